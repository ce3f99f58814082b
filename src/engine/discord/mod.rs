// Jamrank — Discord Adapter
//
// `Platform` implemented over the Discord REST API (v10), plus the gateway
// bridge that feeds events into the handlers.
//
//   mod.rs   — REST client, rate-limit retry, wire types → atoms types
//   gateway  — WebSocket session: identify, heartbeat, dispatch, reconnect
//
// Snowflakes arrive as strings on the wire and are parsed to u64 here; the
// rest of the crate never sees a string id except for roles and channels.

pub mod gateway;

use crate::atoms::constants::DISCORD_API;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::Platform;
use crate::atoms::types::{GuildId, GuildMember, Invite, InviteCreator, InviteRequest, MemberId, RoleInfo};
use crate::engine::http;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

const CHANNEL_TYPE_GUILD_TEXT: u8 = 0;

// Largest page the list-members endpoint returns.
const MEMBER_PAGE_SIZE: usize = 1000;

// ── Wire types ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct WireInvite {
    code: String,
    #[serde(default)]
    uses: u64,
    inviter: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireRole {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    position: i64,
}

#[derive(Debug, Deserialize)]
struct WireGuild {
    system_channel_id: Option<String>,
}

pub(crate) fn parse_snowflake(raw: &str) -> EngineResult<u64> {
    raw.parse::<u64>()
        .map_err(|_| EngineError::channel("discord", format!("Malformed snowflake '{}'", raw)))
}

fn invites_from_wire(raw: Vec<WireInvite>) -> Vec<Invite> {
    raw.into_iter()
        .map(|w| {
            // An unparseable inviter is treated as unknown, not as an error.
            let inviter = w
                .inviter
                .and_then(|u| parse_snowflake(&u.id).ok().map(|id| InviteCreator { id, bot: u.bot }));
            Invite { code: w.code, uses: w.uses, inviter }
        })
        .collect()
}

fn members_from_wire(raw: Vec<WireMember>) -> Vec<GuildMember> {
    raw.into_iter()
        .filter_map(|m| m.user)
        .filter_map(|u| parse_snowflake(&u.id).ok().map(|id| GuildMember { id, bot: u.bot }))
        .collect()
}

/// Channel by name, else the system channel, else the top text channel.
fn pick_text_channel(channels: &[WireChannel], preferred: Option<&str>, system: Option<&str>) -> Option<String> {
    let mut text: Vec<&WireChannel> = channels.iter().filter(|c| c.kind == CHANNEL_TYPE_GUILD_TEXT).collect();
    text.sort_by_key(|c| c.position);

    if let Some(name) = preferred {
        if let Some(c) = text.iter().find(|c| c.name.as_deref() == Some(name)) {
            return Some(c.id.clone());
        }
    }
    if let Some(id) = system {
        if text.iter().any(|c| c.id == id) {
            return Some(id.to_string());
        }
    }
    text.first().map(|c| c.id.clone())
}

// ── REST client ────────────────────────────────────────────────────────

pub struct DiscordClient {
    http: reqwest::Client,
    auth: String,
    api_base: String,
}

impl DiscordClient {
    pub fn new(token: &str) -> Self {
        Self::with_base(token, DISCORD_API)
    }

    pub fn with_base(token: &str, api_base: &str) -> Self {
        DiscordClient {
            http: reqwest::Client::new(),
            auth: format!("Bot {}", token),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Make a Discord API request, retrying rate limits and 5xx with backoff.
    async fn request(&self, method: Method, path: &str, body: Option<&Value>, reason: Option<&str>) -> EngineResult<Value> {
        let url = format!("{}{}", self.api_base, path);
        let mut attempt = 0;
        loop {
            let mut req = self.http.request(method.clone(), &url).header("Authorization", &self.auth);
            if let Some(b) = body {
                req = req.json(b);
            }
            if let Some(r) = reason {
                req = req.header("X-Audit-Log-Reason", r);
            }

            let resp = req.send().await?;
            let status = resp.status().as_u16();
            let header_hint = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(http::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();

            if http::is_retryable_status(status) && attempt < http::MAX_RETRIES {
                let hint = http::parse_retry_after_body(&text).or(header_hint);
                let delay = http::retry_delay(attempt, hint).await;
                warn!(
                    "[discord] {} {} → {}, retried after {}ms (attempt {})",
                    method,
                    path,
                    status,
                    delay.as_millis(),
                    attempt + 1
                );
                attempt += 1;
                continue;
            }

            if status == 204 {
                return Ok(Value::Null);
            }
            if !(200..300).contains(&status) {
                let snippet: String = text.chars().take(300).collect();
                return Err(EngineError::from_status(status, format!("{} {}: {}", method, path, snippet)));
            }
            debug!("[discord] {} {} → {}", method, path, status);
            return Ok(serde_json::from_str(&text).unwrap_or(Value::Null));
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> EngineResult<T> {
        let value = self.request(Method::GET, path, None, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn guild_channels(&self, guild_id: GuildId) -> EngineResult<Vec<WireChannel>> {
        self.get(&format!("/guilds/{}/channels", guild_id)).await
    }
}

#[async_trait]
impl Platform for DiscordClient {
    async fn list_invites(&self, guild_id: GuildId) -> EngineResult<Vec<Invite>> {
        let raw: Vec<WireInvite> = self.get(&format!("/guilds/{}/invites", guild_id)).await?;
        Ok(invites_from_wire(raw))
    }

    async fn create_invite(&self, guild_id: GuildId, request: &InviteRequest) -> EngineResult<Invite> {
        let channel_id = self
            .text_channel(guild_id, None)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("No text channel in guild {} for invites", guild_id)))?;
        let body = json!({
            "max_age": request.max_age_secs,
            "max_uses": request.max_uses,
            "unique": request.unique,
        });
        let value = self
            .request(
                Method::POST,
                &format!("/channels/{}/invites", channel_id),
                Some(&body),
                request.reason.as_deref(),
            )
            .await?;
        let wire: WireInvite = serde_json::from_value(value)?;
        Ok(invites_from_wire(vec![wire]).remove(0))
    }

    async fn list_members(&self, guild_id: GuildId) -> EngineResult<Vec<GuildMember>> {
        let mut members = Vec::new();
        let mut after: MemberId = 0;
        loop {
            let path = format!("/guilds/{}/members?limit={}&after={}", guild_id, MEMBER_PAGE_SIZE, after);
            let page: Vec<WireMember> = self.get(&path).await?;
            let full_page = page.len() == MEMBER_PAGE_SIZE;
            let batch = members_from_wire(page);
            match batch.iter().map(|m| m.id).max() {
                Some(last) => after = last,
                None => break,
            }
            members.extend(batch);
            if !full_page {
                break;
            }
        }
        debug!("[discord] Listed {} members of guild {}", members.len(), guild_id);
        Ok(members)
    }

    async fn guild_roles(&self, guild_id: GuildId) -> EngineResult<Vec<RoleInfo>> {
        let raw: Vec<WireRole> = self.get(&format!("/guilds/{}/roles", guild_id)).await?;
        Ok(raw.into_iter().map(|r| RoleInfo { id: r.id, name: r.name }).collect())
    }

    async fn member_roles(&self, guild_id: GuildId, member_id: MemberId) -> EngineResult<Vec<String>> {
        let member: WireMember = self.get(&format!("/guilds/{}/members/{}", guild_id, member_id)).await?;
        Ok(member.roles)
    }

    async fn add_member_role(&self, guild_id: GuildId, member_id: MemberId, role_id: &str) -> EngineResult<()> {
        let path = format!("/guilds/{}/members/{}/roles/{}", guild_id, member_id, role_id);
        self.request(Method::PUT, &path, None, Some("level reached")).await?;
        Ok(())
    }

    async fn remove_member_role(&self, guild_id: GuildId, member_id: MemberId, role_id: &str) -> EngineResult<()> {
        let path = format!("/guilds/{}/members/{}/roles/{}", guild_id, member_id, role_id);
        self.request(Method::DELETE, &path, None, Some("level changed")).await?;
        Ok(())
    }

    async fn text_channel(&self, guild_id: GuildId, preferred_name: Option<&str>) -> EngineResult<Option<String>> {
        let channels = self.guild_channels(guild_id).await?;
        let guild: WireGuild = self.get(&format!("/guilds/{}", guild_id)).await?;
        Ok(pick_text_channel(&channels, preferred_name, guild.system_channel_id.as_deref()))
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> EngineResult<()> {
        let body = json!({ "content": content, "allowed_mentions": { "parse": ["users"] } });
        self.request(Method::POST, &format!("/channels/{}/messages", channel_id), Some(&body), None)
            .await?;
        Ok(())
    }

    async fn direct_message(&self, member_id: MemberId, content: &str) -> EngineResult<()> {
        let body = json!({ "recipient_id": member_id.to_string() });
        let dm = self.request(Method::POST, "/users/@me/channels", Some(&body), None).await?;
        let channel_id = dm["id"]
            .as_str()
            .ok_or_else(|| EngineError::channel("discord", "DM channel response without id"))?;
        self.send_message(channel_id, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, kind: u8, name: &str, position: i64) -> WireChannel {
        WireChannel { id: id.into(), kind, name: Some(name.into()), position }
    }

    #[test]
    fn invites_keep_platform_order_and_creators() {
        let raw: Vec<WireInvite> = serde_json::from_str(
            r#"[
                {"code": "abc", "uses": 3, "inviter": {"id": "80351110224678912", "username": "nelly"}},
                {"code": "bot", "uses": 0, "inviter": {"id": "42", "bot": true}},
                {"code": "vanity", "uses": 12},
                {"code": "weird", "uses": 1, "inviter": {"id": "not-a-number"}}
            ]"#,
        )
        .unwrap();
        let invites = invites_from_wire(raw);
        let codes: Vec<&str> = invites.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["abc", "bot", "vanity", "weird"]);
        assert_eq!(invites[0].inviter, Some(InviteCreator { id: 80351110224678912, bot: false }));
        assert_eq!(invites[1].inviter, Some(InviteCreator { id: 42, bot: true }));
        assert_eq!(invites[2].inviter, None);
        assert_eq!(invites[3].inviter, None);
    }

    #[test]
    fn members_carry_bot_flag_and_skip_bad_ids() {
        let raw: Vec<WireMember> = serde_json::from_str(
            r#"[
                {"user": {"id": "80351110224678912", "username": "nelly"}, "roles": ["1"]},
                {"user": {"id": "42", "bot": true}},
                {"user": {"id": "not-a-number"}},
                {"roles": []}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            members_from_wire(raw),
            vec![GuildMember { id: 80351110224678912, bot: false }, GuildMember { id: 42, bot: true }]
        );
    }

    #[test]
    fn text_channel_prefers_name_then_system_then_first() {
        let channels = vec![
            channel("30", 0, "off-topic", 3),
            channel("10", 2, "general", 0), // voice channel with the same name
            channel("20", 0, "welcome", 1),
            channel("40", 0, "general", 4),
        ];
        assert_eq!(pick_text_channel(&channels, Some("general"), Some("30")), Some("40".into()));
        assert_eq!(pick_text_channel(&channels, Some("missing"), Some("30")), Some("30".into()));
        assert_eq!(pick_text_channel(&channels, None, Some("10")), Some("20".into()));
        assert_eq!(pick_text_channel(&channels, None, None), Some("20".into()));
        assert_eq!(pick_text_channel(&[], Some("general"), None), None);
    }

    #[test]
    fn snowflakes_parse_or_fail_cleanly() {
        assert_eq!(parse_snowflake("175928847299117063").unwrap(), 175928847299117063);
        assert!(matches!(parse_snowflake("abc"), Err(EngineError::Channel { .. })));
    }

    #[test]
    fn client_trims_api_base() {
        let client = DiscordClient::with_base("tok", "http://localhost:9/api/");
        assert_eq!(client.api_base, "http://localhost:9/api");
        assert_eq!(client.auth, "Bot tok");
    }
}
