// Jamrank — Discord Gateway Bridge
//
// Holds the persistent WebSocket session to Discord's gateway and turns
// dispatch events into handler calls on `BotState`.
//
//   connect → Hello (op 10) → Identify (op 2) → heartbeat task → dispatch loop
//
// Every dispatched event runs on its own task so heartbeats keep flowing
// while handlers wait on REST calls. A dropped session reconnects with
// escalating backoff; an invalid token (4004) or disallowed intents (4014)
// stop the bridge because retrying cannot fix them.

use crate::atoms::constants::{DISCORD_GATEWAY_URL, MAX_RECONNECT_ATTEMPTS};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::GuildId;
use crate::engine::discord::parse_snowflake;
use crate::engine::handlers::{ChatMessage, MemberJoin};
use crate::engine::http;
use crate::engine::state::BotState;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

// GUILDS | GUILD_MEMBERS | GUILD_INVITES | GUILD_MESSAGES | MESSAGE_CONTENT
//
// GUILD_MEMBERS and MESSAGE_CONTENT are privileged: enable them at
// discord.com/developers → Bot → Privileged Gateway Intents, or Discord
// closes the session with 4014.
pub const INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 6) | (1 << 9) | (1 << 15);

const DEFAULT_HEARTBEAT_MS: u64 = 41_250;

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    d: Option<Value>,
    s: Option<u64>,    // sequence number
    t: Option<String>, // event name
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    username: String,
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct WireMemberAdd {
    guild_id: String,
    user: WireUser,
    nick: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    channel_id: String,
    guild_id: Option<String>,
    author: WireUser,
    #[serde(default)]
    content: String,
}

// ── Events ─────────────────────────────────────────────────────────────

/// The dispatch events the bot acts on.
#[derive(Debug, Clone)]
pub(crate) enum GatewayEvent {
    Ready { username: String },
    GuildAvailable(GuildId),
    GuildRemoved(GuildId),
    MemberJoined(MemberJoin),
    Message(ChatMessage),
    InvitesChanged(GuildId),
}

fn guild_id_field(d: &Value) -> EngineResult<GuildId> {
    let raw = d["guild_id"]
        .as_str()
        .ok_or_else(|| EngineError::channel("discord", "event without guild_id"))?;
    parse_snowflake(raw)
}

/// Decode one dispatch. `Ok(None)` for events the bot does not use.
pub(crate) fn parse_event(name: &str, d: Value) -> EngineResult<Option<GatewayEvent>> {
    let event = match name {
        "READY" => {
            let user: WireUser = serde_json::from_value(d["user"].clone())?;
            GatewayEvent::Ready { username: user.username }
        }
        "GUILD_CREATE" => {
            let id = d["id"].as_str().ok_or_else(|| EngineError::channel("discord", "guild without id"))?;
            GatewayEvent::GuildAvailable(parse_snowflake(id)?)
        }
        "GUILD_DELETE" => {
            let id = d["id"].as_str().ok_or_else(|| EngineError::channel("discord", "guild without id"))?;
            GatewayEvent::GuildRemoved(parse_snowflake(id)?)
        }
        "GUILD_MEMBER_ADD" => {
            let wire: WireMemberAdd = serde_json::from_value(d)?;
            let display_name = wire
                .nick
                .or(wire.user.global_name)
                .unwrap_or_else(|| wire.user.username.clone());
            GatewayEvent::MemberJoined(MemberJoin {
                guild_id: parse_snowflake(&wire.guild_id)?,
                member_id: parse_snowflake(&wire.user.id)?,
                bot: wire.user.bot,
                display_name,
            })
        }
        "MESSAGE_CREATE" => {
            let wire: WireMessage = serde_json::from_value(d)?;
            GatewayEvent::Message(ChatMessage {
                guild_id: wire.guild_id.as_deref().map(parse_snowflake).transpose()?,
                channel_id: wire.channel_id,
                author_id: parse_snowflake(&wire.author.id)?,
                author_bot: wire.author.bot,
                content: wire.content,
            })
        }
        "INVITE_CREATE" | "INVITE_DELETE" => GatewayEvent::InvitesChanged(guild_id_field(&d)?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn dispatch(state: &Arc<BotState>, event: GatewayEvent) {
    let state = state.clone();
    match event {
        GatewayEvent::Ready { username } => info!("[discord] Ready as {}", username),
        GatewayEvent::GuildAvailable(guild_id) => {
            tokio::spawn(async move { state.on_guild_available(guild_id).await });
        }
        GatewayEvent::GuildRemoved(guild_id) => {
            tokio::spawn(async move { state.on_guild_removed(guild_id).await });
        }
        GatewayEvent::MemberJoined(join) => {
            tokio::spawn(async move {
                state.on_member_join(&join).await;
            });
        }
        GatewayEvent::Message(msg) => {
            tokio::spawn(async move {
                state.on_message(&msg).await;
            });
        }
        GatewayEvent::InvitesChanged(guild_id) => {
            tokio::spawn(async move { state.on_invites_changed(guild_id).await });
        }
    }
}

// ── Stop signal ────────────────────────────────────────────────────────

/// Cloneable handle that ends the bridge from another task.
#[derive(Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
        info!("[discord] Stop signal sent");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

// ── Bridge core ────────────────────────────────────────────────────────

pub struct GatewayBridge {
    state: Arc<BotState>,
    token: String,
    stop: StopHandle,
}

impl GatewayBridge {
    pub fn new(state: Arc<BotState>, token: impl Into<String>) -> Self {
        GatewayBridge { state, token: token.into(), stop: StopHandle::default() }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run sessions until stopped, a fatal close, or reconnects run out.
    pub async fn run(&self) -> EngineResult<()> {
        let mut reconnect_attempt: u32 = 0;
        loop {
            match self.run_session().await {
                Ok(()) => {
                    if self.stop.is_stopped() {
                        break;
                    }
                    // Server asked for a fresh session; that is not a failure.
                    reconnect_attempt = 0;
                    info!("[discord] Session ended, reconnecting");
                }
                Err(e @ EngineError::Config(_)) => {
                    error!("[discord] Fatal: {} — stopping", e);
                    return Err(e);
                }
                Err(e) => {
                    if self.stop.is_stopped() {
                        break;
                    }
                    reconnect_attempt += 1;
                    if reconnect_attempt > MAX_RECONNECT_ATTEMPTS {
                        error!("[discord] Max reconnect attempts ({}) reached — giving up", MAX_RECONNECT_ATTEMPTS);
                        return Err(e);
                    }
                    error!("[discord] Bridge error: {} — reconnecting", e);
                    let delay = http::reconnect_delay(reconnect_attempt - 1).await;
                    warn!("[discord] Reconnected after {}ms (attempt {})", delay.as_millis(), reconnect_attempt);
                    if self.stop.is_stopped() {
                        break;
                    }
                }
            }
        }
        info!("[discord] Bridge stopped");
        Ok(())
    }

    async fn run_session(&self) -> EngineResult<()> {
        let ws_err = |e: tokio_tungstenite::tungstenite::Error| EngineError::channel("discord", e.to_string());

        let (ws_stream, _) = connect_async(DISCORD_GATEWAY_URL).await.map_err(ws_err)?;
        let (write, mut read) = ws_stream.split();

        // Read Hello (op 10) to get heartbeat interval
        let hello = read
            .next()
            .await
            .ok_or_else(|| EngineError::channel("discord", "Gateway closed before Hello"))?
            .map_err(ws_err)?;
        let hello_payload: GatewayPayload = serde_json::from_str(hello.to_text().map_err(ws_err)?)?;
        if hello_payload.op != 10 {
            return Err(EngineError::channel(
                "discord",
                format!("Expected Hello (op 10), got op {}", hello_payload.op),
            ));
        }
        let heartbeat_interval = hello_payload
            .d
            .as_ref()
            .and_then(|d| d["heartbeat_interval"].as_u64())
            .unwrap_or(DEFAULT_HEARTBEAT_MS);
        info!("[discord] Connected to gateway, heartbeat_interval={}ms", heartbeat_interval);

        let write = Arc::new(tokio::sync::Mutex::new(write));
        let identify = json!({
            "op": 2,
            "d": {
                "token": self.token,
                "intents": INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "jamrank",
                    "device": "jamrank"
                }
            }
        });
        write
            .lock()
            .await
            .send(WsMessage::Text(identify.to_string()))
            .await
            .map_err(ws_err)?;

        // Heartbeat task; the read loop forwards sequence numbers to it.
        let (hb_tx, mut hb_rx) = tokio::sync::mpsc::channel::<u64>(64);
        let hb_write = write.clone();
        let stop_hb = self.stop.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut seq: Option<u64> = None;
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(heartbeat_interval)).await;
                if stop_hb.is_stopped() {
                    break;
                }
                while let Ok(s) = hb_rx.try_recv() {
                    seq = Some(s);
                }
                let hb = json!({ "op": 1, "d": seq });
                if let Err(e) = hb_write.lock().await.send(WsMessage::Text(hb.to_string())).await {
                    warn!("[discord] Heartbeat send failed: {}", e);
                    break;
                }
            }
        });

        let result = self.read_loop(&mut read, &write, &hb_tx).await;
        heartbeat_task.abort();
        result
    }

    async fn read_loop<R, W>(
        &self,
        read: &mut R,
        write: &Arc<tokio::sync::Mutex<W>>,
        hb_tx: &tokio::sync::mpsc::Sender<u64>,
    ) -> EngineResult<()>
    where
        R: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
        W: futures::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let mut last_seq: Option<u64> = None;
        loop {
            if self.stop.is_stopped() {
                return Ok(());
            }
            let next = tokio::select! {
                next = read.next() => next,
                _ = self.stop.notify.notified() => return Ok(()),
            };
            let msg = match next {
                Some(Ok(m)) => m,
                Some(Err(e)) => return Err(EngineError::channel("discord", format!("WS read error: {}", e))),
                None => return Err(EngineError::channel("discord", "Gateway stream ended")),
            };

            let text = match msg {
                WsMessage::Text(t) => t,
                WsMessage::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (f.code.into(), f.reason.to_string()))
                        .unwrap_or((0u16, String::new()));
                    return close_outcome(code, &reason);
                }
                _ => continue,
            };

            let payload: GatewayPayload = match serde_json::from_str(&text) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if let Some(s) = payload.s {
                last_seq = Some(s);
                let _ = hb_tx.try_send(s);
            }

            match payload.op {
                // Dispatch
                0 => {
                    let name = payload.t.as_deref().unwrap_or("");
                    match parse_event(name, payload.d.unwrap_or(Value::Null)) {
                        Ok(Some(event)) => dispatch(&self.state, event),
                        Ok(None) => {}
                        Err(e) => warn!("[discord] Skipping malformed {} event: {}", name, e),
                    }
                }
                // Heartbeat request
                1 => {
                    let hb = json!({ "op": 1, "d": last_seq });
                    write
                        .lock()
                        .await
                        .send(WsMessage::Text(hb.to_string()))
                        .await
                        .map_err(|e| EngineError::channel("discord", e.to_string()))?;
                }
                // Reconnect
                7 => {
                    info!("[discord] Gateway requested reconnect");
                    return Ok(());
                }
                // Invalid Session
                9 => {
                    let resumable = payload.d.as_ref().and_then(|d| d.as_bool()).unwrap_or(false);
                    warn!("[discord] Invalid session (resumable={})", resumable);
                    return Err(EngineError::channel("discord", "Invalid session — Discord rejected the connection"));
                }
                // Heartbeat ACK
                11 => debug!("[discord] Heartbeat ACK"),
                _ => {}
            }
        }
    }
}

/// Map a gateway close code to how the bridge proceeds.
// Discord close codes: https://discord.com/developers/docs/topics/opcodes-and-status-codes
fn close_outcome(code: u16, reason: &str) -> EngineResult<()> {
    match code {
        4004 => Err(EngineError::Config(
            "Invalid bot token (4004). Check your token at discord.com/developers.".into(),
        )),
        4014 => Err(EngineError::Config(
            "Disallowed intents (4014). Enable 'Server Members Intent' and 'Message Content Intent' \
             in Discord Developer Portal → Bot → Privileged Gateway Intents."
                .into(),
        )),
        1000 | 0 => {
            info!("[discord] Gateway closed normally (code={})", code);
            Ok(())
        }
        _ => {
            warn!("[discord] Gateway closed: code={} reason={}", code, reason);
            Err(EngineError::channel("discord", format!("Gateway closed: code={} {}", code, reason)))
        }
    }
}
