// Jamrank — Event Handlers
//
// Platform-neutral handling of the four notifications the bot reacts to:
//
//   guild available   → build the guild's invite snapshot, then give
//                       existing members their personal links
//   invite changed    → rebuild it
//   member joined     → attribute → credit referrer → announce → sync roles,
//                       then provision + DM the newcomer's own link
//   message created   → cooldown gate → credit author → announce → sync roles
//
// Handlers never return errors: every failure is logged here so one bad
// event cannot stop the gateway loop.

use crate::atoms::types::{ExperienceDelta, GuildId, LevelChange, MemberId};
use crate::engine::state::BotState;
use log::{error, info, warn};

/// A member arrived in a guild.
#[derive(Debug, Clone)]
pub struct MemberJoin {
    pub guild_id: GuildId,
    pub member_id: MemberId,
    pub bot: bool,
    pub display_name: String,
}

/// A message posted somewhere the bot can see.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// `None` for direct messages.
    pub guild_id: Option<GuildId>,
    pub channel_id: String,
    pub author_id: MemberId,
    pub author_bot: bool,
    pub content: String,
}

impl BotState {
    pub async fn on_guild_available(&self, guild_id: GuildId) {
        if let Ok(count) = self.invites.refresh(guild_id, self.platform.as_ref()).await {
            info!("[engine] Guild {} ready, tracking {} invites", guild_id, count);
        }
        if self.link_backfill {
            self.backfill_links(guild_id).await;
        }
    }

    /// Provision a personal link for every human member already in the
    /// guild, pausing after each batch. Returns how many members have one.
    pub async fn backfill_links(&self, guild_id: GuildId) -> usize {
        let members = match self.platform.list_members(guild_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!("[engine] Link backfill for guild {} skipped: {}", guild_id, e);
                return 0;
            }
        };

        let mut attempted = 0;
        let mut linked = 0;
        for member in members.iter().filter(|m| !m.bot) {
            if attempted > 0 && attempted % self.backfill_batch == 0 {
                tokio::time::sleep(self.backfill_pause).await;
            }
            attempted += 1;
            if self.referrals.ensure_link(guild_id, member.id).await.is_some() {
                linked += 1;
            }
        }
        info!("[engine] Guild {}: {} of {} members have a personal link", guild_id, linked, attempted);
        linked
    }

    pub async fn on_guild_removed(&self, guild_id: GuildId) {
        self.invites.forget(guild_id).await;
        info!("[engine] Guild {} unavailable, snapshot cleared", guild_id);
    }

    pub async fn on_invites_changed(&self, guild_id: GuildId) {
        let _ = self.invites.refresh(guild_id, self.platform.as_ref()).await;
    }

    /// Returns the credited referrer, if any.
    pub async fn on_member_join(&self, join: &MemberJoin) -> Option<MemberId> {
        if join.bot {
            // Bots still consume invite uses; keep the baseline current.
            let _ = self.invites.refresh(join.guild_id, self.platform.as_ref()).await;
            return None;
        }

        let referrer = self.referrals.attribute(join.guild_id, join.member_id).await;

        if let Some(url) = self.referrals.ensure_link(join.guild_id, join.member_id).await {
            if self.dm_invite_links {
                let text = format!(
                    "Your personal invite link: {}\nAnyone who joins through it counts as your referral.",
                    url
                );
                match self.platform.direct_message(join.member_id, &text).await {
                    Ok(()) => {}
                    Err(e) if e.is_transient() => info!("[engine] Could not DM link to member {}: {}", join.member_id, e),
                    Err(e) => warn!("[engine] DM to member {} failed: {}", join.member_id, e),
                }
            }
        }

        let referrer_id = referrer?;
        let change = match self
            .leveling
            .apply_delta(referrer_id, ExperienceDelta::referral(self.rules.xp_per_referral as i64))
        {
            Ok(change) => change,
            Err(e) => {
                error!("[engine] Referral credit for member {} failed: {}", referrer_id, e);
                return Some(referrer_id);
            }
        };

        let channel = self.announcement_channel(join.guild_id).await;
        if let Some(channel) = &channel {
            let referrals = self.store.get_member(referrer_id).ok().flatten().map(|s| s.referral_count).unwrap_or(0);
            let text = format!(
                "🎉 **{}** joined via <@{}>'s invite! They earned {} xp and now have {} referral(s).",
                join.display_name, referrer_id, self.rules.xp_per_referral, referrals
            );
            self.announce(channel, &text).await;
        }

        if change.leveled_up {
            self.level_up(join.guild_id, &change, channel.as_deref()).await;
        }
        Some(referrer_id)
    }

    /// Returns the level change when the message earned experience.
    pub async fn on_message(&self, msg: &ChatMessage) -> Option<LevelChange> {
        if msg.author_bot {
            return None;
        }
        let guild_id = msg.guild_id?;
        let xp = self.rules.message_experience(&msg.content)?;
        if !self.cooldowns.try_acquire(msg.author_id) {
            return None;
        }

        // Members who missed the join DM still get a link provisioned.
        let _ = self.referrals.ensure_link(guild_id, msg.author_id).await;

        let change = match self.leveling.apply_delta(msg.author_id, ExperienceDelta::message(xp as i64)) {
            Ok(change) => change,
            Err(e) => {
                error!("[engine] Message credit for member {} failed: {}", msg.author_id, e);
                return None;
            }
        };

        if change.leveled_up {
            self.level_up(guild_id, &change, Some(&msg.channel_id)).await;
        }
        Some(change)
    }

    async fn level_up(&self, guild_id: GuildId, change: &LevelChange, channel: Option<&str>) {
        if let Some(channel) = channel {
            let role = self
                .leveling
                .table()
                .role_for(change.new_level)
                .map(str::to_string)
                .unwrap_or_else(|| format!("level {}", change.new_level));
            let text = format!("✨ <@{}> just reached **{}**! (level {})", change.member_id, role, change.new_level);
            self.announce(channel, &text).await;
        }

        match self.roles.sync(guild_id, change.member_id, change.new_level).await {
            Ok(report) if !report.failed.is_empty() => {
                warn!("[engine] Role sync for member {} incomplete: {:?}", change.member_id, report.failed);
            }
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                warn!("[engine] Role sync for member {} skipped: {}", change.member_id, e)
            }
            Err(e) => error!("[engine] Role sync for member {} failed: {}", change.member_id, e),
        }
    }

    async fn announcement_channel(&self, guild_id: GuildId) -> Option<String> {
        match self.platform.text_channel(guild_id, self.referral_channel.as_deref()).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("[engine] No announcement channel for guild {}: {}", guild_id, e);
                None
            }
        }
    }

    async fn announce(&self, channel_id: &str, text: &str) {
        if let Err(e) = self.platform.send_message(channel_id, text).await {
            warn!("[engine] Announcement to {} failed: {}", channel_id, e);
        }
    }
}
