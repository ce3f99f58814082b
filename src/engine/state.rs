// engine/state.rs — Process-scoped bot state.
// Built once at startup from BotConfig and shared (behind Arc) by every
// event handler. The invite snapshots and message cooldowns live here as
// explicit dependencies rather than globals.

use crate::atoms::error::EngineResult;
use crate::atoms::traits::Platform;
use crate::engine::config::BotConfig;
use crate::engine::invite_cache::InviteCache;
use crate::engine::leveling::{ExperienceRules, Leveling, MessageCooldowns};
use crate::engine::referrals::ReferralEngine;
use crate::engine::roles::RoleSync;
use crate::engine::store::RankStore;
use log::info;
use std::sync::Arc;
use std::time::Duration;

pub struct BotState {
    pub platform: Arc<dyn Platform>,
    pub store: Arc<RankStore>,
    pub invites: Arc<InviteCache>,
    pub referrals: ReferralEngine,
    pub leveling: Leveling,
    pub roles: RoleSync,
    pub cooldowns: MessageCooldowns,
    pub rules: ExperienceRules,
    pub referral_channel: Option<String>,
    pub dm_invite_links: bool,
    pub link_backfill: bool,
    pub backfill_batch: usize,
    pub backfill_pause: Duration,
}

impl BotState {
    pub fn new(config: &BotConfig, platform: Arc<dyn Platform>, store: Arc<RankStore>) -> EngineResult<Self> {
        config.check_experience_rates()?;
        let table = Arc::new(config.level_table()?);
        let invites = Arc::new(InviteCache::new());
        info!(
            "[engine] {} levels, {} xp/referral, {}s message cooldown",
            table.max_level(),
            config.xp_per_referral,
            config.message_cooldown_secs
        );

        Ok(BotState {
            referrals: ReferralEngine::new(platform.clone(), store.clone(), invites.clone()),
            leveling: Leveling::new(store.clone(), table.clone()),
            roles: RoleSync::new(platform.clone(), table),
            cooldowns: MessageCooldowns::new(config.message_cooldown()),
            rules: config.experience_rules(),
            referral_channel: config.referral_channel.clone(),
            dm_invite_links: config.dm_invite_links,
            link_backfill: config.backfill_links,
            backfill_batch: config.backfill_batch.max(1),
            backfill_pause: config.backfill_pause(),
            platform,
            store,
            invites,
        })
    }
}
