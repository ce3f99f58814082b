// Jamrank — Discord referral & leveling bot.
//
//   atoms   — pure types, constants, errors, the `Platform` trait
//   engine  — store, leveling, invite snapshots, referrals, roles, Discord

pub mod atoms;
pub mod engine;

use crate::atoms::error::EngineResult;
use crate::engine::config::BotConfig;
use crate::engine::discord::gateway::{GatewayBridge, StopHandle};
use crate::engine::discord::DiscordClient;
use crate::engine::state::BotState;
use crate::engine::store::RankStore;
use log::info;
use std::sync::Arc;

/// Open the store, connect to Discord and run until the bridge stops.
pub async fn run(config: BotConfig) -> EngineResult<()> {
    let (bridge, _stop) = build_bridge(&config)?;
    bridge.run().await
}

/// Wire everything together without connecting. The returned handle stops
/// the bridge from another task.
pub fn build_bridge(config: &BotConfig) -> EngineResult<(GatewayBridge, StopHandle)> {
    config.validate()?;
    let db_path = config.database_path();
    let store = Arc::new(RankStore::open(&db_path)?);
    let platform = Arc::new(DiscordClient::new(&config.bot_token));
    let state = Arc::new(BotState::new(config, platform, store)?);
    info!("[jamrank] Starting bot, database at {}", db_path.display());

    let bridge = GatewayBridge::new(state, config.bot_token.clone());
    let stop = bridge.stop_handle();
    Ok((bridge, stop))
}
