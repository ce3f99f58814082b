// Jamrank — Invite Snapshot Cache
//
// Per-guild map of invite code → last observed use count. It is only a
// delta baseline for spotting which invite a new member consumed, never
// ground truth.
//
// Lifecycle: empty at startup, filled when a guild becomes available,
// refreshed on invite create/delete notifications and after the bot creates
// a personal invite, replaced wholesale on every join diff. Each guild's
// snapshot sits behind its own async mutex so joins in one guild are
// serialized while other guilds proceed in parallel.

use crate::atoms::error::EngineResult;
use crate::atoms::traits::Platform;
use crate::atoms::types::{GuildId, Invite};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Last-known use counts for one guild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteSnapshot {
    uses: HashMap<String, u64>,
}

impl InviteSnapshot {
    pub fn from_invites(invites: &[Invite]) -> Self {
        InviteSnapshot { uses: invites.iter().map(|i| (i.code.clone(), i.uses)).collect() }
    }

    /// Last observed use count; an unseen code counts as 0.
    pub fn uses(&self, code: &str) -> u64 {
        self.uses.get(code).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.uses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uses.is_empty()
    }

    /// First invite, in `fresh` order, whose count rose above the baseline.
    /// Simultaneous increments are not disambiguated: first match wins.
    pub fn first_increase<'a>(&self, fresh: &'a [Invite]) -> Option<&'a Invite> {
        fresh.iter().find(|inv| inv.uses > self.uses(&inv.code))
    }

    /// Replace every count with the fresh listing. Codes missing from it are dropped.
    pub fn replace(&mut self, fresh: &[Invite]) {
        *self = InviteSnapshot::from_invites(fresh);
    }
}

/// Process-scoped owner of every guild's snapshot.
#[derive(Default)]
pub struct InviteCache {
    guilds: Mutex<HashMap<GuildId, Arc<AsyncMutex<InviteSnapshot>>>>,
}

impl InviteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The guild's snapshot slot, created empty on first use.
    /// Hold the returned lock for the whole fetch-diff-replace sequence.
    pub fn guild(&self, guild_id: GuildId) -> Arc<AsyncMutex<InviteSnapshot>> {
        self.guilds.lock().entry(guild_id).or_default().clone()
    }

    /// Rebuild a guild's snapshot from the platform.
    /// On failure the previous snapshot stays as it was.
    pub async fn refresh(&self, guild_id: GuildId, platform: &dyn Platform) -> EngineResult<usize> {
        let slot = self.guild(guild_id);
        let mut snapshot = slot.lock().await;
        match platform.list_invites(guild_id).await {
            Ok(fresh) => {
                snapshot.replace(&fresh);
                debug!("[invites] Cached {} invites for guild {}", fresh.len(), guild_id);
                Ok(fresh.len())
            }
            Err(e) => {
                warn!("[invites] Could not list invites for guild {}: {} — keeping stale snapshot", guild_id, e);
                Err(e)
            }
        }
    }

    /// Copy of a guild's snapshot.
    pub async fn snapshot(&self, guild_id: GuildId) -> InviteSnapshot {
        let slot = self.guild(guild_id);
        let snapshot = slot.lock().await;
        snapshot.clone()
    }

    /// Clear a guild's snapshot. The slot itself stays, so a join still
    /// holding it finishes first and later joins share the same lock.
    pub async fn forget(&self, guild_id: GuildId) {
        let slot = self.guilds.lock().get(&guild_id).cloned();
        if let Some(slot) = slot {
            *slot.lock().await = InviteSnapshot::default();
        }
    }
}
