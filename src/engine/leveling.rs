// Jamrank — Leveling Engine
//
// Converts experience into levels and applies experience credit to members.
//
//   LevelTable        — ordered (threshold, role) tiers; `level_for` is pure
//   Leveling          — atomic apply_delta / set_experience against the store
//   ExperienceRules   — how much a message or a referral is worth
//   MessageCooldowns  — per-member anti-spam gate for message credit
//
// Level 0 means unranked. Level N is reached at the N-th tier's threshold.

use crate::atoms::constants::*;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{ExperienceDelta, LevelChange, MemberId, MemberStats};
use crate::engine::store::RankStore;
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ── Level table ────────────────────────────────────────────────────────

/// One level: the experience needed to reach it and the role it maps to.
/// A tier without a role is valid; role sync simply has nothing to grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTier {
    pub threshold: u64,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    tiers: Vec<LevelTier>,
}

/// Where a member stands relative to the next level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelProgress {
    pub level: u32,
    pub experience: u64,
    /// Threshold of the next level, `None` at max level.
    pub next_threshold: Option<u64>,
}

impl LevelTable {
    /// Build a table. Thresholds must be positive and strictly increasing.
    pub fn new(tiers: Vec<LevelTier>) -> EngineResult<Self> {
        if let Some(first) = tiers.first() {
            if first.threshold == 0 {
                return Err(EngineError::Config("level 1 threshold must be greater than 0".into()));
            }
        }
        for (i, pair) in tiers.windows(2).enumerate() {
            if pair[1].threshold <= pair[0].threshold {
                return Err(EngineError::Config(format!(
                    "level thresholds must be strictly increasing: level {} ({}) <= level {} ({})",
                    i + 2,
                    pair[1].threshold,
                    i + 1,
                    pair[0].threshold
                )));
            }
        }
        Ok(LevelTable { tiers })
    }

    pub fn tiers(&self) -> &[LevelTier] {
        &self.tiers
    }

    pub fn max_level(&self) -> u32 {
        self.tiers.len() as u32
    }

    /// Highest level whose threshold is ≤ `experience`, or 0.
    pub fn level_for(&self, experience: u64) -> u32 {
        self.tiers.partition_point(|t| t.threshold <= experience) as u32
    }

    /// Experience needed for `level` (1-based).
    pub fn threshold(&self, level: u32) -> Option<u64> {
        self.tier(level).map(|t| t.threshold)
    }

    pub fn role_for(&self, level: u32) -> Option<&str> {
        self.tier(level).and_then(|t| t.role.as_deref())
    }

    pub fn progress(&self, experience: u64) -> LevelProgress {
        let level = self.level_for(experience);
        LevelProgress { level, experience, next_threshold: self.threshold(level + 1) }
    }

    fn tier(&self, level: u32) -> Option<&LevelTier> {
        if level == 0 {
            return None;
        }
        self.tiers.get(level as usize - 1)
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        LevelTable {
            tiers: DEFAULT_LEVELS
                .iter()
                .map(|(threshold, role)| LevelTier { threshold: *threshold, role: Some(role.to_string()) })
                .collect(),
        }
    }
}

// ── Experience rules ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperienceRules {
    pub xp_per_message: u64,
    pub long_message_bonus: u64,
    pub long_message_chars: usize,
    pub xp_per_referral: u64,
    pub ignored_prefixes: Vec<String>,
}

impl Default for ExperienceRules {
    fn default() -> Self {
        ExperienceRules {
            xp_per_message: DEFAULT_XP_PER_MESSAGE,
            long_message_bonus: DEFAULT_XP_LONG_MESSAGE_BONUS,
            long_message_chars: DEFAULT_LONG_MESSAGE_CHARS,
            xp_per_referral: DEFAULT_XP_PER_REFERRAL,
            ignored_prefixes: DEFAULT_IGNORED_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ExperienceRules {
    /// Experience a message earns, or `None` for command-like messages.
    pub fn message_experience(&self, content: &str) -> Option<u64> {
        if self.ignored_prefixes.iter().any(|p| content.starts_with(p.as_str())) {
            return None;
        }
        let mut xp = self.xp_per_message;
        if content.chars().count() >= self.long_message_chars {
            xp += self.long_message_bonus;
        }
        Some(xp)
    }
}

// ── Leveling engine ────────────────────────────────────────────────────

pub struct Leveling {
    store: Arc<RankStore>,
    table: Arc<LevelTable>,
}

impl Leveling {
    pub fn new(store: Arc<RankStore>, table: Arc<LevelTable>) -> Self {
        Leveling { store, table }
    }

    pub fn table(&self) -> &LevelTable {
        &self.table
    }

    pub fn stats(&self, member_id: MemberId) -> EngineResult<MemberStats> {
        self.store.get_or_create_member(member_id)
    }

    /// Add `delta` to a member, recompute the level, persist atomically.
    /// Negative experience is rejected, never clamped. Totals stop at `MAX_EXPERIENCE`.
    pub fn apply_delta(&self, member_id: MemberId, delta: ExperienceDelta) -> EngineResult<LevelChange> {
        if delta.experience < 0 {
            return Err(EngineError::InvalidDelta(delta.experience));
        }
        let gained = delta.experience as u64;
        let table = &self.table;
        let (before, after) = self.store.modify_member(member_id, |s| {
            let experience = s.experience.saturating_add(gained).min(MAX_EXPERIENCE);
            Ok(MemberStats {
                member_id,
                experience,
                level: table.level_for(experience),
                referral_count: s.referral_count + delta.referrals,
                message_count: s.message_count + delta.messages,
            })
        })?;

        let change = level_change(&before, &after);
        if change.leveled_up {
            info!(
                "[leveling] Member {} reached level {} ({} xp)",
                member_id, change.new_level, change.experience
            );
        } else {
            debug!("[leveling] Member {} +{} xp → {}", member_id, gained, change.experience);
        }
        Ok(change)
    }

    /// Admin override: set experience outright. The only path that may lower it.
    pub fn set_experience(&self, member_id: MemberId, experience: u64) -> EngineResult<LevelChange> {
        if experience > MAX_EXPERIENCE {
            return Err(EngineError::ExperienceOutOfRange(experience));
        }
        let table = &self.table;
        let (before, after) = self.store.modify_member(member_id, |s| {
            Ok(MemberStats { experience, level: table.level_for(experience), ..s.clone() })
        })?;
        info!("[leveling] Member {} experience set to {}", member_id, experience);
        Ok(level_change(&before, &after))
    }
}

fn level_change(before: &MemberStats, after: &MemberStats) -> LevelChange {
    LevelChange {
        member_id: after.member_id,
        previous_level: before.level,
        new_level: after.level,
        experience: after.experience,
        leveled_up: after.level > before.level,
    }
}

// ── Message cooldown ───────────────────────────────────────────────────

// Entries older than the window are swept once the map grows past this.
const COOLDOWN_SWEEP_AT: usize = 4096;

/// Per-member timestamp gate for message experience.
///
/// In-memory only: lost on restart. Referral credit never consults it.
pub struct MessageCooldowns {
    window: Duration,
    last_credit: Mutex<HashMap<MemberId, Instant>>,
}

impl MessageCooldowns {
    pub fn new(window: Duration) -> Self {
        MessageCooldowns { window, last_credit: Mutex::new(HashMap::new()) }
    }

    /// Claim the member's credit slot. True at most once per window.
    pub fn try_acquire(&self, member_id: MemberId) -> bool {
        self.try_acquire_at(member_id, Instant::now())
    }

    pub fn try_acquire_at(&self, member_id: MemberId, now: Instant) -> bool {
        let mut last = self.last_credit.lock();
        if let Some(prev) = last.get(&member_id) {
            if now.saturating_duration_since(*prev) < self.window {
                return false;
            }
        }
        if last.len() >= COOLDOWN_SWEEP_AT {
            let window = self.window;
            last.retain(|_, t| now.saturating_duration_since(*t) < window);
        }
        last.insert(member_id, now);
        true
    }
}
