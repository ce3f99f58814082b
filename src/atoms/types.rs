// ── Jamrank Atoms: Pure Data Types ────────────────────────────────────────────
// Plain struct/enum definitions shared by the store, the engines and the
// platform adapter.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use serde::{Deserialize, Serialize};

/// Platform-assigned member identifier (Discord snowflake).
pub type MemberId = u64;

/// Platform-assigned community identifier (Discord guild snowflake).
pub type GuildId = u64;

// ── Platform types ─────────────────────────────────────────────────────────

/// The account that created an invite on the platform side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCreator {
    pub id: MemberId,
    #[serde(default)]
    pub bot: bool,
}

/// One invite as listed by the platform: code + cumulative use count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub code: String,
    pub uses: u64,
    pub inviter: Option<InviteCreator>,
}

impl Invite {
    pub fn new(code: impl Into<String>, uses: u64) -> Self {
        Invite { code: code.into(), uses, inviter: None }
    }

    pub fn created_by(mut self, id: MemberId, bot: bool) -> Self {
        self.inviter = Some(InviteCreator { id, bot });
        self
    }

    /// Shareable link for this invite.
    pub fn url(&self) -> String {
        invite_url(&self.code)
    }
}

pub fn invite_url(code: &str) -> String {
    format!("{}{}", crate::atoms::constants::INVITE_URL_BASE, code)
}

/// Parameters for creating an invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRequest {
    /// Seconds until expiry, 0 = never.
    pub max_age_secs: u32,
    /// Maximum uses, 0 = unlimited.
    pub max_uses: u32,
    /// Ask the platform for a fresh code instead of reusing a matching one.
    pub unique: bool,
    /// Audit-log reason.
    pub reason: Option<String>,
}

impl InviteRequest {
    /// Never-expiring, unlimited, unique invite used as a member's personal link.
    pub fn personal(member_id: MemberId) -> Self {
        InviteRequest {
            max_age_secs: 0,
            max_uses: 0,
            unique: true,
            reason: Some(format!("personal referral link for member {}", member_id)),
        }
    }
}

/// A guild member as the platform lists it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildMember {
    pub id: MemberId,
    pub bot: bool,
}

/// A role definition in a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id: String,
    pub name: String,
}

// ── Store types ────────────────────────────────────────────────────────────

/// Persistent per-member stats row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStats {
    pub member_id: MemberId,
    pub experience: u64,
    pub level: u32,
    pub referral_count: u64,
    pub message_count: u64,
}

/// "referred_id was brought in by referrer_id". Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub referrer_id: MemberId,
    pub referred_id: MemberId,
    /// Unix seconds.
    pub created_at: i64,
}

/// Result of inserting a referral edge. `AlreadyExists` is a normal branch:
/// the referred member was credited before (re-join, duplicate delivery).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralInsert {
    Inserted,
    AlreadyExists,
}

// ── Leveling types ─────────────────────────────────────────────────────────

/// Counters added to a member by one credit event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExperienceDelta {
    pub experience: i64,
    pub messages: u64,
    pub referrals: u64,
}

impl ExperienceDelta {
    pub fn message(experience: i64) -> Self {
        ExperienceDelta { experience, messages: 1, referrals: 0 }
    }

    pub fn referral(experience: i64) -> Self {
        ExperienceDelta { experience, messages: 0, referrals: 1 }
    }

    pub fn experience(experience: i64) -> Self {
        ExperienceDelta { experience, ..Default::default() }
    }
}

/// Outcome of one experience update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelChange {
    pub member_id: MemberId,
    pub previous_level: u32,
    pub new_level: u32,
    pub experience: u64,
    pub leveled_up: bool,
}
