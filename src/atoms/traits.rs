// ── Jamrank Atoms: Trait seams ─────────────────────────────────────────────
// The chat platform is an external collaborator. Engines talk to it only
// through `Platform` so the Discord REST adapter can be swapped for a
// scripted fake in tests.

use crate::atoms::error::EngineResult;
use crate::atoms::types::{GuildId, GuildMember, Invite, InviteRequest, MemberId, RoleInfo};
use async_trait::async_trait;

/// Operations the bot needs from the chat platform.
///
/// Every method may fail with `PermissionDenied` or a transport error; callers
/// treat both as "unavailable now", never as "entity absent".
#[async_trait]
pub trait Platform: Send + Sync {
    /// Every invite of the guild, in the platform's order.
    async fn list_invites(&self, guild_id: GuildId) -> EngineResult<Vec<Invite>>;

    /// Create an invite in the guild's default invite channel.
    async fn create_invite(&self, guild_id: GuildId, request: &InviteRequest) -> EngineResult<Invite>;

    /// Every member of the guild, bots included.
    async fn list_members(&self, guild_id: GuildId) -> EngineResult<Vec<GuildMember>>;

    /// Role definitions of the guild.
    async fn guild_roles(&self, guild_id: GuildId) -> EngineResult<Vec<RoleInfo>>;

    /// Role ids currently held by a member.
    async fn member_roles(&self, guild_id: GuildId, member_id: MemberId) -> EngineResult<Vec<String>>;

    async fn add_member_role(&self, guild_id: GuildId, member_id: MemberId, role_id: &str) -> EngineResult<()>;

    async fn remove_member_role(&self, guild_id: GuildId, member_id: MemberId, role_id: &str) -> EngineResult<()>;

    /// Resolve a text channel: by name when given, else the guild's system
    /// channel, else its first text channel.
    async fn text_channel(&self, guild_id: GuildId, preferred_name: Option<&str>) -> EngineResult<Option<String>>;

    async fn send_message(&self, channel_id: &str, content: &str) -> EngineResult<()>;

    async fn direct_message(&self, member_id: MemberId, content: &str) -> EngineResult<()>;
}
