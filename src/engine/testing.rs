// Scripted in-memory `Platform` used by unit tests.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::Platform;
use crate::atoms::types::{GuildId, GuildMember, Invite, InviteRequest, MemberId, RoleInfo};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

pub(crate) const FAKE_BOT_ID: MemberId = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RoleCall {
    Add { member: MemberId, role: String },
    Remove { member: MemberId, role: String },
}

#[derive(Default)]
struct FakeState {
    invites: HashMap<GuildId, Vec<Invite>>,
    members: HashMap<GuildId, Vec<GuildMember>>,
    roles: HashMap<GuildId, Vec<RoleInfo>>,
    held: HashMap<(GuildId, MemberId), Vec<String>>,
    fail_listing: bool,
    fail_create: bool,
    deny_role_changes: bool,
    next_code: u32,
    list_calls: usize,
    created: Vec<InviteRequest>,
    role_calls: Vec<RoleCall>,
    messages: Vec<(String, String)>,
    dms: Vec<(MemberId, String)>,
}

#[derive(Default)]
pub(crate) struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    // ── scripting ──

    pub fn set_invites(&self, guild_id: GuildId, invites: Vec<Invite>) {
        self.state.lock().invites.insert(guild_id, invites);
    }

    /// Simulate a member joining through `code`.
    pub fn use_invite(&self, guild_id: GuildId, code: &str) {
        let mut s = self.state.lock();
        if let Some(inv) = s.invites.entry(guild_id).or_default().iter_mut().find(|i| i.code == code) {
            inv.uses += 1;
        }
    }

    /// Simulate an invite deleted outside the bot.
    pub fn delete_invite(&self, guild_id: GuildId, code: &str) {
        self.state.lock().invites.entry(guild_id).or_default().retain(|i| i.code != code);
    }

    pub fn fail_invite_listing(&self, fail: bool) {
        self.state.lock().fail_listing = fail;
    }

    pub fn fail_invite_creation(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    pub fn deny_role_changes(&self, deny: bool) {
        self.state.lock().deny_role_changes = deny;
    }

    /// Guild members as `(id, bot)`, in listing order.
    pub fn set_members(&self, guild_id: GuildId, members: &[(MemberId, bool)]) {
        let members = members.iter().map(|&(id, bot)| GuildMember { id, bot }).collect();
        self.state.lock().members.insert(guild_id, members);
    }

    pub fn set_roles(&self, guild_id: GuildId, roles: &[(&str, &str)]) {
        let roles = roles
            .iter()
            .map(|(id, name)| RoleInfo { id: id.to_string(), name: name.to_string() })
            .collect();
        self.state.lock().roles.insert(guild_id, roles);
    }

    pub fn give_role(&self, guild_id: GuildId, member_id: MemberId, role_id: &str) {
        self.state.lock().held.entry((guild_id, member_id)).or_default().push(role_id.to_string());
    }

    // ── inspection ──

    pub fn held_roles(&self, guild_id: GuildId, member_id: MemberId) -> Vec<String> {
        let mut roles = self.state.lock().held.get(&(guild_id, member_id)).cloned().unwrap_or_default();
        roles.sort();
        roles
    }

    pub fn role_calls(&self) -> Vec<RoleCall> {
        self.state.lock().role_calls.clone()
    }

    pub fn created_invites(&self) -> usize {
        self.state.lock().created.len()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.state.lock().messages.clone()
    }

    pub fn dms(&self) -> Vec<(MemberId, String)> {
        self.state.lock().dms.clone()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn list_invites(&self, guild_id: GuildId) -> EngineResult<Vec<Invite>> {
        let mut s = self.state.lock();
        s.list_calls += 1;
        if s.fail_listing {
            return Err(EngineError::PermissionDenied("Missing Permissions".into()));
        }
        Ok(s.invites.get(&guild_id).cloned().unwrap_or_default())
    }

    async fn create_invite(&self, guild_id: GuildId, request: &InviteRequest) -> EngineResult<Invite> {
        let mut s = self.state.lock();
        if s.fail_create {
            return Err(EngineError::PermissionDenied("Missing Permissions".into()));
        }
        s.next_code += 1;
        let invite = Invite::new(format!("code{}", s.next_code), 0).created_by(FAKE_BOT_ID, true);
        s.invites.entry(guild_id).or_default().push(invite.clone());
        s.created.push(request.clone());
        Ok(invite)
    }

    async fn list_members(&self, guild_id: GuildId) -> EngineResult<Vec<GuildMember>> {
        Ok(self.state.lock().members.get(&guild_id).cloned().unwrap_or_default())
    }

    async fn guild_roles(&self, guild_id: GuildId) -> EngineResult<Vec<RoleInfo>> {
        Ok(self.state.lock().roles.get(&guild_id).cloned().unwrap_or_default())
    }

    async fn member_roles(&self, guild_id: GuildId, member_id: MemberId) -> EngineResult<Vec<String>> {
        Ok(self.state.lock().held.get(&(guild_id, member_id)).cloned().unwrap_or_default())
    }

    async fn add_member_role(&self, guild_id: GuildId, member_id: MemberId, role_id: &str) -> EngineResult<()> {
        let mut s = self.state.lock();
        s.role_calls.push(RoleCall::Add { member: member_id, role: role_id.to_string() });
        if s.deny_role_changes {
            return Err(EngineError::PermissionDenied("Missing Permissions".into()));
        }
        s.held.entry((guild_id, member_id)).or_default().push(role_id.to_string());
        Ok(())
    }

    async fn remove_member_role(&self, guild_id: GuildId, member_id: MemberId, role_id: &str) -> EngineResult<()> {
        let mut s = self.state.lock();
        s.role_calls.push(RoleCall::Remove { member: member_id, role: role_id.to_string() });
        if s.deny_role_changes {
            return Err(EngineError::PermissionDenied("Missing Permissions".into()));
        }
        s.held.entry((guild_id, member_id)).or_default().retain(|r| r != role_id);
        Ok(())
    }

    async fn text_channel(&self, guild_id: GuildId, preferred_name: Option<&str>) -> EngineResult<Option<String>> {
        Ok(Some(format!("{}#{}", guild_id, preferred_name.unwrap_or("system"))))
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> EngineResult<()> {
        self.state.lock().messages.push((channel_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn direct_message(&self, member_id: MemberId, content: &str) -> EngineResult<()> {
        self.state.lock().dms.push((member_id, content.to_string()));
        Ok(())
    }
}
