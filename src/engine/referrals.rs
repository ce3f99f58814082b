// Jamrank — Referral Attribution Engine
//
// attribute()    — join event → which invite was consumed → who owns it →
//                  referral edge written exactly once
// ensure_link()  — personal invite provisioning: validate the recorded link
//                  upstream, create a fresh one when it is missing or stale
//
// Failure rules:
//   • Platform failures abandon this invocation only; the snapshot is left
//     stale (never zeroed) and the next join diffs against it.
//   • A duplicate edge (re-join, duplicate delivery) is a normal
//     "no referrer" outcome and grants nothing.

use crate::atoms::error::EngineResult;
use crate::atoms::traits::Platform;
use crate::atoms::types::{GuildId, Invite, InviteRequest, MemberId, ReferralInsert};
use crate::engine::invite_cache::InviteCache;
use crate::engine::store::RankStore;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// State of a member's personal link before provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    /// No code recorded for the member.
    Missing,
    /// A code is recorded but the platform no longer lists it.
    Stale(String),
    /// The recorded code is still live upstream.
    Live(String),
}

pub struct ReferralEngine {
    platform: Arc<dyn Platform>,
    store: Arc<RankStore>,
    invites: Arc<InviteCache>,
}

impl ReferralEngine {
    pub fn new(platform: Arc<dyn Platform>, store: Arc<RankStore>, invites: Arc<InviteCache>) -> Self {
        ReferralEngine { platform, store, invites }
    }

    // ── attribution ────────────────────────────────────────────────────

    /// Resolve a join to the member who referred it, recording the edge.
    /// Returns the referrer only when a new edge was written.
    pub async fn attribute(&self, guild_id: GuildId, new_member: MemberId) -> Option<MemberId> {
        let used = match self.consume_invite(guild_id).await {
            Ok(Some(invite)) => invite,
            Ok(None) => {
                debug!("[referrals] No invite increase for member {} in guild {}", new_member, guild_id);
                return None;
            }
            Err(e) => {
                warn!("[referrals] Attribution skipped for member {} in guild {}: {}", new_member, guild_id, e);
                return None;
            }
        };

        let referrer = match self.resolve_owner(&used) {
            Ok(Some(id)) => id,
            Ok(None) => {
                info!("[referrals] Invite {} has no creditable owner", used.code);
                return None;
            }
            Err(e) => {
                error!("[referrals] Owner lookup for invite {} failed: {}", used.code, e);
                return None;
            }
        };

        if referrer == new_member {
            info!("[referrals] Member {} joined through their own invite — no credit", new_member);
            return None;
        }

        let now = chrono::Utc::now().timestamp();
        match self.store.insert_referral(referrer, new_member, now) {
            Ok(ReferralInsert::Inserted) => {
                info!(
                    "[referrals] Member {} joined guild {} via {} (owner {})",
                    new_member, guild_id, used.code, referrer
                );
                Some(referrer)
            }
            Ok(ReferralInsert::AlreadyExists) => {
                info!("[referrals] Member {} was already referred — no credit", new_member);
                None
            }
            Err(e) => {
                error!("[referrals] Could not record referral {} → {}: {}", referrer, new_member, e);
                None
            }
        }
    }

    /// Fetch, diff and replace the guild snapshot under its lock.
    /// On fetch failure the snapshot is untouched.
    async fn consume_invite(&self, guild_id: GuildId) -> EngineResult<Option<Invite>> {
        let slot = self.invites.guild(guild_id);
        let mut snapshot = slot.lock().await;
        let fresh = self.platform.list_invites(guild_id).await?;
        let used = snapshot.first_increase(&fresh).cloned();
        snapshot.replace(&fresh);
        Ok(used)
    }

    /// Registered owner first; otherwise the platform-recorded creator,
    /// unless that creator is a bot.
    fn resolve_owner(&self, invite: &Invite) -> EngineResult<Option<MemberId>> {
        if let Some(owner) = self.store.invite_owner(&invite.code)? {
            return Ok(Some(owner));
        }
        Ok(invite.inviter.as_ref().filter(|c| !c.bot).map(|c| c.id))
    }

    // ── personal links ─────────────────────────────────────────────────

    /// The member's personal invite URL, creating one if needed.
    /// `None` means "not available right now"; the caller may retry later.
    pub async fn ensure_link(&self, guild_id: GuildId, member_id: MemberId) -> Option<String> {
        let state = match self.link_state(guild_id, member_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!("[referrals] Could not validate link for member {}: {}", member_id, e);
                return None;
            }
        };

        match state {
            LinkState::Live(code) => Some(crate::atoms::types::invite_url(&code)),
            LinkState::Stale(code) => {
                info!("[referrals] Invite {} of member {} is gone upstream — recreating", code, member_id);
                self.create_link(guild_id, member_id).await
            }
            LinkState::Missing => self.create_link(guild_id, member_id).await,
        }
    }

    async fn link_state(&self, guild_id: GuildId, member_id: MemberId) -> EngineResult<LinkState> {
        let code = match self.store.invite_code_for(member_id, guild_id)? {
            Some(code) => code,
            None => return Ok(LinkState::Missing),
        };
        let upstream = self.platform.list_invites(guild_id).await?;
        if upstream.iter().any(|i| i.code == code) {
            Ok(LinkState::Live(code))
        } else {
            Ok(LinkState::Stale(code))
        }
    }

    async fn create_link(&self, guild_id: GuildId, member_id: MemberId) -> Option<String> {
        let invite = match self.platform.create_invite(guild_id, &InviteRequest::personal(member_id)).await {
            Ok(invite) => invite,
            Err(e) => {
                warn!("[referrals] Could not create invite for member {}: {}", member_id, e);
                return None;
            }
        };

        let now = chrono::Utc::now().timestamp();
        if let Err(e) = self.store.save_invite_owner(&invite.code, member_id, guild_id, now) {
            error!("[referrals] Could not record owner of invite {}: {}", invite.code, e);
            return None;
        }

        // Baseline the new code before any join can reference it.
        let _ = self.invites.refresh(guild_id, self.platform.as_ref()).await;

        info!("[referrals] Created invite {} for member {}", invite.code, member_id);
        Some(invite.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakePlatform, FAKE_BOT_ID};

    const GUILD: GuildId = 1;

    struct Fixture {
        platform: Arc<FakePlatform>,
        store: Arc<RankStore>,
        cache: Arc<InviteCache>,
        engine: ReferralEngine,
    }

    fn fixture() -> Fixture {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(RankStore::open_in_memory().unwrap());
        let cache = Arc::new(InviteCache::new());
        let engine = ReferralEngine::new(platform.clone(), store.clone(), cache.clone());
        Fixture { platform, store, cache, engine }
    }

    impl Fixture {
        async fn prime(&self, invites: Vec<Invite>) {
            self.platform.set_invites(GUILD, invites);
            self.cache.refresh(GUILD, self.platform.as_ref()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn owned_invite_credits_owner() {
        let f = fixture();
        f.store.save_invite_owner("abc", 10, GUILD, 0).unwrap();
        f.prime(vec![Invite::new("abc", 0)]).await;

        f.platform.use_invite(GUILD, "abc");
        assert_eq!(f.engine.attribute(GUILD, 20).await, Some(10));
        assert_eq!(f.store.referral_for(20).unwrap().unwrap().referrer_id, 10);
        assert_eq!(f.cache.snapshot(GUILD).await.uses("abc"), 1);
    }

    #[tokio::test]
    async fn duplicate_join_credits_once() {
        let f = fixture();
        f.store.save_invite_owner("abc", 10, GUILD, 0).unwrap();
        f.prime(vec![Invite::new("abc", 0)]).await;

        f.platform.use_invite(GUILD, "abc");
        assert_eq!(f.engine.attribute(GUILD, 20).await, Some(10));
        // Member leaves and rejoins through the same link.
        f.platform.use_invite(GUILD, "abc");
        assert_eq!(f.engine.attribute(GUILD, 20).await, None);
        // Same event delivered twice with no new use.
        assert_eq!(f.engine.attribute(GUILD, 20).await, None);

        assert_eq!(f.store.count_referrals_by(10).unwrap(), 1);
    }

    #[tokio::test]
    async fn self_referral_is_ignored() {
        let f = fixture();
        f.store.save_invite_owner("abc", 20, GUILD, 0).unwrap();
        f.prime(vec![Invite::new("abc", 0)]).await;

        f.platform.use_invite(GUILD, "abc");
        assert_eq!(f.engine.attribute(GUILD, 20).await, None);
        assert!(f.store.referral_for(20).unwrap().is_none());
    }

    #[tokio::test]
    async fn falls_back_to_human_creator() {
        let f = fixture();
        f.prime(vec![Invite::new("manual", 2).created_by(30, false)]).await;

        f.platform.use_invite(GUILD, "manual");
        assert_eq!(f.engine.attribute(GUILD, 21).await, Some(30));
    }

    #[tokio::test]
    async fn bot_created_unowned_invite_credits_nobody() {
        let f = fixture();
        f.prime(vec![Invite::new("botmade", 0).created_by(FAKE_BOT_ID, true)]).await;

        f.platform.use_invite(GUILD, "botmade");
        assert_eq!(f.engine.attribute(GUILD, 21).await, None);
        assert_eq!(f.cache.snapshot(GUILD).await.uses("botmade"), 1);
    }

    #[tokio::test]
    async fn first_increase_in_listing_order_wins() {
        let f = fixture();
        f.store.save_invite_owner("B", 11, GUILD, 0).unwrap();
        f.store.save_invite_owner("C", 12, GUILD, 0).unwrap();
        f.prime(vec![Invite::new("A", 5), Invite::new("B", 2)]).await;

        // B went 2→3 and an unseen C appeared with 1 use; B is listed first.
        f.platform.set_invites(GUILD, vec![Invite::new("A", 5), Invite::new("B", 3), Invite::new("C", 1)]);
        assert_eq!(f.engine.attribute(GUILD, 40).await, Some(11));

        let snap = f.cache.snapshot(GUILD).await;
        assert_eq!((snap.uses("A"), snap.uses("B"), snap.uses("C")), (5, 3, 1));
    }

    #[tokio::test]
    async fn no_increase_still_rebaselines() {
        let f = fixture();
        f.prime(vec![Invite::new("A", 5)]).await;

        f.platform.set_invites(GUILD, vec![Invite::new("A", 5), Invite::new("fresh", 0)]);
        assert_eq!(f.engine.attribute(GUILD, 41).await, None);
        assert_eq!(f.cache.snapshot(GUILD).await.len(), 2);
    }

    #[tokio::test]
    async fn listing_failure_leaves_snapshot_stale() {
        let f = fixture();
        f.store.save_invite_owner("abc", 10, GUILD, 0).unwrap();
        f.prime(vec![Invite::new("abc", 4)]).await;

        f.platform.use_invite(GUILD, "abc");
        f.platform.fail_invite_listing(true);
        assert_eq!(f.engine.attribute(GUILD, 50).await, None);
        assert_eq!(f.cache.snapshot(GUILD).await.uses("abc"), 4);

        // Next join after recovery diffs against the stale baseline.
        f.platform.fail_invite_listing(false);
        assert_eq!(f.engine.attribute(GUILD, 51).await, Some(10));
    }

    #[tokio::test]
    async fn concurrent_joins_claim_one_use_each() {
        let f = fixture();
        f.store.save_invite_owner("abc", 10, GUILD, 0).unwrap();
        f.prime(vec![Invite::new("abc", 0)]).await;

        // One real use; two join handlers race over it.
        f.platform.use_invite(GUILD, "abc");
        let engine = Arc::new(f.engine);
        let a = tokio::spawn({
            let e = engine.clone();
            async move { e.attribute(GUILD, 60).await }
        });
        let b = tokio::spawn({
            let e = engine.clone();
            async move { e.attribute(GUILD, 61).await }
        });
        let credited = [a.await.unwrap(), b.await.unwrap()].iter().filter(|r| r.is_some()).count();
        assert_eq!(credited, 1);
    }

    #[tokio::test]
    async fn ensure_link_creates_then_reuses() {
        let f = fixture();
        let url = f.engine.ensure_link(GUILD, 70).await.unwrap();
        assert_eq!(url, "https://discord.gg/code1");
        assert_eq!(f.store.invite_owner("code1").unwrap(), Some(70));
        // Snapshot baselined with the new code.
        assert_eq!(f.cache.snapshot(GUILD).await.len(), 1);

        let again = f.engine.ensure_link(GUILD, 70).await.unwrap();
        assert_eq!(again, url);
        assert_eq!(f.platform.created_invites(), 1);
    }

    #[tokio::test]
    async fn links_are_kept_per_guild() {
        let f = fixture();
        const OTHER: GuildId = 2;
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(f.engine.ensure_link(GUILD, 70).await.unwrap());
            seen.push(f.engine.ensure_link(OTHER, 70).await.unwrap());
        }
        assert_eq!(f.platform.created_invites(), 2);
        assert!(seen.iter().step_by(2).all(|u| u == "https://discord.gg/code1"));
        assert!(seen.iter().skip(1).step_by(2).all(|u| u == "https://discord.gg/code2"));
        assert_eq!(f.store.invite_code_for(70, OTHER).unwrap().as_deref(), Some("code2"));
    }

    #[tokio::test]
    async fn ensure_link_replaces_deleted_invite() {
        let f = fixture();
        f.engine.ensure_link(GUILD, 70).await.unwrap();
        f.platform.delete_invite(GUILD, "code1");

        let url = f.engine.ensure_link(GUILD, 70).await.unwrap();
        assert_eq!(url, "https://discord.gg/code2");
        assert_eq!(f.store.invite_code_for(70, GUILD).unwrap().as_deref(), Some("code2"));
    }

    #[tokio::test]
    async fn ensure_link_unavailable_on_failures() {
        let f = fixture();
        f.platform.fail_invite_creation(true);
        assert!(f.engine.ensure_link(GUILD, 70).await.is_none());
        assert!(f.store.invite_code_for(70, GUILD).unwrap().is_none());

        // A recorded link is not replaced while the listing is unavailable.
        f.platform.fail_invite_creation(false);
        f.engine.ensure_link(GUILD, 70).await.unwrap();
        f.platform.fail_invite_listing(true);
        assert!(f.engine.ensure_link(GUILD, 70).await.is_none());
        assert_eq!(f.platform.created_invites(), 1);
    }

    #[tokio::test]
    async fn provisioned_link_is_attributed() {
        let f = fixture();
        f.engine.ensure_link(GUILD, 70).await.unwrap();
        f.platform.use_invite(GUILD, "code1");
        assert_eq!(f.engine.attribute(GUILD, 71).await, Some(70));
    }
}
