// Jamrank — Role Synchronizer
//
// Reconciles a member's level roles with their level: after a sync the member
// holds exactly the role mapped to the target level and none of the other
// configured level roles. Roles outside the level table are never touched.
//
// Tolerated without failing the sync:
//   • a level with no role configured, or a role name the guild doesn't have
//   • a refused add/remove (missing permission), which is reported

use crate::atoms::error::EngineResult;
use crate::atoms::traits::Platform;
use crate::atoms::types::{GuildId, MemberId};
use crate::engine::leveling::LevelTable;
use log::{info, warn};
use std::sync::Arc;

/// What one sync changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSyncReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Configured role names with no definition in the guild.
    pub missing: Vec<String>,
    /// Role ids whose add/remove the platform refused.
    pub failed: Vec<String>,
}

impl RoleSyncReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

pub struct RoleSync {
    platform: Arc<dyn Platform>,
    table: Arc<LevelTable>,
}

impl RoleSync {
    pub fn new(platform: Arc<dyn Platform>, table: Arc<LevelTable>) -> Self {
        RoleSync { platform, table }
    }

    /// Make the member hold exactly the role for `target_level`.
    /// Level 0 removes every level role. Idempotent.
    pub async fn sync(&self, guild_id: GuildId, member_id: MemberId, target_level: u32) -> EngineResult<RoleSyncReport> {
        let guild_roles = self.platform.guild_roles(guild_id).await?;
        let held = self.platform.member_roles(guild_id, member_id).await?;
        let mut report = RoleSyncReport::default();

        for (idx, tier) in self.table.tiers().iter().enumerate() {
            let level = idx as u32 + 1;
            let Some(name) = tier.role.as_deref() else { continue };
            let Some(role) = guild_roles.iter().find(|r| r.name == name) else {
                report.missing.push(name.to_string());
                continue;
            };

            let wanted = level == target_level;
            let has = held.iter().any(|id| *id == role.id);

            if wanted && !has {
                match self.platform.add_member_role(guild_id, member_id, &role.id).await {
                    Ok(()) => {
                        info!("[roles] Gave '{}' to member {}", name, member_id);
                        report.added.push(role.id.clone());
                    }
                    Err(e) => {
                        warn!("[roles] Could not give '{}' to member {}: {}", name, member_id, e);
                        report.failed.push(role.id.clone());
                    }
                }
            } else if !wanted && has {
                match self.platform.remove_member_role(guild_id, member_id, &role.id).await {
                    Ok(()) => {
                        info!("[roles] Removed '{}' from member {}", name, member_id);
                        report.removed.push(role.id.clone());
                    }
                    Err(e) => {
                        warn!("[roles] Could not remove '{}' from member {}: {}", name, member_id, e);
                        report.failed.push(role.id.clone());
                    }
                }
            }
        }

        if !report.missing.is_empty() {
            warn!("[roles] Guild {} has no role named {:?} — skipped", guild_id, report.missing);
        }
        Ok(report)
    }
}
