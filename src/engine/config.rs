// Jamrank — Bot Configuration
//
// Values come from an optional TOML file; the token and database path can be
// overridden from the command line or the environment:
//
//   jamrank --config jamrank.toml          (JAMRANK_CONFIG)
//           --token …                      (DISCORD_BOT_TOKEN)
//           --database /var/lib/jam.db     (JAMRANK_DATABASE)
//
// Every field has a default, so an empty file (or none) plus a token is a
// working setup.

use crate::atoms::constants::*;
use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::leveling::{ExperienceRules, LevelTable, LevelTier};
use crate::engine::store::default_db_path;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub bot_token: String,
    pub database_path: Option<PathBuf>,
    /// Ordered level tiers: `[[levels]] threshold = 100, role = "strawberry jam"`.
    pub levels: Vec<LevelTier>,
    pub xp_per_message: u64,
    pub xp_long_message_bonus: u64,
    pub long_message_chars: usize,
    pub xp_per_referral: u64,
    pub message_cooldown_secs: u64,
    pub ignored_prefixes: Vec<String>,
    /// Channel name for referral / level-up announcements. Falls back to the
    /// guild's system channel.
    pub referral_channel: Option<String>,
    /// DM each new member their personal invite link.
    pub dm_invite_links: bool,
    /// Give existing members a link when a guild becomes available.
    pub backfill_links: bool,
    pub backfill_batch: usize,
    /// Pause after each batch, in milliseconds.
    pub backfill_pause_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        let rules = ExperienceRules::default();
        BotConfig {
            bot_token: String::new(),
            database_path: None,
            levels: LevelTable::default().tiers().to_vec(),
            xp_per_message: rules.xp_per_message,
            xp_long_message_bonus: rules.long_message_bonus,
            long_message_chars: rules.long_message_chars,
            xp_per_referral: rules.xp_per_referral,
            message_cooldown_secs: DEFAULT_MESSAGE_COOLDOWN_SECS,
            ignored_prefixes: rules.ignored_prefixes,
            referral_channel: Some(DEFAULT_REFERRAL_CHANNEL.to_string()),
            dm_invite_links: true,
            backfill_links: true,
            backfill_batch: DEFAULT_BACKFILL_BATCH,
            backfill_pause_ms: DEFAULT_BACKFILL_PAUSE_MS,
        }
    }
}

impl BotConfig {
    pub fn from_toml(text: &str) -> EngineResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Check everything needed to run the bot.
    pub fn validate(&self) -> EngineResult<()> {
        if self.bot_token.trim().is_empty() {
            return Err(EngineError::Config(
                "No bot token configured. Set DISCORD_BOT_TOKEN, pass --token, or add bot_token to the config file.".into(),
            ));
        }
        self.level_table()?;
        self.check_experience_rates()?;
        Ok(())
    }

    /// Per-event experience must fit a signed delta; a long message earns
    /// the base rate plus the bonus.
    pub fn check_experience_rates(&self) -> EngineResult<()> {
        if self.xp_per_referral > MAX_EXPERIENCE {
            return Err(EngineError::Config(format!(
                "xp_per_referral {} exceeds the maximum of {}",
                self.xp_per_referral, MAX_EXPERIENCE
            )));
        }
        match self.xp_per_message.checked_add(self.xp_long_message_bonus) {
            Some(total) if total <= MAX_EXPERIENCE => Ok(()),
            _ => Err(EngineError::Config(format!(
                "xp_per_message + xp_long_message_bonus exceeds the maximum of {}",
                MAX_EXPERIENCE
            ))),
        }
    }

    pub fn level_table(&self) -> EngineResult<LevelTable> {
        LevelTable::new(self.levels.clone())
    }

    pub fn experience_rules(&self) -> ExperienceRules {
        ExperienceRules {
            xp_per_message: self.xp_per_message,
            long_message_bonus: self.xp_long_message_bonus,
            long_message_chars: self.long_message_chars,
            xp_per_referral: self.xp_per_referral,
            ignored_prefixes: self.ignored_prefixes.clone(),
        }
    }

    pub fn backfill_pause(&self) -> Duration {
        Duration::from_millis(self.backfill_pause_ms)
    }

    pub fn message_cooldown(&self) -> Duration {
        Duration::from_secs(self.message_cooldown_secs)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(default_db_path)
    }
}

// ── Command line ───────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "jamrank", version, about = "Discord referral and leveling bot")]
pub struct Args {
    /// TOML config file.
    #[arg(long, short, env = "JAMRANK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Discord bot token.
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// SQLite database path.
    #[arg(long, env = "JAMRANK_DATABASE")]
    pub database: Option<PathBuf>,
}

impl Args {
    /// File values first, then command-line / environment overrides.
    pub fn load(&self) -> EngineResult<BotConfig> {
        let mut config = match &self.config {
            Some(path) => BotConfig::from_file(path)?,
            None => BotConfig::default(),
        };
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            config.bot_token = token.clone();
        }
        if let Some(db) = &self.database {
            config.database_path = Some(db.clone());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_setup() {
        let config = BotConfig::default();
        let table = config.level_table().unwrap();
        assert_eq!(table.threshold(1), Some(100));
        assert_eq!(table.role_for(3), Some("golden jam"));
        assert_eq!(config.message_cooldown(), Duration::from_secs(60));
        assert_eq!(config.xp_per_referral, 50);
        assert!(config.validate().is_err(), "empty token must not validate");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = BotConfig::from_toml(
            r#"
            bot_token = "abc"
            xp_per_referral = 75

            [[levels]]
            threshold = 10
            role = "rookie"

            [[levels]]
            threshold = 40
            "#,
        )
        .unwrap();
        assert_eq!(config.xp_per_referral, 75);
        assert_eq!(config.xp_per_message, 1);
        let table = config.level_table().unwrap();
        assert_eq!(table.max_level(), 2);
        assert_eq!(table.role_for(1), Some("rookie"));
        assert_eq!(table.role_for(2), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unordered_levels_fail_validation() {
        let config = BotConfig::from_toml(
            r#"
            bot_token = "abc"
            levels = [{ threshold = 500 }, { threshold = 100 }]
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn oversized_experience_rates_fail_validation() {
        let config = BotConfig { bot_token: "abc".into(), xp_per_referral: 1 << 63, ..Default::default() };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let config = BotConfig {
            bot_token: "abc".into(),
            xp_per_message: MAX_EXPERIENCE,
            xp_long_message_bonus: 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let config = BotConfig { bot_token: "abc".into(), xp_per_referral: MAX_EXPERIENCE, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn args_override_file_values() {
        let args = Args::parse_from(["jamrank", "--token", "cli-token", "--database", "/tmp/x.db"]);
        let config = args.load().unwrap();
        assert_eq!(config.bot_token, "cli-token");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x.db"));
    }
}
