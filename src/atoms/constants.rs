// ── Jamrank Atoms: Constants ───────────────────────────────────────────────
// Named constants for the crate. Tunable values live in `BotConfig`; these
// are the defaults it falls back to plus fixed protocol strings.

// ── Platform endpoints ────────────────────────────────────────────────────
pub const DISCORD_API: &str = "https://discord.com/api/v10";
pub const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
pub const INVITE_URL_BASE: &str = "https://discord.gg/";

// ── Experience defaults ───────────────────────────────────────────────────
pub const DEFAULT_XP_PER_MESSAGE: u64 = 1;
pub const DEFAULT_XP_LONG_MESSAGE_BONUS: u64 = 2;
pub const DEFAULT_LONG_MESSAGE_CHARS: usize = 50;
pub const DEFAULT_XP_PER_REFERRAL: u64 = 50;
pub const DEFAULT_MESSAGE_COOLDOWN_SECS: u64 = 60;

/// Largest experience total the store can hold (SQLite INTEGER).
pub const MAX_EXPERIENCE: u64 = i64::MAX as u64;

// Default level table: (threshold, role name).
pub const DEFAULT_LEVELS: [(u64, &str); 3] = [
    (100, "strawberry jam"),
    (500, "blueberry jam"),
    (1500, "golden jam"),
];

pub const DEFAULT_REFERRAL_CHANNEL: &str = "general";

// ── Link backfill ─────────────────────────────────────────────────────────
/// Members given a link between pauses when a guild becomes available.
pub const DEFAULT_BACKFILL_BATCH: usize = 5;
pub const DEFAULT_BACKFILL_PAUSE_MS: u64 = 2_000;

// Messages starting with these are commands for other bots.
pub const DEFAULT_IGNORED_PREFIXES: [&str; 4] = ["!", "/", "?", "."];

// ── Gateway ───────────────────────────────────────────────────────────────
/// Maximum reconnect attempts before the bridge gives up entirely.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 8;

/// Leaderboard size when the caller gives none.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
