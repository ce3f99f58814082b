// ── Jamrank Atoms: Error Types ─────────────────────────────────────────────
// Single canonical error enum for the bot, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Platform, Config…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Platform failures are split by what the caller may do with them:
//     `PermissionDenied` and `Platform` mean "unavailable now", `NotFound`
//     means the entity is gone upstream.
//   • No variant carries the bot token in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file parse failure.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Gateway / bridge failure.
    #[error("Channel error: {channel}: {message}")]
    Channel { channel: String, message: String },

    /// The platform refused the call (HTTP 403, missing permission).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The platform reports the entity does not exist (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success platform response.
    #[error("Platform error {status}: {message}")]
    Platform { status: u16, message: String },

    /// Bot configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Experience deltas are never negative; only an explicit override may lower experience.
    #[error("Invalid experience delta: {0}")]
    InvalidDelta(i64),

    /// Experience totals are stored as signed 64-bit integers.
    #[error("Experience {0} exceeds the storable maximum")]
    ExperienceOutOfRange(u64),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a channel error with name and message.
    pub fn channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel { channel: channel.into(), message: message.into() }
    }

    /// Map a non-success HTTP status to the matching platform variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            _ => Self::Platform { status, message },
        }
    }

    /// True for failures that mean "operation unavailable now": the caller
    /// abandons this invocation and waits for the next natural trigger.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::PermissionDenied(_)
                | Self::Platform { .. }
                | Self::Channel { .. }
        )
    }
}

// ── Migration bridge: String → EngineError ─────────────────────────────────

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}
