// ── Jamrank Engine: HTTP Retry & Reconnect Backoff ─────────────────────────
//
// Shared retry utilities used by the Discord REST adapter and the gateway.
//
//   • Exponential backoff with ±25% jitter (base 1s, max 30s, 3 retries)
//   • Retry on 429 (rate limit), 500, 502, 503, 504
//   • Respects the server's retry hint (Retry-After header / retry_after body)
//   • Gateway reconnect helper with escalating backoff + 5 minute cap

use std::time::{Duration, SystemTime};

// ── Constants ──────────────────────────────────────────────────────────────

/// Default maximum number of retry attempts per request.
pub const MAX_RETRIES: u32 = 3;

/// Initial retry delay in milliseconds (doubles each attempt).
const INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Maximum retry delay cap in milliseconds (30 seconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Maximum gateway reconnect delay cap in milliseconds (5 minutes).
const MAX_RECONNECT_DELAY_MS: u64 = 300_000;

// ── Retryable status detection ─────────────────────────────────────────────

/// Check if an HTTP status code represents a transient/retryable error.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

// ── Backoff delay ──────────────────────────────────────────────────────────

/// Backoff for request retry `attempt` (0-based), before jitter.
/// A server hint wins when it asks for longer, capped at 60s.
pub fn retry_backoff_ms(attempt: u32, retry_after: Option<Duration>) -> u64 {
    let base_ms = INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt.min(12));
    let capped_ms = base_ms.min(MAX_RETRY_DELAY_MS);
    match retry_after {
        Some(hint) => (hint.as_millis().min(60_000) as u64).max(capped_ms),
        None => capped_ms,
    }
}

/// Sleep with exponential backoff + ±25% jitter.
/// Returns the actual delay duration for logging.
pub async fn retry_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    let delay = Duration::from_millis(apply_jitter(retry_backoff_ms(attempt, retry_after)));
    tokio::time::sleep(delay).await;
    delay
}

/// Backoff for gateway reconnect `attempt` (0-based), before jitter.
pub fn reconnect_backoff_ms(attempt: u32) -> u64 {
    let base_ms = INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt.min(12));
    base_ms.min(MAX_RECONNECT_DELAY_MS)
}

/// Compute exponential backoff delay for gateway reconnection and sleep it.
/// Uses a longer cap (5 minutes) than request retries.
pub async fn reconnect_delay(attempt: u32) -> Duration {
    let delay = Duration::from_millis(apply_jitter(reconnect_backoff_ms(attempt)));
    tokio::time::sleep(delay).await;
    delay
}

/// Apply ±25% jitter to prevent thundering-herd effects.
fn apply_jitter(base_ms: u64) -> u64 {
    let jitter_range = (base_ms / 4) as i64;
    if jitter_range == 0 {
        return base_ms.max(100);
    }
    let offset = (rand_jitter() % (2 * jitter_range + 1)) - jitter_range;
    let result = base_ms as i64 + offset;
    result.max(100) as u64
}

/// Simple jitter source using system clock nanos (no extra crate needed).
fn rand_jitter() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as i64
}

// ── Retry hint parsing ─────────────────────────────────────────────────────

/// Parse a Retry-After header value (integer seconds only).
/// HTTP-date format is not implemented and falls back to computed backoff.
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    header_value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Discord also reports the wait in the JSON body as fractional seconds.
pub fn parse_retry_after_body(body: &str) -> Option<Duration> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["retry_after"].as_f64())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}
