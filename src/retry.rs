//! Reconnect backoff for realtime subscriptions.
//!
//! Only the SSE transport reopens its connection on its own; HTTP calls made
//! by the SDK are never retried.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential backoff with bounded jitter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reopen attempt.
    pub initial_backoff: Duration,
    /// Upper bound for backoff growth.
    pub max_backoff: Duration,
    /// Maximum random jitter added to each delay.
    pub jitter: Duration,
}

impl ReconnectPolicy {
    /// Computes the delay before reopen attempt `attempt` (1-based).
    ///
    /// A server-provided `retry:` hint replaces the initial backoff; growth
    /// and the upper bound still apply.
    pub fn delay_for_attempt(&self, attempt: usize, server_hint: Option<Duration>) -> Duration {
        let max_backoff = self.max_backoff.max(server_hint.unwrap_or_default());
        let mut delay = server_hint.unwrap_or(self.initial_backoff).min(max_backoff);
        for _ in 1..attempt {
            delay = std::cmp::min(delay.saturating_mul(2), max_backoff);
        }
        delay + jitter_duration(self.jitter, attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            jitter: Duration::from_millis(50),
        }
    }
}

fn jitter_duration(max_jitter: Duration, attempt: usize) -> Duration {
    let limit_nanos = max_jitter.as_nanos().min(u64::MAX as u128) as u64;
    if limit_nanos == 0 {
        return Duration::ZERO;
    }

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let mixed = now_nanos ^ ((attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    Duration::from_nanos(mixed % (limit_nanos + 1))
}
