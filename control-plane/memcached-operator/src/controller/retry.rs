use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::trace;

use crate::store::ObjectKey;

pub const DEFAULT_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_CAP: Duration = Duration::from_secs(300);

/// Capped exponential backoff: `base * 2^(attempt-1)`, never above `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            cap: DEFAULT_CAP,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Per-key attempt counters for transient failures.
#[derive(Debug, Default)]
pub struct RetryScheduler {
    backoff: Backoff,
    attempts: Mutex<HashMap<ObjectKey, u32>>,
}

impl RetryScheduler {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record another failed attempt for `key` and return how long to wait.
    pub async fn next_delay(&self, key: &ObjectKey) -> Duration {
        let mut attempts = self.attempts.lock().await;
        let attempt = attempts.entry(key.clone()).or_insert(0);
        *attempt = attempt.saturating_add(1);
        let delay = self.backoff.delay(*attempt);
        trace!(%key, attempt = *attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
        delay
    }

    pub async fn forget(&self, key: &ObjectKey) {
        self.attempts.lock().await.remove(key);
    }

    pub async fn attempts(&self, key: &ObjectKey) -> u32 {
        self.attempts.lock().await.get(key).copied().unwrap_or(0)
    }
}
