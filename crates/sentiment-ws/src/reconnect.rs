//! Bounded reconnection scheduling.
//!
//! Each `attempt` either schedules one reconnect after the backoff delay or,
//! once `max_retries` attempts have been spent, reports exhaustion and
//! rearms the counter. Only one reconnect is ever pending.

use crate::timer::TimerHandle;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 3_000;
/// Default cap for exponential backoff.
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Delay strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay for every attempt.
    #[default]
    Fixed,
    /// `base * 2^(attempt-1)`, capped at the max delay.
    Exponential,
}

/// What `attempt` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Scheduled { attempt: u32, delay: Duration },
    Exhausted,
}

/// Bounded retry scheduler.
pub struct ReconnectPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    backoff: Backoff,
    retry_count: u32,
    pending: Option<TimerHandle>,
}

impl ReconnectPolicy {
    /// Fixed-delay policy.
    pub fn new(max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms: retry_delay_ms,
            max_delay_ms: retry_delay_ms,
            backoff: Backoff::Fixed,
            retry_count: 0,
            pending: None,
        }
    }

    /// Exponential policy starting at `base_delay_ms`, capped at `max_delay_ms`.
    pub fn exponential(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
            backoff: Backoff::Exponential,
            retry_count: 0,
            pending: None,
        }
    }

    /// Spend one retry, or report exhaustion.
    ///
    /// On a retry, `on_retry(retry_count, max_retries)` runs synchronously and
    /// `connect_fn` is scheduled after the backoff delay, replacing any
    /// pending schedule. When retries are spent, the counter resets to 0 and
    /// `on_exhausted` runs; nothing is scheduled.
    pub fn attempt<C, R, E>(
        &mut self,
        connect_fn: C,
        on_retry: R,
        on_exhausted: E,
    ) -> ReconnectDecision
    where
        C: FnOnce() + Send + 'static,
        R: FnOnce(u32, u32),
        E: FnOnce(),
    {
        if self.retry_count >= self.max_retries {
            error!(max_retries = self.max_retries, "Max reconnection attempts reached");
            self.cancel_pending();
            self.retry_count = 0;
            on_exhausted();
            return ReconnectDecision::Exhausted;
        }

        self.retry_count += 1;
        on_retry(self.retry_count, self.max_retries);

        let delay = self.delay_for(self.retry_count);
        warn!(
            attempt = self.retry_count,
            max_retries = self.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        self.cancel_pending();
        self.pending = Some(TimerHandle::after(delay, connect_fn));

        ReconnectDecision::Scheduled {
            attempt: self.retry_count,
            delay,
        }
    }

    /// Cancel any pending attempt and zero the counter.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.retry_count = 0;
    }

    /// Cancel any pending attempt, keeping the counter.
    pub fn cancel_pending(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.cancel();
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Delay before the given (1-based) attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Exponential => {
                // attempt=1 -> base, attempt=2 -> 2*base, attempt=3 -> 4*base
                let exponent = attempt.saturating_sub(1).min(16);
                self.base_delay_ms
                    .saturating_mul(1u64 << exponent)
                    .min(self.max_delay_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS)
    }
}
