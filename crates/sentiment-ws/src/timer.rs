//! Cancellable one-shot and periodic timers.
//!
//! Each timer is a Tokio task guarded by a `CancellationToken`. Cancelling
//! (or dropping the handle) stops the task before its next firing. Must be
//! created from within a Tokio runtime.

use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    /// Run `f` once after `delay`.
    pub fn after<F>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = child.cancelled() => {}
                () = tokio::time::sleep(delay) => f(),
            }
        });
        Self { token }
    }

    /// Run `f` every `period`, first firing one period from now.
    pub fn every<F>(period: Duration, mut f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = child.cancelled() => break,
                    _ = ticker.tick() => f(),
                }
            }
        });
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_after_fires_once() {
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        let _timer = TimerHandle::after(Duration::from_millis(100), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_after_never_fires() {
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        let timer = TimerHandle::after(Duration::from_millis(100), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();
        assert!(timer.is_cancelled());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_fires_periodically_until_dropped() {
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        let timer = TimerHandle::every(Duration::from_millis(100), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);

        drop(timer);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }
}
