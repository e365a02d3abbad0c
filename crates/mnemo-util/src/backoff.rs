//! Exponential backoff for retryable-transient provider errors.
//!
//! Fixed schedule `[3s, 5s, 10s, 30s, 60s]`, capped at 60s, with a hard limit
//! on attempts. Further attempts past the end of the table repeat the cap.

use std::time::Duration;

use tokio::sync::watch;

/// Whether a sleep completed or was aborted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Backoff {
    schedule: Vec<Duration>,
    cap: Duration,
    max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::provider_retry()
    }
}

impl Backoff {
    /// The schedule used for retryable-transient provider errors.
    pub fn provider_retry() -> Self {
        Self {
            schedule: [3, 5, 10, 30, 60].into_iter().map(Duration::from_secs).collect(),
            cap: Duration::from_secs(60),
            max_attempts: 10,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the (1-indexed) `attempt`'th retry.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt.saturating_sub(1)) as usize;
        self.schedule.get(idx).copied().unwrap_or(self.cap).min(self.cap)
    }

    /// Sleep for `delay_for(attempt)`, returning early if `cancel` fires.
    ///
    /// `cancel` is a `watch` channel whose value flips to `true` to signal
    /// cancellation — the same shape the session processor uses for its
    /// per-loop cancellation token.
    pub async fn sleep(&self, attempt: u32, cancel: &mut watch::Receiver<bool>) -> SleepOutcome {
        if *cancel.borrow() {
            return SleepOutcome::Cancelled;
        }
        let delay = self.delay_for(attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => SleepOutcome::Completed,
            _ = cancel.changed() => SleepOutcome::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_follows_fixed_schedule() {
        let b = Backoff::provider_retry();
        assert_eq!(b.delay_for(1), Duration::from_secs(3));
        assert_eq!(b.delay_for(2), Duration::from_secs(5));
        assert_eq!(b.delay_for(3), Duration::from_secs(10));
        assert_eq!(b.delay_for(4), Duration::from_secs(30));
        assert_eq!(b.delay_for(5), Duration::from_secs(60));
    }

    #[test]
    fn delay_past_schedule_end_repeats_cap() {
        let b = Backoff::provider_retry();
        assert_eq!(b.delay_for(6), Duration::from_secs(60));
        assert_eq!(b.delay_for(100), Duration::from_secs(60));
    }

    #[test]
    fn max_attempts_is_ten() {
        assert_eq!(Backoff::provider_retry().max_attempts(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_when_not_cancelled() {
        let b = Backoff::provider_retry();
        let (_tx, mut rx) = watch::channel(false);
        let start = tokio::time::Instant::now();
        let outcome = b.sleep(1, &mut rx).await;
        assert_eq!(outcome, SleepOutcome::Completed);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn sleep_returns_cancelled_immediately_when_already_cancelled() {
        let b = Backoff::provider_retry();
        let (_tx, mut rx) = watch::channel(true);
        let outcome = b.sleep(1, &mut rx).await;
        assert_eq!(outcome, SleepOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_aborts_when_cancelled_mid_wait() {
        let b = Backoff::provider_retry();
        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });
        let outcome = b.sleep(5, &mut rx).await;
        assert_eq!(outcome, SleepOutcome::Cancelled);
        handle.await.unwrap();
    }
}
