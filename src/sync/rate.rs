//! Fixed-interval pacing for remote calls.
//!
//! Telegram applies the same flood limits to history, full-info and file
//! requests, so a single interval is shared by every unit of remote work.

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Default gap between the starts of two remote units.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct RateScheduler {
    interval: Duration,
}

impl RateScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run `unit`, then sleep whatever is left of the interval.
    pub async fn gate<F, T>(&self, unit: F) -> T
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let out = unit.await;
        self.pace(start, self.interval).await;
        out
    }

    /// Sleep until `needed` has elapsed since `start`. Callers that get a
    /// per-unit recommendation (e.g. no remote call was made) pass it here.
    pub async fn pace(&self, start: Instant, needed: Duration) {
        let remaining = needed.saturating_sub(start.elapsed());
        if !remaining.is_zero() {
            time::sleep(remaining).await;
        }
    }
}

impl Default for RateScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fast_unit_waits_out_the_interval() {
        let scheduler = RateScheduler::new(Duration::from_secs(1));
        let start = Instant::now();

        let value = scheduler.gate(async { 7 }).await;

        assert_eq!(value, 7);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_unit_is_not_delayed_further() {
        let scheduler = RateScheduler::new(Duration::from_secs(1));
        let start = Instant::now();

        scheduler
            .gate(time::sleep(Duration::from_millis(1500)))
            .await;

        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_units_are_spaced() {
        let scheduler = RateScheduler::new(Duration::from_millis(250));
        let mut starts = Vec::new();
        for _ in 0..4 {
            scheduler.gate(async { starts.push(Instant::now()) }).await;
        }
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pace_with_zero_does_not_sleep() {
        let scheduler = RateScheduler::default();
        let start = Instant::now();
        scheduler.pace(start, Duration::ZERO).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
