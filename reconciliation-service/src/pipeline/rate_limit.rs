//! Minimum spacing between outbound LLM calls.

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Enforces a minimum interval between the starts of successive calls.
///
/// Callers wait until `last_call + interval` and the limiter then records the
/// new call time. Not a queue: callers serialize through whatever owns it.
#[derive(Debug)]
pub struct MinIntervalLimiter {
    interval: Duration,
    last_call: Option<Instant>,
}

impl MinIntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits out the remaining interval, if any, and returns the instant
    /// granted to the caller.
    pub async fn wait(&mut self) -> Instant {
        if let Some(last) = self.last_call {
            let ready_at = last + self.interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    delay_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Rate limiting LLM call"
                );
                sleep_until(ready_at).await;
            }
        }

        let granted = Instant::now();
        self.last_call = Some(granted);
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate() {
        let start = Instant::now();
        let mut limiter = MinIntervalLimiter::new(Duration::from_secs(2));
        let granted = limiter.wait().await;
        assert_eq!(granted, start);
    }

    #[tokio::test(start_paused = true)]
    async fn successive_calls_are_spaced_by_interval() {
        let mut limiter = MinIntervalLimiter::new(Duration::from_secs(2));
        let first = limiter.wait().await;
        let second = limiter.wait().await;
        let third = limiter.wait().await;
        assert!(second - first >= Duration::from_secs(2));
        assert!(third - second >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_counts_towards_interval() {
        let mut limiter = MinIntervalLimiter::new(Duration::from_secs(2));
        let first = limiter.wait().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let second = limiter.wait().await;
        assert_eq!(second - first, Duration::from_secs(5));
    }
}
