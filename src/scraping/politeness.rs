//! Politeness delays between consecutive requests
//!
//! The harvester is strictly sequential, so politeness reduces to a single
//! minimum gap between the starts of two consecutive requests. Time spent
//! inside a slow request counts toward the gap.

use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum delay between requests
#[derive(Debug)]
pub struct Throttle {
    delay: Duration,
    last_request: Option<Instant>,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_request: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Configured gap
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait until the gap since the previous request has elapsed, then mark
    /// a new request as started. The first call never waits.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let ready_at = last + self.delay;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}
