use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Enforces a minimum delay between the starts of consecutive calls.
///
/// The first call goes through immediately.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: None,
        }
    }

    /// Wait until the next call is allowed, then mark it as started
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait = self.min_delay - elapsed;
                debug!(?wait, "Rate limiting geocoding request");
                tokio::time::sleep(wait).await;
            }
        }
        self.last_call = Some(Instant::now());
    }
}
