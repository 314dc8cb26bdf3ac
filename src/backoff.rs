//! Rate-limit backoff between cascade steps.
//!
//! Unlike a retry loop, the cascade never calls the same provider twice in a
//! request: the backoff only delays the move to the *next* provider.

use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    None,
    Fixed { delay: Duration },
    Exponential { base_delay: Duration, max_delay: Duration },
}

impl BackoffPolicy {
    /// Delay before moving on after the `rate_limits_seen`-th rate limit of
    /// this request (1-based).
    pub fn delay_for(&self, rate_limits_seen: u32) -> Duration {
        match self {
            BackoffPolicy::None => Duration::ZERO,
            BackoffPolicy::Fixed { delay } => *delay,
            BackoffPolicy::Exponential { base_delay, max_delay } => {
                let exponent = rate_limits_seen.saturating_sub(1).min(16);
                let delay = base_delay.saturating_mul(1u32 << exponent);
                std::cmp::min(delay, *max_delay)
            }
        }
    }

    /// Suspend the current request only.
    pub async fn wait(&self, rate_limits_seen: u32) {
        let delay = self.delay_for(rate_limits_seen);
        if delay.is_zero() {
            return;
        }

        debug!("Rate limited {} time(s), backing off {}ms", rate_limits_seen, delay.as_millis());
        sleep(delay).await;
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed {
            delay: Duration::from_secs(2),
        }
    }
}
