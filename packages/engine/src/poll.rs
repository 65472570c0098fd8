//! Bounded polling for eventually consistent side effects.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::EngineError;

/// How many times to probe, and how long to sleep between probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Run `probe` until it reports `true` or the attempts run out.
    ///
    /// At least one attempt is always made. There is no sleep after the
    /// last attempt. Probe errors end polling immediately.
    pub async fn poll_until<F, Fut>(&self, mut probe: F) -> Result<bool, EngineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<bool, EngineError>>,
    {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            if probe(attempt).await? {
                return Ok(true);
            }
            if attempt < attempts {
                debug!("poll: attempt {attempt}/{attempts} not converged; sleeping {:?}", self.delay);
                tokio::time::sleep(self.delay).await;
            }
        }
        Ok(false)
    }
}
