//! Bounded rate-limit retry and cooperative cancellation for external calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use homeviz_shared::{HomeVizError, Result, RetryConfig};

/// How often and how long to back off when the service rate-limits us.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait before re-attempt `n` (0-based); the last entry repeats.
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    /// Wait before the re-attempt that follows failed attempt `index` (0-based).
    pub fn backoff_for(&self, index: usize) -> Duration {
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Vec::new(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config
                .backoff_secs
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

/// Cancellation signal shared between a run and its caller.
///
/// Clones observe the same signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(HomeVizError::Cancelled);
        }
        Ok(())
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `op` until it succeeds, retrying only rate-limit errors.
///
/// Any other error, or a rate limit on the last permitted attempt, is
/// returned attributed to `step`. Cancellation is checked before every
/// attempt and interrupts backoff sleeps.
pub async fn with_retry<T, F, Fut>(
    step: &str,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        cancel.check()?;
        attempt += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rate_limited() && attempt < max_attempts => {
                let wait = policy.backoff_for((attempt - 1) as usize);
                warn!(
                    step,
                    attempt,
                    max_attempts,
                    wait_secs = wait.as_secs(),
                    "rate limit hit, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => return Err(HomeVizError::Cancelled),
                }
            }
            Err(err) => return Err(err.in_step(step)),
        }
    }
}
