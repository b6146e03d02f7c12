//! Bounded-retry call orchestration.
//!
//! Every platform call runs through [`Orchestrator::execute`]. A call is
//! retried when no HTTP round trip happened, or when the response status is in
//! the caller's retry set. Anything else fails immediately. Between attempts
//! the orchestrator waits with exponential backoff, racing the wait against
//! the caller's [`CancellationToken`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octofhir_config::RetryConfig;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{CallError, ClientError};

/// Status codes retried when the caller does not pass its own set.
pub const DEFAULT_RETRY_ON: [u16; 6] = [403, 429, 500, 502, 503, 504];

/// Default retry set extended with operation-specific codes, e.g. 404 for
/// FHIR reads or 422 for IAM role assignment.
pub fn retry_on_with(extra: &[u16]) -> Vec<u16> {
    let mut codes = DEFAULT_RETRY_ON.to_vec();
    for code in extra {
        if !codes.contains(code) {
            codes.push(*code);
        }
    }
    codes
}

/// Renews credentials between attempts.
///
/// Refreshing is best-effort: implementations swallow their own errors and
/// the next attempt succeeds or fails on its own merits.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self);
}

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Randomization factor in [0, 1); 0 disables jitter
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            initial_interval: Duration::from_millis(cfg.initial_interval_ms),
            max_interval: Duration::from_millis(cfg.max_interval_ms),
            multiplier: cfg.multiplier,
            jitter: cfg.jitter,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let base = self.initial_interval.as_secs_f64() * self.multiplier.powi(exp);
        let capped = base.min(self.max_interval.as_secs_f64());
        let delay = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            rand::thread_rng().gen_range((capped - spread)..=(capped + spread))
        } else {
            capped
        };
        Duration::from_secs_f64(delay.clamp(0.0, self.max_interval.as_secs_f64()))
    }
}

/// Runs operations with bounded retries, backoff and credential refresh.
#[derive(Clone)]
pub struct Orchestrator {
    policy: RetryPolicy,
    refresher: Option<Arc<dyn Refresher>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("policy", &self.policy)
            .field("refresher", &self.refresher.is_some())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            refresher: None,
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn Refresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `op` until it succeeds, fails permanently, runs out of
    /// attempts or `cancel` fires.
    ///
    /// `max_attempts` of 0 falls back to the policy default. An empty
    /// `retry_on` means [`DEFAULT_RETRY_ON`]. A 401 is always retried when a
    /// refresher is installed, and both 401 and 403 trigger a refresh before
    /// the next attempt.
    ///
    /// Exhaustion yields [`ClientError::RetriesExhausted`] carrying the last
    /// response; cancellation yields [`ClientError::Cancelled`] without
    /// issuing further attempts.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        max_attempts: u32,
        retry_on: &[u16],
        mut op: F,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max_attempts = match max_attempts {
            0 => self.policy.max_attempts.max(1),
            n => n,
        };
        let retry_on: &[u16] = if retry_on.is_empty() {
            &DEFAULT_RETRY_ON
        } else {
            retry_on
        };

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(CallError::without_response(ClientError::Cancelled {
                    attempts: attempt,
                }));
            }
            attempt += 1;

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let status = err.envelope.as_ref().map(|e| e.status);
            let retryable = match status {
                None => !err.error.is_permanent(),
                Some(0) => true,
                Some(401) => self.refresher.is_some() || retry_on.contains(&401),
                Some(code) => retry_on.contains(&code),
            };
            if !retryable {
                return Err(err);
            }
            if attempt >= max_attempts {
                let last_status = status.unwrap_or(0);
                tracing::warn!(attempts = attempt, status = last_status, "giving up on call");
                let CallError { envelope, error } = err;
                return Err(CallError::new(
                    envelope,
                    ClientError::RetriesExhausted {
                        attempts: attempt,
                        last_status,
                        source: Box::new(error),
                    },
                ));
            }

            if matches!(status, Some(401 | 403))
                && let Some(refresher) = &self.refresher
            {
                refresher.refresh().await;
            }

            let delay = self.policy.backoff(attempt);
            tracing::debug!(
                attempt,
                status = status.unwrap_or(0),
                delay_ms = delay.as_millis() as u64,
                error = %err.error,
                "retrying call"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CallError::without_response(ClientError::Cancelled {
                        attempts: attempt,
                    }));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ResponseEnvelope;
    use reqwest::header::HeaderMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    fn failure(status: u16) -> CallError {
        CallError::new(
            Some(ResponseEnvelope::new(status, HeaderMap::new(), Vec::new())),
            ClientError::status(status, "failure"),
        )
    }

    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Refresher for CountingRefresher {
        async fn refresh(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_retry_on_with_extends_defaults() {
        let codes = retry_on_with(&[404, 429]);
        assert!(codes.contains(&404));
        assert!(codes.contains(&403));
        assert_eq!(codes.iter().filter(|c| **c == 429).count(), 1);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter: 0.0,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..fast_policy()
        };
        for attempt in 1..10 {
            assert!(policy.backoff(attempt) <= policy.max_interval);
        }
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let orchestrator = Orchestrator::new(fast_policy());
        let calls = AtomicU32::new(0);
        let result: Result<(), CallError> = orchestrator
            .execute(&CancellationToken::new(), 4, &[], || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(failure(503)) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let err = result.unwrap_err();
        assert_eq!(err.status(), 503);
        assert!(matches!(
            err.error,
            ClientError::RetriesExhausted {
                attempts: 4,
                last_status: 503,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_non_retryable_status_fails_immediately() {
        let orchestrator = Orchestrator::new(fast_policy());
        let calls = AtomicU32::new(0);
        let result: Result<(), CallError> = orchestrator
            .execute(&CancellationToken::new(), 5, &[], || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(failure(400)) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.unwrap_err().error,
            ClientError::Status { status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried() {
        let orchestrator = Orchestrator::new(fast_policy());
        let calls = AtomicU32::new(0);
        let result = orchestrator
            .execute(&CancellationToken::new(), 5, &[], || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CallError::from(ClientError::Transport("reset".into())))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_403_refreshes_then_succeeds() {
        let refresher = Arc::new(CountingRefresher::default());
        let orchestrator = Orchestrator::new(fast_policy()).with_refresher(refresher.clone());
        let calls = AtomicU32::new(0);
        let result = orchestrator
            .execute(&CancellationToken::new(), 5, &[], || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(failure(403))
                    } else {
                        Ok("X")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "X");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_401_needs_refresher_to_retry() {
        let plain = Orchestrator::new(fast_policy());
        let calls = AtomicU32::new(0);
        let _ = plain
            .execute(&CancellationToken::new(), 5, &[], || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(failure(401)) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let refresher = Arc::new(CountingRefresher::default());
        let refreshing = Orchestrator::new(fast_policy()).with_refresher(refresher.clone());
        let _ = refreshing
            .execute(&CancellationToken::new(), 3, &[], || async {
                Err::<(), _>(failure(401))
            })
            .await;
        // no refresh after the final attempt
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let orchestrator = Orchestrator::new(fast_policy());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let result: Result<(), CallError> = orchestrator
            .execute(&cancel, 5, &[], || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            result.unwrap_err().error,
            ClientError::Cancelled { attempts: 0 }
        ));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_stops_attempts() {
        let policy = RetryPolicy {
            initial_interval: Duration::from_secs(30),
            max_interval: Duration::from_secs(30),
            ..fast_policy()
        };
        let orchestrator = Orchestrator::new(policy);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let trigger = cancel.clone();
        let result: Result<(), CallError> = orchestrator
            .execute(&cancel, 5, &[], || {
                calls.fetch_add(1, Ordering::SeqCst);
                trigger.cancel();
                async { Err(failure(503)) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.unwrap_err().error,
            ClientError::Cancelled { attempts: 1 }
        ));
    }
}
