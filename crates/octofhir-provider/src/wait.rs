//! Polling for asynchronous terminal states (deletes, jobs).

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};

/// Default interval between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Status of an asynchronous server-side operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Queued,
    InProgress,
    Success,
    Failed,
}

impl DeleteStatus {
    /// Parse a server status; anything unrecognised counts as in progress.
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => DeleteStatus::Queued,
            "SUCCESS" | "SUCCEEDED" | "COMPLETED" => DeleteStatus::Success,
            "FAILED" | "FAILURE" => DeleteStatus::Failed,
            _ => DeleteStatus::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeleteStatus::Success | DeleteStatus::Failed)
    }
}

/// Poll until `poll` reports a terminal status, `timeout` elapses or
/// `cancel` fires. The first poll happens immediately.
pub async fn wait_for<F, Fut>(
    cancel: &CancellationToken,
    what: &str,
    interval: Duration,
    timeout: Duration,
    mut poll: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<DeleteStatus>>,
{
    let deadline = Instant::now() + timeout;
    let mut polls = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::cancelled(format!("waiting for {what}")));
        }
        polls += 1;
        let status = poll().await?;
        tracing::debug!(what, polls, ?status, "polled status");
        match status {
            DeleteStatus::Success => return Ok(()),
            DeleteStatus::Failed => {
                return Err(ProviderError::Failed(format!("{what} reported FAILED")));
            }
            DeleteStatus::Queued | DeleteStatus::InProgress => {}
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ProviderError::Timeout {
                what: what.to_string(),
                after: timeout,
            });
        }
        let pause = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProviderError::cancelled(format!("waiting for {what}")));
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_client::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_unknown_status_folds_into_in_progress() {
        assert_eq!(DeleteStatus::parse("queued"), DeleteStatus::Queued);
        assert_eq!(DeleteStatus::parse("IN_PROGRESS"), DeleteStatus::InProgress);
        assert_eq!(DeleteStatus::parse("SOMETHING_NEW"), DeleteStatus::InProgress);
        assert_eq!(DeleteStatus::parse("SUCCESS"), DeleteStatus::Success);
        assert!(DeleteStatus::parse("FAILED").is_terminal());
    }

    #[tokio::test]
    async fn test_waits_through_states() {
        let polls = AtomicU32::new(0);
        let statuses = ["QUEUED", "IN_PROGRESS", "SUCCESS"];
        let result = wait_for(
            &CancellationToken::new(),
            "subscriber deletion",
            Duration::from_millis(1),
            Duration::from_secs(5),
            || {
                let n = polls.fetch_add(1, Ordering::SeqCst) as usize;
                async move { Ok(DeleteStatus::parse(statuses[n])) }
            },
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_status_is_error() {
        let err = wait_for(
            &CancellationToken::new(),
            "deletion",
            Duration::from_millis(1),
            Duration::from_secs(5),
            || async { Ok(DeleteStatus::Failed) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Failed(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = wait_for(
            &CancellationToken::new(),
            "deletion",
            Duration::from_millis(5),
            Duration::from_millis(20),
            || async { Ok(DeleteStatus::InProgress) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for(
            &cancel,
            "deletion",
            POLL_INTERVAL,
            Duration::from_secs(60),
            || async { Ok(DeleteStatus::InProgress) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
