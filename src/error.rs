//! Crate-wide error taxonomy and the bounded retry helper used by callers of
//! the indexer gateway.

use std::future::Future;
use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoff;
use thiserror::Error;

use crate::identity::SignerError;
use crate::indexer::GatewayError;

/// Errors surfaced by the reconciliation, session, and query layers.
///
/// The taxonomy decides the caller's reaction: `NotFound` is rendered as
/// absent state, `Transient` is retryable, `Unauthorized` demotes the session
/// to Public, `Invariant` ends the current Private session with a warning.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("not found")]
    NotFound,
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl From<GatewayError> for SyncError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound => SyncError::NotFound,
            GatewayError::Unauthorized => {
                SyncError::Unauthorized("indexer rejected credentials".to_string())
            }
            other if other.is_transient() => SyncError::Transient(other.to_string()),
            other => SyncError::Invariant(other.to_string()),
        }
    }
}

impl From<SignerError> for SyncError {
    fn from(err: SignerError) -> Self {
        SyncError::Unauthorized(err.to_string())
    }
}

/// Bounds the exponential backoff applied to transient gateway failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_elapsed_ms: u64) -> Self {
        Self {
            max_elapsed: Duration::from_millis(max_elapsed_ms),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }
}

/// Retry a gateway call until it succeeds, fails permanently, or the policy
/// is exhausted. The gateway itself never retries; this is the single place
/// where its failure classification turns into a retry decision.
pub(crate) async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    retry(policy.backoff(), || {
        let attempt = op();
        async move {
            attempt.await.map_err(|err| {
                if err.is_transient() {
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        }
    })
    .await
    .map_err(SyncError::from)
}
