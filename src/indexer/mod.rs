//! Typed boundary to the remote indexer.
//!
//! The gateway is stateless request/response: it classifies failures so that
//! callers can tell "no such resource" from "transient failure", and it never
//! retries. Retry policy belongs to the reconciliation and query layers.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::domain::{HistoricalPosition, OpenPosition, PaginatedResponse, Position, UnspentNote};
use crate::identity::AuthHeaders;

pub mod http;
pub mod mock;

pub use http::HttpIndexerGateway;
pub use mock::MockIndexerGateway;

/// Which identity a listing query is keyed by: a wallet address in Public
/// mode, derived auth material in Private mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKey {
    Public { address: String },
    Private { auth: AuthHeaders },
}

/// Failure classification for indexer calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("request timed out")]
    Timeout,
    #[error("indexer unreachable: {0}")]
    Unreachable(String),
    #[error("resource not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("indexer server error (status {status})")]
    ServerError { status: u16 },
    #[error("unexpected HTTP status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("malformed response: {0}")]
    Parse(String),
}

impl GatewayError {
    /// Whether a bounded retry is worthwhile. `NotFound` and auth failures
    /// are definitive; malformed responses will not fix themselves.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout
                | GatewayError::Unreachable(_)
                | GatewayError::ServerError { .. }
        )
    }
}

/// Network boundary consumed by the reconciliation engine and position query
/// engine. All operations are async, non-blocking I/O; implementations own
/// no state.
#[async_trait]
pub trait IndexerGateway: Send + Sync + fmt::Debug {
    /// Fetch the encrypted metadata checkpoint. `None` means the identity
    /// was never initialized, which is distinct from any failure.
    async fn get_metadata(&self, auth: &AuthHeaders) -> Result<Option<String>, GatewayError>;

    /// Overwrite the metadata checkpoint. Last-writer-wins at the server.
    async fn post_metadata(&self, auth: &AuthHeaders, blob: &str) -> Result<(), GatewayError>;

    /// Fetch every unspent note addressed to `receiver_hash`.
    async fn unspent_notes(&self, receiver_hash: &str) -> Result<Vec<UnspentNote>, GatewayError>;

    /// Fetch open positions for the given scope.
    async fn open_positions(&self, scope: &ScopeKey) -> Result<Vec<OpenPosition>, GatewayError>;

    /// Fetch one page (fixed size 20) of settled positions for the given
    /// scope. Cursors are opaque and round-tripped verbatim.
    async fn historical_positions(
        &self,
        scope: &ScopeKey,
        cursor: Option<&str>,
    ) -> Result<PaginatedResponse<HistoricalPosition>, GatewayError>;

    /// Resolve a position id. A missing position is `GatewayError::NotFound`,
    /// mapped explicitly from 404 and distinct from every other failure.
    async fn position_by_id(&self, position_id: &str) -> Result<Position, GatewayError>;
}
