//! Position query engine.
//!
//! Point lookups resolve against the scope-independent `/positions/{id}`
//! endpoint; listings go through the active `ScopeSource`. History reads are
//! strictly forward-only: a prior cursor is never revisited mid-session, and
//! a refresh restarts from the first page.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{HistoricalPosition, OpenPosition, PaginatedResponse, Position};
use crate::error::{retry_transient, RetryPolicy, SyncError};
use crate::indexer::IndexerGateway;
use crate::scope::ScopeSource;

/// An absent position is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionLookup {
    Open(OpenPosition),
    Historical(HistoricalPosition),
    NotFound,
}

pub struct PositionQuery<G> {
    gateway: Arc<G>,
    retry: RetryPolicy,
}

impl<G: IndexerGateway> PositionQuery<G> {
    pub fn new(gateway: Arc<G>, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    /// Resolve a position id to its current lifecycle state. Transient
    /// gateway failures are retried within the policy bound, then surfaced
    /// as retryable errors.
    pub async fn position_by_id(&self, position_id: &str) -> Result<PositionLookup, SyncError> {
        let result =
            retry_transient(&self.retry, || self.gateway.position_by_id(position_id)).await;
        match result {
            Ok(Position::Open(position)) => Ok(PositionLookup::Open(position)),
            Ok(Position::Historical(position)) => Ok(PositionLookup::Historical(position)),
            Err(SyncError::NotFound) => {
                debug!(position_id, "position not found");
                Ok(PositionLookup::NotFound)
            }
            Err(err) => Err(err),
        }
    }

    /// Open positions in the given scope.
    pub async fn open_positions(
        &self,
        scope: &dyn ScopeSource,
    ) -> Result<Vec<OpenPosition>, SyncError> {
        scope.open_positions().await
    }

    /// One history page for the given scope; `None` starts from the first
    /// page.
    pub async fn history_page(
        &self,
        scope: &dyn ScopeSource,
        cursor: Option<&str>,
    ) -> Result<PaginatedResponse<HistoricalPosition>, SyncError> {
        scope.history_page(cursor).await
    }

    /// Follow `next_cursor` from the first page until `has_more` is false,
    /// concatenating pages. Refuses cursor loops instead of spinning forever.
    pub async fn full_history(
        &self,
        scope: &dyn ScopeSource,
    ) -> Result<Vec<HistoricalPosition>, SyncError> {
        const MAX_PAGES: usize = 1_000;

        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let page = scope.history_page(cursor.as_deref()).await?;
            items.extend(page.items);
            if !page.has_more {
                return Ok(items);
            }
            if page.next_cursor == cursor {
                return Err(SyncError::Invariant(
                    "history cursor did not advance".to_string(),
                ));
            }
            cursor = page.next_cursor;
        }
        Err(SyncError::Invariant(
            "history pagination exceeded page limit".to_string(),
        ))
    }
}
