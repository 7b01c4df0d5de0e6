//! In-memory gateway for tests; no network calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{GatewayError, IndexerGateway, ScopeKey};
use crate::config::PAGE_SIZE;
use crate::domain::{HistoricalPosition, OpenPosition, PaginatedResponse, Position, UnspentNote};
use crate::identity::AuthHeaders;

/// Mock gateway returning predefined data, with per-endpoint call counters
/// and fault injection so tests can assert on traffic as well as results.
#[derive(Debug, Default)]
pub struct MockIndexerGateway {
    metadata_blob: Mutex<Option<String>>,
    notes: Vec<UnspentNote>,
    open: Vec<(ScopeKey, OpenPosition)>,
    history: Vec<(ScopeKey, HistoricalPosition)>,
    positions: Vec<Position>,
    fail_queue: Mutex<VecDeque<GatewayError>>,
    pub calls: CallCounts,
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub metadata_gets: AtomicUsize,
    pub metadata_posts: AtomicUsize,
    pub note_fetches: AtomicUsize,
    pub open_lists: AtomicUsize,
    pub history_lists: AtomicUsize,
    pub position_lookups: AtomicUsize,
}

impl CallCounts {
    /// Calls that only make sense against private-scope endpoints.
    pub fn private_scope_calls(&self) -> usize {
        self.metadata_gets.load(Ordering::SeqCst)
            + self.metadata_posts.load(Ordering::SeqCst)
            + self.note_fetches.load(Ordering::SeqCst)
    }
}

impl MockIndexerGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stored encrypted metadata blob.
    pub fn with_metadata_blob(self, blob: String) -> Self {
        *self.metadata_blob.lock().unwrap() = Some(blob);
        self
    }

    /// Add an unspent note.
    pub fn with_note(mut self, note: UnspentNote) -> Self {
        self.notes.push(note);
        self
    }

    /// Add an open position visible in the given scope.
    pub fn with_open_position(mut self, scope: ScopeKey, position: OpenPosition) -> Self {
        self.open.push((scope, position));
        self
    }

    /// Add a settled position to the given scope's history, in listing order.
    pub fn with_historical_position(
        mut self,
        scope: ScopeKey,
        position: HistoricalPosition,
    ) -> Self {
        self.history.push((scope, position));
        self
    }

    /// Register a position resolvable by id.
    pub fn with_position(mut self, position: Position) -> Self {
        self.positions.push(position);
        self
    }

    /// Queue an error; each queued error fails exactly one subsequent call,
    /// in order.
    pub fn fail_next(self, err: GatewayError) -> Self {
        self.fail_queue.lock().unwrap().push_back(err);
        self
    }

    pub fn stored_metadata(&self) -> Option<String> {
        self.metadata_blob.lock().unwrap().clone()
    }

    fn take_fault(&self) -> Result<(), GatewayError> {
        match self.fail_queue.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn scope_tag(scope: &ScopeKey) -> &str {
        match scope {
            ScopeKey::Public { address } => address,
            ScopeKey::Private { auth } => &auth.receiver_hash,
        }
    }
}

#[async_trait::async_trait]
impl IndexerGateway for MockIndexerGateway {
    async fn get_metadata(&self, _auth: &AuthHeaders) -> Result<Option<String>, GatewayError> {
        self.calls.metadata_gets.fetch_add(1, Ordering::SeqCst);
        self.take_fault()?;
        Ok(self.metadata_blob.lock().unwrap().clone())
    }

    async fn post_metadata(&self, _auth: &AuthHeaders, blob: &str) -> Result<(), GatewayError> {
        self.calls.metadata_posts.fetch_add(1, Ordering::SeqCst);
        self.take_fault()?;
        // Last-writer-wins, as at the real server.
        *self.metadata_blob.lock().unwrap() = Some(blob.to_string());
        Ok(())
    }

    async fn unspent_notes(&self, receiver_hash: &str) -> Result<Vec<UnspentNote>, GatewayError> {
        self.calls.note_fetches.fetch_add(1, Ordering::SeqCst);
        self.take_fault()?;
        Ok(self
            .notes
            .iter()
            .filter(|note| note.receiver_hash == receiver_hash)
            .cloned()
            .collect())
    }

    async fn open_positions(&self, scope: &ScopeKey) -> Result<Vec<OpenPosition>, GatewayError> {
        self.calls.open_lists.fetch_add(1, Ordering::SeqCst);
        self.take_fault()?;
        Ok(self
            .open
            .iter()
            .filter(|(s, _)| s == scope)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn historical_positions(
        &self,
        scope: &ScopeKey,
        cursor: Option<&str>,
    ) -> Result<PaginatedResponse<HistoricalPosition>, GatewayError> {
        self.calls.history_lists.fetch_add(1, Ordering::SeqCst);
        self.take_fault()?;

        let tag = Self::scope_tag(scope);
        let offset = match cursor {
            None => 0,
            Some(cursor) => {
                // A cursor is only valid for the scope that issued it.
                let (cursor_tag, offset) = cursor
                    .rsplit_once(':')
                    .ok_or_else(|| GatewayError::Http {
                        status: 400,
                        message: "malformed cursor".to_string(),
                    })?;
                if cursor_tag != tag {
                    return Err(GatewayError::Http {
                        status: 400,
                        message: "cursor issued for another scope".to_string(),
                    });
                }
                offset.parse::<usize>().map_err(|_| GatewayError::Http {
                    status: 400,
                    message: "malformed cursor".to_string(),
                })?
            }
        };

        let scoped: Vec<HistoricalPosition> = self
            .history
            .iter()
            .filter(|(s, _)| s == scope)
            .map(|(_, p)| p.clone())
            .collect();
        let end = (offset + PAGE_SIZE as usize).min(scoped.len());
        let items = scoped[offset.min(scoped.len())..end].to_vec();
        let has_more = end < scoped.len();
        Ok(PaginatedResponse {
            items,
            has_more,
            next_cursor: has_more.then(|| format!("{}:{}", tag, end)),
        })
    }

    async fn position_by_id(&self, position_id: &str) -> Result<Position, GatewayError> {
        self.calls.position_lookups.fetch_add(1, Ordering::SeqCst);
        self.take_fault()?;
        self.positions
            .iter()
            .find(|p| p.position_id() == position_id)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }
}
