//! Cursor-based pagination envelope.

use serde::{Deserialize, Serialize};

/// One page of a paginated listing. Cursors are opaque and must be
/// round-tripped verbatim; a cursor issued for one scope is never valid for
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl<T> PaginatedResponse<T> {
    /// Structural invariant: `next_cursor == None ⇔ has_more == false`.
    /// A server response violating this is malformed and must be surfaced,
    /// not patched over.
    pub fn validate(&self) -> Result<(), String> {
        match (self.has_more, &self.next_cursor) {
            (true, None) => Err("has_more without next_cursor".to_string()),
            (false, Some(_)) => Err("next_cursor without has_more".to_string()),
            _ => Ok(()),
        }
    }
}
