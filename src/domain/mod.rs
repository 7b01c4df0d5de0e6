//! Domain types for the private account synchronization client.
//!
//! This module provides:
//! - Commitment/note model: UserCommitmentInfo, UserMetadata, UnspentNote
//! - Position tagged union with its wire encoding
//! - Cursor-based pagination envelope with its structural invariant

pub mod metadata;
pub mod page;
pub mod position;

pub use metadata::{u256, UnspentNote, UserCommitmentInfo, UserMetadata};
pub use page::PaginatedResponse;
pub use position::{ClosureStatus, HistoricalPosition, OpenPosition, Position};
