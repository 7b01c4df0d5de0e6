//! Position lifecycle model.
//!
//! A position is created `Open` when a trade executes on-chain and moves
//! exactly once, irreversibly, to `Historical` (`Closed` or `Liquidated`).
//! The indexer is the sole source of truth for that transition; the client
//! never infers it locally.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open position as served by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub position_id: String,
    pub is_long: bool,
    pub size: Decimal,
    pub margin: Decimal,
    pub entry_price: Decimal,
}

/// How a historical position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosureStatus {
    Closed,
    Liquidated,
}

/// A settled position. `owner_address` is present on point lookups but not
/// on history listings, which are already scoped to one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalPosition {
    pub position_id: String,
    pub is_long: bool,
    pub size: Decimal,
    pub margin: Decimal,
    pub entry_price: Decimal,
    pub status: ClosureStatus,
    pub final_pnl: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_address: Option<String>,
}

/// Wire encoding: `{"status": "Open"|"Historical", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data")]
pub enum Position {
    Open(OpenPosition),
    Historical(HistoricalPosition),
}

impl Position {
    pub fn position_id(&self) -> &str {
        match self {
            Position::Open(p) => &p.position_id,
            Position::Historical(p) => &p.position_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn open_position_wire_round_trip() {
        let json = r#"{
            "status": "Open",
            "data": {
                "position_id": "0xabc",
                "is_long": true,
                "size": "2.5",
                "margin": "100",
                "entry_price": "50000"
            }
        }"#;
        let position: Position = serde_json::from_str(json).unwrap();
        match &position {
            Position::Open(p) => {
                assert_eq!(p.position_id, "0xabc");
                assert!(p.is_long);
                assert_eq!(p.size, Decimal::from_str("2.5").unwrap());
            }
            other => panic!("expected Open, got {:?}", other),
        }
        let back: Position = serde_json::from_str(&serde_json::to_string(&position).unwrap()).unwrap();
        assert_eq!(back, position);
    }

    #[test]
    fn historical_position_carries_closure_status() {
        let json = r#"{
            "status": "Historical",
            "data": {
                "position_id": "0xdef",
                "is_long": false,
                "size": "1",
                "margin": "50",
                "entry_price": "3000",
                "status": "Liquidated",
                "final_pnl": "-50",
                "owner_address": "0x123"
            }
        }"#;
        let position: Position = serde_json::from_str(json).unwrap();
        match position {
            Position::Historical(p) => {
                assert_eq!(p.status, ClosureStatus::Liquidated);
                assert_eq!(p.final_pnl, Decimal::from_str("-50").unwrap());
                assert_eq!(p.owner_address.as_deref(), Some("0x123"));
            }
            other => panic!("expected Historical, got {:?}", other),
        }
    }

    #[test]
    fn history_listing_entries_omit_owner_address() {
        let json = r#"{
            "position_id": "0xdef",
            "is_long": true,
            "size": "1",
            "margin": "50",
            "entry_price": "3000",
            "status": "Closed",
            "final_pnl": "12.5"
        }"#;
        let position: HistoricalPosition = serde_json::from_str(json).unwrap();
        assert_eq!(position.owner_address, None);
        assert_eq!(position.status, ClosureStatus::Closed);
    }

    #[test]
    fn status_is_exclusive() {
        // The tagged encoding cannot represent a position that is both open
        // and historical; a bare object without the envelope is rejected.
        let bad = r#"{"position_id": "0xabc", "is_long": true}"#;
        assert!(serde_json::from_str::<Position>(bad).is_err());
    }
}
