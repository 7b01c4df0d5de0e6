//! Commitment checkpoint and unspent note model.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// The currently-valid commitment in the global commitment tree backing the
/// user's private balance. `leaf_index` is stable once assigned; `value`
/// changes only when a new commitment supersedes this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCommitmentInfo {
    #[serde(with = "u256")]
    pub value: BigUint,
    pub leaf_index: u64,
}

/// The authoritative, server-held (client-encrypted) checkpoint of private
/// state. `last_used_nullifier_nonce` is monotonically non-decreasing for a
/// given identity; only a finalized on-chain spend advances it.
/// `commitment_info == None` denotes a zero-balance, uninitialized account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub last_used_nullifier_nonce: u64,
    pub commitment_info: Option<UserCommitmentInfo>,
}

impl UserMetadata {
    /// The state of an account that has never been initialized.
    pub fn empty() -> Self {
        Self {
            last_used_nullifier_nonce: 0,
            commitment_info: None,
        }
    }

    /// The commitment value, or zero for an uninitialized account.
    pub fn base_value(&self) -> BigUint {
        self.commitment_info
            .as_ref()
            .map(|info| info.value.clone())
            .unwrap_or_default()
    }
}

/// A candidate increment to the user's balance which has not yet been folded
/// into the commitment checkpoint. `note_nonce` disambiguates same-value
/// notes and fixes the spend order when folding notes into a new commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentNote {
    pub note_id: String,
    pub note_nonce: u64,
    #[serde(with = "u256")]
    pub value: BigUint,
    pub receiver_hash: String,
}

/// Serde adapter for 256-bit unsigned values carried on the wire as decimal
/// strings. Rejects anything wider than 256 bits.
pub mod u256 {
    use num_bigint::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<BigUint, String> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid u256 decimal string: {:?}", raw));
        }
        let value = BigUint::parse_bytes(raw.as_bytes(), 10)
            .ok_or_else(|| format!("invalid u256 decimal string: {:?}", raw))?;
        if value.bits() > 256 {
            return Err("u256 value exceeds 256 bits".to_string());
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trips_through_json() {
        let meta = UserMetadata {
            last_used_nullifier_nonce: 3,
            commitment_info: Some(UserCommitmentInfo {
                value: BigUint::from(500u32),
                leaf_index: 7,
            }),
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"value\":\"500\""));
        let back: UserMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn null_commitment_info_deserializes() {
        let meta: UserMetadata =
            serde_json::from_str(r#"{"last_used_nullifier_nonce":0,"commitment_info":null}"#)
                .unwrap();
        assert_eq!(meta, UserMetadata::empty());
        assert_eq!(meta.base_value(), BigUint::default());
    }

    #[test]
    fn u256_rejects_non_decimal_and_oversized() {
        assert!(u256::parse("0x1f").is_err());
        assert!(u256::parse("").is_err());
        assert!(u256::parse("-5").is_err());
        // 2^256 is one past the largest representable value.
        let too_big: BigUint = BigUint::from(1u8) << 256;
        assert!(u256::parse(&too_big.to_str_radix(10)).is_err());
        let max: BigUint = (BigUint::from(1u8) << 256) - BigUint::from(1u8);
        assert_eq!(u256::parse(&max.to_str_radix(10)).unwrap(), max);
    }

    #[test]
    fn note_parses_from_wire_shape() {
        let note: UnspentNote = serde_json::from_str(
            r#"{"note_id":"n-1","note_nonce":2,"value":"50","receiver_hash":"0xabc"}"#,
        )
        .unwrap();
        assert_eq!(note.note_nonce, 2);
        assert_eq!(note.value, BigUint::from(50u32));
    }
}
