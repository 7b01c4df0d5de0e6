//! Identity derivation and the metadata cipher.
//!
//! A private trading identity is derived from one interactive wallet
//! signature over a fixed, versioned login message. The signature bytes are
//! the only secret input; hashing them under distinct domain tags yields the
//! receiver hash (public, addresses notes without revealing the wallet), the
//! auth token presented to the indexer, and the symmetric key protecting the
//! metadata checkpoint. Re-deriving for the same address and the same signed
//! payload is idempotent.

use std::fmt;

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::domain::UserMetadata;
use crate::error::SyncError;

const LOGIN_MESSAGE_PREFIX: &str = "nox-private-account-v1:";
const RECEIVER_HASH_TAG: &[u8] = b"nox/receiver-hash/v1";
const METADATA_KEY_TAG: &[u8] = b"nox/metadata-key/v1";
const SESSION_TOKEN_TAG: &[u8] = b"nox/session-token/v1";
const METADATA_AAD: &[u8] = b"nox-metadata-v1";
const NONCE_LEN: usize = 24;

/// Interactive message-signing capability supplied by the wallet collaborator.
/// Implementations must prompt the user at most once per call.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign_message(&self, message: &str) -> Result<Vec<u8>, SignerError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("user rejected the signature request")]
    Rejected,
    #[error("no signer is connected")]
    Unavailable,
}

/// Opaque auth material presented to the private indexer endpoints. The
/// gateway forwards these pairs as HTTP headers without interpreting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub receiver_hash: String,
    pub session_token: String,
}

impl AuthHeaders {
    pub fn header_pairs(&self) -> [(&'static str, &str); 2] {
        [
            ("x-receiver-hash", self.receiver_hash.as_str()),
            ("x-session-token", self.session_token.as_str()),
        ]
    }
}

/// A derived private-mode identity, valid for one wallet address within one
/// session.
#[derive(Clone)]
pub struct SessionIdentity {
    pub address: String,
    pub receiver_hash: String,
    pub auth: AuthHeaders,
    metadata_key: Zeroizing<[u8; 32]>,
}

impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("address", &self.address)
            .field("receiver_hash", &self.receiver_hash)
            .field("metadata_key", &"<redacted>")
            .finish()
    }
}

impl SessionIdentity {
    pub fn metadata_key(&self) -> &[u8; 32] {
        &self.metadata_key
    }
}

/// The message presented to the wallet for signing. Versioned and
/// address-bound so one signature cannot stand in for another account.
pub fn login_message(address: &str) -> String {
    format!("{}{}", LOGIN_MESSAGE_PREFIX, address)
}

/// Derive the private identity for `address`. Issues exactly one signature
/// prompt; callers holding a cached identity for the current address must not
/// call this again.
pub async fn derive_identity(
    address: &str,
    signer: &dyn WalletSigner,
) -> Result<SessionIdentity, SignerError> {
    let signature = signer.sign_message(&login_message(address)).await?;
    let identity = identity_from_signature(address, &signature);
    debug!(address, receiver_hash = %identity.receiver_hash, "derived private identity");
    Ok(identity)
}

fn identity_from_signature(address: &str, signature: &[u8]) -> SessionIdentity {
    let receiver_hash = hex::encode(tagged_hash(RECEIVER_HASH_TAG, signature));
    let session_token = hex::encode(tagged_hash(SESSION_TOKEN_TAG, signature));
    let metadata_key = Zeroizing::new(tagged_hash(METADATA_KEY_TAG, signature));
    SessionIdentity {
        address: address.to_string(),
        auth: AuthHeaders {
            receiver_hash: receiver_hash.clone(),
            session_token,
        },
        receiver_hash,
        metadata_key,
    }
}

fn tagged_hash(tag: &[u8], signature: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(signature);
    hasher.finalize().into()
}

/// Encrypt a metadata checkpoint into the opaque blob posted to the indexer:
/// `hex(nonce || ciphertext)` over the canonical JSON encoding.
pub fn seal_metadata(key: &[u8; 32], metadata: &UserMetadata) -> Result<String, SyncError> {
    // The wire format caps values at 256 bits; a wider value would seal fine
    // but fail every later open.
    if let Some(info) = &metadata.commitment_info {
        if info.value.bits() > 256 {
            return Err(SyncError::Invariant(
                "commitment value exceeds 256 bits".to_string(),
            ));
        }
    }
    let plaintext = serde_json::to_vec(metadata)
        .map_err(|err| SyncError::Invariant(format!("metadata encoding failed: {}", err)))?;
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| SyncError::Invariant("invalid metadata key".to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: &plaintext,
                aad: METADATA_AAD,
            },
        )
        .map_err(|_| SyncError::Invariant("metadata encryption failed".to_string()))?;
    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(hex::encode(blob))
}

/// Decrypt a metadata blob fetched from the indexer. Any failure here is an
/// `Invariant` error: a checkpoint that exists but cannot be read must be
/// surfaced, never silently treated as a zero balance.
pub fn open_metadata(key: &[u8; 32], blob: &str) -> Result<UserMetadata, SyncError> {
    let raw = hex::decode(blob)
        .map_err(|_| SyncError::Invariant("metadata blob is not valid hex".to_string()))?;
    if raw.len() <= NONCE_LEN {
        return Err(SyncError::Invariant("metadata blob too short".to_string()));
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| SyncError::Invariant("invalid metadata key".to_string()))?;
    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: METADATA_AAD,
            },
        )
        .map_err(|_| SyncError::Invariant("metadata decryption failed".to_string()))?;
    serde_json::from_slice(&plaintext)
        .map_err(|err| SyncError::Invariant(format!("metadata decoding failed: {}", err)))
}
