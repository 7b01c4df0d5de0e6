//! Balance reconciliation engine.
//!
//! Merges the encrypted metadata checkpoint (authoritative commitment pointer
//! and nullifier nonce) with freshly observed unspent notes into the current
//! spendable view of one private identity. The engine is the single logical
//! owner of that view: concurrent refresh requests coalesce onto one in-flight
//! pass, and a generation counter keeps a late stale pass from overwriting a
//! newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use num_bigint::BigUint;
use tracing::{debug, warn};

use crate::domain::{UnspentNote, UserCommitmentInfo, UserMetadata};
use crate::error::{retry_transient, RetryPolicy, SyncError};
use crate::identity::{open_metadata, SessionIdentity};
use crate::indexer::IndexerGateway;

/// The merged view produced by one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledBalance {
    /// Commitment value plus the sum of all spendable note values.
    pub balance: BigUint,
    /// Notes not yet folded into the checkpoint, ascending by
    /// `(note_nonce, note_id)`, the deterministic spend order.
    pub spendable_notes: Vec<UnspentNote>,
    /// Equal to the checkpoint's `last_used_nullifier_nonce`; only a
    /// finalized on-chain spend advances it, never this engine.
    pub next_nullifier_nonce: u64,
    pub commitment: Option<UserCommitmentInfo>,
}

type PassFuture = Shared<BoxFuture<'static, Result<ReconciledBalance, SyncError>>>;

struct Inner<G> {
    gateway: Arc<G>,
    identity: SessionIdentity,
    retry: RetryPolicy,
    generation: AtomicU64,
    pass_ids: AtomicU64,
    state: RwLock<Option<ReconciledBalance>>,
    inflight: tokio::sync::Mutex<Option<(u64, PassFuture)>>,
}

/// Cheap-clone handle; all clones share one view and one in-flight slot.
pub struct ReconcileEngine<G> {
    inner: Arc<Inner<G>>,
}

impl<G> Clone for ReconcileEngine<G> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<G: IndexerGateway + 'static> ReconcileEngine<G> {
    pub fn new(gateway: Arc<G>, identity: SessionIdentity, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                identity,
                retry,
                generation: AtomicU64::new(0),
                pass_ids: AtomicU64::new(0),
                state: RwLock::new(None),
                inflight: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.inner.identity
    }

    /// The last committed view, without I/O.
    pub fn current(&self) -> Option<ReconciledBalance> {
        self.inner.state.read().ok().and_then(|s| s.clone())
    }

    /// Abandon any in-flight pass: its result will not be committed to the
    /// cached view. Called on mode switches and wallet disconnects; the pass
    /// itself is never awaited.
    pub fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Run (or join) a reconciliation pass and return the resulting view.
    ///
    /// A refresh arriving while a pass is in flight joins that pass instead
    /// of issuing a duplicate network round trip.
    pub async fn refresh(&self) -> Result<ReconciledBalance, SyncError> {
        let (pass_id, pass) = {
            let mut slot = self.inner.inflight.lock().await;
            match slot.as_ref() {
                Some((id, pass)) => (*id, pass.clone()),
                None => {
                    let id = self.inner.pass_ids.fetch_add(1, Ordering::SeqCst);
                    let pass: PassFuture = run_pass(self.inner.clone()).boxed().shared();
                    *slot = Some((id, pass.clone()));
                    (id, pass)
                }
            }
        };

        let result = pass.await;

        let mut slot = self.inner.inflight.lock().await;
        if matches!(slot.as_ref(), Some((id, _)) if *id == pass_id) {
            *slot = None;
        }
        result
    }

    /// Persist a new metadata checkpoint after an externally finalized spend.
    ///
    /// The nullifier nonce must not regress; the post is last-writer-wins at
    /// the server, which is safe because any note not folded into the new
    /// checkpoint remains discoverable on the next refresh.
    pub async fn persist_checkpoint(&self, metadata: UserMetadata) -> Result<(), SyncError> {
        if let Some(view) = self.current() {
            if metadata.last_used_nullifier_nonce < view.next_nullifier_nonce {
                return Err(SyncError::Invariant(format!(
                    "nullifier nonce regression: {} < {}",
                    metadata.last_used_nullifier_nonce, view.next_nullifier_nonce
                )));
            }
        }

        let blob = crate::identity::seal_metadata(self.inner.identity.metadata_key(), &metadata)?;
        let gateway = self.inner.gateway.clone();
        let auth = self.inner.identity.auth.clone();
        retry_transient(&self.inner.retry, || gateway.post_metadata(&auth, &blob)).await?;
        debug!(
            nonce = metadata.last_used_nullifier_nonce,
            "metadata checkpoint persisted"
        );

        // The checkpoint now reflects the fold; notes still unspent after it
        // will reappear on the next refresh. Any pass started before the fold
        // is now stale and must not commit over this view.
        self.invalidate();
        if let Ok(mut state) = self.inner.state.write() {
            *state = Some(ReconciledBalance {
                balance: metadata.base_value(),
                spendable_notes: Vec::new(),
                next_nullifier_nonce: metadata.last_used_nullifier_nonce,
                commitment: metadata.commitment_info,
            });
        }
        Ok(())
    }
}

async fn run_pass<G: IndexerGateway + 'static>(
    inner: Arc<Inner<G>>,
) -> Result<ReconciledBalance, SyncError> {
    let generation = inner.generation.load(Ordering::SeqCst);
    let gateway = inner.gateway.clone();
    let auth = inner.identity.auth.clone();
    let receiver_hash = inner.identity.receiver_hash.clone();

    // Independent fetches, issued concurrently, combined only after both
    // complete.
    let (metadata_result, notes_result) = tokio::join!(
        retry_transient(&inner.retry, || gateway.get_metadata(&auth)),
        retry_transient(&inner.retry, || gateway.unspent_notes(&receiver_hash)),
    );
    let blob = metadata_result?;
    let notes = notes_result?;

    let metadata = match blob {
        Some(blob) => open_metadata(inner.identity.metadata_key(), &blob)?,
        None => UserMetadata::empty(),
    };

    let view = merge(&receiver_hash, metadata, notes);

    if inner.generation.load(Ordering::SeqCst) == generation {
        if let Ok(mut state) = inner.state.write() {
            *state = Some(view.clone());
        }
    } else {
        debug!("discarding reconciliation result from an abandoned pass");
    }
    Ok(view)
}

/// Pure merge of checkpoint and notes. Summation order cannot affect the
/// balance; spend order is fixed ascending by `(note_nonce, note_id)` so
/// independent clients reconstruct the same spend from the same state.
fn merge(
    receiver_hash: &str,
    metadata: UserMetadata,
    notes: Vec<UnspentNote>,
) -> ReconciledBalance {
    let mut spendable: Vec<UnspentNote> = notes
        .into_iter()
        .filter(|note| {
            if note.receiver_hash == receiver_hash {
                true
            } else {
                warn!(
                    note_id = %note.note_id,
                    "dropping note addressed to a different receiver"
                );
                false
            }
        })
        .collect();
    spendable.sort_by(|a, b| {
        a.note_nonce
            .cmp(&b.note_nonce)
            .then_with(|| a.note_id.cmp(&b.note_id))
    });

    let mut balance = metadata.base_value();
    for note in &spendable {
        balance += &note.value;
    }

    ReconciledBalance {
        balance,
        spendable_notes: spendable,
        next_nullifier_nonce: metadata.last_used_nullifier_nonce,
        commitment: metadata.commitment_info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, nonce: u64, value: u32, receiver: &str) -> UnspentNote {
        UnspentNote {
            note_id: id.to_string(),
            note_nonce: nonce,
            value: BigUint::from(value),
            receiver_hash: receiver.to_string(),
        }
    }

    fn checkpoint(nonce: u64, value: u32, leaf_index: u64) -> UserMetadata {
        UserMetadata {
            last_used_nullifier_nonce: nonce,
            commitment_info: Some(UserCommitmentInfo {
                value: BigUint::from(value),
                leaf_index,
            }),
        }
    }

    #[test]
    fn merge_matches_reference_scenario() {
        // nonce 3, commitment 500 @ leaf 7, notes 100 and 50.
        let view = merge(
            "rh",
            checkpoint(3, 500, 7),
            vec![note("a", 1, 100, "rh"), note("b", 2, 50, "rh")],
        );
        assert_eq!(view.balance, BigUint::from(650u32));
        assert_eq!(view.next_nullifier_nonce, 3);
        assert_eq!(view.commitment.unwrap().leaf_index, 7);
    }

    #[test]
    fn balance_is_order_independent() {
        let forward = merge(
            "rh",
            checkpoint(0, 7, 0),
            vec![note("a", 1, 1, "rh"), note("b", 2, 2, "rh"), note("c", 3, 4, "rh")],
        );
        let reversed = merge(
            "rh",
            checkpoint(0, 7, 0),
            vec![note("c", 3, 4, "rh"), note("b", 2, 2, "rh"), note("a", 1, 1, "rh")],
        );
        assert_eq!(forward.balance, reversed.balance);
        assert_eq!(forward.spendable_notes, reversed.spendable_notes);
    }

    #[test]
    fn null_metadata_reconciles_to_note_sum() {
        let view = merge(
            "rh",
            UserMetadata::empty(),
            vec![note("a", 1, 30, "rh"), note("b", 2, 12, "rh")],
        );
        assert_eq!(view.balance, BigUint::from(42u32));
        assert_eq!(view.next_nullifier_nonce, 0);
        assert_eq!(view.commitment, None);
    }

    #[test]
    fn spend_order_is_ascending_nonce_then_id() {
        let view = merge(
            "rh",
            UserMetadata::empty(),
            vec![
                note("z", 2, 1, "rh"),
                note("a", 2, 1, "rh"),
                note("m", 1, 1, "rh"),
            ],
        );
        let order: Vec<&str> = view
            .spendable_notes
            .iter()
            .map(|n| n.note_id.as_str())
            .collect();
        assert_eq!(order, vec!["m", "a", "z"]);
    }

    #[test]
    fn foreign_notes_never_counted() {
        let view = merge(
            "rh",
            UserMetadata::empty(),
            vec![note("a", 1, 100, "rh"), note("x", 1, 900, "someone-else")],
        );
        assert_eq!(view.balance, BigUint::from(100u32));
        assert_eq!(view.spendable_notes.len(), 1);
    }
}
