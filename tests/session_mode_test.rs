use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use num_bigint::BigUint;

use noxsync::identity::{SignerError, WalletSigner};
use noxsync::indexer::GatewayError;
use noxsync::{
    ModeState, MockIndexerGateway, RetryPolicy, SyncError, TradingSession, UnspentNote,
};

const WALLET: &str = "0x1230000000000000000000000000000000000abc";

/// Signer that counts prompts, so tests can assert "exactly one signature
/// per session".
struct CountingSigner {
    prompts: AtomicUsize,
}

impl CountingSigner {
    fn new() -> Self {
        Self {
            prompts: AtomicUsize::new(0),
        }
    }

    fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for CountingSigner {
    async fn sign_message(&self, _message: &str) -> Result<Vec<u8>, SignerError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(vec![9u8; 65])
    }
}

struct RejectingSigner;

#[async_trait]
impl WalletSigner for RejectingSigner {
    async fn sign_message(&self, _message: &str) -> Result<Vec<u8>, SignerError> {
        Err(SignerError::Rejected)
    }
}

async fn receiver_hash_for(signer: &CountingSigner) -> String {
    // Same signature bytes, so same derived identity as the session's.
    let identity = noxsync::derive_identity(WALLET, signer).await.unwrap();
    identity.receiver_hash
}

#[tokio::test]
async fn rejected_signature_keeps_session_out_of_private() {
    let gateway = Arc::new(MockIndexerGateway::new());
    let mut session = TradingSession::new(gateway.clone(), RetryPolicy::default());
    session.connect_wallet(WALLET);

    let result = session.enter_private(&RejectingSigner).await;
    assert!(matches!(result, Err(SyncError::Unauthorized(_))));
    assert_eq!(session.mode(), ModeState::PrivateInitFailed);
    // Not a single private-scope network call was issued.
    assert_eq!(gateway.calls.private_scope_calls(), 0);

    // The failure is recoverable: the user falls back to Public.
    session.exit_private();
    assert_eq!(session.mode(), ModeState::Public);
}

#[tokio::test]
async fn successful_toggle_reaches_private_with_reconciled_balance() {
    let signer = CountingSigner::new();
    let receiver_hash = receiver_hash_for(&signer).await;
    let gateway = Arc::new(MockIndexerGateway::new().with_note(UnspentNote {
        note_id: "n1".to_string(),
        note_nonce: 1,
        value: BigUint::from(75u32),
        receiver_hash,
    }));
    let mut session = TradingSession::new(gateway, RetryPolicy::default());
    session.connect_wallet(WALLET);

    let view = session.enter_private(&signer).await.unwrap();
    assert_eq!(session.mode(), ModeState::Private);
    assert_eq!(view.balance, BigUint::from(75u32));
    assert_eq!(view.next_nullifier_nonce, 0);
}

#[tokio::test]
async fn reentering_private_reuses_cached_identity_without_reprompt() {
    let signer = CountingSigner::new();
    let gateway = Arc::new(MockIndexerGateway::new());
    let mut session = TradingSession::new(gateway, RetryPolicy::default());
    session.connect_wallet(WALLET);

    session.enter_private(&signer).await.unwrap();
    session.exit_private();
    assert_eq!(session.mode(), ModeState::Public);

    session.enter_private(&signer).await.unwrap();
    assert_eq!(session.mode(), ModeState::Private);
    assert_eq!(signer.prompt_count(), 1);
}

#[tokio::test]
async fn failed_reconciliation_lands_in_init_failed_and_is_retryable() {
    let signer = CountingSigner::new();
    // A permanent failure on the first pass; the metadata endpoint recovers
    // afterwards.
    let gateway = Arc::new(MockIndexerGateway::new().fail_next(GatewayError::Parse(
        "truncated body".to_string(),
    )));
    let mut session = TradingSession::new(gateway, RetryPolicy::default());
    session.connect_wallet(WALLET);

    let result = session.enter_private(&signer).await;
    assert!(result.is_err());
    assert_eq!(session.mode(), ModeState::PrivateInitFailed);

    // Retry succeeds, still without a second signature prompt.
    session.enter_private(&signer).await.unwrap();
    assert_eq!(session.mode(), ModeState::Private);
    assert_eq!(signer.prompt_count(), 1);
}

#[tokio::test]
async fn disconnect_forces_public_and_clears_identity() {
    let signer = CountingSigner::new();
    let gateway = Arc::new(MockIndexerGateway::new());
    let mut session = TradingSession::new(gateway, RetryPolicy::default());
    session.connect_wallet(WALLET);
    session.enter_private(&signer).await.unwrap();

    session.disconnect_wallet();
    assert_eq!(session.mode(), ModeState::Public);
    assert!(session.scope().is_err());
    assert!(session.engine().is_none());

    // A fresh connection needs a fresh signature.
    session.connect_wallet(WALLET);
    session.enter_private(&signer).await.unwrap();
    assert_eq!(signer.prompt_count(), 2);
}

#[tokio::test]
async fn enter_private_while_private_is_idempotent() {
    let signer = CountingSigner::new();
    let gateway = Arc::new(MockIndexerGateway::new());
    let mut session = TradingSession::new(gateway.clone(), RetryPolicy::default());
    session.connect_wallet(WALLET);

    let first = session.enter_private(&signer).await.unwrap();
    let gets_after_first = gateway.calls.metadata_gets.load(Ordering::SeqCst);
    let second = session.enter_private(&signer).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        gateway.calls.metadata_gets.load(Ordering::SeqCst),
        gets_after_first
    );
    assert_eq!(signer.prompt_count(), 1);
}
