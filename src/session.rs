//! Trading-mode state machine.
//!
//! Owns the Public/Private mode for one UI session, the connected wallet
//! address, the cached derived identity, and the active reconciliation
//! engine. The machine is live for the whole session; there is no terminal
//! state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{RetryPolicy, SyncError};
use crate::identity::{derive_identity, SessionIdentity, WalletSigner};
use crate::indexer::IndexerGateway;
use crate::reconcile::{ReconcileEngine, ReconciledBalance};
use crate::scope::{PrivateScope, PublicScope, ScopeSource};

/// Session mode. `InitializingPrivate` covers the interactive signature and
/// the first reconciliation; `PrivateInitFailed` is retryable and also allows
/// falling back to Public.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    Public,
    InitializingPrivate,
    Private,
    PrivateInitFailed,
}

pub struct TradingSession<G> {
    gateway: Arc<G>,
    retry: RetryPolicy,
    mode: ModeState,
    wallet: Option<String>,
    cached_identity: Option<SessionIdentity>,
    engine: Option<ReconcileEngine<G>>,
    scope: Option<Arc<dyn ScopeSource>>,
}

impl<G: IndexerGateway + 'static> TradingSession<G> {
    pub fn new(gateway: Arc<G>, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            retry,
            mode: ModeState::Public,
            wallet: None,
            cached_identity: None,
            engine: None,
            scope: None,
        }
    }

    pub fn mode(&self) -> ModeState {
        self.mode
    }

    pub fn wallet(&self) -> Option<&str> {
        self.wallet.as_deref()
    }

    /// The engine backing the current Private session, if one exists.
    pub fn engine(&self) -> Option<&ReconcileEngine<G>> {
        self.engine.as_ref()
    }

    /// The active data-sourcing strategy. Selected once per mode transition;
    /// absent until a wallet connects.
    pub fn scope(&self) -> Result<Arc<dyn ScopeSource>, SyncError> {
        self.scope
            .clone()
            .ok_or_else(|| SyncError::Unauthorized("no wallet connected".to_string()))
    }

    /// Connect a wallet. Switching to a different address drops the cached
    /// identity and any Private-family state.
    pub fn connect_wallet(&mut self, address: &str) {
        if self.wallet.as_deref() == Some(address) {
            return;
        }
        if self.wallet.is_some() {
            info!(address, "wallet switched, resetting private state");
            self.reset_private_state();
        }
        self.wallet = Some(address.to_string());
        self.mode = ModeState::Public;
        self.scope = Some(self.public_scope(address));
    }

    /// Disconnecting the wallet forces any Private-family state back to
    /// Public and clears the cached identity.
    pub fn disconnect_wallet(&mut self) {
        info!("wallet disconnected, returning to Public mode");
        self.reset_private_state();
        self.wallet = None;
        self.mode = ModeState::Public;
        self.scope = None;
    }

    /// User toggle into Private mode.
    ///
    /// Derives the identity (one signature prompt, skipped when a valid
    /// derivation for the current address is cached) and runs the first
    /// reconciliation. On any failure the machine lands in
    /// `PrivateInitFailed`; no private-scope call is issued when derivation
    /// itself fails.
    pub async fn enter_private(
        &mut self,
        signer: &dyn WalletSigner,
    ) -> Result<ReconciledBalance, SyncError> {
        if self.mode == ModeState::Private {
            if let Some(engine) = &self.engine {
                if let Some(view) = engine.current() {
                    return Ok(view);
                }
            }
        }
        let wallet = match &self.wallet {
            Some(wallet) => wallet.clone(),
            None => {
                return Err(SyncError::Unauthorized(
                    "cannot enter Private mode without a connected wallet".to_string(),
                ))
            }
        };

        info!(mode = ?self.mode, "entering Private mode");
        self.mode = ModeState::InitializingPrivate;

        let identity = match self.cached_identity_for(&wallet) {
            Some(identity) => identity,
            None => match derive_identity(&wallet, signer).await {
                Ok(identity) => {
                    self.cached_identity = Some(identity.clone());
                    identity
                }
                Err(err) => {
                    warn!("identity derivation failed: {}", err);
                    self.mode = ModeState::PrivateInitFailed;
                    return Err(err.into());
                }
            },
        };

        let engine = match &self.engine {
            Some(engine) if engine.identity().receiver_hash == identity.receiver_hash => {
                engine.clone()
            }
            _ => {
                let engine = ReconcileEngine::new(
                    self.gateway.clone(),
                    identity.clone(),
                    self.retry.clone(),
                );
                self.engine = Some(engine.clone());
                engine
            }
        };

        match engine.refresh().await {
            Ok(view) => {
                self.mode = ModeState::Private;
                self.scope = Some(Arc::new(PrivateScope::new(
                    self.gateway.clone(),
                    engine,
                    self.retry.clone(),
                )));
                info!("Private mode initialized");
                Ok(view)
            }
            Err(err) => {
                warn!("initial reconciliation failed: {}", err);
                self.mode = ModeState::PrivateInitFailed;
                Err(err)
            }
        }
    }

    /// User toggle back to Public. Cached private state is retained so
    /// re-entering Private within the session does not re-prompt for a
    /// signature; any in-flight reconciliation is abandoned, not awaited.
    pub fn exit_private(&mut self) {
        if let Some(engine) = &self.engine {
            engine.invalidate();
        }
        info!(mode = ?self.mode, "returning to Public mode");
        self.mode = ModeState::Public;
        self.scope = self.wallet.clone().map(|addr| self.public_scope(&addr));
    }

    fn cached_identity_for(&self, wallet: &str) -> Option<SessionIdentity> {
        self.cached_identity
            .as_ref()
            .filter(|identity| identity.address == wallet)
            .cloned()
    }

    fn public_scope(&self, address: &str) -> Arc<dyn ScopeSource> {
        Arc::new(PublicScope::new(
            self.gateway.clone(),
            address.to_string(),
            self.retry.clone(),
        ))
    }

    fn reset_private_state(&mut self) {
        if let Some(engine) = &self.engine {
            engine.invalidate();
        }
        self.cached_identity = None;
        self.engine = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::MockIndexerGateway;

    #[tokio::test]
    async fn session_starts_public_without_wallet() {
        let session = TradingSession::new(Arc::new(MockIndexerGateway::new()), RetryPolicy::default());
        assert_eq!(session.mode(), ModeState::Public);
        assert!(session.scope().is_err());
    }

    #[tokio::test]
    async fn enter_private_without_wallet_is_unauthorized() {
        struct NoSigner;
        #[async_trait::async_trait]
        impl WalletSigner for NoSigner {
            async fn sign_message(
                &self,
                _message: &str,
            ) -> Result<Vec<u8>, crate::identity::SignerError> {
                Err(crate::identity::SignerError::Unavailable)
            }
        }

        let mut session =
            TradingSession::new(Arc::new(MockIndexerGateway::new()), RetryPolicy::default());
        let result = session.enter_private(&NoSigner).await;
        assert!(matches!(result, Err(SyncError::Unauthorized(_))));
        // Not even InitializingPrivate: the toggle requires a wallet.
        assert_eq!(session.mode(), ModeState::Public);
    }

    #[tokio::test]
    async fn wallet_switch_drops_cached_identity() {
        let mut session =
            TradingSession::new(Arc::new(MockIndexerGateway::new()), RetryPolicy::default());
        session.connect_wallet("0xaaa");
        session.connect_wallet("0xaaa");
        assert_eq!(session.wallet(), Some("0xaaa"));
        session.connect_wallet("0xbbb");
        assert_eq!(session.wallet(), Some("0xbbb"));
        assert!(session.cached_identity.is_none());
        assert!(session.engine().is_none());
    }
}
