//! Mode-dependent data sourcing.
//!
//! One interface, two implementations: `PublicScope` keys queries by wallet
//! address, `PrivateScope` by the derived identity. The session selects one
//! implementation per mode transition; call sites never branch on the mode.

use std::sync::Arc;

use async_trait::async_trait;
use num_bigint::BigUint;

use crate::domain::{HistoricalPosition, OpenPosition, PaginatedResponse};
use crate::error::{retry_transient, RetryPolicy, SyncError};
use crate::indexer::{IndexerGateway, ScopeKey};
use crate::reconcile::ReconcileEngine;

/// Where the displayed account balance comes from in the current scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeBalance {
    /// Public-mode balances are read from the wallet/RPC collaborator, not
    /// from this client.
    External,
    /// Private-mode balance from the reconciliation engine.
    Private(BigUint),
}

/// Data sourcing strategy for the active trading mode.
#[async_trait]
pub trait ScopeSource: Send + Sync {
    fn scope_key(&self) -> ScopeKey;

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, SyncError>;

    /// One history page; the pagination invariant is checked on every page.
    async fn history_page(
        &self,
        cursor: Option<&str>,
    ) -> Result<PaginatedResponse<HistoricalPosition>, SyncError>;

    async fn balance(&self) -> Result<ScopeBalance, SyncError>;
}

fn checked<T>(page: PaginatedResponse<T>) -> Result<PaginatedResponse<T>, SyncError> {
    page.validate().map_err(SyncError::Invariant)?;
    Ok(page)
}

/// Address-keyed sourcing for Public mode.
pub struct PublicScope<G> {
    gateway: Arc<G>,
    address: String,
    retry: RetryPolicy,
}

impl<G: IndexerGateway> PublicScope<G> {
    pub fn new(gateway: Arc<G>, address: String, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            address,
            retry,
        }
    }
}

#[async_trait]
impl<G: IndexerGateway> ScopeSource for PublicScope<G> {
    fn scope_key(&self) -> ScopeKey {
        ScopeKey::Public {
            address: self.address.clone(),
        }
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, SyncError> {
        let key = self.scope_key();
        retry_transient(&self.retry, || self.gateway.open_positions(&key)).await
    }

    async fn history_page(
        &self,
        cursor: Option<&str>,
    ) -> Result<PaginatedResponse<HistoricalPosition>, SyncError> {
        let key = self.scope_key();
        let page =
            retry_transient(&self.retry, || self.gateway.historical_positions(&key, cursor))
                .await?;
        checked(page)
    }

    async fn balance(&self) -> Result<ScopeBalance, SyncError> {
        Ok(ScopeBalance::External)
    }
}

/// Identity-keyed sourcing for Private mode.
pub struct PrivateScope<G> {
    gateway: Arc<G>,
    engine: ReconcileEngine<G>,
    retry: RetryPolicy,
}

impl<G: IndexerGateway + 'static> PrivateScope<G> {
    pub fn new(gateway: Arc<G>, engine: ReconcileEngine<G>, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            engine,
            retry,
        }
    }
}

#[async_trait]
impl<G: IndexerGateway + 'static> ScopeSource for PrivateScope<G> {
    fn scope_key(&self) -> ScopeKey {
        ScopeKey::Private {
            auth: self.engine.identity().auth.clone(),
        }
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, SyncError> {
        let key = self.scope_key();
        retry_transient(&self.retry, || self.gateway.open_positions(&key)).await
    }

    async fn history_page(
        &self,
        cursor: Option<&str>,
    ) -> Result<PaginatedResponse<HistoricalPosition>, SyncError> {
        let key = self.scope_key();
        let page =
            retry_transient(&self.retry, || self.gateway.historical_positions(&key, cursor))
                .await?;
        checked(page)
    }

    async fn balance(&self) -> Result<ScopeBalance, SyncError> {
        match self.engine.current() {
            Some(view) => Ok(ScopeBalance::Private(view.balance)),
            None => {
                let view = self.engine.refresh().await?;
                Ok(ScopeBalance::Private(view.balance))
            }
        }
    }
}
