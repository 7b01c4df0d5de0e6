pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod indexer;
pub mod positions;
pub mod reconcile;
pub mod scope;
pub mod session;

pub use config::{Config, ConfigError, PAGE_SIZE};
pub use domain::{
    ClosureStatus, HistoricalPosition, OpenPosition, PaginatedResponse, Position, UnspentNote,
    UserCommitmentInfo, UserMetadata,
};
pub use error::{RetryPolicy, SyncError};
pub use identity::{derive_identity, AuthHeaders, SessionIdentity, SignerError, WalletSigner};
pub use indexer::{GatewayError, HttpIndexerGateway, IndexerGateway, MockIndexerGateway, ScopeKey};
pub use positions::{PositionLookup, PositionQuery};
pub use reconcile::{ReconcileEngine, ReconciledBalance};
pub use scope::{PrivateScope, PublicScope, ScopeBalance, ScopeSource};
pub use session::{ModeState, TradingSession};
