use thiserror::Error;

/// Failures of a single JSON-RPC exchange with the node.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Network failure or undecodable response body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with an error payload.
    #[error("node error: {0}")]
    Node(String),

    /// `sero_sendTransaction` returned the all-zero hash sentinel, meaning
    /// the signer could not produce the transaction yet.
    #[error("transaction is not yet available")]
    NotYetAvailable,
}

/// Failures of the ledger backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open {name} database: {source}")]
    DatabaseOpen {
        name: String,
        #[source]
        source: sled::Error,
    },

    #[error("database operation failed: {0}")]
    DatabaseOp(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("payouts already locked by {holder}")]
    AlreadyLocked { holder: String },

    #[error("balance of {login} is {balance} Shannon, cannot debit {amount}")]
    InsufficientBalance {
        login: String,
        balance: u64,
        amount: u64,
    },
}

/// Top-level error of the back-office daemon.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The pool's view of funds or sync state contradicts the node's.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// A payouts lock survived from a previous run and must be resolved
    /// manually before payouts can start.
    #[error("stale payouts lock held by {holder}")]
    StaleLock { holder: String },

    #[error("malformed node response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// True for faults that latch the owning processor's halt flag; the
    /// operator contract is that these repeat in the log until a restart.
    pub fn is_critical(&self) -> bool {
        !matches!(self, PoolError::StaleLock { .. })
    }
}
