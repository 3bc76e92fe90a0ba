//! Error types for the agent core.
//!
//! Everything raised inside a sampling tick or a sweep is transient and gets
//! logged by the loop that hit it. Only [`LifecycleError::StoreInit`] and
//! [`ConfigError`] stop the process.

/// Failure to read host metrics.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider: {0}")]
    Unavailable(String),

    #[error("provider: collection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store: I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store: blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("store: invalid timestamp {0} in column 'timestamp'")]
    BadTimestamp(i64),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One failed sampling tick. Never fatal to the loop.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("tick did not finish within {0:?}")]
    TimedOut(std::time::Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config: {key} has invalid value {value:?}")]
    Invalid { key: String, value: String },

    #[error("config: {0} must be greater than zero")]
    Zero(&'static str),

    #[error("config: {flag} expects a value")]
    MissingValue { flag: String },

    #[error("config: unexpected argument {0:?}")]
    UnexpectedArg(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The history database could not be opened or migrated.
    #[error("lifecycle: failed to initialize store: {0}")]
    StoreInit(#[source] StoreError),

    #[error("lifecycle: cannot {op} while {state:?}")]
    InvalidState {
        op: &'static str,
        state: crate::lifecycle::LifecycleState,
    },
}

/// Why a frame could not be handed to one viewer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery: connection closed")]
    Closed,

    #[error("delivery: viewer did not drain its queue in time")]
    TimedOut,
}
