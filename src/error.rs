/// Crate-wide error kinds.
///
/// Leaf adapters (chain, swap, market data) return their own narrower
/// error enums. Pipeline components translate those into `AppError` or
/// into a `skip` / `degrade` outcome per the error handling design —
/// only schema violations, scoring/aggregation panics, and a failure to
/// persist a confirmed trade are meant to be fatal.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider rejected request: {0}")]
    ProviderRejection(String),

    #[error("storage conflict: {0}")]
    StorageConflict(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("stale state: {0}")]
    StaleState(String),

    #[error("cancellation requested")]
    CancellationRequested,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

pub type AppResult<T> = Result<T, AppError>;
