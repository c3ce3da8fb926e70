use thiserror::Error;

/// Failures reported by a [`TransactionManager`](crate::transaction::TransactionManager)
/// implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("Context {0} is already bound to a transaction")]
    AlreadyBound(String),

    #[error("Context {0} has no bound transaction")]
    NotBound(String),

    #[error("Transaction {0} not found")]
    UnknownTransaction(String),

    #[error("Transaction {0} is not suspended")]
    NotSuspended(String),

    #[error("Transaction {0} was rolled back")]
    RolledBack(String),

    #[error("Transaction {0} timed out")]
    TimedOut(String),

    #[error("Transaction manager error: {0}")]
    Other(String),
}

pub type ManagerResult<T> = std::result::Result<T, ManagerError>;

#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("Transaction required by route '{route}' but none is active")]
    TransactionRequired { route: String },

    #[error("Route '{route}' does not allow a transaction but one is active")]
    TransactionNotAllowed { route: String },

    #[error("Transaction state corrupted: {0}")]
    TransactionStateCorrupted(String),

    #[error(transparent)]
    ManagerFailure(#[from] ManagerError),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PropagationError>;

impl<T> From<std::sync::PoisonError<T>> for PropagationError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for PropagationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for PropagationError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}
