// ============================================================================
// Transaction Management Module
// ============================================================================
//
// The collaborator contract the propagation coordinator drives, plus an
// in-memory implementation of it.
//
// Bindings are scoped to an execution context: every operation acts on the
// transaction currently bound to the given `ContextId`.
//
// ============================================================================

pub mod manager;
pub mod state;

pub use manager::{InMemoryTransactionManager, ManagerConfig, TransactionInfo};
pub use state::{Transaction, TransactionId, TransactionState};

use crate::core::{ContextId, ManagerResult};
use async_trait::async_trait;
use std::fmt::Debug;

/// Status of a transaction as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    NoTransaction,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "ACTIVE"),
            TransactionStatus::MarkedRollback => write!(f, "MARKED_ROLLBACK"),
            TransactionStatus::NoTransaction => write!(f, "NO_TRANSACTION"),
        }
    }
}

/// Context-scoped transactional resource manager.
///
/// Contract:
/// - `begin` fails if the context already has a bound transaction.
/// - `commit` / `rollback` act on the bound transaction and clear the binding.
/// - `suspend` clears the binding and returns its handle.
/// - `resume` rebinds a suspended handle, failing if the context is bound.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Opaque transaction identity. Only stored and handed back.
    type Handle: Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Begin a transaction. A `timeout_secs` of zero selects the manager default.
    async fn begin(&self, ctx: ContextId, timeout_secs: u64) -> ManagerResult<Self::Handle>;

    async fn commit(&self, ctx: ContextId) -> ManagerResult<()>;

    async fn rollback(&self, ctx: ContextId) -> ManagerResult<()>;

    async fn set_rollback_only(&self, ctx: ContextId) -> ManagerResult<()>;

    async fn suspend(&self, ctx: ContextId) -> ManagerResult<Self::Handle>;

    async fn resume(&self, ctx: ContextId, handle: Self::Handle) -> ManagerResult<()>;

    async fn current(&self, ctx: ContextId) -> ManagerResult<Option<Self::Handle>>;

    async fn status(&self, handle: &Self::Handle) -> ManagerResult<TransactionStatus>;
}
