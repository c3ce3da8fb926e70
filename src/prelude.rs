//! Everything an application needs to declare transactional units of work.

pub use crate::config::{TransactionAttributes, TransactionalConfig};
pub use crate::core::{PropagationError, Result};
pub use crate::facade::{InterceptError, TransactionalInterceptor};
pub use crate::propagation::{
    ExecutionContext, Failure, FailureKind, Fault, OutcomeRecorder, Propagation, RollbackRules,
    TransactionObserver, kinds,
};
pub use crate::transaction::{InMemoryTransactionManager, TransactionManager};
pub use crate::Transactional;
