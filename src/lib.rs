// ============================================================================
// txprop Library
// ============================================================================
//
// Declarative transaction propagation over a context-scoped transaction
// manager.
//

pub mod config;
pub mod core;
pub mod facade;
pub mod prelude;
pub mod propagation;
pub mod scenario;
pub mod transaction;

// Re-export main types for convenience
pub use config::{TransactionAttributes, TransactionalConfig};
pub use core::{ContextId, ManagerError, PropagationError, Result};
pub use facade::{InterceptError, TransactionalInterceptor};
pub use propagation::{
    ExecutionContext, Failure, FailureKind, Fault, InvocationRecord, Outcome, OutcomeRecorder,
    Propagation, PropagationCoordinator, RollbackRules, TransactionObserver, kinds,
};
pub use transaction::{
    InMemoryTransactionManager, ManagerConfig, TransactionId, TransactionManager,
    TransactionStatus,
};

/// Coordinator, interceptor and context wired to the in-memory manager.
///
/// # Examples
///
/// ```
/// use txprop::{Fault, Propagation, TransactionAttributes, Transactional};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tx = Transactional::in_memory();
/// let ctx = tx.context();
///
/// let total = tx
///     .interceptor()
///     .run(&ctx, "checkout", &TransactionAttributes::new(Propagation::Requires), None, |_ctx| async {
///         Ok::<_, Fault>(42)
///     })
///     .await?;
///
/// assert_eq!(total, 42);
/// # Ok(())
/// # }
/// ```
pub struct Transactional<M: TransactionManager> {
    manager: std::sync::Arc<M>,
    interceptor: TransactionalInterceptor<M>,
}

impl Transactional<InMemoryTransactionManager> {
    pub fn in_memory() -> Self {
        Self::in_memory_with_config(ManagerConfig::default())
    }

    pub fn in_memory_with_config(config: ManagerConfig) -> Self {
        Self::new(std::sync::Arc::new(InMemoryTransactionManager::with_config(config)))
    }
}

impl<M: TransactionManager> Transactional<M> {
    pub fn new(manager: std::sync::Arc<M>) -> Self {
        let interceptor = TransactionalInterceptor::new(std::sync::Arc::clone(&manager));
        Self {
            manager,
            interceptor,
        }
    }

    pub fn manager(&self) -> &std::sync::Arc<M> {
        &self.manager
    }

    pub fn coordinator(&self) -> &PropagationCoordinator<M> {
        self.interceptor.coordinator()
    }

    pub fn interceptor(&self) -> &TransactionalInterceptor<M> {
        &self.interceptor
    }

    /// A fresh execution context for one logical call stack
    pub fn context(&self) -> ExecutionContext<M::Handle> {
        ExecutionContext::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transactional_in_memory() {
        let tx = Transactional::in_memory();
        let ctx = tx.context();
        let recorder = OutcomeRecorder::<TransactionId>::new();

        tx.interceptor()
            .run(
                &ctx,
                "route",
                &TransactionAttributes::default(),
                Some(&recorder),
                |_ctx| async { Ok::<_, Fault>(()) },
            )
            .await
            .unwrap();

        assert!(recorder.last().unwrap().is_committed());
        assert_eq!(tx.manager().current(ctx.id()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_contexts_are_distinct() {
        let tx = Transactional::in_memory();
        assert_ne!(tx.context().id(), tx.context().id());
    }
}
