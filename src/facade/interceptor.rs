// ============================================================================
// Transactional Interceptor
// ============================================================================
//
// Wraps a unit of work with the coordinator's entry/exit protocol:
//
//   on_entry ── work ──Ok──> on_exit
//                   └─Err──> on_error ──> on_exit
//
// ============================================================================

use crate::config::{TransactionAttributes, TransactionalConfig};
use crate::core::PropagationError;
use crate::propagation::{
    ExecutionContext, Failure, FailureKind, PropagationCoordinator, TransactionObserver,
};
use crate::transaction::TransactionManager;
use log::{error, warn};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Failure of an intercepted unit of work
#[derive(Error, Debug)]
pub enum InterceptError<E> {
    /// The unit of work itself failed; its transaction was handled per the
    /// rollback rules
    #[error("{0}")]
    Work(E),

    #[error(transparent)]
    Propagation(#[from] PropagationError),
}

impl<E> InterceptError<E> {
    pub fn work(&self) -> Option<&E> {
        match self {
            InterceptError::Work(err) => Some(err),
            InterceptError::Propagation(_) => None,
        }
    }

    pub fn propagation(&self) -> Option<&PropagationError> {
        match self {
            InterceptError::Work(_) => None,
            InterceptError::Propagation(err) => Some(err),
        }
    }
}

impl<E: Failure> Failure for InterceptError<E> {
    fn kind(&self) -> &'static FailureKind {
        match self {
            InterceptError::Work(err) => err.kind(),
            InterceptError::Propagation(err) => err.kind(),
        }
    }
}

pub struct TransactionalInterceptor<M: TransactionManager> {
    coordinator: PropagationCoordinator<M>,
}

impl<M: TransactionManager> Clone for TransactionalInterceptor<M> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<M: TransactionManager> TransactionalInterceptor<M> {
    pub fn new(manager: Arc<M>) -> Self {
        Self::with_coordinator(PropagationCoordinator::new(manager))
    }

    pub fn with_coordinator(coordinator: PropagationCoordinator<M>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &PropagationCoordinator<M> {
        &self.coordinator
    }

    /// Run `work` under `attributes`.
    ///
    /// `work` receives a clone of `ctx` to hand to nested units of work. If
    /// the coordinator fails while closing a failed unit of work, the
    /// coordinator error is returned and the work error is logged.
    pub async fn run<T, E, F, Fut>(
        &self,
        ctx: &ExecutionContext<M::Handle>,
        route_id: &str,
        attributes: &TransactionAttributes,
        observer: Option<&dyn TransactionObserver<M::Handle>>,
        work: F,
    ) -> Result<T, InterceptError<E>>
    where
        F: FnOnce(ExecutionContext<M::Handle>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure + std::fmt::Display,
    {
        let policy = attributes.propagation;
        self.coordinator
            .on_entry(ctx, policy, attributes.timeout_secs, route_id)
            .await?;

        match work(ctx.clone()).await {
            Ok(value) => {
                self.coordinator.on_exit(ctx, policy, route_id, observer).await?;
                Ok(value)
            }
            Err(failure) => {
                let marked = self
                    .coordinator
                    .on_error(ctx, &failure, policy, &attributes.rules, route_id, observer)
                    .await;
                let exited = self.coordinator.on_exit(ctx, policy, route_id, observer).await;

                let cleanup = match (marked, exited) {
                    (Ok(()), exited) => exited,
                    (Err(err), Ok(())) => Err(err),
                    (Err(err), Err(exit_err)) => {
                        error!("Route '{}' on {} failed to exit: {}", route_id, ctx.id(), exit_err);
                        Err(err)
                    }
                };

                match cleanup {
                    Ok(()) => Err(InterceptError::Work(failure)),
                    Err(err) => {
                        warn!(
                            "Route '{}' on {} failed with '{}' and could not close its transaction",
                            route_id,
                            ctx.id(),
                            failure
                        );
                        Err(err.into())
                    }
                }
            }
        }
    }

    /// Run `work` with the attributes `config` declares for `route_id`
    pub async fn run_route<T, E, F, Fut>(
        &self,
        ctx: &ExecutionContext<M::Handle>,
        config: &TransactionalConfig,
        route_id: &str,
        observer: Option<&dyn TransactionObserver<M::Handle>>,
        work: F,
    ) -> Result<T, InterceptError<E>>
    where
        F: FnOnce(ExecutionContext<M::Handle>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure + std::fmt::Display,
    {
        let attributes = config.attributes_for(route_id);
        self.run(ctx, route_id, attributes, observer, work).await
    }
}
