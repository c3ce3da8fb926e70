// ============================================================================
// Propagation Coordinator
// ============================================================================
//
// Decides at entry and exit of a unit of work whether to begin, join,
// suspend/resume or forbid a transaction, based on the declared policy.
//
// Calls for one execution context must nest: every successful `on_entry` is
// closed by exactly one `on_exit`, innermost first. Violations that can be
// observed (empty stack, policy mismatch, a foreign transaction bound at
// completion or resume time) fail with `TransactionStateCorrupted`.
//
// ============================================================================

use super::{ExecutionContext, Failure, InvocationRecord, Propagation, RollbackRules, TransactionObserver};
use crate::core::{PropagationError, Result};
use crate::transaction::{TransactionManager, TransactionStatus};
use log::{debug, error, trace};
use std::sync::Arc;

pub struct PropagationCoordinator<M: TransactionManager> {
    manager: Arc<M>,
}

impl<M: TransactionManager> Clone for PropagationCoordinator<M> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<M: TransactionManager> PropagationCoordinator<M> {
    pub fn new(manager: Arc<M>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<M> {
        &self.manager
    }

    /// Open an invocation. `timeout_secs` only matters when a transaction is
    /// begun.
    pub async fn on_entry(
        &self,
        ctx: &ExecutionContext<M::Handle>,
        policy: Propagation,
        timeout_secs: u64,
        route_id: &str,
    ) -> Result<()> {
        let id = ctx.id();
        let current = self.manager.current(id).await?;
        trace!(
            "Entering route '{}' on {} with {} (current: {:?})",
            route_id, id, policy, current
        );

        let (owned, suspended) = match policy {
            Propagation::Requires => match current {
                Some(_) => (None, None),
                None => (Some(self.manager.begin(id, timeout_secs).await?), None),
            },
            Propagation::RequiresNew => {
                let suspended = match current {
                    Some(_) => Some(self.manager.suspend(id).await?),
                    None => None,
                };
                match self.manager.begin(id, timeout_secs).await {
                    Ok(handle) => (Some(handle), suspended),
                    Err(err) => {
                        if let Some(handle) = suspended {
                            if let Err(resume_err) = self.manager.resume(id, handle).await {
                                error!(
                                    "Route '{}' on {} failed to resume after a failed begin: {}",
                                    route_id, id, resume_err
                                );
                            }
                        }
                        return Err(err.into());
                    }
                }
            }
            Propagation::Mandatory => {
                if current.is_none() {
                    return Err(PropagationError::TransactionRequired {
                        route: route_id.to_string(),
                    });
                }
                (None, None)
            }
            Propagation::Never => {
                if current.is_some() {
                    return Err(PropagationError::TransactionNotAllowed {
                        route: route_id.to_string(),
                    });
                }
                (None, None)
            }
            Propagation::NotSupported => match current {
                Some(_) => (None, Some(self.manager.suspend(id).await?)),
                None => (None, None),
            },
            Propagation::Supported => (None, None),
        };

        if let Some(handle) = &owned {
            debug!("Route '{}' on {} began {:?}", route_id, id, handle);
        }
        if let Some(handle) = &suspended {
            debug!("Route '{}' on {} suspended {:?}", route_id, id, handle);
        }

        let record = InvocationRecord::new(route_id, policy, owned.clone(), suspended.clone());
        if let Err(err) = ctx.push(record) {
            self.undo_entry(ctx, owned, suspended, route_id).await;
            return Err(err);
        }
        Ok(())
    }

    /// Roll back what `on_entry` began and resume what it suspended when the
    /// invocation could not be recorded. Failures are logged; the caller
    /// reports the original error.
    async fn undo_entry(
        &self,
        ctx: &ExecutionContext<M::Handle>,
        owned: Option<M::Handle>,
        suspended: Option<M::Handle>,
        route_id: &str,
    ) {
        let id = ctx.id();
        if let Some(handle) = owned {
            match self.manager.rollback(id).await {
                Ok(()) => debug!("Route '{}' on {} rolled back unrecorded {:?}", route_id, id, handle),
                Err(err) => error!(
                    "Route '{}' on {} failed to roll back unrecorded {:?}: {}",
                    route_id, id, handle, err
                ),
            }
        }
        if let Some(handle) = suspended {
            if let Err(err) = self.manager.resume(id, handle.clone()).await {
                error!(
                    "Route '{}' on {} failed to resume {:?} after an unrecorded entry: {}",
                    route_id, id, handle, err
                );
            }
        }
    }

    /// Close the most recent invocation: complete the transaction it owns,
    /// then resume the one it suspended.
    pub async fn on_exit(
        &self,
        ctx: &ExecutionContext<M::Handle>,
        policy: Propagation,
        route_id: &str,
        observer: Option<&dyn TransactionObserver<M::Handle>>,
    ) -> Result<()> {
        let record = ctx.pop_matching(policy, route_id)?;
        let (owned, suspended) = record.into_parts();

        let completion = match owned {
            Some(handle) => self.complete(ctx, handle, route_id, observer).await,
            None => Ok(()),
        };

        let Some(handle) = suspended else {
            return completion;
        };

        match (completion, self.resume(ctx, handle, route_id).await) {
            (Ok(()), resumed) => resumed,
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(resume_err)) => {
                error!(
                    "Route '{}' on {} failed to resume after a failed completion: {}",
                    route_id,
                    ctx.id(),
                    resume_err
                );
                Err(err)
            }
        }
    }

    /// Mark the current transaction rollback-only if `failure` requires it.
    /// Does not close the invocation; `on_exit` still follows.
    pub async fn on_error(
        &self,
        ctx: &ExecutionContext<M::Handle>,
        failure: &dyn Failure,
        policy: Propagation,
        rules: &RollbackRules,
        route_id: &str,
        _observer: Option<&dyn TransactionObserver<M::Handle>>,
    ) -> Result<()> {
        let id = ctx.id();
        let kind = failure.kind();

        let Some(current) = self.manager.current(id).await? else {
            trace!(
                "Route '{}' ({}) on {} failed with {} outside a transaction",
                route_id, policy, id, kind
            );
            return Ok(());
        };

        if rules.requires_rollback(kind) {
            debug!(
                "Route '{}' ({}) on {} failed with {}; marking {:?} rollback-only",
                route_id, policy, id, kind, current
            );
            self.manager.set_rollback_only(id).await?;
        } else {
            debug!(
                "Route '{}' ({}) on {} failed with {}; {:?} may still commit",
                route_id, policy, id, kind, current
            );
        }

        Ok(())
    }

    async fn complete(
        &self,
        ctx: &ExecutionContext<M::Handle>,
        handle: M::Handle,
        route_id: &str,
        observer: Option<&dyn TransactionObserver<M::Handle>>,
    ) -> Result<()> {
        let id = ctx.id();
        let current = self.manager.current(id).await?;
        if current.as_ref() != Some(&handle) {
            return Err(PropagationError::TransactionStateCorrupted(format!(
                "route '{}' on {} owns {:?} but {:?} is current",
                route_id, id, handle, current
            )));
        }

        match self.manager.status(&handle).await? {
            TransactionStatus::MarkedRollback => {
                self.manager.rollback(id).await?;
                debug!("Route '{}' on {} rolled back {:?}", route_id, id, handle);
                if let Some(observer) = observer {
                    observer.transaction_rolled_back(&handle);
                }
            }
            TransactionStatus::Active => {
                self.manager.commit(id).await?;
                debug!("Route '{}' on {} committed {:?}", route_id, id, handle);
                if let Some(observer) = observer {
                    observer.transaction_committed(&handle);
                }
            }
            TransactionStatus::NoTransaction => {
                return Err(PropagationError::TransactionStateCorrupted(format!(
                    "route '{}' on {} owns {:?} but it already ended",
                    route_id, id, handle
                )));
            }
        }

        Ok(())
    }

    async fn resume(
        &self,
        ctx: &ExecutionContext<M::Handle>,
        handle: M::Handle,
        route_id: &str,
    ) -> Result<()> {
        let id = ctx.id();
        if let Some(foreign) = self.manager.current(id).await? {
            return Err(PropagationError::TransactionStateCorrupted(format!(
                "route '{}' on {} cannot resume {:?}: {:?} was left open",
                route_id, id, handle, foreign
            )));
        }

        self.manager.resume(id, handle.clone()).await?;
        debug!("Route '{}' on {} resumed {:?}", route_id, id, handle);
        Ok(())
    }
}
