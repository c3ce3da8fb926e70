// ============================================================================
// Execution Context
// ============================================================================
//
// One value per logical call stack. It identifies the stack to the
// transaction manager and holds the invocation records opened by
// `on_entry` and closed by `on_exit`, strictly LIFO.
//
// Clones share the same stack, so a context can be handed to nested units of
// work. The stack lock is never held across an await point.
//
// ============================================================================

use super::Propagation;
use crate::core::{ContextId, PropagationError, Result};
use log::debug;
use std::sync::{Arc, Mutex};

/// What `on_entry` did, kept until the matching `on_exit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord<H> {
    route_id: String,
    policy: Propagation,
    /// The transaction this invocation began, if any
    owned: Option<H>,
    /// A transaction this invocation suspended and must resume
    suspended: Option<H>,
}

impl<H> InvocationRecord<H> {
    pub fn new(
        route_id: impl Into<String>,
        policy: Propagation,
        owned: Option<H>,
        suspended: Option<H>,
    ) -> Self {
        Self {
            route_id: route_id.into(),
            policy,
            owned,
            suspended,
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn policy(&self) -> Propagation {
        self.policy
    }

    pub fn owns_transaction(&self) -> bool {
        self.owned.is_some()
    }

    pub fn owned(&self) -> Option<&H> {
        self.owned.as_ref()
    }

    pub fn suspended(&self) -> Option<&H> {
        self.suspended.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Option<H>, Option<H>) {
        (self.owned, self.suspended)
    }
}

pub struct ExecutionContext<H> {
    id: ContextId,
    stack: Arc<Mutex<Vec<InvocationRecord<H>>>>,
}

impl<H> Clone for ExecutionContext<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            stack: Arc::clone(&self.stack),
        }
    }
}

impl<H> Default for ExecutionContext<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> std::fmt::Debug for ExecutionContext<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let depth = self.stack.lock().map(|stack| stack.len()).unwrap_or(0);
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("depth", &depth)
            .finish()
    }
}

impl<H> ExecutionContext<H> {
    pub fn new() -> Self {
        Self::with_id(ContextId::new())
    }

    pub fn with_id(id: ContextId) -> Self {
        Self {
            id,
            stack: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Number of open invocations
    pub fn depth(&self) -> Result<usize> {
        Ok(self.stack.lock()?.len())
    }

    pub fn is_idle(&self) -> Result<bool> {
        Ok(self.depth()? == 0)
    }

    /// Route ids of the open invocations, outermost first
    pub fn open_routes(&self) -> Result<Vec<String>> {
        let stack = self.stack.lock()?;
        Ok(stack.iter().map(|r| r.route_id.clone()).collect())
    }

    /// Leave the stack lock poisoned, as a panicking holder would
    #[cfg(test)]
    pub(crate) fn poison(&self)
    where
        H: Send + 'static,
    {
        let stack = Arc::clone(&self.stack);
        let _ = std::thread::spawn(move || {
            let _guard = stack.lock();
            panic!("invocation stack holder panicked");
        })
        .join();
    }

    pub(crate) fn push(&self, record: InvocationRecord<H>) -> Result<()> {
        self.stack.lock()?.push(record);
        Ok(())
    }

    /// Close the most recent invocation, which must have been opened with
    /// `policy`. The stack is left untouched on mismatch.
    pub(crate) fn pop_matching(
        &self,
        policy: Propagation,
        route_id: &str,
    ) -> Result<InvocationRecord<H>> {
        let mut stack = self.stack.lock()?;

        let top_policy = match stack.last() {
            Some(record) => {
                if record.route_id != route_id {
                    debug!(
                        "Closing route '{}' on {} with exit for route '{}'",
                        record.route_id, self.id, route_id
                    );
                }
                record.policy
            }
            None => {
                return Err(PropagationError::TransactionStateCorrupted(format!(
                    "exit of route '{}' ({}) on {} without a matching entry",
                    route_id, policy, self.id
                )));
            }
        };

        if top_policy != policy {
            return Err(PropagationError::TransactionStateCorrupted(format!(
                "exit of route '{}' on {} with {} but the open invocation was entered with {}",
                route_id, self.id, policy, top_policy
            )));
        }

        stack.pop().ok_or_else(|| {
            PropagationError::TransactionStateCorrupted(format!(
                "invocation stack of {} emptied concurrently",
                self.id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_lifo() {
        let ctx: ExecutionContext<u64> = ExecutionContext::new();
        ctx.push(InvocationRecord::new("outer", Propagation::Requires, Some(1), None))
            .unwrap();
        ctx.push(InvocationRecord::new("inner", Propagation::Supported, None, None))
            .unwrap();
        assert_eq!(ctx.depth().unwrap(), 2);
        assert_eq!(ctx.open_routes().unwrap(), vec!["outer", "inner"]);

        let inner = ctx.pop_matching(Propagation::Supported, "inner").unwrap();
        assert!(!inner.owns_transaction());
        let outer = ctx.pop_matching(Propagation::Requires, "outer").unwrap();
        assert_eq!(outer.owned(), Some(&1));
        assert!(ctx.is_idle().unwrap());
    }

    #[test]
    fn test_pop_empty_is_corruption() {
        let ctx: ExecutionContext<u64> = ExecutionContext::new();
        let err = ctx.pop_matching(Propagation::Requires, "route").unwrap_err();
        assert!(matches!(err, PropagationError::TransactionStateCorrupted(_)));
    }

    #[test]
    fn test_policy_mismatch_leaves_stack() {
        let ctx: ExecutionContext<u64> = ExecutionContext::new();
        ctx.push(InvocationRecord::new("route", Propagation::NotSupported, None, Some(4)))
            .unwrap();

        let err = ctx.pop_matching(Propagation::Requires, "route").unwrap_err();
        assert!(matches!(err, PropagationError::TransactionStateCorrupted(_)));
        assert_eq!(ctx.depth().unwrap(), 1);
    }

    #[test]
    fn test_clones_share_stack() {
        let ctx: ExecutionContext<u64> = ExecutionContext::new();
        let nested = ctx.clone();
        nested
            .push(InvocationRecord::new("route", Propagation::Never, None, None))
            .unwrap();
        assert_eq!(ctx.depth().unwrap(), 1);
        assert_eq!(ctx.id(), nested.id());
    }
}
