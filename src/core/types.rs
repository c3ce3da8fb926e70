use std::sync::atomic::{AtomicU64, Ordering};

/// Global execution context counter
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one logical call stack (a task, a request, a thread) to the
/// transaction manager. Transaction bindings are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl ContextId {
    /// Allocate a fresh, process-unique context id
    pub fn new() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx_{}", self.0)
    }
}
