// ============================================================================
// Propagation Module
// ============================================================================
//
// Declarative transaction propagation: policies, the per-context invocation
// stack, failure classification and the coordinator tying them together.
//
// ============================================================================

pub mod classify;
pub mod context;
pub mod coordinator;
pub mod observer;
pub mod policy;

pub use classify::{kinds, Failure, FailureKind, Fault, RollbackRules};
pub use context::{ExecutionContext, InvocationRecord};
pub use coordinator::PropagationCoordinator;
pub use observer::{Outcome, OutcomeRecorder, TransactionObserver};
pub use policy::Propagation;
