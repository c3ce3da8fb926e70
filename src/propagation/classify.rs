// ============================================================================
// Failure Classification
// ============================================================================
//
// Failures carry a tag from an explicit kind hierarchy. Rollback rules name
// kinds; a failure matches a rule when its kind, or any ancestor of it, has
// the rule's name.
//
// ============================================================================

use crate::core::PropagationError;
use log::warn;
use serde::{Deserialize, Serialize};

/// A node in the failure kind hierarchy
#[derive(Debug, PartialEq, Eq)]
pub struct FailureKind {
    name: &'static str,
    parent: Option<&'static FailureKind>,
}

impl FailureKind {
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    pub const fn child(name: &'static str, parent: &'static FailureKind) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static FailureKind> {
        self.parent
    }

    /// This kind followed by each of its ancestors, nearest first
    pub fn lineage(&self) -> impl Iterator<Item = &FailureKind> {
        std::iter::successors(Some(self), |kind| kind.parent)
    }

    /// True when this kind is `name` or descends from it
    pub fn is_kind_of(&self, name: &str) -> bool {
        self.lineage().any(|kind| kind.name == name)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Built-in failure kinds.
///
/// ```text
/// Error
/// ├── RuntimeError
/// │   ├── IllegalState
/// │   ├── IllegalArgument
/// │   │   └── Validation
/// │   ├── NullValue
/// │   └── TransactionError
/// └── IoError
///     └── Timeout
/// ```
pub mod kinds {
    use super::FailureKind;

    pub static ERROR: FailureKind = FailureKind::root("Error");
    pub static RUNTIME: FailureKind = FailureKind::child("RuntimeError", &ERROR);
    pub static ILLEGAL_STATE: FailureKind = FailureKind::child("IllegalState", &RUNTIME);
    pub static ILLEGAL_ARGUMENT: FailureKind = FailureKind::child("IllegalArgument", &RUNTIME);
    pub static VALIDATION: FailureKind = FailureKind::child("Validation", &ILLEGAL_ARGUMENT);
    pub static NULL_VALUE: FailureKind = FailureKind::child("NullValue", &RUNTIME);
    pub static TRANSACTION: FailureKind = FailureKind::child("TransactionError", &RUNTIME);
    pub static IO: FailureKind = FailureKind::child("IoError", &ERROR);
    pub static TIMEOUT: FailureKind = FailureKind::child("Timeout", &IO);

    static BUILTIN: [&FailureKind; 9] = [
        &ERROR,
        &RUNTIME,
        &ILLEGAL_STATE,
        &ILLEGAL_ARGUMENT,
        &VALIDATION,
        &NULL_VALUE,
        &TRANSACTION,
        &IO,
        &TIMEOUT,
    ];

    /// Find a built-in kind by name
    pub fn lookup(name: &str) -> Option<&'static FailureKind> {
        BUILTIN.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn all() -> impl Iterator<Item = &'static FailureKind> {
        BUILTIN.iter().copied()
    }
}

/// Anything a unit of work can fail with
pub trait Failure: Send + Sync {
    fn kind(&self) -> &'static FailureKind;
}

impl Failure for PropagationError {
    fn kind(&self) -> &'static FailureKind {
        &kinds::TRANSACTION
    }
}

/// A failure with a kind and a message
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    kind: &'static FailureKind,
    message: String,
}

impl Fault {
    pub fn new(kind: &'static FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Failure for Fault {
    fn kind(&self) -> &'static FailureKind {
        self.kind
    }
}

/// Which failures force the current transaction to roll back.
///
/// With `rollback_for` set, only failures of those kinds roll back and
/// `no_rollback_for` is ignored. Otherwise every failure rolls back except
/// those of a `no_rollback_for` kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRules {
    #[serde(default)]
    pub rollback_for: Vec<String>,

    #[serde(default)]
    pub no_rollback_for: Vec<String>,
}

impl RollbackRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rollback_for(mut self, kind: &FailureKind) -> Self {
        self.rollback_for.push(kind.name().to_string());
        self
    }

    pub fn no_rollback_for(mut self, kind: &FailureKind) -> Self {
        self.no_rollback_for.push(kind.name().to_string());
        self
    }

    pub fn requires_rollback(&self, kind: &FailureKind) -> bool {
        let exempt = self
            .no_rollback_for
            .iter()
            .any(|name| kind.is_kind_of(name));

        if !self.rollback_for.is_empty() {
            let listed = self.rollback_for.iter().any(|name| kind.is_kind_of(name));
            if listed && exempt {
                warn!(
                    "Failure kind '{}' matches both rollback_for and no_rollback_for; rolling back",
                    kind
                );
            }
            return listed;
        }

        !exempt
    }
}
