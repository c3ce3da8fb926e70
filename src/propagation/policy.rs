use crate::core::PropagationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a unit of work relates to the transaction already running in its
/// execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Propagation {
    /// Join the current transaction, or begin one if none is running
    Requires,
    /// Suspend any current transaction and always begin a fresh one
    RequiresNew,
    /// Join the current transaction; fail if none is running
    Mandatory,
    /// Fail if a transaction is running
    Never,
    /// Suspend any current transaction and run without one
    NotSupported,
    /// Join if present, otherwise run without a transaction
    Supported,
}

impl Propagation {
    pub const ALL: [Propagation; 6] = [
        Propagation::Requires,
        Propagation::RequiresNew,
        Propagation::Mandatory,
        Propagation::Never,
        Propagation::NotSupported,
        Propagation::Supported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Requires => "REQUIRES",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::Mandatory => "MANDATORY",
            Propagation::Never => "NEVER",
            Propagation::NotSupported => "NOT_SUPPORTED",
            Propagation::Supported => "SUPPORTED",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Propagation::Requires => "join the current transaction or begin a new one",
            Propagation::RequiresNew => "suspend the current transaction and begin a new one",
            Propagation::Mandatory => "join the current transaction, fail without one",
            Propagation::Never => "run without a transaction, fail if one is active",
            Propagation::NotSupported => "suspend the current transaction and run without one",
            Propagation::Supported => "join the current transaction if there is one",
        }
    }

    /// Whether entering with this policy may begin a transaction
    pub fn may_begin(&self) -> bool {
        matches!(self, Propagation::Requires | Propagation::RequiresNew)
    }

    /// Whether entering with this policy suspends a running transaction
    pub fn suspends(&self) -> bool {
        matches!(self, Propagation::RequiresNew | Propagation::NotSupported)
    }
}

impl Default for Propagation {
    fn default() -> Self {
        Propagation::Requires
    }
}

impl std::fmt::Display for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Propagation {
    type Err = PropagationError;

    /// Accepts `REQUIRES_NEW`, `requires-new`, `RequiresNew` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "requires" | "required" => Ok(Propagation::Requires),
            "requiresnew" => Ok(Propagation::RequiresNew),
            "mandatory" => Ok(Propagation::Mandatory),
            "never" => Ok(Propagation::Never),
            "notsupported" => Ok(Propagation::NotSupported),
            "supported" | "supports" => Ok(Propagation::Supported),
            _ => Err(PropagationError::Config(format!(
                "Unknown propagation policy '{}'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Propagation {
    type Error = PropagationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Propagation> for String {
    fn from(value: Propagation) -> Self {
        value.as_str().to_string()
    }
}
