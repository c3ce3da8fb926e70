use crate::core::{PropagationError, Result};
use crate::propagation::{FailureKind, Propagation, RollbackRules};
use crate::transaction::ManagerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Transaction attributes for one unit of work
///
/// # Examples
///
/// ```
/// use txprop::{Propagation, TransactionAttributes};
/// use txprop::kinds;
///
/// let attributes = TransactionAttributes::new(Propagation::RequiresNew)
///     .timeout(30)
///     .no_rollback_for(&kinds::VALIDATION);
///
/// assert_eq!(attributes.timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAttributes {
    #[serde(default)]
    pub propagation: Propagation,

    /// Zero selects the transaction manager default
    #[serde(default)]
    pub timeout_secs: u64,

    #[serde(flatten)]
    pub rules: RollbackRules,
}

impl TransactionAttributes {
    pub fn new(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Self::default()
        }
    }

    /// Set the timeout used when a transaction is begun
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn rollback_for(mut self, kind: &FailureKind) -> Self {
        self.rules = self.rules.rollback_for(kind);
        self
    }

    pub fn no_rollback_for(mut self, kind: &FailureKind) -> Self {
        self.rules = self.rules.no_rollback_for(kind);
        self
    }

    pub fn rules(mut self, rules: RollbackRules) -> Self {
        self.rules = rules;
        self
    }

    fn validate(&self, scope: &str) -> Result<()> {
        let names = self.rules.rollback_for.iter().chain(&self.rules.no_rollback_for);
        for name in names {
            if name.trim().is_empty() {
                return Err(PropagationError::Config(format!(
                    "{}: rollback rule with an empty failure kind",
                    scope
                )));
            }
        }
        Ok(())
    }
}

/// Transaction attributes for a set of routes
///
/// JSON layout:
///
/// ```json
/// {
///   "defaults": { "propagation": "REQUIRES", "timeout_secs": 10 },
///   "routes": {
///     "audit": { "propagation": "REQUIRES_NEW", "no_rollback_for": ["Validation"] }
///   },
///   "manager": { "default_timeout_secs": 60 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionalConfig {
    #[serde(default)]
    pub defaults: TransactionAttributes,

    #[serde(default)]
    pub routes: HashMap<String, TransactionAttributes>,

    #[serde(default)]
    pub manager: ManagerConfig,
}

impl TransactionalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attributes used by routes without an override
    pub fn defaults(mut self, attributes: TransactionAttributes) -> Self {
        self.defaults = attributes;
        self
    }

    /// Override the attributes of one route
    pub fn route(mut self, route_id: &str, attributes: TransactionAttributes) -> Self {
        self.routes.insert(route_id.to_string(), attributes);
        self
    }

    pub fn manager(mut self, manager: ManagerConfig) -> Self {
        self.manager = manager;
        self
    }

    pub fn attributes_for(&self, route_id: &str) -> &TransactionAttributes {
        self.routes.get(route_id).unwrap_or(&self.defaults)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.defaults.validate("defaults")?;
        for (route_id, attributes) in &self.routes {
            attributes.validate(&format!("route '{}'", route_id))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::kinds;
    use std::io::Write;

    #[test]
    fn test_builder() {
        let config = TransactionalConfig::new()
            .defaults(TransactionAttributes::new(Propagation::Supported))
            .route(
                "transfer",
                TransactionAttributes::new(Propagation::RequiresNew)
                    .timeout(5)
                    .rollback_for(&kinds::RUNTIME),
            )
            .manager(ManagerConfig::new().default_timeout(60));

        assert_eq!(config.attributes_for("other").propagation, Propagation::Supported);
        let transfer = config.attributes_for("transfer");
        assert_eq!(transfer.propagation, Propagation::RequiresNew);
        assert_eq!(transfer.timeout_secs, 5);
        assert_eq!(transfer.rules.rollback_for, vec!["RuntimeError"]);
        assert_eq!(config.manager.default_timeout_secs, 60);
    }

    #[test]
    fn test_from_json() {
        let config = TransactionalConfig::from_json(
            r#"{
                "defaults": { "propagation": "MANDATORY" },
                "routes": {
                    "audit": {
                        "propagation": "requires-new",
                        "timeout_secs": 3,
                        "no_rollback_for": ["Validation"]
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.defaults.propagation, Propagation::Mandatory);
        let audit = config.attributes_for("audit");
        assert_eq!(audit.propagation, Propagation::RequiresNew);
        assert_eq!(audit.timeout_secs, 3);
        assert_eq!(audit.rules.no_rollback_for, vec!["Validation"]);
        assert!(audit.rules.rollback_for.is_empty());
        assert_eq!(config.manager, ManagerConfig::default());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = TransactionalConfig::from_json("{}").unwrap();
        assert_eq!(config.defaults.propagation, Propagation::Requires);
        assert_eq!(config.defaults.timeout_secs, 0);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let err = TransactionalConfig::from_json(r#"{ "defaults": { "propagation": "SOMETIMES" } }"#)
            .unwrap_err();
        assert!(matches!(err, PropagationError::Config(_)));
    }

    #[test]
    fn test_rejects_empty_kind() {
        let err = TransactionalConfig::from_json(r#"{ "routes": { "a": { "rollback_for": [" "] } } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("route 'a'"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "defaults": {{ "propagation": "NEVER" }} }}"#).unwrap();

        let config = TransactionalConfig::from_file(file.path()).unwrap();
        assert_eq!(config.defaults.propagation, Propagation::Never);

        assert!(TransactionalConfig::from_file("/definitely/not/here.json").is_err());
    }
}
