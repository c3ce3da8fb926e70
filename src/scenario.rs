// ============================================================================
// Scenario Replay
// ============================================================================
//
// Replays a tree of nested units of work through the interceptor against
// the in-memory manager and records what the coordinator did.
//
// ============================================================================

use crate::config::{TransactionAttributes, TransactionalConfig};
use crate::core::{PropagationError, Result};
use crate::facade::InterceptError;
use crate::propagation::{ExecutionContext, Fault, TransactionObserver, kinds};
use crate::transaction::{TransactionId, TransactionManager, TransactionStatus};
use crate::Transactional;
use async_recursion::async_recursion;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// One unit of work and the units it calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub route: String,

    /// Overrides the configured attributes of `route`
    #[serde(default)]
    pub attributes: Option<TransactionAttributes>,

    /// Fail with this built-in failure kind after the nested steps ran
    #[serde(default)]
    pub fail: Option<String>,

    /// Swallow this step's failure instead of propagating it to the caller
    #[serde(default)]
    pub catch: bool,

    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Begin a caller-managed transaction before the first step
    #[serde(default)]
    pub preexisting: bool,

    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        fn check(step: &Step) -> Result<()> {
            if let Some(kind) = &step.fail {
                if kinds::lookup(kind).is_none() {
                    return Err(PropagationError::Config(format!(
                        "step '{}' fails with unknown kind '{}'",
                        step.route, kind
                    )));
                }
            }
            step.steps.iter().try_for_each(check)
        }
        self.steps.iter().try_for_each(check)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioEvent {
    Entered {
        route: String,
        depth: usize,
        current: Option<TransactionId>,
    },
    Failed {
        route: String,
        kind: String,
    },
    Caught {
        route: String,
        error: String,
    },
    Committed(TransactionId),
    RolledBack(TransactionId),
}

impl std::fmt::Display for ScenarioEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioEvent::Entered {
                route,
                depth,
                current,
            } => {
                let indent = "  ".repeat(*depth);
                match current {
                    Some(txn) => write!(f, "{}-> {} in {}", indent, route, txn),
                    None => write!(f, "{}-> {} without transaction", indent, route),
                }
            }
            ScenarioEvent::Failed { route, kind } => write!(f, "!! {} failed with {}", route, kind),
            ScenarioEvent::Caught { route, error } => write!(f, "~~ {} caught: {}", route, error),
            ScenarioEvent::Committed(txn) => write!(f, "committed {}", txn),
            ScenarioEvent::RolledBack(txn) => write!(f, "rolled back {}", txn),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub events: Vec<ScenarioEvent>,

    /// The caller-managed transaction and its status after replay
    pub outer: Option<(TransactionId, TransactionStatus)>,

    /// First failure that escaped a top-level step
    pub error: Option<String>,
}

impl ScenarioReport {
    pub fn committed(&self) -> Vec<TransactionId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ScenarioEvent::Committed(txn) => Some(*txn),
                _ => None,
            })
            .collect()
    }

    pub fn rolled_back(&self) -> Vec<TransactionId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ScenarioEvent::RolledBack(txn) => Some(*txn),
                _ => None,
            })
            .collect()
    }
}

pub struct ScenarioRunner {
    tx: Transactional<crate::transaction::InMemoryTransactionManager>,
    config: TransactionalConfig,
    events: Mutex<Vec<ScenarioEvent>>,
}

impl ScenarioRunner {
    pub fn new(config: TransactionalConfig) -> Self {
        Self {
            tx: Transactional::in_memory_with_config(config.manager.clone()),
            config,
            events: Mutex::new(Vec::new()),
        }
    }

    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        self.events.lock()?.clear();

        let ctx = self.tx.context();
        let manager = self.tx.manager();

        let outer = match scenario.preexisting {
            true => Some(manager.begin(ctx.id(), 0).await?),
            false => None,
        };

        let mut error = None;
        for step in &scenario.steps {
            if let Err(err) = self.replay(ctx.clone(), step, 0).await {
                error = Some(err.to_string());
                break;
            }
        }

        let outer = match outer {
            Some(txn) => Some((txn, manager.status(&txn).await?)),
            None => None,
        };

        let events = std::mem::take(&mut *self.events.lock()?);
        Ok(ScenarioReport {
            events,
            outer,
            error,
        })
    }

    fn record(&self, event: ScenarioEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }

    #[async_recursion]
    async fn replay(
        &self,
        ctx: ExecutionContext<TransactionId>,
        step: &Step,
        depth: usize,
    ) -> std::result::Result<(), InterceptError<Fault>> {
        let attributes = step
            .attributes
            .as_ref()
            .unwrap_or_else(|| self.config.attributes_for(&step.route));

        self.tx
            .interceptor()
            .run(&ctx, &step.route, attributes, Some(self), |inner| async move {
                let current = match self.tx.manager().current(inner.id()).await {
                    Ok(current) => current,
                    Err(err) => return Err(Fault::new(&kinds::TRANSACTION, err.to_string())),
                };
                self.record(ScenarioEvent::Entered {
                    route: step.route.clone(),
                    depth,
                    current,
                });

                for child in &step.steps {
                    match self.replay(inner.clone(), child, depth + 1).await {
                        Ok(()) => {}
                        Err(err) if child.catch => self.record(ScenarioEvent::Caught {
                            route: child.route.clone(),
                            error: err.to_string(),
                        }),
                        Err(InterceptError::Work(fault)) => return Err(fault),
                        Err(InterceptError::Propagation(err)) => {
                            return Err(Fault::new(&kinds::TRANSACTION, err.to_string()));
                        }
                    }
                }

                match &step.fail {
                    Some(name) => {
                        let kind = kinds::lookup(name).unwrap_or(&kinds::ERROR);
                        self.record(ScenarioEvent::Failed {
                            route: step.route.clone(),
                            kind: kind.name().to_string(),
                        });
                        Err(Fault::new(kind, format!("{} failed", step.route)))
                    }
                    None => Ok(()),
                }
            })
            .await
    }
}

impl TransactionObserver<TransactionId> for ScenarioRunner {
    fn transaction_committed(&self, handle: &TransactionId) {
        self.record(ScenarioEvent::Committed(*handle));
    }

    fn transaction_rolled_back(&self, handle: &TransactionId) {
        self.record(ScenarioEvent::RolledBack(*handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_kind() {
        let err = Scenario::from_json(r#"{ "steps": [ { "route": "a", "steps": [ { "route": "b", "fail": "Boom" } ] } ] }"#)
            .unwrap_err();
        assert!(err.to_string().contains("Boom"));
    }

    #[test]
    fn test_event_display() {
        let event = ScenarioEvent::Entered {
            route: "orders".into(),
            depth: 1,
            current: Some(TransactionId(3)),
        };
        assert_eq!(event.to_string(), "  -> orders in txn_3");
        assert_eq!(ScenarioEvent::RolledBack(TransactionId(3)).to_string(), "rolled back txn_3");
    }
}
