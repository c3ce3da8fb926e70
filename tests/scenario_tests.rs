/// Scenario replay tests
///
/// Run with: cargo test --test scenario_tests

use txprop::scenario::{Scenario, ScenarioEvent, ScenarioRunner};
use txprop::{TransactionStatus, TransactionalConfig};

fn config() -> TransactionalConfig {
    TransactionalConfig::from_json(
        r#"{
            "defaults": { "propagation": "REQUIRES" },
            "routes": {
                "audit": { "propagation": "REQUIRES_NEW" },
                "report": { "propagation": "NOT_SUPPORTED" },
                "lookup": { "propagation": "SUPPORTED", "no_rollback_for": ["IllegalArgument"] }
            }
        }"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_nested_requires_new_commits_in_reverse_order() {
    let scenario = Scenario::from_json(
        r#"{
            "preexisting": true,
            "steps": [
                { "route": "audit", "steps": [ { "route": "audit" } ] }
            ]
        }"#,
    )
    .unwrap();

    let report = ScenarioRunner::new(config()).run(&scenario).await.unwrap();

    let committed = report.committed();
    assert_eq!(committed.len(), 2);
    assert!(committed[0] > committed[1], "innermost commits first");

    let (outer, status) = report.outer.unwrap();
    assert_eq!(status, TransactionStatus::Active);
    assert!(!committed.contains(&outer));
    assert!(report.error.is_none());
}

#[tokio::test]
async fn test_failure_propagates_and_rolls_back() {
    let scenario = Scenario::from_json(
        r#"{
            "steps": [
                { "route": "orders", "steps": [ { "route": "payment", "fail": "IllegalState" } ] }
            ]
        }"#,
    )
    .unwrap();

    let report = ScenarioRunner::new(config()).run(&scenario).await.unwrap();

    assert!(report.committed().is_empty());
    assert_eq!(report.rolled_back().len(), 1);
    assert!(report.error.unwrap().contains("payment failed"));
}

#[tokio::test]
async fn test_caught_exempt_failure_lets_outer_commit() {
    let scenario = Scenario::from_json(
        r#"{
            "steps": [
                { "route": "orders", "steps": [ { "route": "lookup", "fail": "Validation", "catch": true } ] }
            ]
        }"#,
    )
    .unwrap();

    let report = ScenarioRunner::new(config()).run(&scenario).await.unwrap();

    assert_eq!(report.committed().len(), 1);
    assert!(report.rolled_back().is_empty());
    assert!(report
        .events
        .iter()
        .any(|event| matches!(event, ScenarioEvent::Caught { route, .. } if route == "lookup")));
}

#[tokio::test]
async fn test_not_supported_runs_without_transaction() {
    let scenario = Scenario::from_json(
        r#"{ "preexisting": true, "steps": [ { "route": "report" } ] }"#,
    )
    .unwrap();

    let report = ScenarioRunner::new(config()).run(&scenario).await.unwrap();

    assert!(matches!(
        report.events.first(),
        Some(ScenarioEvent::Entered { current: None, .. })
    ));
    assert_eq!(report.outer.unwrap().1, TransactionStatus::Active);
}
