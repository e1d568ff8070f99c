//! Scenario lifecycle tests for the shared store

use pipelines_e2e::k8s::CRONJOB_KEY;
use pipelines_e2e::store::{Scope, Store, Value, CLI, NAMESPACE};
use pipelines_e2e::Oc;
use std::sync::Arc;

/// Values written by one scenario are invisible to the next
#[test]
fn test_scenarios_do_not_leak() {
    let store = Store::new();
    store.put_suite_data(CLI, Value::Cli(Oc::new("kubectl")));

    store.begin_scenario();
    store.put(Scope::Scenario, NAMESPACE, Value::Text("releasetest-aaaaa".to_string()));
    store.put_scenario_data(CRONJOB_KEY, "hello");
    assert_eq!(store.namespace(), "releasetest-aaaaa");
    assert_eq!(store.scenario_data(CRONJOB_KEY), "hello");

    store.begin_scenario();
    assert_eq!(store.namespace(), "");
    assert_eq!(store.scenario_data(CRONJOB_KEY), "");

    // Suite values survive scenario boundaries
    assert_eq!(store.cli().binary, "kubectl");
}

/// Steps running on different tasks see each other's writes within a scenario
#[tokio::test]
async fn test_steps_share_scenario_state_across_tasks() {
    let store = Arc::new(Store::new());
    store.begin_scenario();

    let writer = Arc::clone(&store);
    tokio::spawn(async move {
        writer.put_scenario_data_slice(
            "installersets",
            vec!["pipeline-main-static-x".to_string(), "rhosp-rbac-y".to_string()],
        );
    })
    .await
    .unwrap();

    assert_eq!(
        store.scenario_data_slice("installersets"),
        vec!["pipeline-main-static-x", "rhosp-rbac-y"]
    );
}

/// Teardown clears both scopes
#[test]
#[should_panic(expected = "suite setup did not run")]
fn test_teardown_drops_suite_values() {
    let store = Store::new();
    store.put_suite_data(CLI, Value::Cli(Oc::default()));

    store.teardown();

    let _ = store.cli();
}
