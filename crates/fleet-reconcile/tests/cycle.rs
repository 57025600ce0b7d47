//! End-to-end reconciliation cycles against in-memory collaborators.
//!
//! Each test builds a server and backend, runs `Reconciler::execute`, and
//! checks the exact sequence of state-changing calls.

use std::sync::Arc;

use fleet_core::{MatchConfig, StringSet};
use fleet_reconcile::memory::*;
use fleet_reconcile::{AgentOp, AgentOutcome, Decision, Reconciler, ReconcileError};

const ENV: &[&str] = &["Test-Env"];
const RES: &[&str] = &["Test-Resource"];

struct Harness {
    log: CallLog,
    server: Arc<InMemoryCiServer>,
    executor: Arc<RecordingExecutor>,
    reconciler: Reconciler,
}

fn harness_with_log(
    log: CallLog,
    server: InMemoryCiServer,
    executor: RecordingExecutor,
    max_agents: u32,
) -> Harness {
    let server = Arc::new(server);
    let executor = Arc::new(executor);
    let config = MatchConfig::new(StringSet::from(ENV), StringSet::from(RES), max_agents);
    let reconciler = Reconciler::new(config, server.clone(), executor.clone());
    Harness {
        log,
        server,
        executor,
        reconciler,
    }
}

fn pending_job(name: &str) -> fleet_core::Job {
    job(name, "Test-Env", &["Test-Resource"])
}

#[tokio::test]
async fn scale_up_when_demand_exceeds_supply() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_jobs(vec![pending_job("p/1/s/1/j")]);
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 3);

    let report = h.reconciler.execute().await;

    assert_eq!(report.demand, Some(1));
    assert_eq!(report.supply, Some(0));
    assert_eq!(report.into_result().unwrap(), Decision::ScaledUp { count: 1 });
    assert_eq!(h.log.mutations(), vec![Call::ScaleUp(1)]);
}

#[tokio::test]
async fn scale_up_is_capped_at_max_agents() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_jobs(
        (0..5).map(|i| pending_job(&format!("p/{i}/s/1/j"))).collect(),
    );
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 3);

    let decision = h.reconciler.execute().await.into_result().unwrap();

    assert_eq!(decision, Decision::ScaledUp { count: 3 });
    assert_eq!(h.executor.managed().len(), 3);

    // Next cycle: the three booting agents count as supply and the cap holds.
    h.log.clear();
    let decision = h.reconciler.execute().await.into_result().unwrap();
    assert_eq!(decision, Decision::AtCapacity);
    assert!(h.log.mutations().is_empty());
}

#[tokio::test]
async fn scale_down_removes_idle_agent() {
    let log = CallLog::new();
    let server =
        InMemoryCiServer::new(log.clone()).with_agents(vec![idle_agent("kill-agent-id", ENV, RES)]);
    let executor = RecordingExecutor::new(log.clone()).with_managed(&["kill-agent-id"]);
    let h = harness_with_log(log, server, executor, 1);

    let decision = h.reconciler.execute().await.into_result().unwrap();

    assert_eq!(
        decision,
        Decision::ScaledDown {
            removed: vec!["kill-agent-id".to_string()],
            reinstated: Vec::new(),
        }
    );
    assert_eq!(
        h.log.mutations(),
        vec![
            Call::DisableAgent("kill-agent-id".to_string()),
            Call::DeleteAgent("kill-agent-id".to_string()),
            Call::ScaleDown(vec!["kill-agent-id".to_string()]),
        ]
    );

    // The re-check sits between disable and delete.
    let calls = h.log.calls();
    let disable = calls
        .iter()
        .position(|c| *c == Call::DisableAgent("kill-agent-id".to_string()))
        .unwrap();
    assert_eq!(calls[disable + 1], Call::Agent("kill-agent-id".to_string()));
    assert_eq!(h.log.count(&Call::Agent("kill-agent-id".to_string())), 1);

    assert!(h.server.agent_ids().is_empty());
    assert!(h.executor.managed().is_empty());
}

#[tokio::test]
async fn agent_that_started_building_survives() {
    let log = CallLog::new();
    let server =
        InMemoryCiServer::new(log.clone()).with_agents(vec![idle_agent("kill-agent-id", ENV, RES)]);
    server.start_building_on_disable("kill-agent-id");
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 1);

    let decision = h.reconciler.execute().await.into_result().unwrap();

    assert_eq!(
        decision,
        Decision::ScaledDown {
            removed: Vec::new(),
            reinstated: vec!["kill-agent-id".to_string()],
        }
    );
    assert_eq!(
        h.log.mutations(),
        vec![
            Call::DisableAgent("kill-agent-id".to_string()),
            Call::EnableAgent("kill-agent-id".to_string()),
        ]
    );
    assert_eq!(h.log.count(&Call::DeleteAgent("kill-agent-id".to_string())), 0);
    assert!(h.log.calls().iter().all(|c| !matches!(c, Call::ScaleDown(_))));
    assert_eq!(h.server.agent_ids(), vec!["kill-agent-id"]);
}

#[tokio::test]
async fn only_half_the_surplus_is_removed() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_agents(vec![
        idle_agent("a", ENV, RES),
        idle_agent("b", ENV, RES),
        idle_agent("c", ENV, RES),
        idle_agent("d", ENV, RES),
    ]);
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 10);

    let decision = h.reconciler.execute().await.into_result().unwrap();

    // Surplus of 4 → remove 2, picked in server order.
    assert_eq!(
        decision,
        Decision::ScaledDown {
            removed: vec!["a".to_string(), "b".to_string()],
            reinstated: Vec::new(),
        }
    );
    assert_eq!(h.server.agent_ids(), vec!["c", "d"]);
}

#[tokio::test]
async fn busy_managed_agents_are_never_touched() {
    let log = CallLog::new();
    // Two booting agents count as supply but none is idle on the server.
    let server = InMemoryCiServer::new(log.clone());
    let executor = RecordingExecutor::new(log.clone()).with_managed(&["boot-1", "boot-2"]);
    let h = harness_with_log(log, server, executor, 5);

    let decision = h.reconciler.execute().await.into_result().unwrap();

    assert_eq!(decision, Decision::AllBusy);
    assert!(h.log.mutations().is_empty());
}

#[tokio::test]
async fn balanced_and_idle_cycles_change_nothing() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone());
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 5);
    assert_eq!(
        h.reconciler.execute().await.into_result().unwrap(),
        Decision::Idle
    );

    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone())
        .with_jobs(vec![pending_job("p/1/s/1/j")])
        .with_agents(vec![idle_agent("a", ENV, RES)]);
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 5);
    assert_eq!(
        h.reconciler.execute().await.into_result().unwrap(),
        Decision::Balanced
    );
    assert!(h.log.mutations().is_empty());
}

#[tokio::test]
async fn measurement_failure_aborts_without_mutations() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_jobs(vec![pending_job("p/1/s/1/j")]);
    let executor = RecordingExecutor::new(log.clone());
    executor.fail_on(Call::ManagedAgents);
    let h = harness_with_log(log, server, executor, 5);

    let report = h.reconciler.execute().await;

    assert_eq!(report.decision, Decision::Aborted);
    assert_eq!(report.demand, Some(1));
    assert_eq!(report.supply, None);
    assert!(h.log.mutations().is_empty());

    let err = report.into_result().unwrap_err();
    assert_eq!(err.len(), 1);
    assert!(matches!(err.errors()[0], ReconcileError::ManagedAgents(_)));
}

#[tokio::test]
async fn disable_failure_does_not_stop_other_agents() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_agents(vec![
        idle_agent("a", ENV, RES),
        idle_agent("b", ENV, RES),
    ]);
    server.fail_on(Call::DisableAgent("a".to_string()));
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 5);

    // Surplus of 2 → remove 1.
    let report = h.reconciler.execute().await;
    assert_eq!(
        report.decision,
        Decision::ScaledDown {
            removed: vec!["a".to_string()],
            reinstated: Vec::new(),
        }
    );
    // Disable failed but the re-check showed idle, so the agent was still removed.
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        &report.errors[0],
        ReconcileError::Agent { op: AgentOp::Disable, id, .. } if id == "a"
    ));
    assert_eq!(
        h.log.mutations(),
        vec![
            Call::DisableAgent("a".to_string()),
            Call::DeleteAgent("a".to_string()),
            Call::ScaleDown(vec!["a".to_string()]),
        ]
    );
}

#[tokio::test]
async fn failed_delete_is_kept_out_of_scale_down() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_agents(vec![
        idle_agent("a", ENV, RES),
        idle_agent("b", ENV, RES),
        idle_agent("c", ENV, RES),
        idle_agent("d", ENV, RES),
    ]);
    server.fail_on(Call::DeleteAgent("a".to_string()));
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 10);

    let report = h.reconciler.execute().await;

    assert_eq!(
        report.decision,
        Decision::ScaledDown {
            removed: vec!["b".to_string()],
            reinstated: Vec::new(),
        }
    );
    assert_eq!(h.log.count(&Call::ScaleDown(vec!["b".to_string()])), 1);
    let err = report.into_result().unwrap_err();
    assert_eq!(err.len(), 1);
    assert_eq!(err.errors()[0].agent_id(), Some("a"));
}

#[tokio::test]
async fn failed_recheck_reenables_agent() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_agents(vec![idle_agent("a", ENV, RES)]);
    server.fail_on(Call::Agent("a".to_string()));
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 1);

    let report = h.reconciler.execute().await;

    assert_eq!(
        h.log.mutations(),
        vec![
            Call::DisableAgent("a".to_string()),
            Call::EnableAgent("a".to_string()),
        ]
    );
    assert_eq!(
        report.decision,
        Decision::ScaledDown {
            removed: Vec::new(),
            reinstated: vec!["a".to_string()],
        }
    );
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn scale_up_failure_is_reported() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_jobs(vec![pending_job("p/1/s/1/j")]);
    let executor = RecordingExecutor::new(log.clone());
    executor.fail_on(Call::ScaleUp(1));
    let h = harness_with_log(log, server, executor, 3);

    let err = h.reconciler.execute().await.into_result().unwrap_err();

    assert_eq!(err.len(), 1);
    assert!(matches!(
        err.errors()[0],
        ReconcileError::ScaleUp { count: 1, .. }
    ));
}

#[tokio::test]
async fn decommission_batch_records_every_agent() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_agents(vec![
        idle_agent("a", ENV, RES),
        idle_agent("b", ENV, RES),
    ]);
    server.start_building_on_disable("b");
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 5);

    let batch = h
        .reconciler
        .decommission(&["a".to_string(), "b".to_string()])
        .await;

    assert_eq!(
        batch.outcomes,
        vec![
            ("a".to_string(), AgentOutcome::Removed),
            ("b".to_string(), AgentOutcome::Reinstated),
        ]
    );
    assert!(batch.errors.is_empty());
    assert_eq!(
        h.log.mutations(),
        vec![
            Call::DisableAgent("a".to_string()),
            Call::DeleteAgent("a".to_string()),
            Call::DisableAgent("b".to_string()),
            Call::EnableAgent("b".to_string()),
        ]
    );
    // The executor is only called by a full cycle.
    assert_eq!(h.log.count(&Call::ManagedAgents), 0);
    assert!(h.executor.managed().is_empty());
}

#[tokio::test]
async fn idle_listing_failure_during_scale_down_aborts() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_agents(vec![idle_agent("a", ENV, RES)]);
    // Demand and supply each list agents once; the third listing is the
    // scale-down re-fetch.
    server.fail_nth(Call::Agents, 3);
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 1);

    let report = h.reconciler.execute().await;

    assert_eq!(report.demand, Some(0));
    assert_eq!(report.supply, Some(1));
    assert_eq!(report.decision, Decision::Aborted);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(report.errors[0], ReconcileError::Agents(_)));
    assert_eq!(h.log.count(&Call::Agents), 3);
    assert!(h.log.mutations().is_empty());
    assert_eq!(h.server.agent_ids(), vec!["a".to_string()]);
}

#[tokio::test]
async fn failed_reenable_of_building_agent_is_reported() {
    let log = CallLog::new();
    let server = InMemoryCiServer::new(log.clone()).with_agents(vec![idle_agent("a", ENV, RES)]);
    server.start_building_on_disable("a");
    server.fail_on(Call::EnableAgent("a".to_string()));
    let executor = RecordingExecutor::new(log.clone());
    let h = harness_with_log(log, server, executor, 1);

    let report = h.reconciler.execute().await;

    assert_eq!(
        report.decision,
        Decision::ScaledDown {
            removed: Vec::new(),
            reinstated: vec!["a".to_string()],
        }
    );
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        &report.errors[0],
        ReconcileError::Agent { op: AgentOp::Enable, id, .. } if id == "a"
    ));
    assert_eq!(
        h.log.mutations(),
        vec![
            Call::DisableAgent("a".to_string()),
            Call::EnableAgent("a".to_string()),
        ]
    );
    assert_eq!(h.server.agent_ids(), vec!["a".to_string()]);
}
