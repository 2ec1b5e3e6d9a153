//! Bootstrap scenarios: hydrate, first tick, rebuild equivalence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetwatch::hydrate::hydrate;
use fleetwatch::repository::{MemoryRepository, Repository};
use fleetwatch::scheduler::Scheduler;
use tokio_util::sync::CancellationToken;

use super::helpers::{single_check_repo, ScriptedSession};

#[tokio::test]
async fn hydrate_then_first_tick_dispatches_one_probe() {
    let (repo, client_id, group_id, command_id) = single_check_repo("uptime", 60, false);
    let repo = Arc::new(repo);

    let fleet = Arc::new(hydrate(repo.as_ref()).await.unwrap());

    // fleet shape: one client, one check, immediately due
    let client = fleet.get(client_id).unwrap();
    assert_eq!(client.address(), "10.0.0.1");
    let checks = client.checks();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].command().id(), command_id);
    assert_eq!(checks[0].group_id(), group_id);
    assert_eq!(checks[0].next_due(), None);

    client.set_session(ScriptedSession::replying(&["up 3 days\n"]));

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(
        fleet.clone(),
        repo.clone() as Arc<dyn Repository>,
        Duration::from_millis(20),
    );
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();
    handle.await.unwrap();

    // exactly one probe ran: a placeholder for the fresh check plus its
    // real outcome, and the cadence re-armed so later ticks stayed quiet
    let outcomes = repo.published_outcomes();
    assert_eq!(outcomes.len(), 2);
    let outcome = &outcomes[1];
    assert_eq!(outcome.response, "up 3 days");
    assert!(outcome.finished);
    assert!(!outcome.error);

    let check = &fleet.get(client_id).unwrap().checks()[0];
    assert_eq!(check.outcome_id(), Some(outcome.id));
    assert_eq!(
        check.next_due(),
        Some(outcome.created_at + chrono::Duration::seconds(60))
    );
}

#[tokio::test]
async fn rehydration_is_structurally_stable() {
    let (repo, client_id, ..) = single_check_repo("uptime", 60, false);

    let first = hydrate(&repo).await.unwrap();
    // run one probe so outcomes exist, then hydrate again
    let client = first.get(client_id).unwrap();
    client.set_session(ScriptedSession::replying(&["ok\n"]));
    let check = client.checks()[0].clone();
    client.dispatch(&check, &repo).await;

    let second = hydrate(&repo).await.unwrap();

    assert_eq!(first.len(), second.len());
    let (a, b) = (first.get(client_id).unwrap(), second.get(client_id).unwrap());
    assert_eq!(a.address(), b.address());
    assert_eq!(a.groups().len(), b.groups().len());
    assert_eq!(a.checks().len(), b.checks().len());

    // the rebuilt check resumes from the persisted outcome
    let rebuilt = &b.checks()[0];
    assert_eq!(rebuilt.outcome_id(), check.outcome_id());
    assert!(!rebuilt.is_in_flight());
}

#[tokio::test]
async fn group_removal_cascades_checks() {
    let (repo, client_id, group_id, _command_id) = single_check_repo("uptime", 60, false);
    let fleet = hydrate(&repo).await.unwrap();
    let client = fleet.get(client_id).unwrap();
    assert_eq!(client.checks().len(), 1);

    assert!(client.remove_groups_by_name("g"));

    assert!(client.groups().is_empty());
    assert!(
        client.checks().iter().all(|c| c.group_id() != group_id),
        "no check of the removed group may survive"
    );
    assert!(client.checks().is_empty());
}

#[tokio::test]
async fn far_future_checks_wait_for_their_turn() {
    let (repo, client_id, ..) = single_check_repo("uptime", 60, false);
    let fleet = Arc::new(hydrate(&repo).await.unwrap());
    let client = fleet.get(client_id).unwrap();
    client.set_session(ScriptedSession::replying(&["never seen\n"]));

    let check = client.checks()[0].clone();
    check.set_next_due(Some(Utc::now() + chrono::Duration::days(365)));

    let repo = Arc::new(MemoryRepository::new());
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(
        fleet.clone(),
        repo.clone() as Arc<dyn Repository>,
        Duration::from_millis(20),
    );
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(repo.published_outcomes().is_empty());

    // forcing the timestamp to zero makes the next tick dispatch
    check.set_next_due(None);
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(!repo.published_outcomes().is_empty());
}
