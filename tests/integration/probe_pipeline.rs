//! Dispatch outcomes: success, transport failure, fail-on-error parking.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetwatch::hydrate::hydrate;
use fleetwatch::repository::Repository;
use fleetwatch::scheduler::Scheduler;
use tokio_util::sync::CancellationToken;

use super::helpers::{single_check_repo, ScriptedSession};

#[tokio::test]
async fn successful_probe_records_reply_and_advances_cadence() {
    let (repo, client_id, ..) = single_check_repo("top", 60, false);
    let fleet = hydrate(&repo).await.unwrap();
    let client = fleet.get(client_id).unwrap();
    client.set_session(ScriptedSession::replying(&["{\"error\":\"\",\"load\":0.1}\n"]));

    let check = client.checks()[0].clone();
    let before = Utc::now();
    let reply = client.dispatch(&check, &repo).await;

    assert_eq!(reply, "{\"error\":\"\",\"load\":0.1}");
    let outcome = repo.published_outcomes().last().cloned().unwrap();
    assert_eq!(outcome.response, "{\"error\":\"\",\"load\":0.1}");
    assert!(!outcome.error);
    assert!(outcome.finished);

    assert!(!check.last_errored());
    let next_due = check.next_due().unwrap();
    assert!(next_due >= before + chrono::Duration::seconds(60));
    assert_eq!(next_due, outcome.created_at + chrono::Duration::seconds(60));
}

#[tokio::test]
async fn transport_error_is_recorded_as_the_response() {
    let (repo, client_id, ..) = single_check_repo("top", 60, false);
    let fleet = hydrate(&repo).await.unwrap();
    let client = fleet.get(client_id).unwrap();
    client.set_session(ScriptedSession::eof());

    let check = client.checks()[0].clone();
    let reply = client.dispatch(&check, &repo).await;

    assert_eq!(reply, "session closed by peer");
    let outcome = repo.published_outcomes().last().cloned().unwrap();
    assert!(outcome.error);
    assert_eq!(outcome.response, "session closed by peer");
    assert!(check.last_errored());

    // the dead session was dropped
    assert!(!client.has_session());
}

#[tokio::test]
async fn errored_stop_on_error_check_is_skipped_until_rearmed() {
    let (repo, client_id, ..) = single_check_repo("top", 1, true);
    let repo = Arc::new(repo);
    let fleet = Arc::new(hydrate(repo.as_ref()).await.unwrap());
    let client = fleet.get(client_id).unwrap();
    client.set_session(ScriptedSession::eof());

    let check = client.checks()[0].clone();
    client.dispatch(&check, repo.as_ref()).await;
    assert!(check.last_errored());
    let outcomes_after_failure = repo.published_outcomes().len();

    // the agent is back, but the parked check must not be probed
    client.set_session(ScriptedSession::replying(&["ok\n", "ok\n", "ok\n"]));
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(
        fleet.clone(),
        repo.clone() as Arc<dyn Repository>,
        Duration::from_millis(20),
    );
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(repo.published_outcomes().len(), outcomes_after_failure);

    // rearming the group releases it on the next tick
    client.rearm_group_after_success("g");
    tokio::time::sleep(Duration::from_millis(1200)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(repo.published_outcomes().len() > outcomes_after_failure);
    assert!(!check.last_errored());
}

#[tokio::test]
async fn probes_survive_an_unavailable_repository() {
    let (repo, client_id, ..) = single_check_repo("top", 60, false);
    let fleet = hydrate(&repo).await.unwrap();
    let client = fleet.get(client_id).unwrap();
    client.set_session(ScriptedSession::replying(&["still here\n"]));

    repo.set_unavailable(true);
    let check = client.checks()[0].clone();
    let reply = client.dispatch(&check, &repo).await;

    // the probe itself still ran and the check keeps scheduling
    assert_eq!(reply, "still here");
    assert!(!check.is_in_flight());
    assert!(check.next_due().is_some());
}
