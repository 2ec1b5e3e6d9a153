//! Inline ping probes end to end.

use fleetwatch::hydrate::hydrate;
use fleetwatch::repository::MemoryRepository;
use serde_json::Value;
use uuid::Uuid;

use super::helpers::{client_record, command_record, group_record, membership};

/// Seed one loopback client whose single command is the given ping text.
fn loopback_fleet(command_text: &str) -> (MemoryRepository, Uuid) {
    let client_id = Uuid::new_v4();
    let group_id = Uuid::new_v4();
    let command_id = Uuid::new_v4();

    let repo = MemoryRepository::new();
    repo.seed_client(client_record(client_id, "127.0.0.1", vec![group_id]));
    repo.seed_group(group_record(group_id, "g", vec![membership(command_id, 60, false)]));
    repo.seed_command(command_record(command_id, command_text));

    (repo, client_id)
}

#[tokio::test]
async fn ping_reply_reports_each_port_and_the_aggregate_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open_port = listener.local_addr().unwrap().port();
    let closed_port = {
        let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        probe.local_addr().unwrap().port()
    };

    let command = format!("ping -port=\"{open_port},{closed_port}\"");
    let (repo, client_id) = loopback_fleet(&command);
    let fleet = hydrate(&repo).await.unwrap();
    let client = fleet.get(client_id).unwrap();

    // ping is served inline: no session required
    let check = client.checks()[0].clone();
    let reply = client.dispatch(&check, &repo).await;

    let json: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(json["error"], "one or more servers failed");
    let ports = json["ports"].as_array().unwrap();
    assert_eq!(ports.len(), 2);
    assert_eq!(ports[0]["Port"], open_port);
    assert_eq!(ports[0]["Result"], true);
    assert_eq!(ports[1]["Port"], closed_port);
    assert_eq!(ports[1]["Result"], false);

    // a locally answered ping is not a transport error
    assert!(!check.last_errored());
    let outcome = repo.published_outcomes().last().cloned().unwrap();
    assert!(!outcome.error);
    assert_eq!(outcome.response, reply);
}

#[tokio::test]
async fn ping_succeeds_when_every_port_answers() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open_port = listener.local_addr().unwrap().port();

    let command = format!("ping -port={open_port}");
    let (repo, client_id) = loopback_fleet(&command);
    let fleet = hydrate(&repo).await.unwrap();
    let client = fleet.get(client_id).unwrap();

    let check = client.checks()[0].clone();
    let reply = client.dispatch(&check, &repo).await;

    let json: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(json["error"], "");
    assert_eq!(json["ports"][0]["Result"], true);
}

#[tokio::test]
async fn bare_ping_probes_the_default_port() {
    let (repo, client_id) = loopback_fleet("ping");
    let fleet = hydrate(&repo).await.unwrap();
    let client = fleet.get(client_id).unwrap();

    let check = client.checks()[0].clone();
    let reply = client.dispatch(&check, &repo).await;

    let json: Value = serde_json::from_str(&reply).unwrap();
    // nothing listens on 3333 here; the shape is what matters
    assert_eq!(json["ports"][0]["Port"], 3333);
}

#[tokio::test]
async fn malformed_port_expression_is_reported_in_the_reply() {
    let (repo, client_id) = loopback_fleet("ping -port=\"10-5\"");
    let fleet = hydrate(&repo).await.unwrap();
    let client = fleet.get(client_id).unwrap();

    let check = client.checks()[0].clone();
    let reply = client.dispatch(&check, &repo).await;

    let json: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(json["error"], "min value \"10\" is larger then the max value \"5\"");
    assert_eq!(json["ports"], Value::Array(vec![]));
}
