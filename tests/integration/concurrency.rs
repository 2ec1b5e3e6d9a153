//! Concurrency invariants on the shared fleet model.

use std::sync::Arc;

use chrono::Utc;
use fleetwatch::fleet::{Check, Client, Command, Fleet, Group};
use uuid::Uuid;

fn due_check() -> Arc<Check> {
    let group_id = Uuid::new_v4();
    let command = Arc::new(Command::new(Uuid::new_v4(), group_id, "uptime", 60, false));
    Arc::new(Check::new(command, group_id))
}

#[tokio::test]
async fn only_one_claim_wins_per_check() {
    let check = due_check();
    let now = Utc::now();

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let check = check.clone();
        tasks.push(tokio::spawn(async move { check.claim_due(now) }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert!(check.is_in_flight());
}

#[tokio::test]
async fn fleet_mutation_during_iteration_is_safe() {
    let fleet = Arc::new(Fleet::new());
    for i in 0..16 {
        fleet.add(Arc::new(Client::new(
            Uuid::new_v4(),
            format!("c{i}"),
            format!("10.0.0.{i}"),
        )));
    }

    let ids: Vec<Uuid> = fleet.snapshot().iter().map(|c| c.id()).collect();

    let remover = {
        let fleet = fleet.clone();
        let ids = ids.clone();
        tokio::spawn(async move {
            for id in ids {
                fleet.remove_by_id(id);
                tokio::task::yield_now().await;
            }
        })
    };

    let walker = {
        let fleet = fleet.clone();
        tokio::spawn(async move {
            for _ in 0..64 {
                // a snapshot stays coherent no matter what the remover does
                for client in fleet.snapshot() {
                    let _ = client.address();
                }
                tokio::task::yield_now().await;
            }
        })
    };

    remover.await.unwrap();
    walker.await.unwrap();
    assert!(fleet.is_empty());
}

#[tokio::test]
async fn group_removal_leaves_no_orphan_checks_under_concurrency() {
    let group_id = Uuid::new_v4();
    let command = Arc::new(Command::new(Uuid::new_v4(), group_id, "uptime", 60, false));
    let group = Arc::new(Group::new(group_id, "g", vec![command.clone()]));

    let client = Arc::new(Client::new(Uuid::new_v4(), "c1", "10.0.0.1"));
    client.add_group(group.clone());
    for _ in 0..8 {
        client.add_check(Arc::new(Check::new(command.clone(), group_id)));
    }

    let adder = {
        let client = client.clone();
        let command = command.clone();
        tokio::spawn(async move {
            for _ in 0..8 {
                client.add_check(Arc::new(Check::new(command.clone(), group_id)));
                tokio::task::yield_now().await;
            }
        })
    };
    adder.await.unwrap();

    assert!(client.remove_groups_by_name("g"));
    assert!(client
        .checks()
        .iter()
        .all(|check| check.group_id() != group_id));
}
