//! Fleet bootstrap from the persistent store.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use crate::fleet::{Check, Client, Command, Fleet, Group};
use crate::records::{CommandRecord, GroupRecord};
use crate::repository::Repository;

/// Build the fleet from persisted clients, groups, and commands, seeding
/// every check from its most recent outcome. Failure here is fatal: an
/// orchestrator without a model has nothing to schedule.
pub async fn hydrate(repo: &dyn Repository) -> anyhow::Result<Fleet> {
    let clients = repo
        .find_clients()
        .await
        .context("error finding all clients")?;
    let groups = repo.find_groups().await.context("error finding all groups")?;
    let commands = repo
        .find_commands()
        .await
        .context("error finding all commands")?;

    let groups = build_groups(&groups, &commands);
    let fleet = Fleet::new();

    for record in clients {
        let client = Arc::new(Client::from_record(&record));

        for group_id in &record.group_ids {
            let Some(group) = groups.iter().find(|g| g.id() == *group_id) else {
                debug!(client = %record.id, group = %group_id, "membership points at unknown group");
                continue;
            };

            client.add_group(group.clone());
            for command in group.commands() {
                let outcome = repo
                    .find_latest_outcome(client.id(), command.id())
                    .await
                    .context("error finding latest outcome for check")?;

                let check = match outcome {
                    Some(outcome) => Check::from_outcome(command.clone(), group.id(), &outcome),
                    None => Check::new(command.clone(), group.id()),
                };
                client.add_check(Arc::new(check));
            }
        }

        fleet.add(client);
    }

    info!("hydrated {} clients", fleet.len());
    Ok(fleet)
}

/// Materialize groups, cloning each referenced command with the group's own
/// cadence and fail-on-error policy.
fn build_groups(groups: &[GroupRecord], commands: &[CommandRecord]) -> Vec<Arc<Group>> {
    groups
        .iter()
        .map(|group| {
            let cloned = group
                .commands
                .iter()
                .filter_map(|entry| {
                    let command = commands.iter().find(|c| c.id == entry.command_id)?;
                    Some(Arc::new(Command::new(
                        command.id,
                        group.id,
                        command.command.clone(),
                        entry.interval,
                        entry.fail_on_error,
                    )))
                })
                .collect();
            Arc::new(Group::new(group.id, group.name.clone(), cloned))
        })
        .collect()
}
