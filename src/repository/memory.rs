//! In-memory repository (no broker, no persistence).
//!
//! Backs the test suite: seeded with records up front, it serves the same
//! find operations as the NATS client and records every published outcome
//! and alert for later inspection.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::records::{
    AlertRecord, ClientRecord, CommandRecord, GroupRecord, OutcomeRecord,
};

use super::{Repository, RepositoryResult};

#[derive(Default)]
pub struct MemoryRepository {
    clients: Mutex<Vec<ClientRecord>>,
    groups: Mutex<Vec<GroupRecord>>,
    commands: Mutex<Vec<CommandRecord>>,
    outcomes: Mutex<Vec<OutcomeRecord>>,
    alerts: Mutex<Vec<AlertRecord>>,
    /// When set, every operation fails (repository-unavailable scenarios).
    unavailable: Mutex<bool>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_client(&self, client: ClientRecord) -> &Self {
        self.clients.lock().unwrap().push(client);
        self
    }

    pub fn seed_group(&self, group: GroupRecord) -> &Self {
        self.groups.lock().unwrap().push(group);
        self
    }

    pub fn seed_command(&self, command: CommandRecord) -> &Self {
        self.commands.lock().unwrap().push(command);
        self
    }

    pub fn seed_outcome(&self, outcome: OutcomeRecord) -> &Self {
        self.outcomes.lock().unwrap().push(outcome);
        self
    }

    pub fn seed_alert(&self, alert: AlertRecord) -> &Self {
        self.alerts.lock().unwrap().push(alert);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    /// Outcomes published through `create_outcome`, oldest first.
    pub fn published_outcomes(&self) -> Vec<OutcomeRecord> {
        self.outcomes.lock().unwrap().clone()
    }

    /// Alerts published through `create_alert`, oldest first.
    pub fn published_alerts(&self) -> Vec<AlertRecord> {
        self.alerts.lock().unwrap().clone()
    }

    fn check_available(&self) -> RepositoryResult<()> {
        if *self.unavailable.lock().unwrap() {
            anyhow::bail!("repository unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_clients(&self) -> RepositoryResult<Vec<ClientRecord>> {
        self.check_available()?;
        let mut clients = self.clients.lock().unwrap().clone();
        clients.sort_by_key(|c| c.created_at);
        Ok(clients)
    }

    async fn find_groups(&self) -> RepositoryResult<Vec<GroupRecord>> {
        self.check_available()?;
        let mut groups = self.groups.lock().unwrap().clone();
        groups.sort_by_key(|g| g.created_at);
        Ok(groups)
    }

    async fn find_commands(&self) -> RepositoryResult<Vec<CommandRecord>> {
        self.check_available()?;
        let mut commands = self.commands.lock().unwrap().clone();
        commands.sort_by_key(|c| c.created_at);
        Ok(commands)
    }

    async fn find_latest_outcome(
        &self,
        client_id: Uuid,
        command_id: Uuid,
    ) -> RepositoryResult<Option<OutcomeRecord>> {
        self.check_available()?;
        let outcomes = self.outcomes.lock().unwrap();
        Ok(outcomes
            .iter()
            .filter(|o| o.client_id == client_id && o.command_id == command_id)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn find_outcome(&self, id: Uuid) -> RepositoryResult<Option<OutcomeRecord>> {
        self.check_available()?;
        let outcomes = self.outcomes.lock().unwrap();
        Ok(outcomes.iter().find(|o| o.id == id).cloned())
    }

    async fn find_latest_alert(
        &self,
        rule_id: Uuid,
        client_id: Uuid,
    ) -> RepositoryResult<Option<AlertRecord>> {
        self.check_available()?;
        let alerts = self.alerts.lock().unwrap();
        Ok(alerts
            .iter()
            .filter(|a| a.rule_id == rule_id && a.client_id == client_id)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn mark_outcome_checked(&self, id: Uuid) -> RepositoryResult<bool> {
        self.check_available()?;
        let mut outcomes = self.outcomes.lock().unwrap();
        match outcomes.iter_mut().find(|o| o.id == id) {
            Some(outcome) => {
                outcome.checked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_outcome(&self, outcome: &OutcomeRecord) -> RepositoryResult<()> {
        self.check_available()?;
        self.outcomes.lock().unwrap().push(outcome.clone());
        Ok(())
    }

    async fn create_alert(&self, alert: &AlertRecord) -> RepositoryResult<()> {
        self.check_available()?;
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
