//! NATS-backed repository client.
//!
//! Reads go through subject-addressed request/reply with a configurable
//! reply timeout; writes are plain publishes. Payloads are the JSON
//! envelopes of [`crate::records`].

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::records::{
    AlertRecord, ClientRecord, CommandRecord, FindOptions, GroupRecord, OutcomeRecord,
    UpdateOptions,
};

use super::{Repository, RepositoryResult};

const CLIENTS_FIND: &str = "clients.retrieve.find";
const GROUPS_FIND: &str = "groups.retrieve.find";
const COMMANDS_FIND: &str = "commands.retrieve.find";
const CHECKS_FIND: &str = "checks.retrieve.find";
const CHECKS_CREATE: &str = "checks.create.send";
const CHECKS_UPDATE: &str = "checks.update.send";
const ALERTS_CREATE: &str = "alerts.create.send";

pub struct NatsRepository {
    client: async_nats::Client,
    reply_timeout: Duration,
}

impl NatsRepository {
    pub fn new(client: async_nats::Client, reply_timeout: Duration) -> Self {
        Self {
            client,
            reply_timeout,
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        subject: &str,
        options: &FindOptions,
    ) -> RepositoryResult<T> {
        let payload = serde_json::to_vec(options).context("error marshaling find options")?;

        debug!("requesting {subject}");
        let message = tokio::time::timeout(
            self.reply_timeout,
            self.client.request(subject.to_string(), payload.into()),
        )
        .await
        .with_context(|| format!("request to {subject} timed out"))?
        .with_context(|| format!("error requesting {subject}"))?;

        serde_json::from_slice(&message.payload)
            .with_context(|| format!("error decoding reply from {subject}"))
    }

    async fn publish<T: Serialize>(&self, subject: &str, payload: &T) -> RepositoryResult<()> {
        let payload = serde_json::to_vec(payload).context("error marshaling payload")?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .with_context(|| format!("error publishing to {subject}"))
    }
}

#[async_trait]
impl Repository for NatsRepository {
    async fn find_clients(&self) -> RepositoryResult<Vec<ClientRecord>> {
        self.request(CLIENTS_FIND, &FindOptions::sorted("created_at"))
            .await
    }

    async fn find_groups(&self) -> RepositoryResult<Vec<GroupRecord>> {
        self.request(GROUPS_FIND, &FindOptions::sorted("created_at"))
            .await
    }

    async fn find_commands(&self) -> RepositoryResult<Vec<CommandRecord>> {
        self.request(COMMANDS_FIND, &FindOptions::sorted("created_at"))
            .await
    }

    async fn find_latest_outcome(
        &self,
        client_id: Uuid,
        command_id: Uuid,
    ) -> RepositoryResult<Option<OutcomeRecord>> {
        let options = FindOptions::sorted("-created_at")
            .with_filter("client_id", client_id.to_string())
            .with_filter("command_id", command_id.to_string());
        let mut outcomes: Vec<OutcomeRecord> = self.request(CHECKS_FIND, &options).await?;
        Ok(if outcomes.is_empty() {
            None
        } else {
            Some(outcomes.remove(0))
        })
    }

    async fn find_outcome(&self, id: Uuid) -> RepositoryResult<Option<OutcomeRecord>> {
        let options = FindOptions::default().with_filter("id", id.to_string());
        let mut outcomes: Vec<OutcomeRecord> = self.request(CHECKS_FIND, &options).await?;
        Ok(if outcomes.is_empty() {
            None
        } else {
            Some(outcomes.remove(0))
        })
    }

    async fn find_latest_alert(
        &self,
        rule_id: Uuid,
        client_id: Uuid,
    ) -> RepositoryResult<Option<AlertRecord>> {
        // Alert history is served over the checks retrieve subject; there is
        // no dedicated alerts.retrieve endpoint in the store.
        let options = FindOptions::sorted("-created_at")
            .with_filter("alert_id", rule_id.to_string())
            .with_filter("client_id", client_id.to_string());
        let mut alerts: Vec<AlertRecord> = self.request(CHECKS_FIND, &options).await?;
        Ok(if alerts.is_empty() {
            None
        } else {
            Some(alerts.remove(0))
        })
    }

    async fn mark_outcome_checked(&self, id: Uuid) -> RepositoryResult<bool> {
        if self.find_outcome(id).await?.is_none() {
            return Ok(false);
        }

        let update = UpdateOptions::set_by_id(id, json!({ "checked": true }));
        self.publish(CHECKS_UPDATE, &update).await?;
        Ok(true)
    }

    async fn create_outcome(&self, outcome: &OutcomeRecord) -> RepositoryResult<()> {
        self.publish(CHECKS_CREATE, outcome).await
    }

    async fn create_alert(&self, alert: &AlertRecord) -> RepositoryResult<()> {
        self.publish(ALERTS_CREATE, alert).await
    }
}
