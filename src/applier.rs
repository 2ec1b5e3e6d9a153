//! Change-feed consumption.
//!
//! The applier keeps the in-memory fleet in sync with external CRUD on the
//! persisted entities. Decoding is permissive throughout: a malformed
//! payload is logged and dropped, never fatal. The event application is
//! separated from the subscribe loops so it can be exercised without a
//! broker.

use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::alerts::{AlertRule, SinkFactory};
use crate::fleet::{Client, Fleet};
use crate::records::{AlertRuleRecord, ClientRecord, OutcomeRecord};
use crate::repository::Repository;

const ALERT_RULES_CREATED: &str = "alert_options.create.after";
const ALERT_RULES_UPDATED: &str = "alert_options.update.after";
const ALERT_RULES_DELETED: &str = "alert_options.delete.after";
const OUTCOMES_DELETED: &str = "checks.delete.after";
const CLIENTS_UPDATED: &str = "clients.update.after";
const CLIENTS_DELETED: &str = "clients.delete.after";

pub struct ChangeApplier {
    fleet: Arc<Fleet>,
    repo: Arc<dyn Repository>,
    sink_factory: Arc<SinkFactory>,
}

impl ChangeApplier {
    pub fn new(
        fleet: Arc<Fleet>,
        repo: Arc<dyn Repository>,
        sink_factory: Arc<SinkFactory>,
    ) -> Self {
        Self {
            fleet,
            repo,
            sink_factory,
        }
    }

    /// Subscribe to the change subjects and apply events until shutdown.
    pub async fn run(
        self,
        nats: async_nats::Client,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut rule_created = subscribe(&nats, ALERT_RULES_CREATED).await?;
        let mut rule_updated = subscribe(&nats, ALERT_RULES_UPDATED).await?;
        let mut rules_deleted = subscribe(&nats, ALERT_RULES_DELETED).await?;
        let mut outcomes_deleted = subscribe(&nats, OUTCOMES_DELETED).await?;
        let mut client_updated = subscribe(&nats, CLIENTS_UPDATED).await?;
        let mut clients_deleted = subscribe(&nats, CLIENTS_DELETED).await?;

        debug!("listening for database changes");

        loop {
            tokio::select! {
                Some(msg) = rule_created.next() => self.apply_alert_rule_created(&msg.payload).await,
                Some(msg) = rule_updated.next() => self.apply_alert_rule_updated(&msg.payload),
                Some(msg) = rules_deleted.next() => self.apply_alert_rules_deleted(&msg.payload),
                Some(msg) = outcomes_deleted.next() => self.apply_outcomes_deleted(&msg.payload),
                Some(msg) = client_updated.next() => self.apply_client_updated(&msg.payload),
                Some(msg) = clients_deleted.next() => self.apply_clients_deleted(&msg.payload),
                _ = shutdown.cancelled() => {
                    debug!("change applier stopping");
                    break;
                }
                else => {
                    warn!("change feed closed");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Bind a new rule to the check probing its (client, command) pair.
    /// A rule id already present anywhere in the fleet is ignored. The
    /// suppression clock is seeded from the most recent persisted alert so
    /// a restart does not replay a notification.
    pub async fn apply_alert_rule_created(&self, payload: &[u8]) {
        let Some(record) = decode::<AlertRuleRecord>(ALERT_RULES_CREATED, payload) else {
            return;
        };

        if self.fleet.has_alert_rule(record.id) {
            return;
        }
        let Some(client) = self.fleet.get(record.client_id) else {
            return;
        };
        let Some(check) = client.checks_by_command(record.command_id).into_iter().next() else {
            return;
        };

        let Some(rule) = AlertRule::from_record(&record, self.sink_factory.clone()) else {
            warn!(rule = %record.id, "dropping alert rule with unusable evaluator parameters");
            return;
        };
        let rule = Arc::new(rule);

        match self.repo.find_latest_alert(rule.id(), client.id()).await {
            Ok(Some(alert)) => rule.set_previous_fired_at(alert.created_at),
            Ok(None) => {}
            Err(err) => warn!(rule = %rule.id(), "error seeding alert history: {err:#}"),
        }

        debug!(rule = %rule.id(), client = %client.id(), "alert rule bound");
        check.add_rule(rule);
    }

    /// Locate a rule by its (client, command, rule) triple and reconfigure
    /// it in place.
    pub fn apply_alert_rule_updated(&self, payload: &[u8]) {
        let Some(record) = decode::<AlertRuleRecord>(ALERT_RULES_UPDATED, payload) else {
            return;
        };

        let Some(client) = self.fleet.get(record.client_id) else {
            return;
        };
        for check in client.checks_by_command(record.command_id) {
            if let Some(rule) = check.rule_by_id(record.id) {
                if !rule.update(&record) {
                    warn!(rule = %record.id, "rejected alert rule update");
                }
                return;
            }
        }
    }

    /// Remove the listed rules from every check in the fleet.
    pub fn apply_alert_rules_deleted(&self, payload: &[u8]) {
        let Some(records) = decode::<Vec<AlertRuleRecord>>(ALERT_RULES_DELETED, payload) else {
            return;
        };

        for client in self.fleet.snapshot() {
            for check in client.checks() {
                for record in &records {
                    check.remove_rule_by_id(record.id);
                }
            }
        }
    }

    /// Remove checks by deleted outcome id, from every client.
    pub fn apply_outcomes_deleted(&self, payload: &[u8]) {
        let Some(records) = decode::<Vec<OutcomeRecord>>(OUTCOMES_DELETED, payload) else {
            return;
        };

        for client in self.fleet.snapshot() {
            for record in &records {
                client.remove_check_by_id(record.id);
            }
        }
    }

    /// Upsert a client: a new id materializes in the fleet, an existing one
    /// only has its address replaced.
    pub fn apply_client_updated(&self, payload: &[u8]) {
        let Some(record) = decode::<ClientRecord>(CLIENTS_UPDATED, payload) else {
            return;
        };

        match self.fleet.get(record.id) {
            Some(client) => client.set_address(record.address),
            None => {
                debug!(client = %record.id, "new client materialized from change feed");
                self.fleet.add(Arc::new(Client::from_record(&record)));
            }
        }
    }

    pub fn apply_clients_deleted(&self, payload: &[u8]) {
        let Some(records) = decode::<Vec<ClientRecord>>(CLIENTS_DELETED, payload) else {
            return;
        };

        for record in &records {
            self.fleet.remove_by_id(record.id);
        }
    }
}

async fn subscribe(
    nats: &async_nats::Client,
    subject: &str,
) -> anyhow::Result<async_nats::Subscriber> {
    nats.subscribe(subject.to_string())
        .await
        .with_context(|| format!("error subscribing to {subject}"))
}

fn decode<T: DeserializeOwned>(subject: &str, payload: &[u8]) -> Option<T> {
    match serde_json::from_slice(payload) {
        Ok(value) => Some(value),
        Err(err) => {
            error!("error decoding event ({subject}): {err}");
            None
        }
    }
}
