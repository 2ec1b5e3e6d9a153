//! Alert rules bound to checks.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::records::{AlertRecord, AlertRuleRecord};
use crate::repository::Repository;

use super::evaluator::{Evaluator, EvaluatorKind};
use super::sinks::{NotificationSink, SinkFactory};

struct RuleInner {
    /// Suppression window between notifications, in seconds.
    delay: u64,
    evaluator: Evaluator,
    /// No further fire before this instant.
    previous_fired_at: DateTime<Utc>,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

/// A stateful rule evaluated against every reply of one check.
///
/// The inner mutex is never held across sink or repository I/O: the fire
/// decision is taken under the lock, delivery happens after it is released.
pub struct AlertRule {
    id: Uuid,
    client_id: Uuid,
    command_id: Uuid,
    inner: Mutex<RuleInner>,
    sink_factory: Arc<SinkFactory>,
}

impl std::fmt::Debug for AlertRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRule")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("command_id", &self.command_id)
            .finish_non_exhaustive()
    }
}

impl AlertRule {
    /// Build a rule from its record. `None` when the evaluator kind is
    /// unknown or its parameters do not parse.
    pub fn from_record(record: &AlertRuleRecord, sink_factory: Arc<SinkFactory>) -> Option<Self> {
        let evaluator = Evaluator::from_record(record)?;
        let sinks = sink_factory.build(&record.service);

        Some(Self {
            id: record.id,
            client_id: record.client_id,
            command_id: record.command_id,
            inner: Mutex::new(RuleInner {
                delay: record.delay,
                evaluator,
                previous_fired_at: DateTime::<Utc>::MIN_UTC,
                sinks,
            }),
            sink_factory,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn command_id(&self) -> Uuid {
        self.command_id
    }

    pub fn previous_fired_at(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().previous_fired_at
    }

    /// Seed the suppression clock, e.g. from the most recent persisted
    /// alert after a restart.
    pub fn set_previous_fired_at(&self, at: DateTime<Utc>) {
        self.inner.lock().unwrap().previous_fired_at = at;
    }

    pub fn delay(&self) -> u64 {
        self.inner.lock().unwrap().delay
    }

    #[cfg(test)]
    pub(crate) fn sink_count(&self) -> usize {
        self.inner.lock().unwrap().sinks.len()
    }

    /// Reconfigure from an updated record: patch the evaluator in place when
    /// the kind is unchanged (keeping its rolling state), replace it
    /// otherwise, and re-derive the notification sinks. `false` when the
    /// record's evaluator parameters do not parse.
    pub fn update(&self, record: &AlertRuleRecord) -> bool {
        let mut inner = self.inner.lock().unwrap();

        let same_kind = EvaluatorKind::from_tag(&record.kind) == Some(inner.evaluator.kind());

        if same_kind {
            if !inner.evaluator.reconfigure(record) {
                return false;
            }
        } else {
            match Evaluator::from_record(record) {
                Some(evaluator) => inner.evaluator = evaluator,
                None => return false,
            }
        }

        inner.delay = record.delay;
        inner.sinks = self.sink_factory.build(&record.service);
        true
    }

    /// Feed one probe reply to the evaluator and fire if it trips.
    ///
    /// A fire inside the suppression window is swallowed entirely. A fire
    /// outside it notifies every sink best-effort, publishes an alert record
    /// fire-and-forget, and pushes the window forward by `delay` seconds
    /// whether or not the publish succeeded.
    pub async fn check(&self, response: &str, repo: &dyn Repository) {
        let decision = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.evaluator.evaluate(response) {
                None
            } else {
                let now = Utc::now();
                if now <= inner.previous_fired_at {
                    debug!(rule = %self.id, "alert suppressed");
                    None
                } else {
                    Some((
                        now,
                        inner.evaluator.name(),
                        inner.evaluator.value(),
                        inner.evaluator.message(),
                        inner.sinks.clone(),
                        inner.delay,
                    ))
                }
            }
        };

        let Some((now, name, value, message, sinks, delay)) = decision else {
            return;
        };

        debug!(rule = %self.id, client = %self.client_id, "alert fired: {message}");

        for sink in sinks {
            if let Err(err) = sink.send(name, &message).await {
                warn!(rule = %self.id, "error sending notification: {err:#}");
            }
        }

        let record = AlertRecord {
            id: Uuid::new_v4(),
            rule_id: self.id,
            client_id: self.client_id,
            value,
            created_at: now,
            updated_at: now,
        };
        if let Err(err) = repo.create_alert(&record).await {
            warn!(rule = %self.id, "error publishing alert: {err:#}");
        }

        self.inner.lock().unwrap().previous_fired_at = now + Duration::seconds(delay as i64);
    }
}
