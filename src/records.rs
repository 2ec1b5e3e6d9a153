//! Persisted record shapes.
//!
//! These are the documents the external repository stores and the change-feed
//! carries. All of them travel as JSON with stable ids, creation/update
//! timestamps, and a soft-delete marker. The in-memory fleet model is built
//! from these records but does not mirror them field for field; the booleans
//! on [`OutcomeRecord`] exist for wire compatibility only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A monitored remote agent as the store knows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    /// Network address the agent connects from and pings are dialed against.
    pub address: String,
    #[serde(default)]
    pub group_ids: Vec<Uuid>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A named bag of commands with per-group cadence and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub commands: Vec<GroupCommandRecord>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Membership entry of a command in a group. The cadence and fail-on-error
/// policy live here, not on the command itself, so two groups can probe the
/// same command on different schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCommandRecord {
    pub command_id: Uuid,
    /// Seconds between probes.
    pub interval: u64,
    #[serde(default)]
    pub fail_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: Uuid,
    /// Shell-style command text sent verbatim to the agent.
    pub command: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One persisted probe outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: Uuid,
    pub client_id: Uuid,
    pub command_id: Uuid,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub finished: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// An alert rule bound to a (client, command) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRuleRecord {
    pub id: Uuid,
    pub client_id: Uuid,
    pub command_id: Uuid,
    /// Evaluator kind tag, e.g. `cpu`.
    #[serde(rename = "alert")]
    pub kind: String,
    /// Evaluator threshold, stringly typed in the store.
    #[serde(default)]
    pub value: String,
    /// Rolling window size.
    #[serde(default)]
    pub count: usize,
    /// Suppression delay between notifications, in seconds.
    #[serde(default)]
    pub delay: u64,
    /// Comma-separated notification targets, e.g. `sms,email`.
    #[serde(default)]
    pub service: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A fired alert, persisted for history and notification seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    #[serde(rename = "alert_id")]
    pub rule_id: Uuid,
    pub client_id: Uuid,
    /// Evaluator value at fire time.
    #[serde(default)]
    pub value: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Request envelope for `*.retrieve.find` subjects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub filter: Map<String, Value>,
    /// Field names; a leading `-` means descending.
    #[serde(default)]
    pub sort: Vec<String>,
}

impl FindOptions {
    pub fn sorted(field: &str) -> Self {
        Self {
            filter: Map::new(),
            sort: vec![field.to_string()],
        }
    }

    pub fn with_filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filter.insert(key.to_string(), value.into());
        self
    }
}

/// Request envelope for `*.update.send` subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOptions {
    pub filter: Map<String, Value>,
    pub updates: Value,
}

impl UpdateOptions {
    /// `$set`-style update for a single document by id.
    pub fn set_by_id(id: Uuid, updates: Value) -> Self {
        let mut filter = Map::new();
        filter.insert("id".to_string(), Value::String(id.to_string()));
        Self {
            filter,
            updates: serde_json::json!({ "$set": updates }),
        }
    }
}
