//! The in-memory fleet model.
//!
//! Every aggregate guards its own interior with a readers-writer lock and
//! hands out point-in-time snapshots for iteration, so no lock is ever held
//! across I/O or across another aggregate's operations.

pub mod check;
pub mod client;
pub mod command;
pub mod group;
pub mod ping;

pub use check::{Check, CheckState};
pub use client::Client;
pub use command::Command;
pub use group::Group;

use std::sync::{Arc, RwLock};

use uuid::Uuid;

/// Registry of all clients known to the orchestrator.
///
/// Insertion order is preserved as the iteration tiebreak. The fleet is a
/// rebuildable cache of the persistent store, not a source of truth.
#[derive(Default)]
pub struct Fleet {
    clients: RwLock<Vec<Arc<Client>>>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client. Idempotent on id: adding an existing id replaces the
    /// address but preserves the groups, checks, and live session of the
    /// client already registered.
    pub fn add(&self, client: Arc<Client>) {
        let mut clients = self.clients.write().unwrap();
        if let Some(existing) = clients.iter().find(|c| c.id() == client.id()) {
            existing.set_address(client.address());
            return;
        }
        clients.push(client);
    }

    /// Drop a client. In-flight probes against it complete on their detached
    /// references; their outcomes persist but never re-enter the fleet.
    pub fn remove_by_id(&self, id: Uuid) -> bool {
        let mut clients = self.clients.write().unwrap();
        let before = clients.len();
        clients.retain(|c| c.id() != id);
        clients.len() != before
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Client>> {
        self.clients
            .read()
            .unwrap()
            .iter()
            .find(|c| c.id() == id)
            .cloned()
    }

    /// Point-in-time copy of all clients. Mutations during iteration do not
    /// affect the snapshot, and a yielded client may no longer belong to the
    /// fleet by the time it is observed.
    pub fn snapshot(&self) -> Vec<Arc<Client>> {
        self.clients.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any check anywhere in the fleet carries the given alert rule.
    pub fn has_alert_rule(&self, rule_id: Uuid) -> bool {
        self.snapshot()
            .iter()
            .any(|client| client.checks().iter().any(|check| check.has_rule(rule_id)))
    }
}
