//! Repository interface to the external store.
//!
//! The orchestrator never talks to a database directly: reads are
//! request/reply over the change-feed transport and writes are fire-and-forget
//! publishes. The trait keeps the core testable without a broker.

mod memory;
mod nats;

pub use memory::MemoryRepository;
pub use nats::NatsRepository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::records::{
    AlertRecord, ClientRecord, CommandRecord, GroupRecord, OutcomeRecord,
};

pub type RepositoryResult<T> = anyhow::Result<T>;

/// Request/reply + publish interface to the persistent store.
///
/// Find operations are bounded by the transport's reply timeout. Publishes
/// are best-effort: a lost outcome is acceptable (the in-memory model is a
/// rebuildable cache and the next probe produces a fresh one).
#[async_trait]
pub trait Repository: Send + Sync {
    /// All clients, oldest first.
    async fn find_clients(&self) -> RepositoryResult<Vec<ClientRecord>>;

    /// All groups, oldest first.
    async fn find_groups(&self) -> RepositoryResult<Vec<GroupRecord>>;

    /// All commands, oldest first.
    async fn find_commands(&self) -> RepositoryResult<Vec<CommandRecord>>;

    /// Most recent outcome for a (client, command) pair, if any.
    async fn find_latest_outcome(
        &self,
        client_id: Uuid,
        command_id: Uuid,
    ) -> RepositoryResult<Option<OutcomeRecord>>;

    /// A single outcome by id.
    async fn find_outcome(&self, id: Uuid) -> RepositoryResult<Option<OutcomeRecord>>;

    /// Most recent persisted alert for a (rule, client) pair, if any.
    async fn find_latest_alert(
        &self,
        rule_id: Uuid,
        client_id: Uuid,
    ) -> RepositoryResult<Option<AlertRecord>>;

    /// Mark an existing outcome as checked. Returns `false` when the store
    /// does not know the outcome (the caller then publishes a placeholder).
    async fn mark_outcome_checked(&self, id: Uuid) -> RepositoryResult<bool>;

    /// Publish a new outcome record.
    async fn create_outcome(&self, outcome: &OutcomeRecord) -> RepositoryResult<()>;

    /// Publish a fired alert record.
    async fn create_alert(&self, alert: &AlertRecord) -> RepositoryResult<()>;
}
