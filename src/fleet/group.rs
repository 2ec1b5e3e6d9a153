use std::sync::Arc;

use uuid::Uuid;

use super::command::Command;

/// A named bag of command clones, shared by reference across clients.
///
/// No change-feed subject mutates a group after hydration, so the aggregate
/// is immutable; sharing an `Arc<Group>` needs no lock.
#[derive(Debug)]
pub struct Group {
    id: Uuid,
    name: String,
    commands: Vec<Arc<Command>>,
}

impl Group {
    pub fn new(id: Uuid, name: impl Into<String>, commands: Vec<Arc<Command>>) -> Self {
        Self {
            id,
            name: name.into(),
            commands,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[Arc<Command>] {
        &self.commands
    }

    pub fn command_by_id(&self, id: Uuid) -> Option<&Arc<Command>> {
        self.commands.iter().find(|c| c.id() == id)
    }

    pub fn has_command(&self, id: Uuid) -> bool {
        self.command_by_id(id).is_some()
    }
}
