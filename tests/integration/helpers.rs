//! Shared fixtures: scripted agent sessions and record builders.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use fleetwatch::records::{ClientRecord, CommandRecord, GroupCommandRecord, GroupRecord};
use fleetwatch::repository::MemoryRepository;
use fleetwatch::session::{AgentSession, SessionError};
use uuid::Uuid;

/// Agent session that replays canned reply lines, then behaves like a
/// closed socket.
pub struct ScriptedSession {
    replies: Mutex<Vec<String>>,
}

impl ScriptedSession {
    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
        })
    }

    /// A session that immediately reports EOF.
    pub fn eof() -> Arc<Self> {
        Self::replying(&[])
    }
}

#[async_trait]
impl AgentSession for ScriptedSession {
    async fn exchange(&self, _line: &str) -> Result<String, SessionError> {
        match self.replies.lock().unwrap().pop() {
            Some(reply) => Ok(reply),
            None => Err(SessionError::Closed),
        }
    }
}

pub fn client_record(id: Uuid, address: &str, group_ids: Vec<Uuid>) -> ClientRecord {
    ClientRecord {
        id,
        name: format!("client-{address}"),
        address: address.to_string(),
        group_ids,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

pub fn group_record(id: Uuid, name: &str, commands: Vec<GroupCommandRecord>) -> GroupRecord {
    GroupRecord {
        id,
        name: name.to_string(),
        commands,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

pub fn command_record(id: Uuid, text: &str) -> CommandRecord {
    CommandRecord {
        id,
        command: text.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

pub fn membership(command_id: Uuid, interval: u64, fail_on_error: bool) -> GroupCommandRecord {
    GroupCommandRecord {
        command_id,
        interval,
        fail_on_error,
    }
}

/// One client (10.0.0.1) in one group with one command; returns the repo and
/// the three ids.
pub fn single_check_repo(
    command_text: &str,
    interval: u64,
    fail_on_error: bool,
) -> (MemoryRepository, Uuid, Uuid, Uuid) {
    let client_id = Uuid::new_v4();
    let group_id = Uuid::new_v4();
    let command_id = Uuid::new_v4();

    let repo = MemoryRepository::new();
    repo.seed_client(client_record(client_id, "10.0.0.1", vec![group_id]));
    repo.seed_group(group_record(
        group_id,
        "g",
        vec![membership(command_id, interval, fail_on_error)],
    ));
    repo.seed_command(command_record(command_id, command_text));

    (repo, client_id, group_id, command_id)
}
