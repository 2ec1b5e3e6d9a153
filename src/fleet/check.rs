use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::alerts::AlertRule;
use crate::records::OutcomeRecord;

use super::command::Command;

/// Scheduling state of a check.
///
/// The persisted outcome still carries the historical `checked`/`finished`
/// booleans; in memory the machine is a single tag so a check can never be
/// simultaneously idle and in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Idle,
    InFlight,
}

#[derive(Debug)]
struct CheckInner {
    /// Id of the last persisted outcome; rotated on every successful save.
    /// `None` until the first outcome exists.
    outcome_id: Option<Uuid>,
    /// `None` means epoch zero: immediately due, even when errored.
    next_due: Option<DateTime<Utc>>,
    state: CheckState,
    last_errored: bool,
    finished: bool,
    rules: Vec<Arc<AlertRule>>,
}

/// Per-(client, command) scheduling record.
pub struct Check {
    command: Arc<Command>,
    group_id: Uuid,
    inner: RwLock<CheckInner>,
}

impl Check {
    /// A fresh check that has never been probed; due on the next tick.
    pub fn new(command: Arc<Command>, group_id: Uuid) -> Self {
        Self {
            command,
            group_id,
            inner: RwLock::new(CheckInner {
                outcome_id: None,
                next_due: None,
                state: CheckState::Idle,
                last_errored: false,
                finished: false,
                rules: Vec::new(),
            }),
        }
    }

    /// Seed a check from its most recent persisted outcome. The in-flight
    /// state is ephemeral and never restored.
    pub fn from_outcome(command: Arc<Command>, group_id: Uuid, outcome: &OutcomeRecord) -> Self {
        let check = Self::new(command, group_id);
        {
            let mut inner = check.inner.write().unwrap();
            inner.outcome_id = Some(outcome.id);
            inner.next_due = Some(outcome.created_at);
            inner.last_errored = outcome.error;
            inner.finished = outcome.finished;
        }
        check
    }

    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    /// Id of the group whose command clone this check probes.
    pub fn group_id(&self) -> Uuid {
        self.group_id
    }

    pub fn outcome_id(&self) -> Option<Uuid> {
        self.inner.read().unwrap().outcome_id
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.inner.read().unwrap().next_due
    }

    pub fn state(&self) -> CheckState {
        self.inner.read().unwrap().state
    }

    pub fn is_in_flight(&self) -> bool {
        self.state() == CheckState::InFlight
    }

    pub fn last_errored(&self) -> bool {
        self.inner.read().unwrap().last_errored
    }

    pub fn finished(&self) -> bool {
        self.inner.read().unwrap().finished
    }

    /// Atomically test whether the check is due and transition it to
    /// in-flight. This happens before the dispatch task is spawned and is
    /// the only guard against duplicate probes.
    ///
    /// A check with no next-due timestamp is due unconditionally. Otherwise
    /// an errored check whose command stops on error stays parked until
    /// [`Check::rearm`], and a future timestamp waits its turn.
    pub fn claim_due(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.state == CheckState::InFlight {
            return false;
        }

        if let Some(due) = inner.next_due {
            if inner.last_errored && self.command.fail_on_error() {
                return false;
            }
            if now < due {
                return false;
            }
        }

        inner.state = CheckState::InFlight;
        true
    }

    /// Force the in-flight transition, for dispatches that bypass the
    /// scheduler's due test.
    pub fn begin(&self) {
        self.inner.write().unwrap().state = CheckState::InFlight;
    }

    /// Return to idle after a dispatch completes.
    pub fn release(&self) {
        self.inner.write().unwrap().state = CheckState::Idle;
    }

    /// Clear the error latch and any in-flight claim; used when a
    /// successful sibling probe resynchronizes the group.
    pub fn rearm(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.last_errored = false;
        inner.state = CheckState::Idle;
    }

    pub fn set_error(&self, errored: bool) {
        self.inner.write().unwrap().last_errored = errored;
    }

    pub fn mark_finished(&self) {
        self.inner.write().unwrap().finished = true;
    }

    /// Adopt the id of a newly persisted outcome.
    pub fn adopt_outcome(&self, id: Uuid) {
        self.inner.write().unwrap().outcome_id = Some(id);
    }

    pub fn set_next_due(&self, next_due: Option<DateTime<Utc>>) {
        self.inner.write().unwrap().next_due = next_due;
    }

    pub fn add_rule(&self, rule: Arc<AlertRule>) {
        self.inner.write().unwrap().rules.push(rule);
    }

    pub fn remove_rule_by_id(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write().unwrap();
        let before = inner.rules.len();
        inner.rules.retain(|r| r.id() != id);
        inner.rules.len() != before
    }

    pub fn rule_by_id(&self, id: Uuid) -> Option<Arc<AlertRule>> {
        self.inner
            .read()
            .unwrap()
            .rules
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    pub fn has_rule(&self, id: Uuid) -> bool {
        self.rule_by_id(id).is_some()
    }

    /// Point-in-time copy of the bound rules.
    pub fn rules(&self) -> Vec<Arc<AlertRule>> {
        self.inner.read().unwrap().rules.clone()
    }
}
