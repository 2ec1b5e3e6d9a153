use std::sync::{Arc, LazyLock, RwLock};

use chrono::{Duration, Utc};
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::records::{ClientRecord, OutcomeRecord};
use crate::repository::Repository;
use crate::session::{AgentSession, SessionError};

use super::check::Check;
use super::group::Group;
use super::ping;

/// Port expression embedded in a ping command, e.g. `ping -port="80,443"`.
static PORT_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"-port="?([\d,-]+)"?"#).expect("port expression pattern"));

/// Ports probed when a ping command names none.
const DEFAULT_PING_PORTS: &str = "3333";

struct ClientInner {
    name: String,
    address: String,
    session: Option<Arc<dyn AgentSession>>,
    groups: Vec<Arc<Group>>,
    checks: Vec<Arc<Check>>,
}

/// A remote agent: identity, address, optional live session, group
/// memberships, and the checks scheduled against it.
///
/// All operations are thread-safe behind one readers-writer lock. Iteration
/// hands out snapshots; the lock is never held across I/O.
pub struct Client {
    id: Uuid,
    inner: RwLock<ClientInner>,
}

impl Client {
    pub fn new(id: Uuid, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            inner: RwLock::new(ClientInner {
                name: name.into(),
                address: address.into(),
                session: None,
                groups: Vec::new(),
                checks: Vec::new(),
            }),
        }
    }

    pub fn from_record(record: &ClientRecord) -> Self {
        Self::new(record.id, record.name.clone(), record.address.clone())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> String {
        self.inner.read().unwrap().name.clone()
    }

    pub fn address(&self) -> String {
        self.inner.read().unwrap().address.clone()
    }

    pub fn set_address(&self, address: impl Into<String>) {
        self.inner.write().unwrap().address = address.into();
    }

    pub fn session(&self) -> Option<Arc<dyn AgentSession>> {
        self.inner.read().unwrap().session.clone()
    }

    pub fn has_session(&self) -> bool {
        self.inner.read().unwrap().session.is_some()
    }

    /// Bind a live session, replacing any prior one.
    pub fn set_session(&self, session: Arc<dyn AgentSession>) {
        self.inner.write().unwrap().session = Some(session);
    }

    pub fn clear_session(&self) {
        self.inner.write().unwrap().session = None;
    }

    pub fn add_group(&self, group: Arc<Group>) {
        self.inner.write().unwrap().groups.push(group);
    }

    /// Point-in-time copy of the group memberships.
    pub fn groups(&self) -> Vec<Arc<Group>> {
        self.inner.read().unwrap().groups.clone()
    }

    pub fn group_by_name(&self, name: &str) -> Option<Arc<Group>> {
        self.inner
            .read()
            .unwrap()
            .groups
            .iter()
            .find(|g| g.name() == name)
            .cloned()
    }

    fn group_name(&self, group_id: Uuid) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .groups
            .iter()
            .find(|g| g.id() == group_id)
            .map(|g| g.name().to_string())
    }

    /// Remove every group with the given name. The removal cascades: every
    /// check whose command belongs to a removed group goes with it,
    /// atomically.
    pub fn remove_groups_by_name(&self, name: &str) -> bool {
        let mut inner = self.inner.write().unwrap();

        let removed: Vec<Uuid> = inner
            .groups
            .iter()
            .filter(|g| g.name() == name)
            .map(|g| g.id())
            .collect();
        if removed.is_empty() {
            return false;
        }

        inner.groups.retain(|g| g.name() != name);
        inner.checks.retain(|c| !removed.contains(&c.group_id()));
        true
    }

    /// Remove every group that mentions the given command, cascading the
    /// checks of those groups.
    pub fn remove_groups_by_command(&self, command_id: Uuid) -> bool {
        let mut inner = self.inner.write().unwrap();

        let removed: Vec<Uuid> = inner
            .groups
            .iter()
            .filter(|g| g.has_command(command_id))
            .map(|g| g.id())
            .collect();
        if removed.is_empty() {
            return false;
        }

        inner.groups.retain(|g| !removed.contains(&g.id()));
        inner.checks.retain(|c| !removed.contains(&c.group_id()));
        true
    }

    pub fn add_check(&self, check: Arc<Check>) {
        self.inner.write().unwrap().checks.push(check);
    }

    /// Point-in-time copy of the checks.
    pub fn checks(&self) -> Vec<Arc<Check>> {
        self.inner.read().unwrap().checks.clone()
    }

    /// Find a check by the id of its last persisted outcome.
    pub fn check_by_outcome_id(&self, id: Uuid) -> Option<Arc<Check>> {
        self.inner
            .read()
            .unwrap()
            .checks
            .iter()
            .find(|c| c.outcome_id() == Some(id))
            .cloned()
    }

    /// All checks probing the given command.
    pub fn checks_by_command(&self, command_id: Uuid) -> Vec<Arc<Check>> {
        self.inner
            .read()
            .unwrap()
            .checks
            .iter()
            .filter(|c| c.command().id() == command_id)
            .cloned()
            .collect()
    }

    /// Remove a check by the id of its last persisted outcome.
    pub fn remove_check_by_id(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write().unwrap();
        let before = inner.checks.len();
        inner.checks.retain(|c| c.outcome_id() != Some(id));
        inner.checks.len() != before
    }

    /// Clear the error latch on every check of the named group, so a
    /// successful probe unblocks its stop-on-error siblings.
    pub fn rearm_group_after_success(&self, group_name: &str) {
        let group_ids: Vec<Uuid> = self
            .groups()
            .iter()
            .filter(|g| g.name() == group_name)
            .map(|g| g.id())
            .collect();

        for check in self.checks() {
            if group_ids.contains(&check.group_id()) {
                check.rearm();
            }
        }
    }

    /// Write one command line to the live session and read one reply line.
    ///
    /// The session is dropped on I/O failure; the acceptor binds a fresh one
    /// when the agent reconnects.
    pub async fn send_message(&self, message: &str) -> Result<String, SessionError> {
        let Some(session) = self.session() else {
            return Err(SessionError::NotConnected);
        };

        match session.exchange(message).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.clear_session();
                Err(err)
            }
        }
    }

    /// Dial each port of the expression against this client's address.
    pub async fn ping(&self, port_expr: &str) -> (Vec<ping::PingResult>, Option<ping::PingError>) {
        ping::ping(&self.address(), port_expr).await
    }

    /// Run one probe to completion: mark the prior outcome checked, execute
    /// the command (inline for `ping`, over the session otherwise), persist
    /// the new outcome, re-arm the cadence, and feed every bound alert rule.
    ///
    /// Returns the (trimmed) reply recorded on the outcome.
    pub async fn dispatch(&self, check: &Check, repo: &dyn Repository) -> String {
        check.begin();
        let command = check.command().clone();

        // Flag the previous outcome as superseded; if the store has never
        // seen this check, publish a placeholder carrying the current flags.
        let prior_id = check.outcome_id();
        let known = match prior_id {
            Some(id) => match repo.mark_outcome_checked(id).await {
                Ok(known) => known,
                Err(err) => {
                    warn!(client = %self.id, "error updating last outcome: {err:#}");
                    true
                }
            },
            None => false,
        };
        if !known {
            let placeholder_id = prior_id.unwrap_or_else(Uuid::new_v4);
            let now = Utc::now();
            let placeholder = OutcomeRecord {
                id: placeholder_id,
                client_id: self.id,
                command_id: command.id(),
                response: String::new(),
                checked: true,
                error: check.last_errored(),
                finished: check.finished(),
                created_at: now,
                updated_at: now,
            };
            if let Err(err) = repo.create_outcome(&placeholder).await {
                warn!(client = %self.id, "error publishing placeholder outcome: {err:#}");
            }
            check.adopt_outcome(placeholder_id);
        }

        // Ping commands are answered inline; everything else goes to the
        // agent verbatim.
        let (reply, errored) = if command.text().starts_with("ping") {
            let expr = PORT_EXPR
                .captures(command.text())
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| DEFAULT_PING_PORTS.to_string());

            let (results, err) = self.ping(&expr).await;
            let error_text = err.map(|e| e.to_string()).unwrap_or_default();
            let reply = serde_json::json!({ "error": error_text, "ports": results });
            (reply.to_string(), false)
        } else {
            match self.send_message(command.text()).await {
                Ok(reply) => (reply, false),
                Err(err) => (err.to_string(), true),
            }
        };

        check.set_error(errored);
        let reply = reply.trim_end_matches('\n').to_string();

        let outcome = OutcomeRecord {
            id: Uuid::new_v4(),
            client_id: self.id,
            command_id: command.id(),
            response: reply.clone(),
            checked: false,
            error: errored,
            finished: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        if let Err(err) = repo.create_outcome(&outcome).await {
            warn!(client = %self.id, "error publishing outcome: {err:#}");
        }
        check.adopt_outcome(outcome.id);
        check.mark_finished();
        check.set_next_due(Some(
            outcome.created_at + Duration::seconds(command.interval() as i64),
        ));

        // A clean probe of a stop-on-error command unblocks its group.
        if !errored && command.fail_on_error() {
            if let Some(name) = self.group_name(check.group_id()) {
                self.rearm_group_after_success(&name);
            }
        }

        for rule in check.rules() {
            rule.check(&reply, repo).await;
        }

        debug!(client = %self.id, command = %command.id(), "probe finished (errored={errored})");
        check.release();
        reply
    }
}
