use uuid::Uuid;

/// A probe specification as one group carries it.
///
/// The same stored command can appear in several groups; each group owns its
/// own clone with that group's cadence and fail-on-error policy, so
/// per-group overrides never leak across groups. Commands are immutable once
/// hydrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    id: Uuid,
    group_id: Uuid,
    text: String,
    interval: u64,
    fail_on_error: bool,
}

impl Command {
    pub fn new(id: Uuid, group_id: Uuid, text: impl Into<String>, interval: u64, fail_on_error: bool) -> Self {
        Self {
            id,
            group_id,
            text: text.into(),
            interval,
            fail_on_error,
        }
    }

    /// Stable id, shared across every group that mentions this command.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Id of the group this clone belongs to.
    pub fn group_id(&self) -> Uuid {
        self.group_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Seconds between probes.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Once a probe errors, skip the check until the group is rearmed by a
    /// successful sibling probe.
    pub fn fail_on_error(&self) -> bool {
        self.fail_on_error
    }
}
