//! Task instance: one concrete occurrence of a definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TaskError;
use super::ids::{DefinitionId, InstanceId};
use super::priority::Priority;
use super::state::InstanceStatus;

/// Single source of truth for an instance's state.
///
/// The scheduler hands out clones as snapshots; all mutation goes through the
/// `mark_*` methods, which refuse transitions the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: InstanceId,
    pub definition_id: DefinitionId,
    pub status: InstanceStatus,
    pub priority: Priority,

    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of handler invocations so far.
    pub attempts: u32,
    pub last_error: Option<TaskError>,
    pub result: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

impl TaskInstance {
    pub fn new(
        id: InstanceId,
        definition_id: DefinitionId,
        priority: Priority,
        now: DateTime<Utc>,
        scheduled_at: DateTime<Utc>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id,
            definition_id,
            status: InstanceStatus::Pending,
            priority,
            created_at: now,
            scheduled_at,
            started_at: None,
            completed_at: None,
            attempts: 0,
            last_error: None,
            result: None,
            metadata,
        }
    }

    fn transition(&mut self, next: InstanceStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) -> bool {
        if !self.transition(InstanceStatus::Running) {
            return false;
        }
        self.started_at = Some(now);
        true
    }

    /// Count one handler invocation and return the new total.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn record_error(&mut self, error: TaskError) {
        self.last_error = Some(error);
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>, result: serde_json::Value) -> bool {
        if !self.transition(InstanceStatus::Completed) {
            return false;
        }
        self.completed_at = Some(now);
        self.result = Some(result);
        true
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>, error: TaskError) -> bool {
        if !self.transition(InstanceStatus::Failed) {
            return false;
        }
        self.completed_at = Some(now);
        self.last_error = Some(error);
        true
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) -> bool {
        if !self.transition(InstanceStatus::Cancelled) {
            return false;
        }
        self.completed_at = Some(now);
        true
    }

    /// Timestamp used to age terminal instances during cleanup.
    pub fn finished_or_created_at(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn instance() -> TaskInstance {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        TaskInstance::new(
            InstanceId::from_ulid(Ulid::new()),
            DefinitionId::from("t1"),
            Priority::High,
            now,
            now,
            None,
        )
    }

    #[test]
    fn happy_path_sets_timestamps() {
        let mut inst = instance();
        let later = inst.created_at + chrono::Duration::seconds(5);

        assert!(inst.mark_running(inst.created_at));
        assert_eq!(inst.record_attempt(), 1);
        assert!(inst.mark_completed(later, serde_json::json!({"ok": true})));

        assert_eq!(inst.status, InstanceStatus::Completed);
        assert_eq!(inst.started_at, Some(inst.created_at));
        assert_eq!(inst.completed_at, Some(later));
        assert_eq!(inst.finished_or_created_at(), later);
    }

    #[test]
    fn running_instance_cannot_be_cancelled() {
        let mut inst = instance();
        inst.mark_running(inst.created_at);
        assert!(!inst.mark_cancelled(inst.created_at));
        assert_eq!(inst.status, InstanceStatus::Running);
    }

    #[test]
    fn pending_instance_can_fail_without_running() {
        let mut inst = instance();
        let err = TaskError::HandlerNotFound(DefinitionId::from("t1"));
        assert!(inst.mark_failed(inst.created_at, err.clone()));
        assert_eq!(inst.last_error, Some(err));
        assert!(inst.started_at.is_none());
    }

    #[test]
    fn terminal_instance_stays_terminal() {
        let mut inst = instance();
        inst.mark_cancelled(inst.created_at);
        assert!(!inst.mark_running(inst.created_at));
        assert!(!inst.mark_failed(inst.created_at, TaskError::Handler("x".into())));
        assert_eq!(inst.status, InstanceStatus::Cancelled);
    }
}
