//! Status - スケジューラ状態の読み取り専用ビュー

use serde::{Deserialize, Serialize};

use crate::domain::{DefinitionId, InstanceStatus, TaskInstance};

/// Point-in-time counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub definitions: usize,
    pub armed_timers: usize,
    /// Instances waiting in the run queue.
    pub queued: usize,
    /// `max_queue_size`
    pub queue_capacity: usize,
    /// Queued instances currently executing.
    pub active: usize,

    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl SchedulerStats {
    pub(crate) fn collect<'a>(
        instances: impl Iterator<Item = &'a TaskInstance>,
        queued: usize,
        queue_capacity: usize,
        active: usize,
        definitions: usize,
        armed_timers: usize,
        running: bool,
    ) -> Self {
        let mut stats = SchedulerStats {
            running,
            definitions,
            armed_timers,
            queued,
            queue_capacity,
            active,
            ..Default::default()
        };
        for instance in instances {
            match instance.status {
                InstanceStatus::Pending => stats.pending += 1,
                InstanceStatus::Running => stats.in_progress += 1,
                InstanceStatus::Completed => stats.completed += 1,
                InstanceStatus::Failed => stats.failed += 1,
                InstanceStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

/// Filter for `TaskScheduler::get_instances`. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub definition_id: Option<DefinitionId>,
    pub status: Option<InstanceStatus>,
}

impl InstanceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn definition(mut self, id: impl Into<DefinitionId>) -> Self {
        self.definition_id = Some(id.into());
        self
    }

    pub fn status(mut self, status: InstanceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, instance: &TaskInstance) -> bool {
        self.definition_id
            .as_ref()
            .is_none_or(|id| &instance.definition_id == id)
            && self.status.is_none_or(|status| instance.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstanceId, Priority};
    use chrono::Utc;
    use ulid::Ulid;

    fn instance(def: &str, status: InstanceStatus) -> TaskInstance {
        let now = Utc::now();
        let mut instance = TaskInstance::new(
            InstanceId::from_ulid(Ulid::new()),
            DefinitionId::from(def),
            Priority::Normal,
            now,
            now,
            None,
        );
        instance.status = status;
        instance
    }

    #[test]
    fn counts_by_status() {
        let instances = [
            instance("a", InstanceStatus::Pending),
            instance("a", InstanceStatus::Completed),
            instance("b", InstanceStatus::Completed),
            instance("b", InstanceStatus::Failed),
        ];
        let stats = SchedulerStats::collect(instances.iter(), 1, 1000, 0, 2, 3, true);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 0);
        assert_eq!(stats.queue_capacity, 1000);
        assert_eq!(stats.definitions, 2);
        assert!(stats.running);
    }

    #[test]
    fn filter_combines_definition_and_status() {
        let filter = InstanceFilter::all()
            .definition("a")
            .status(InstanceStatus::Completed);
        assert!(filter.matches(&instance("a", InstanceStatus::Completed)));
        assert!(!filter.matches(&instance("a", InstanceStatus::Pending)));
        assert!(!filter.matches(&instance("b", InstanceStatus::Completed)));
        assert!(InstanceFilter::all().matches(&instance("b", InstanceStatus::Failed)));
    }
}
