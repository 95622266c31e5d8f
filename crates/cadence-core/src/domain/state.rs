//! InstanceStatus - インスタンスの状態遷移
//!
//! # 許可される遷移
//! - Pending → Running / Failed / Cancelled
//! - Running → Completed / Failed
//!
//! 終端状態（Completed / Failed / Cancelled）からは遷移しない。

use serde::{Deserialize, Serialize};

/// Status of a task instance.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed (retries exhausted)
/// - Pending -> Failed (definition or handler missing, queue full)
/// - Pending -> Cancelled
///
/// Nothing ever returns to Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Waiting on a timer or in the queue.
    Pending,

    /// Handler is executing (possibly between retry attempts).
    Running,

    Completed,

    Failed,

    Cancelled,
}

impl InstanceStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstanceStatus::Completed | InstanceStatus::Failed | InstanceStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Failed) | (Pending, Cancelled) | (Running, Completed) | (Running, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Running => "running",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InstanceStatus::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Pending, false)]
    #[case(Running, false)]
    #[case(Completed, true)]
    #[case(Failed, true)]
    #[case(Cancelled, true)]
    fn terminal_states(#[case] status: InstanceStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn nothing_returns_to_pending() {
        for from in [Pending, Running, Completed, Failed, Cancelled] {
            assert!(!from.can_transition_to(Pending));
        }
    }

    #[test]
    fn running_cannot_be_cancelled() {
        assert!(!Running.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Completed, Failed, Cancelled] {
            for to in [Pending, Running, Completed, Failed, Cancelled] {
                assert!(!from.can_transition_to(to));
            }
        }
    }
}
