//! Result of running one instance to a terminal state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::TaskError;
use super::ids::InstanceId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub instance_id: InstanceId,
    pub success: bool,
    /// Wall time from the first attempt to the terminal state (zero when the
    /// instance never started).
    pub duration: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl TaskResult {
    pub fn success(instance_id: InstanceId, duration: Duration, value: serde_json::Value) -> Self {
        Self {
            instance_id,
            success: true,
            duration,
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(instance_id: InstanceId, duration: Duration, error: TaskError) -> Self {
        Self {
            instance_id,
            success: false,
            duration,
            value: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn failure_omits_value_in_json() {
        let r = TaskResult::failure(
            InstanceId::from_ulid(Ulid::new()),
            Duration::from_millis(10),
            TaskError::Handler("boom".into()),
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["success"], false);
        assert!(v.get("value").is_none());
        assert_eq!(v["error"]["kind"], "handler");
    }
}
