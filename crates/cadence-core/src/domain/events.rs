//! Lifecycle events - スケジューラが emit するイベント

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::TaskError;
use super::instance::TaskInstance;
use super::outcome::TaskResult;

/// Subscription key for listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "task:scheduled")]
    Scheduled,
    #[serde(rename = "task:started")]
    Started,
    #[serde(rename = "task:completed")]
    Completed,
    #[serde(rename = "task:failed")]
    Failed,
    #[serde(rename = "task:cancelled")]
    Cancelled,
    #[serde(rename = "task:retrying")]
    Retrying,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Scheduled => "task:scheduled",
            EventKind::Started => "task:started",
            EventKind::Completed => "task:completed",
            EventKind::Failed => "task:failed",
            EventKind::Cancelled => "task:cancelled",
            EventKind::Retrying => "task:retrying",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload. Every variant carries a snapshot of the instance taken at
/// the moment the event was emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    Scheduled {
        instance: TaskInstance,
    },
    Started {
        instance: TaskInstance,
    },
    Completed {
        instance: TaskInstance,
        result: TaskResult,
    },
    Failed {
        instance: TaskInstance,
        error: TaskError,
        duration: Duration,
    },
    Cancelled {
        instance: TaskInstance,
    },
    Retrying {
        instance: TaskInstance,
        /// Zero-based index of the attempt that just failed.
        attempt: u32,
        delay: Duration,
        error: TaskError,
    },
}

impl SchedulerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SchedulerEvent::Scheduled { .. } => EventKind::Scheduled,
            SchedulerEvent::Started { .. } => EventKind::Started,
            SchedulerEvent::Completed { .. } => EventKind::Completed,
            SchedulerEvent::Failed { .. } => EventKind::Failed,
            SchedulerEvent::Cancelled { .. } => EventKind::Cancelled,
            SchedulerEvent::Retrying { .. } => EventKind::Retrying,
        }
    }

    pub fn instance(&self) -> &TaskInstance {
        match self {
            SchedulerEvent::Scheduled { instance }
            | SchedulerEvent::Started { instance }
            | SchedulerEvent::Completed { instance, .. }
            | SchedulerEvent::Failed { instance, .. }
            | SchedulerEvent::Cancelled { instance }
            | SchedulerEvent::Retrying { instance, .. } => instance,
        }
    }
}
