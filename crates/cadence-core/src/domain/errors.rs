//! Error types.
//!
//! - `SchedulerError`: misuse of the scheduler API, returned before any work starts.
//! - `TaskError`: why an instance failed. Stored on instances and carried in events.
//! - `HandlerError`: what a task handler returns when it fails.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{DefinitionId, InstanceId};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task definition not found: {0}")]
    DefinitionNotFound(DefinitionId),

    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("interval period out of range: {0:?}")]
    InvalidInterval(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    #[error("task definition not found: {0}")]
    DefinitionNotFound(DefinitionId),

    #[error("no handler bound for task definition: {0}")]
    HandlerNotFound(DefinitionId),

    #[error("instance {0} is not pending")]
    InstanceNotRunnable(InstanceId),

    #[error("task timeout after {0:?}")]
    Timeout(Duration),

    #[error("queue full (max_queue_size={0})")]
    QueueFull(usize),

    #[error("{0}")]
    Handler(String),
}

/// Failure reported by a task handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<HandlerError> for TaskError {
    fn from(err: HandlerError) -> Self {
        TaskError::Handler(err.message)
    }
}
