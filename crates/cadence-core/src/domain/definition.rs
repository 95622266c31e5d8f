//! Task definitions: what to run, when, and with which execution policy.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::ids::DefinitionId;
use super::priority::Priority;
use crate::runtime::TaskHandler;

/// When a definition fires on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fire once, `delay` after the schedule is armed.
    Once { delay: Duration },

    /// Fire every `period` until unregistered or the scheduler stops.
    Interval { period: Duration },

    /// Fire at every instant matching `expression`, evaluated in `timezone`
    /// (IANA name such as "Europe/Berlin" or "UTC").
    Cron { expression: String, timezone: String },
}

impl Schedule {
    pub fn once(delay: Duration) -> Self {
        Schedule::Once { delay }
    }

    pub fn interval(period: Duration) -> Self {
        Schedule::Interval { period }
    }

    pub fn cron(expression: impl Into<String>, timezone: impl Into<String>) -> Self {
        Schedule::Cron {
            expression: expression.into(),
            timezone: timezone.into(),
        }
    }
}

/// How a definition reaches its handler.
#[derive(Clone)]
pub enum HandlerRef {
    /// Resolved at execution time through the handler registry.
    Named(String),

    /// Bound to the definition id when the definition is registered.
    Direct(Arc<dyn TaskHandler>),
}

impl HandlerRef {
    pub fn named(name: impl Into<String>) -> Self {
        HandlerRef::Named(name.into())
    }

    pub fn direct(handler: impl TaskHandler + 'static) -> Self {
        HandlerRef::Direct(Arc::new(handler))
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            HandlerRef::Direct(_) => f.write_str("Direct(..)"),
        }
    }
}

/// Execution policy. `None` fields fall back to the scheduler defaults.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    pub handler: HandlerRef,
    pub timeout: Option<Duration>,
    /// Additional attempts after the first one.
    pub retries: Option<u32>,
    /// Base delay of the exponential backoff between attempts.
    pub retry_delay: Option<Duration>,
}

impl ExecutionPolicy {
    pub fn new(handler: HandlerRef) -> Self {
        Self {
            handler,
            timeout: None,
            retries: None,
            retry_delay: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub id: DefinitionId,
    pub name: String,
    pub schedule: Schedule,
    pub execution: ExecutionPolicy,
    pub priority: Priority,
    pub enabled: bool,
}

impl TaskDefinition {
    pub fn new(
        id: impl Into<DefinitionId>,
        name: impl Into<String>,
        schedule: Schedule,
        handler: HandlerRef,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schedule,
            execution: ExecutionPolicy::new(handler),
            priority: Priority::Normal,
            enabled: true,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execution.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.execution.retries = Some(retries);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.execution.retry_delay = Some(retry_delay);
        self
    }

    /// Store the definition without arming its schedule.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
