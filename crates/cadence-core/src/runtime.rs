use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{DefinitionId, HandlerError, HandlerRef, InstanceId};

/// What a handler gets to see about the instance it is running.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub instance_id: InstanceId,
    pub definition_id: DefinitionId,
    /// 1-based attempt number.
    pub attempt: u32,
    pub metadata: Option<serde_json::Value>,
}

/// The unit of work a definition runs.
///
/// Handlers may be dropped mid-flight when they exceed their timeout, so any
/// cleanup they need must live in `Drop` impls rather than after an `.await`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: TaskContext) -> Result<serde_json::Value, HandlerError>;
}

/// Adapter turning an async closure into a `TaskHandler`.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, ctx: TaskContext) -> Result<serde_json::Value, HandlerError> {
        (self.f)(ctx).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

/// Handlers known to a scheduler.
///
/// Two tables:
/// - bound: definition id -> handler (direct handlers and `bind_handler`)
/// - named: name -> handler (targets of `HandlerRef::Named`)
///
/// Both are "last wins"; re-binding replaces silently.
#[derive(Default)]
pub struct HandlerRegistry {
    bound: HashMap<DefinitionId, Arc<dyn TaskHandler>>,
    named: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, definition_id: DefinitionId, handler: Arc<dyn TaskHandler>) {
        self.bound.insert(definition_id, handler);
    }

    pub fn unbind(&mut self, definition_id: &DefinitionId) -> bool {
        self.bound.remove(definition_id).is_some()
    }

    pub fn register_named(&mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.named.insert(name.into(), handler);
    }

    pub fn has_named(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// A handler bound to the definition wins over a named one.
    pub fn resolve(
        &self,
        definition_id: &DefinitionId,
        handler_ref: &HandlerRef,
    ) -> Option<Arc<dyn TaskHandler>> {
        if let Some(handler) = self.bound.get(definition_id) {
            return Some(Arc::clone(handler));
        }
        match handler_ref {
            HandlerRef::Named(name) => self.named.get(name).cloned(),
            HandlerRef::Direct(handler) => Some(Arc::clone(handler)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn ctx(def: &str) -> TaskContext {
        TaskContext {
            instance_id: InstanceId::from_ulid(Ulid::new()),
            definition_id: DefinitionId::from(def),
            attempt: 1,
            metadata: None,
        }
    }

    fn constant(value: &'static str) -> Arc<dyn TaskHandler> {
        Arc::new(handler_fn(move |_ctx| async move {
            Ok::<_, HandlerError>(serde_json::json!(value))
        }))
    }

    #[tokio::test]
    async fn closure_handler_sees_context() {
        let handler = handler_fn(|ctx: TaskContext| async move {
            Ok::<_, HandlerError>(serde_json::json!({
                "def": ctx.definition_id.as_str(),
                "attempt": ctx.attempt,
            }))
        });
        let out = handler.handle(ctx("t1")).await.unwrap();
        assert_eq!(out["def"], "t1");
        assert_eq!(out["attempt"], 1);
    }

    #[tokio::test]
    async fn bound_handler_wins_over_named() {
        let mut reg = HandlerRegistry::new();
        reg.register_named("report", constant("named"));
        reg.bind(DefinitionId::from("t1"), constant("bound"));

        let handler = reg
            .resolve(&DefinitionId::from("t1"), &HandlerRef::named("report"))
            .unwrap();
        assert_eq!(handler.handle(ctx("t1")).await.unwrap(), "bound");

        let handler = reg
            .resolve(&DefinitionId::from("t2"), &HandlerRef::named("report"))
            .unwrap();
        assert_eq!(handler.handle(ctx("t2")).await.unwrap(), "named");
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        let reg = HandlerRegistry::new();
        assert!(
            reg.resolve(&DefinitionId::from("t1"), &HandlerRef::named("missing"))
                .is_none()
        );
    }

    #[test]
    fn unbind_removes_binding() {
        let mut reg = HandlerRegistry::new();
        reg.bind(DefinitionId::from("t1"), constant("x"));
        assert!(reg.unbind(&DefinitionId::from("t1")));
        assert!(!reg.unbind(&DefinitionId::from("t1")));
    }
}
