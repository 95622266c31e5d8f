//! Executor - インスタンス 1 件の実行
//!
//! # フロー
//! 1. 定義と handler を解決（失敗なら Running を経ずに Failed）
//! 2. Running に遷移し task:started
//! 3. timeout 付きで handler を実行、失敗なら指数バックオフで再試行
//! 4. 成功なら Completed、試行を使い切ったら Failed

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::scheduler::Inner;
use crate::domain::{
    DefinitionId, InstanceId, InstanceStatus, SchedulerEvent, TaskError, TaskResult,
};
use crate::queue::RetryPolicy;
use crate::runtime::{TaskContext, TaskHandler};

/// Everything an instance needs once it has been moved to `Running`.
struct Prepared {
    handler: Arc<dyn TaskHandler>,
    definition_id: DefinitionId,
    timeout: Duration,
    retry: RetryPolicy,
    metadata: Option<serde_json::Value>,
}

impl Inner {
    /// Drive one pending instance to a terminal state.
    ///
    /// Never returns an error: failures are encoded in the `TaskResult` and
    /// in the emitted events.
    pub(super) async fn run_instance(&self, id: InstanceId) -> TaskResult {
        let prepared = match self.prepare(id) {
            Ok((prepared, started)) => {
                self.events.emit(started);
                prepared
            }
            Err((result, event)) => {
                if let Some(event) = event {
                    self.events.emit(event);
                }
                return result;
            }
        };

        let started = Instant::now();
        let mut last_error = None;

        // 試行ループ（attempt は 0 始まり）
        for attempt in 0..prepared.retry.max_attempts() {
            let attempt_number = self
                .state
                .lock()
                .instances
                .get_mut(&id)
                .map(|instance| instance.record_attempt())
                .unwrap_or(attempt + 1);

            let ctx = TaskContext {
                instance_id: id,
                definition_id: prepared.definition_id.clone(),
                attempt: attempt_number,
                metadata: prepared.metadata.clone(),
            };

            match invoke(&prepared.handler, ctx, prepared.timeout).await {
                Ok(value) => {
                    let result = TaskResult::success(id, started.elapsed(), value.clone());
                    let event = {
                        let mut st = self.state.lock();
                        st.instances.get_mut(&id).map(|instance| {
                            instance.mark_completed(self.clock.now(), value);
                            SchedulerEvent::Completed {
                                instance: instance.clone(),
                                result: result.clone(),
                            }
                        })
                    };
                    info!(
                        instance = %id,
                        definition = %prepared.definition_id,
                        attempts = attempt_number,
                        duration_ms = result.duration.as_millis() as u64,
                        "task completed"
                    );
                    if let Some(event) = event {
                        self.events.emit(event);
                    }
                    return result;
                }
                Err(error) => {
                    // 試行が残っていればバックオフ後に再試行
                    let retry_delay = (attempt < prepared.retry.max_retries)
                        .then(|| prepared.retry.next_delay(attempt));
                    let event = {
                        let mut st = self.state.lock();
                        st.instances.get_mut(&id).map(|instance| {
                            instance.record_error(error.clone());
                            instance.clone()
                        })
                    };

                    if let Some(delay) = retry_delay {
                        warn!(
                            instance = %id,
                            attempt = attempt_number,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "task attempt failed, retrying"
                        );
                        if let Some(instance) = event {
                            self.events.emit(SchedulerEvent::Retrying {
                                instance,
                                attempt,
                                delay,
                                error: error.clone(),
                            });
                        }
                        last_error = Some(error);
                        tokio::time::sleep(delay).await;
                    } else {
                        last_error = Some(error);
                    }
                }
            }
        }

        // 試行を使い切った
        let error = last_error.unwrap_or_else(|| TaskError::Handler("no attempt was made".into()));
        let duration = started.elapsed();
        let event = {
            let mut st = self.state.lock();
            st.instances.get_mut(&id).map(|instance| {
                instance.mark_failed(self.clock.now(), error.clone());
                SchedulerEvent::Failed {
                    instance: instance.clone(),
                    error: error.clone(),
                    duration,
                }
            })
        };
        warn!(
            instance = %id,
            definition = %prepared.definition_id,
            error = %error,
            "task failed"
        );
        if let Some(event) = event {
            self.events.emit(event);
        }
        TaskResult::failure(id, duration, error)
    }

    /// Resolve definition and handler and move the instance to `Running`.
    ///
    /// On failure the instance (if it exists and is pending) goes straight to
    /// `Failed` without ever running.
    #[allow(clippy::type_complexity)]
    fn prepare(
        &self,
        id: InstanceId,
    ) -> Result<(Prepared, SchedulerEvent), (TaskResult, Option<SchedulerEvent>)> {
        let now = self.clock.now();
        let mut guard = self.state.lock();
        let st = &mut *guard;

        let Some(instance) = st.instances.get_mut(&id) else {
            let error = TaskError::InstanceNotRunnable(id);
            return Err((TaskResult::failure(id, Duration::ZERO, error), None));
        };
        if instance.status != InstanceStatus::Pending {
            let error = TaskError::InstanceNotRunnable(id);
            return Err((TaskResult::failure(id, Duration::ZERO, error), None));
        }

        let resolved = match st.definitions.get(&instance.definition_id) {
            None => Err(TaskError::DefinitionNotFound(instance.definition_id.clone())),
            Some(definition) => st
                .handlers
                .resolve(&definition.id, &definition.execution.handler)
                .map(|handler| {
                    let execution = &definition.execution;
                    let retry = RetryPolicy::exponential(
                        execution.retries.unwrap_or(self.config.default_retries),
                        execution
                            .retry_delay
                            .unwrap_or_else(|| self.config.default_retry_delay()),
                    );
                    (
                        handler,
                        execution
                            .timeout
                            .unwrap_or_else(|| self.config.default_timeout()),
                        retry,
                    )
                })
                .ok_or_else(|| TaskError::HandlerNotFound(definition.id.clone())),
        };

        match resolved {
            Ok((handler, timeout, retry)) => {
                instance.mark_running(now);
                debug!(instance = %id, definition = %instance.definition_id, "task started");
                Ok((
                    Prepared {
                        handler,
                        definition_id: instance.definition_id.clone(),
                        timeout,
                        retry,
                        metadata: instance.metadata.clone(),
                    },
                    SchedulerEvent::Started {
                        instance: instance.clone(),
                    },
                ))
            }
            Err(error) => {
                warn!(instance = %id, error = %error, "cannot run task");
                instance.mark_failed(now, error.clone());
                let event = SchedulerEvent::Failed {
                    instance: instance.clone(),
                    error: error.clone(),
                    duration: Duration::ZERO,
                };
                Err((TaskResult::failure(id, Duration::ZERO, error), Some(event)))
            }
        }
    }
}

/// Run the handler on its own task so a timeout can abort it and a panic
/// stays contained.
async fn invoke(
    handler: &Arc<dyn TaskHandler>,
    ctx: TaskContext,
    timeout: Duration,
) -> Result<serde_json::Value, TaskError> {
    let handler = Arc::clone(handler);
    let mut join = tokio::spawn(async move { handler.handle(ctx).await });

    match tokio::time::timeout(timeout, &mut join).await {
        Err(_) => {
            join.abort();
            Err(TaskError::Timeout(timeout))
        }
        Ok(Ok(outcome)) => outcome.map_err(TaskError::from),
        Ok(Err(join_error)) if join_error.is_panic() => {
            Err(TaskError::Handler("task handler panicked".into()))
        }
        Ok(Err(_)) => Err(TaskError::Handler("task handler was aborted".into())),
    }
}
