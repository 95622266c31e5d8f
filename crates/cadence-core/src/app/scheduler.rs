//! TaskScheduler - 定義・インスタンス・実行キュー・timer を 1 つのハンドルにまとめる
//!
//! # 学習ポイント
//! - 状態は 1 本の `parking_lot::Mutex` に集約し、`.await` をまたいで保持しない
//! - イベントはロック解放後に emit する
//! - timer タスクは `Weak` + 世代トークンを持ち、古いトークンの fire は無視される

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::builder::SchedulerBuilder;
use super::config::SchedulerConfig;
use super::cron::CronSchedule;
use super::events::{EventBus, Listener};
use super::gc_loop;
use super::status::{InstanceFilter, SchedulerStats};
use super::timers::{TimerKey, TimerRegistry, TimerToken};
use crate::domain::{
    DefinitionId, EventKind, HandlerRef, InstanceId, InstanceStatus, ListenerId, Priority,
    Schedule, SchedulerError, SchedulerEvent, TaskDefinition, TaskError, TaskInstance,
    TaskResult,
};
use crate::ports::{Clock, IdGenerator};
use crate::queue::PriorityQueue;
use crate::runtime::{HandlerRegistry, TaskHandler};

/// Everything mutable, guarded by one lock that is never held across `.await`.
pub(super) struct SchedulerState {
    pub(super) definitions: HashMap<DefinitionId, TaskDefinition>,
    pub(super) instances: HashMap<InstanceId, TaskInstance>,
    pub(super) queue: PriorityQueue,
    pub(super) timers: TimerRegistry,
    pub(super) handlers: HandlerRegistry,
    pub(super) running: bool,
    /// Queued instances currently executing (`execute_now` is not counted).
    pub(super) running_count: usize,
}

impl SchedulerState {
    fn new(max_queue_size: usize, handlers: HandlerRegistry) -> Self {
        Self {
            definitions: HashMap::new(),
            instances: HashMap::new(),
            queue: PriorityQueue::new(max_queue_size),
            timers: TimerRegistry::new(),
            handlers,
            running: false,
            running_count: 0,
        }
    }

    /// Put a pending instance on the run queue. A full queue fails the
    /// instance and returns the event to emit once the lock is released.
    fn enqueue(&mut self, id: InstanceId, now: DateTime<Utc>) -> Option<SchedulerEvent> {
        let priority = self.instances.get(&id)?.priority;
        let Err(full) = self.queue.push(id, priority) else {
            return None;
        };

        warn!(instance = %id, capacity = full.capacity, "run queue full, dropping instance");
        let error = TaskError::QueueFull(full.capacity);
        let instance = self.instances.get_mut(&id)?;
        instance.mark_failed(now, error.clone());
        Some(SchedulerEvent::Failed {
            instance: instance.clone(),
            error,
            duration: Duration::ZERO,
        })
    }
}

pub(super) struct Inner {
    pub(super) config: SchedulerConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ids: Arc<dyn IdGenerator>,
    pub(super) events: EventBus,
    pub(super) state: Mutex<SchedulerState>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state.get_mut().timers.disarm_all();
    }
}

/// Cloneable handle to one scheduler. Clones share state.
///
/// Methods that arm timers or start work spawn Tokio tasks, so they must be
/// called from within a Tokio runtime.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(super) fn from_parts(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        handlers: HandlerRegistry,
    ) -> Self {
        let state = SchedulerState::new(config.max_queue_size, handlers);
        let events = EventBus::new(config.event_buffer);
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                ids,
                events,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // registration
    // ------------------------------------------------------------------

    /// Store a definition and, when enabled, arm its schedule.
    ///
    /// Registering an existing id replaces the definition and its schedule.
    pub fn register(&self, definition: TaskDefinition) -> Result<(), SchedulerError> {
        // 1) schedule を先に検証（失敗時は何も変更しない）
        let cron = match &definition.schedule {
            Schedule::Cron {
                expression,
                timezone,
            } => Some(CronSchedule::parse(expression, timezone)?),
            // 最初の tick とその次が Instant に収まること
            Schedule::Interval { period }
                if Instant::now().checked_add(period.saturating_mul(2)).is_none() =>
            {
                return Err(SchedulerError::InvalidInterval(*period));
            }
            _ => None,
        };

        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        let id = definition.id.clone();

        // 2) 古い schedule を止めてから差し替える
        st.timers.disarm(&TimerKey::Definition(id.clone()));
        if let HandlerRef::Direct(handler) = &definition.execution.handler {
            st.handlers.bind(id.clone(), Arc::clone(handler));
        }

        // 3) enabled なら arm
        if definition.enabled {
            self.inner.arm_schedule(st, &definition, cron);
        } else {
            debug!(definition = %id, "definition disabled, schedule not armed");
        }

        let replaced = st.definitions.insert(id.clone(), definition).is_some();
        info!(definition = %id, replaced, "registered task definition");
        Ok(())
    }

    /// Remove a definition, cancelling its pending instances.
    pub fn unregister(&self, id: &DefinitionId) -> bool {
        let now = self.inner.clock.now();
        let mut cancelled = Vec::new();
        let existed = {
            let mut guard = self.inner.state.lock();
            let st = &mut *guard;
            st.timers.disarm(&TimerKey::Definition(id.clone()));

            let pending: Vec<InstanceId> = st
                .instances
                .values()
                .filter(|i| &i.definition_id == id && i.status == InstanceStatus::Pending)
                .map(|i| i.id)
                .collect();
            for instance_id in pending {
                st.timers.disarm(&TimerKey::Instance(instance_id));
                st.queue.remove(instance_id);
                if let Some(instance) = st.instances.get_mut(&instance_id)
                    && instance.mark_cancelled(now)
                {
                    cancelled.push(SchedulerEvent::Cancelled {
                        instance: instance.clone(),
                    });
                }
            }

            st.handlers.unbind(id);
            st.definitions.remove(id).is_some()
        };

        info!(definition = %id, existed, cancelled = cancelled.len(), "unregistered task definition");
        for event in cancelled {
            self.inner.events.emit(event);
        }
        existed
    }

    /// Attach (or replace) the handler used for a definition id.
    pub fn bind_handler(&self, id: impl Into<DefinitionId>, handler: impl TaskHandler + 'static) {
        let id = id.into();
        debug!(definition = %id, "binding handler");
        self.inner.state.lock().handlers.bind(id, Arc::new(handler));
    }

    /// Register a handler that `HandlerRef::Named(name)` resolves to.
    pub fn register_handler(&self, name: impl Into<String>, handler: impl TaskHandler + 'static) {
        self.inner
            .state
            .lock()
            .handlers
            .register_named(name, Arc::new(handler));
    }

    // ------------------------------------------------------------------
    // manual execution and scheduling
    // ------------------------------------------------------------------

    /// Run a definition right away, bypassing the queue and the concurrency cap.
    pub async fn execute_now(
        &self,
        id: &DefinitionId,
        metadata: Option<serde_json::Value>,
    ) -> Result<TaskResult, SchedulerError> {
        let instance_id = {
            let mut guard = self.inner.state.lock();
            let st = &mut *guard;
            let definition = st
                .definitions
                .get(id)
                .ok_or_else(|| SchedulerError::DefinitionNotFound(id.clone()))?;
            let now = self.inner.clock.now();
            let instance = self
                .inner
                .new_instance(definition.id.clone(), definition.priority, now, now, metadata);
            let instance_id = instance.id;
            st.instances.insert(instance_id, instance);
            instance_id
        };

        debug!(definition = %id, instance = %instance_id, "executing now");
        Ok(self.inner.run_instance(instance_id).await)
    }

    /// Create an instance that runs at `at` (or as soon as possible if `at`
    /// is not in the future). Emits `task:scheduled`.
    pub fn schedule(
        &self,
        id: &DefinitionId,
        at: DateTime<Utc>,
        metadata: Option<serde_json::Value>,
    ) -> Result<TaskInstance, SchedulerError> {
        let (scheduled, queue_failure, enqueued) = {
            let mut guard = self.inner.state.lock();
            let st = &mut *guard;
            let definition = st
                .definitions
                .get(id)
                .ok_or_else(|| SchedulerError::DefinitionNotFound(id.clone()))?;
            let now = self.inner.clock.now();
            let instance = self
                .inner
                .new_instance(definition.id.clone(), definition.priority, now, at, metadata);
            let instance_id = instance.id;
            let scheduled = instance.clone();
            st.instances.insert(instance_id, instance);

            match (at - now).to_std() {
                Ok(delay) if !delay.is_zero() => {
                    self.inner.arm_instance_timer(st, instance_id, delay);
                    (scheduled, None, false)
                }
                _ => {
                    let failure = st.enqueue(instance_id, now);
                    (scheduled, failure, true)
                }
            }
        };

        debug!(definition = %id, instance = %scheduled.id, at = %at, "scheduled instance");
        self.inner.events.emit(SchedulerEvent::Scheduled {
            instance: scheduled.clone(),
        });
        if let Some(event) = queue_failure {
            self.inner.events.emit(event);
        }
        if enqueued {
            self.inner.drain();
        }
        Ok(scheduled)
    }

    /// `schedule` relative to the scheduler clock.
    pub fn schedule_after(
        &self,
        id: &DefinitionId,
        delay: Duration,
        metadata: Option<serde_json::Value>,
    ) -> Result<TaskInstance, SchedulerError> {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let now = self.inner.clock.now();
        let at = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.schedule(id, at, metadata)
    }

    /// Cancel a pending instance. Running or finished instances are left alone.
    pub fn cancel(&self, instance_id: InstanceId) -> bool {
        let now = self.inner.clock.now();
        let event = {
            let mut guard = self.inner.state.lock();
            let st = &mut *guard;
            let Some(instance) = st.instances.get_mut(&instance_id) else {
                return false;
            };
            if instance.status != InstanceStatus::Pending {
                return false;
            }
            st.timers.disarm(&TimerKey::Instance(instance_id));
            st.queue.remove(instance_id);
            instance.mark_cancelled(now);
            SchedulerEvent::Cancelled {
                instance: instance.clone(),
            }
        };

        debug!(instance = %instance_id, "cancelled instance");
        self.inner.events.emit(event);
        true
    }

    // ------------------------------------------------------------------
    // events
    // ------------------------------------------------------------------

    /// Listen for one kind of event. Listeners run synchronously on the task
    /// that emitted the event, in registration order.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        let id = self.inner.ids.generate_listener_id();
        let listener: Listener = Arc::new(listener);
        self.inner.events.on(id, kind, listener);
        id
    }

    pub fn off(&self, listener: ListenerId) -> bool {
        self.inner.events.off(listener)
    }

    /// Receive every event through a bounded broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    pub fn start(&self) {
        {
            let mut guard = self.inner.state.lock();
            let st = &mut *guard;
            if st.running {
                return;
            }
            st.running = true;
            if let Some(period) = self.inner.config.cleanup_interval() {
                gc_loop::arm(&self.inner, st, period);
            }
        }
        info!("scheduler started");
        self.inner.drain();
    }

    /// Stop draining the queue and disarm every timer. Queued instances stay
    /// queued; schedules are not rearmed by a later `start`.
    pub fn stop(&self) {
        let (was_running, disarmed) = {
            let mut st = self.inner.state.lock();
            let was_running = std::mem::replace(&mut st.running, false);
            (was_running, st.timers.disarm_all())
        };
        if was_running || disarmed > 0 {
            info!(disarmed, "scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Drop terminal instances older than `older_than` (default
    /// `cleanup_age`). Returns how many were removed.
    pub fn cleanup(&self, older_than: Option<Duration>) -> usize {
        self.inner.cleanup(older_than)
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    pub fn get_instance(&self, id: InstanceId) -> Option<TaskInstance> {
        self.inner.state.lock().instances.get(&id).cloned()
    }

    /// Matching instances, oldest first.
    pub fn get_instances(&self, filter: &InstanceFilter) -> Vec<TaskInstance> {
        let mut instances: Vec<TaskInstance> = self
            .inner
            .state
            .lock()
            .instances
            .values()
            .filter(|instance| filter.matches(instance))
            .cloned()
            .collect();
        instances.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        instances
    }

    pub fn get_definition(&self, id: &DefinitionId) -> Option<TaskDefinition> {
        self.inner.state.lock().definitions.get(id).cloned()
    }

    pub fn get_definitions(&self) -> Vec<TaskDefinition> {
        let mut definitions: Vec<TaskDefinition> =
            self.inner.state.lock().definitions.values().cloned().collect();
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        definitions
    }

    pub fn stats(&self) -> SchedulerStats {
        let st = self.inner.state.lock();
        SchedulerStats::collect(
            st.instances.values(),
            st.queue.len(),
            st.queue.capacity(),
            st.running_count,
            st.definitions.len(),
            st.timers.len(),
            st.running,
        )
    }
}

impl Inner {
    pub(super) fn new_instance(
        &self,
        definition_id: DefinitionId,
        priority: Priority,
        now: DateTime<Utc>,
        scheduled_at: DateTime<Utc>,
        metadata: Option<serde_json::Value>,
    ) -> TaskInstance {
        TaskInstance::new(
            self.ids.generate_instance_id(),
            definition_id,
            priority,
            now,
            scheduled_at,
            metadata,
        )
    }

    /// Start queued instances while below `max_concurrent`.
    ///
    /// The capacity check and the `running_count` increment happen under the
    /// same lock, so the cap holds on a multi-threaded runtime.
    pub(super) fn drain(self: &Arc<Self>) {
        // 1) ロック内で取り出す分だけ running_count を確保
        let ready: Vec<InstanceId> = {
            let mut st = self.state.lock();
            if !st.running {
                return;
            }
            let mut ready = Vec::new();
            while st.running_count < self.config.max_concurrent {
                let Some(id) = st.queue.pop() else {
                    break;
                };
                st.running_count += 1;
                ready.push(id);
            }
            ready
        };

        // 2) ロック外で spawn、終わったら枠を返して再度 drain
        for id in ready {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.run_instance(id).await;
                inner.state.lock().running_count -= 1;
                inner.drain();
            });
        }
    }

    pub(super) fn cleanup(&self, older_than: Option<Duration>) -> usize {
        let age = older_than.unwrap_or_else(|| self.config.cleanup_age());
        let threshold = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut st = self.state.lock();
        let before = st.instances.len();
        st.instances.retain(|_, instance| {
            !(instance.status.is_terminal() && instance.finished_or_created_at() < threshold)
        });
        let removed = before - st.instances.len();
        if removed > 0 {
            debug!(removed, threshold = %threshold, "cleaned up finished instances");
        }
        removed
    }

    fn arm_schedule(
        self: &Arc<Self>,
        st: &mut SchedulerState,
        definition: &TaskDefinition,
        cron: Option<CronSchedule>,
    ) {
        let key = TimerKey::Definition(definition.id.clone());
        let token = st.timers.next_token();
        let weak = Arc::downgrade(self);
        let id = definition.id.clone();

        let handle = match (&definition.schedule, cron) {
            (Schedule::Once { delay }, _) => {
                let delay = *delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    fire_definition(&weak, &id, token, true);
                })
            }
            (Schedule::Interval { period }, _) => {
                let period = if period.is_zero() {
                    warn!(definition = %id, "zero interval, using 1ms");
                    Duration::from_millis(1)
                } else {
                    *period
                };
                let Some(first) = Instant::now().checked_add(period) else {
                    warn!(definition = %id, ?period, "interval period out of range, not armed");
                    return;
                };
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval_at(first, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        if !fire_definition(&weak, &id, token, false) {
                            break;
                        }
                    }
                })
            }
            (Schedule::Cron { .. }, Some(cron)) => {
                let clock = Arc::clone(&self.clock);
                tokio::spawn(async move {
                    // 前回の fire 時刻より後だけを探す（壁時計が遅れても同じ instant で二度 fire しない）
                    let mut last_fire: Option<DateTime<Utc>> = None;
                    loop {
                        let now = clock.now();
                        let from = last_fire.map_or(now, |last| now.max(last));
                        let Some(next) = cron.next_after(from) else {
                            debug!(definition = %id, "cron schedule has no further fire times");
                            break;
                        };
                        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
                        tokio::time::sleep(delay).await;
                        if !fire_definition(&weak, &id, token, false) {
                            break;
                        }
                        last_fire = Some(next);
                    }
                })
            }
            (Schedule::Cron { .. }, None) => {
                warn!(definition = %definition.id, "cron schedule without parsed expression, not armed");
                return;
            }
        };

        st.timers.arm(key, token, handle.abort_handle());
        debug!(definition = %definition.id, schedule = ?definition.schedule, "armed schedule");
    }

    fn arm_instance_timer(self: &Arc<Self>, st: &mut SchedulerState, id: InstanceId, delay: Duration) {
        let token = st.timers.next_token();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire_instance(&weak, id, token);
        });
        st.timers.arm(TimerKey::Instance(id), token, handle.abort_handle());
    }
}

/// A definition's schedule fired: create an instance and queue it.
/// Returns false when the timer is no longer current (stop/unregister won).
fn fire_definition(weak: &Weak<Inner>, id: &DefinitionId, token: TimerToken, one_shot: bool) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };

    let failure = {
        let mut guard = inner.state.lock();
        let st = &mut *guard;
        let key = TimerKey::Definition(id.clone());
        let current = if one_shot {
            st.timers.take_if_current(&key, token)
        } else {
            st.timers.is_current(&key, token)
        };
        if !current {
            return false;
        }
        let Some(definition) = st.definitions.get(id) else {
            return false;
        };

        let now = inner.clock.now();
        let instance = inner.new_instance(id.clone(), definition.priority, now, now, None);
        let instance_id = instance.id;
        st.instances.insert(instance_id, instance);
        debug!(definition = %id, instance = %instance_id, "schedule fired");
        st.enqueue(instance_id, now)
    };

    if let Some(event) = failure {
        inner.events.emit(event);
    }
    inner.drain();
    true
}

fn fire_instance(weak: &Weak<Inner>, id: InstanceId, token: TimerToken) {
    let Some(inner) = weak.upgrade() else {
        return;
    };

    let failure = {
        let mut guard = inner.state.lock();
        let st = &mut *guard;
        if !st.timers.take_if_current(&TimerKey::Instance(id), token) {
            return;
        }
        match st.instances.get(&id) {
            Some(instance) if instance.status == InstanceStatus::Pending => {}
            _ => return,
        }
        st.enqueue(id, inner.clock.now())
    };

    if let Some(event) = failure {
        inner.events.emit(event);
    }
    inner.drain();
}
