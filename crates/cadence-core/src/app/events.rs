//! EventBus - スケジューライベントの listener 管理と配信
//!
//! # 配信ルール
//! - listener は登録順に同期実行（スケジューラのロック外）
//! - panic した listener はログに残してスキップ
//! - 全イベントは broadcast channel にも流す（`subscribe()`）

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::error;

use crate::domain::{EventKind, ListenerId, SchedulerEvent};

pub type Listener = Arc<dyn Fn(&SchedulerEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    kind: EventKind,
    listener: Listener,
}

pub struct EventBus {
    listeners: RwLock<Vec<Registration>>,
    broadcast: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (broadcast, _) = broadcast::channel(buffer.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            broadcast,
        }
    }

    pub fn on(&self, id: ListenerId, kind: EventKind, listener: Listener) {
        self.listeners.write().push(Registration { id, kind, listener });
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|registration| registration.id != id);
        listeners.len() != before
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.broadcast.subscribe()
    }

    /// Deliver to matching listeners in registration order, then broadcast.
    ///
    /// Listeners are snapshotted first so a listener may call `on`/`off`
    /// without deadlocking. A panicking listener is logged and skipped.
    pub fn emit(&self, event: SchedulerEvent) {
        let kind = event.kind();
        let targets: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .iter()
            .filter(|registration| registration.kind == kind)
            .map(|registration| (registration.id, Arc::clone(&registration.listener)))
            .collect();

        for (id, listener) in targets {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                error!(listener = %id, event = %kind, "event listener panicked");
            }
        }

        // no receivers is fine
        let _ = self.broadcast.send(event);
    }
}
