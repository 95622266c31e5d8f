//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock のタイムスタンプ + 乱数

use std::sync::Arc;

use crate::domain::{InstanceId, ListenerId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_instance_id(&self) -> InstanceId;

    fn generate_listener_id(&self) -> ListenerId;
}

/// ULID generator driven by a `Clock`, so a `FixedClock` yields ids with a
/// deterministic timestamp part.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_instance_id(&self) -> InstanceId {
        InstanceId::from(self.next_ulid())
    }

    fn generate_listener_id(&self) -> ListenerId {
        ListenerId::from(self.next_ulid())
    }
}
