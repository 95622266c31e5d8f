//! GCLoop - 終了済みインスタンスの定期削除
//!
//! `cleanup_interval_ms` が設定されていれば `start()` で arm され、
//! `stop()` で他の timer と一緒に disarm される。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::scheduler::{Inner, SchedulerState};
use super::timers::TimerKey;

pub(super) fn arm(inner: &Arc<Inner>, st: &mut SchedulerState, period: Duration) {
    let Some(first) = Instant::now().checked_add(period) else {
        warn!(?period, "cleanup interval out of range, periodic cleanup disabled");
        return;
    };
    let token = st.timers.next_token();
    let weak = Arc::downgrade(inner);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if !inner.state.lock().timers.is_current(&TimerKey::Cleanup, token) {
                break;
            }
            let removed = inner.cleanup(None);
            debug!(removed, "periodic cleanup");
        }
    });

    st.timers.arm(TimerKey::Cleanup, token, handle.abort_handle());
}
