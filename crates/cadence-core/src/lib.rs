//! cadence-core
//!
//! プロセス内タスクスケジューラ。
//! 定義 (TaskDefinition) は delay / interval / cron で fire し、
//! インスタンス (TaskInstance) は有界の優先度キューを通って timeout + 指数バックオフ付きで実行される。
//! ライフサイクルイベントは listener と broadcast に配信される。
//!
//! # モジュール構成
//! - **domain**: 定義・インスタンス・状態遷移・結果・イベント・エラー
//! - **ports**: 時刻と ID 生成の差し替え口
//! - **queue**: 実行キューの順序付けとリトライのバックオフ
//! - **runtime**: handler trait と registry
//! - **app**: `TaskScheduler` 本体、builder、config、timer、cron

pub mod app;
pub mod domain;
pub mod ports;
pub mod queue;
pub mod runtime;

pub use app::{
    BuildError, ConfigError, InstanceFilter, SchedulerBuilder, SchedulerConfig, SchedulerStats,
    TaskScheduler,
};
pub use domain::{
    DefinitionId, EventKind, HandlerError, HandlerRef, InstanceId, InstanceStatus, ListenerId,
    Priority, Schedule, SchedulerError, SchedulerEvent, TaskDefinition, TaskError, TaskInstance,
    TaskResult,
};
pub use runtime::{TaskContext, TaskHandler, handler_fn};
