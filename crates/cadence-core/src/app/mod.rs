//! App - スケジューラ本体とその周辺
//!
//! # 構成要素
//! - **TaskScheduler**: 公開ハンドル（登録・スケジュール・ライフサイクル・参照）
//! - **executor**: インスタンス単位の試行ループ（timeout + バックオフ）
//! - **timers**: 世代トークン付きの timer 管理
//! - **cron**: タイムゾーン付き cron 式の評価
//! - **events**: listener 登録と broadcast 配信
//! - **gc_loop**: 終了済みインスタンスの定期掃除
//! - **SchedulerBuilder / SchedulerConfig**: 構築と設定

pub mod builder;
pub mod config;
pub mod cron;
pub mod events;
mod executor;
mod gc_loop;
pub mod scheduler;
pub mod status;
mod timers;


pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::config::{ConfigError, SchedulerConfig};
pub use self::cron::CronSchedule;
pub use self::scheduler::TaskScheduler;
pub use self::status::{InstanceFilter, SchedulerStats};
