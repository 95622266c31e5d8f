//! SchedulerBuilder - `TaskScheduler` の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - Clock / IdGenerator の差し替え（テスト容易性）

use std::sync::Arc;

use tracing::warn;

use super::config::{ConfigError, SchedulerConfig};
use super::scheduler::TaskScheduler;
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
use crate::runtime::{HandlerRegistry, TaskHandler};

/// SchedulerBuilder はスケジューラを構築
///
/// # 使用例
/// ```ignore
/// let scheduler = TaskScheduler::builder()
///     .config(SchedulerConfig::from_file("cadence.toml")?)
///     .handler("report", ReportHandler)
///     .expect_handlers(&["report"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_handlers() で期待される handler 名を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError::MissingHandlers を返す
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    handlers: HandlerRegistry,
    expected_handlers: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing named handlers: {0:?}")]
    MissingHandlers(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            clock: None,
            ids: None,
            handlers: HandlerRegistry::new(),
            expected_handlers: None,
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Register a named handler up front.
    pub fn handler(mut self, name: impl Into<String>, handler: impl TaskHandler + 'static) -> Self {
        self.handlers.register_named(name, Arc::new(handler));
        self
    }

    pub fn expect_handlers(mut self, names: &[&str]) -> Self {
        self.expected_handlers = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<TaskScheduler, BuildError> {
        // 1) config の検証
        self.config.validate()?;

        // 2) 期待される handler が揃っているか
        if let Some(expected) = &self.expected_handlers {
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !self.handlers.has_named(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingHandlers(missing));
            }
        }

        if self.config.persistence {
            warn!("persistence is not supported; scheduler state is in-memory only");
        }

        // 3) 未指定の port はデフォルト実装
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        Ok(TaskScheduler::from_parts(self.config, clock, ids, self.handlers))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HandlerError;
    use crate::runtime::handler_fn;

    fn noop() -> impl TaskHandler {
        handler_fn(|_ctx| async { Ok::<_, HandlerError>(serde_json::Value::Null) })
    }

    #[test]
    fn build_success() {
        let scheduler = TaskScheduler::builder()
            .handler("report", noop())
            .expect_handlers(&["report"])
            .build();
        assert!(scheduler.is_ok());
    }

    #[test]
    fn build_missing_handlers() {
        let scheduler = TaskScheduler::builder()
            .handler("report", noop())
            .expect_handlers(&["report", "sync"])
            .build();
        assert!(matches!(
            scheduler,
            Err(BuildError::MissingHandlers(missing)) if missing == vec!["sync".to_string()]
        ));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let config = SchedulerConfig {
            max_concurrent: 0,
            ..SchedulerConfig::default()
        };
        let scheduler = TaskScheduler::builder().config(config).build();
        assert!(matches!(scheduler, Err(BuildError::Config(_))));
    }
}
