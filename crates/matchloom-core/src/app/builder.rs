//! OrchestratorBuilder - オーケストレータの構築とワイヤリング
//!
//! # 方針
//! - 評価器だけ必須。ストア・時計・ID 生成器は省略時にデフォルトを使う
//! - 起動時検証（Fail-fast 設計）: 設定値が不正なら build() が BuildError を返す

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::app::orchestrator::{BatchOrchestrator, Inner};
use crate::config::{ConfigError, OrchestratorConfig};
use crate::impls::InMemoryResultStore;
use crate::ports::{Clock, IdGenerator, MatchEvaluator, ResultStore, SystemClock, UlidGenerator};
use crate::registry::TaskRegistry;

/// OrchestratorBuilder は BatchOrchestrator を構築
///
/// # 使用例
/// ```ignore
/// let orchestrator = BatchOrchestrator::builder(Arc::new(MyEvaluator))
///     .with_store(Arc::new(store))
///     .with_config(config)
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    evaluator: Arc<dyn MatchEvaluator>,
    store: Option<Arc<dyn ResultStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: OrchestratorConfig,
}

/// BuildError はオーケストレータ構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid orchestrator configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl OrchestratorBuilder {
    pub fn new(evaluator: Arc<dyn MatchEvaluator>) -> Self {
        Self {
            evaluator,
            store: None,
            clock: None,
            ids: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// 省略時は InMemoryResultStore
    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// 設定を検証して BatchOrchestrator を生成
    ///
    /// # 検証
    /// - `OrchestratorConfig::validate()` が失敗したら BuildError::InvalidConfig
    pub fn build(self) -> Result<BatchOrchestrator, BuildError> {
        self.config.validate()?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let store: Arc<dyn ResultStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryResultStore::new(Arc::clone(&ids))));

        info!(
            max_concurrency = self.config.max_concurrency,
            max_batch_size = self.config.max_batch_size,
            evaluation_timeout_ms = self
                .config
                .evaluation_timeout
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            "orchestrator ready"
        );

        Ok(BatchOrchestrator::from_inner(Inner {
            registry: Arc::new(TaskRegistry::new(Arc::clone(&clock))),
            store,
            evaluator: self.evaluator,
            ids,
            clock,
            permits: Arc::new(Semaphore::new(self.config.max_concurrency)),
            drivers: TaskTracker::new(),
            config: self.config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Evaluation, EvaluationError, MatchRequestPair};
    use crate::ports::FixedClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct Constant;

    #[async_trait]
    impl MatchEvaluator for Constant {
        async fn evaluate(&self, _pair: &MatchRequestPair) -> Result<Evaluation, EvaluationError> {
            Ok(Evaluation::new(50.0))
        }
    }

    #[test]
    fn test_build_with_defaults() {
        let orch = OrchestratorBuilder::new(Arc::new(Constant)).build();
        assert!(orch.is_ok());
    }

    #[test]
    fn test_build_invalid_config() {
        let config = OrchestratorConfig {
            max_concurrency: 0,
            ..OrchestratorConfig::default()
        };
        let orch = OrchestratorBuilder::new(Arc::new(Constant))
            .with_config(config)
            .build();
        assert!(matches!(
            orch,
            Err(BuildError::InvalidConfig(ConfigError::Invalid(_)))
        ));
    }

    #[tokio::test]
    async fn test_build_with_huge_timeout() {
        let config = OrchestratorConfig {
            evaluation_timeout: Some(std::time::Duration::MAX),
            ..OrchestratorConfig::default()
        };
        let orch = OrchestratorBuilder::new(Arc::new(Constant))
            .with_config(config)
            .build()
            .unwrap();

        let outcome = orch.match_one(MatchRequestPair::new("r-1", "j-1")).await.unwrap();
        assert_eq!(outcome.score, 50.0);
    }

    #[tokio::test]
    async fn test_injected_clock_stamps_tasks() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let orch = OrchestratorBuilder::new(Arc::new(Constant))
            .with_clock(Arc::new(FixedClock::new(at)))
            .build()
            .unwrap();

        let task_id = orch
            .submit(vec![MatchRequestPair::new("r-1", "j-1")])
            .await
            .unwrap();
        assert_eq!(orch.progress(task_id).await.unwrap().created_at, at);
    }
}
