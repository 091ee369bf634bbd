//! matchloom-core
//!
//! Core building blocks for asynchronous resume/job batch matching.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, pair, state, task, outcome, progress, errors）
//! - **ports**: 抽象化レイヤー（MatchEvaluator, ResultStore, Clock, IdGenerator）
//! - **registry**: TaskRegistry（タスクごとの進捗と終端遷移）
//! - **app**: アプリケーションロジック（builder, orchestrator, retention, retry）
//! - **impls**: 実装（InMemoryResultStore, JsonFileResultStore）
//! - **config**: OrchestratorConfig（TOML + 環境変数）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod registry;

pub use app::{BatchOrchestrator, BuildError, OrchestratorBuilder, RetentionLoop, RetryPolicy};
pub use config::{ConfigError, OrchestratorConfig};
pub use domain::{
    BatchReport, BatchState, Evaluation, EvaluationError, JobId, MatchDetail, MatchError,
    MatchId, MatchOutcome, MatchRequestPair, PairStatus, ProgressSnapshot, ResumeId, StoreError,
    TaskId,
};
