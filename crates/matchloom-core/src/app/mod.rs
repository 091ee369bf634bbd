//! App - アプリケーション層
//!
//! このモジュールは、ports と registry を組み合わせてオーケストレーションを実装します。
//!
//! # 主要コンポーネント
//! - **OrchestratorBuilder**: オーケストレータの構築とワイヤリング
//! - **BatchOrchestrator**: submit / progress / cancel / 結果管理
//! - **RetentionLoop**: 終端タスクの定期 purge
//! - **RetryPolicy**: ストア書き込みのバックオフ

pub mod builder;
pub mod orchestrator;
pub mod retention;
pub mod retry;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, OrchestratorBuilder};
pub use self::orchestrator::BatchOrchestrator;
pub use self::retention::{RetentionLoop, purge_expired};
pub use self::retry::RetryPolicy;
