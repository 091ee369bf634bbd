//! MatchEvaluator port - 外部の採点ロジック
//!
//! 履歴書と求人を比較するアルゴリズム自体はこのクレートの外にある。
//! オーケストレータはこの trait 越しに 1 ペアずつ呼び出すだけ。

use async_trait::async_trait;

use crate::domain::{Evaluation, EvaluationError, MatchRequestPair};

/// Scores one resume against one job.
///
/// Implementations may block on external resources (fetching resume text,
/// calling a model). The orchestrator holds no registry lock while this runs.
/// Unknown ids are reported as `ResumeNotFound` / `JobNotFound`.
#[async_trait]
pub trait MatchEvaluator: Send + Sync {
    async fn evaluate(&self, pair: &MatchRequestPair) -> Result<Evaluation, EvaluationError>;
}
