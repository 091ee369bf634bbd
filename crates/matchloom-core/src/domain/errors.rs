//! Errors - エラー型と分類
//!
//! - `MatchError`: オーケストレータが Gateway に返すエラー
//! - `EvaluationError`: 評価器（外部）が返すペア単位のエラー
//! - `StoreError`: ResultStore が返すエラー
//!
//! ペア単位の評価エラーは failed_pairs に吸収され、Progress には伝播しない。

use thiserror::Error;

use super::ids::{MatchId, TaskId};
use super::pair::{JobId, ResumeId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    /// Empty or malformed submission. No task was created.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// Unknown or purged task id.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Unknown outcome id.
    #[error("match result not found: {0}")]
    NotFound(MatchId),

    #[error("result store unavailable: {0}")]
    StoreUnavailable(String),

    /// Only returned by the single-match path; batches record it in `failed_pairs`.
    #[error("evaluation failed: {0}")]
    EvaluationFailure(String),
}

/// Failure reported by a `MatchEvaluator` for one pair.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("resume not found: {0}")]
    ResumeNotFound(ResumeId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("evaluator unavailable: {0}")]
    Unavailable(String),

    #[error("evaluation timed out after {0} ms")]
    TimedOut(u64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("match result not found: {0}")]
    NotFound(MatchId),

    /// Transient; the orchestrator retries inserts that fail this way.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store data corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<StoreError> for MatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => MatchError::NotFound(id),
            other => MatchError::StoreUnavailable(other.to_string()),
        }
    }
}
