//! State - バッチタスクとペアの状態
//!
//! # 状態遷移（BatchState）
//! - Pending -> Running -> Completed
//! - Pending -> Running -> CompletedWithErrors
//! - Pending -> Running -> Cancelled（未開始ペアがスキップされた場合のみ）
//! - Pending -> Failed（ペアが一つも開始される前にオーケストレータ側で失敗）
//!
//! 終端状態への遷移は一度だけ。

use serde::{Deserialize, Serialize};

use super::ids::MatchId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Registered; no evaluation has begun yet.
    Pending,

    /// At least one evaluation has begun.
    Running,

    /// Every pair produced an outcome.
    Completed,

    /// Every pair settled and at least one failed.
    CompletedWithErrors,

    /// Cancel was requested and at least one pair was skipped.
    Cancelled,

    /// The orchestrator failed before any pair started.
    Failed,
}

impl BatchState {
    /// Is this a terminal state (no further counter changes)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchState::Completed
                | BatchState::CompletedWithErrors
                | BatchState::Cancelled
                | BatchState::Failed
        )
    }
}

/// Status of one submitted pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairStatus {
    Queued,
    InFlight,
    Matched { outcome_id: MatchId },
    Failed { reason: String },
    /// Never started (cancel or shutdown). Counted as failed.
    Skipped { reason: String },
}

impl PairStatus {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PairStatus::Matched { .. } | PairStatus::Failed { .. } | PairStatus::Skipped { .. }
        )
    }
}
