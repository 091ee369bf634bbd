//! Serializable views handed to the Gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::pair::MatchRequestPair;
use super::state::{BatchState, PairStatus};

/// Point-in-time view of a batch task's counters.
///
/// Counters and state are copied under the same lock, so a terminal `state`
/// is never paired with stale counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub task_id: TaskId,
    pub state: BatchState,
    pub total_pairs: usize,
    pub completed_pairs: usize,
    pub failed_pairs: usize,

    /// Most recently started pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<MatchRequestPair>,

    /// Orchestrator-level failure message (`Failed` tasks only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    pub fn settled_pairs(&self) -> usize {
        self.completed_pairs + self.failed_pairs
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// One submitted pair and where it stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    pub index: usize,
    pub pair: MatchRequestPair,
    #[serde(flatten)]
    pub status: PairStatus,
}

/// Progress plus the per-pair breakdown, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    #[serde(flatten)]
    pub progress: ProgressSnapshot,
    pub pairs: Vec<PairReport>,
}
