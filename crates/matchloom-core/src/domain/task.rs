//! Batch task record: counters + per-pair status.

use chrono::{DateTime, Utc};

use super::ids::{MatchId, TaskId};
use super::pair::MatchRequestPair;
use super::progress::{BatchReport, PairReport, ProgressSnapshot};
use super::state::{BatchState, PairStatus};

/// What a worker should do with a pair it is about to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairStart {
    /// Evaluate it.
    Proceed,

    /// Already settled (skipped by cancel/shutdown). Nothing to do.
    Settled,
}

/// Bookkeeping for one submitted batch.
///
/// Design:
/// - This is the single source of truth for a batch's progress.
/// - Every pair settles exactly once, so `completed_pairs + failed_pairs`
///   never exceeds `total_pairs`.
/// - The terminal state is written in the same call that settles the last
///   pair.
#[derive(Debug, Clone)]
pub struct BatchTask {
    pub task_id: TaskId,
    pub state: BatchState,
    pub total_pairs: usize,
    pub completed_pairs: usize,
    pub failed_pairs: usize,
    pub pairs: Vec<PairReport>,

    /// Index of the most recently started pair.
    pub current: Option<usize>,
    pub cancel_requested: bool,
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchTask {
    pub fn new(task_id: TaskId, pairs: Vec<MatchRequestPair>, now: DateTime<Utc>) -> Self {
        let pairs: Vec<PairReport> = pairs
            .into_iter()
            .enumerate()
            .map(|(index, pair)| PairReport {
                index,
                pair,
                status: PairStatus::Queued,
            })
            .collect();
        Self {
            task_id,
            state: BatchState::Pending,
            total_pairs: pairs.len(),
            completed_pairs: 0,
            failed_pairs: 0,
            pairs,
            current: None,
            cancel_requested: false,
            error: None,
            created_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn settled_pairs(&self) -> usize {
        self.completed_pairs + self.failed_pairs
    }

    /// Mark a pair in flight. Moves the task from Pending to Running on the
    /// first call.
    pub fn begin_pair(&mut self, index: usize) -> PairStart {
        let Some(report) = self.pairs.get_mut(index) else {
            return PairStart::Settled;
        };
        if report.status != PairStatus::Queued {
            return PairStart::Settled;
        }
        report.status = PairStatus::InFlight;
        self.current = Some(index);
        if self.state == BatchState::Pending {
            self.state = BatchState::Running;
        }
        PairStart::Proceed
    }

    /// Settle a pair with its persisted outcome.
    pub fn record_success(&mut self, index: usize, outcome_id: MatchId, now: DateTime<Utc>) -> bool {
        self.settle(index, PairStatus::Matched { outcome_id }, now)
    }

    /// Settle a pair as failed.
    pub fn record_failure(
        &mut self,
        index: usize,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        self.settle(
            index,
            PairStatus::Failed {
                reason: reason.into(),
            },
            now,
        )
    }

    /// Stop scheduling new work. Queued pairs are skipped (counted as failed),
    /// in-flight pairs finish normally. Returns false on a terminal task.
    pub fn request_cancel(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.cancel_requested = true;
        self.skip_queued("cancelled", now);
        true
    }

    /// The worker pool is gone. A task that never started fails outright;
    /// otherwise its queued pairs are skipped.
    pub fn abandon(&mut self, reason: &str, now: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        if self.state == BatchState::Pending {
            self.error = Some(reason.to_string());
            self.state = BatchState::Failed;
            for report in &mut self.pairs {
                report.status = PairStatus::Skipped {
                    reason: reason.to_string(),
                };
            }
            self.failed_pairs = self.total_pairs - self.completed_pairs;
            self.finished_at = Some(now);
            return;
        }
        self.skip_queued(reason, now);
    }

    fn skip_queued(&mut self, reason: &str, now: DateTime<Utc>) {
        let queued: Vec<usize> = self
            .pairs
            .iter()
            .filter(|r| r.status == PairStatus::Queued)
            .map(|r| r.index)
            .collect();
        for index in queued {
            self.settle(
                index,
                PairStatus::Skipped {
                    reason: reason.to_string(),
                },
                now,
            );
        }
    }

    fn settle(&mut self, index: usize, status: PairStatus, now: DateTime<Utc>) -> bool {
        let Some(report) = self.pairs.get_mut(index) else {
            return false;
        };
        if report.status.is_settled() {
            return false;
        }
        if matches!(status, PairStatus::Matched { .. }) {
            self.completed_pairs += 1;
        } else {
            self.failed_pairs += 1;
        }
        report.status = status;
        self.finish_if_done(now);
        true
    }

    fn finish_if_done(&mut self, now: DateTime<Utc>) {
        if self.is_terminal() || self.completed_pairs + self.failed_pairs < self.total_pairs {
            return;
        }
        let skipped = self
            .pairs
            .iter()
            .any(|r| matches!(r.status, PairStatus::Skipped { .. }));
        self.state = if self.cancel_requested && skipped {
            BatchState::Cancelled
        } else if self.failed_pairs == 0 {
            BatchState::Completed
        } else {
            BatchState::CompletedWithErrors
        };
        self.finished_at = Some(now);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            task_id: self.task_id,
            state: self.state,
            total_pairs: self.total_pairs,
            completed_pairs: self.completed_pairs,
            failed_pairs: self.failed_pairs,
            current: self
                .current
                .and_then(|i| self.pairs.get(i))
                .map(|r| r.pair.clone()),
            error: self.error.clone(),
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }

    pub fn report(&self) -> BatchReport {
        BatchReport {
            progress: self.snapshot(),
            pairs: self.pairs.clone(),
        }
    }
}
