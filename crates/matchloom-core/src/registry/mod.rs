//! TaskRegistry - in-flight and finished batch tasks, keyed by task id.
//!
//! Locking:
//! - The outer map is behind an `RwLock` that is held only long enough to
//!   look up (or insert/remove) a slot.
//! - Each task has its own `Mutex`. Counter updates, the terminal transition
//!   and snapshots all happen under that lock, so updates are linearizable
//!   per task and unrelated tasks never contend.
//! - No lock is held across an evaluator or store call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::domain::{
    BatchReport, BatchState, BatchTask, MatchError, MatchId, MatchRequestPair, PairStart,
    PairStatus, ProgressSnapshot, TaskId,
};
use crate::ports::Clock;

type Slot = Arc<Mutex<BatchTask>>;

/// Result of settling one pair.
#[derive(Debug, Clone)]
pub struct Settled {
    /// False when the pair had already settled (e.g. skipped by cancel).
    pub applied: bool,

    /// True only for the call that moved the task into its terminal state.
    pub finished: bool,

    pub progress: ProgressSnapshot,
}

pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Slot>>,
    clock: Arc<dyn Clock>,
}

impl TaskRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Register a new task in `Pending` with zeroed counters.
    pub async fn create(&self, task_id: TaskId, pairs: Vec<MatchRequestPair>) -> ProgressSnapshot {
        let task = BatchTask::new(task_id, pairs, self.clock.now());
        let snapshot = task.snapshot();
        self.tasks
            .write()
            .await
            .insert(task_id, Arc::new(Mutex::new(task)));
        debug!(%task_id, total_pairs = snapshot.total_pairs, "task registered");
        snapshot
    }

    async fn slot(&self, task_id: TaskId) -> Result<Slot, MatchError> {
        self.tasks
            .read()
            .await
            .get(&task_id)
            .cloned()
            .ok_or(MatchError::TaskNotFound(task_id))
    }

    /// Point-in-time snapshot of counters and state.
    pub async fn get(&self, task_id: TaskId) -> Result<ProgressSnapshot, MatchError> {
        let slot = self.slot(task_id).await?;
        let task = slot.lock().await;
        Ok(task.snapshot())
    }

    pub async fn report(&self, task_id: TaskId) -> Result<BatchReport, MatchError> {
        let slot = self.slot(task_id).await?;
        let task = slot.lock().await;
        Ok(task.report())
    }

    pub async fn begin_pair(&self, task_id: TaskId, index: usize) -> Result<PairStart, MatchError> {
        let slot = self.slot(task_id).await?;
        let mut task = slot.lock().await;
        Ok(task.begin_pair(index))
    }

    /// True while the pair is still waiting for a worker.
    pub async fn is_queued(&self, task_id: TaskId, index: usize) -> Result<bool, MatchError> {
        let slot = self.slot(task_id).await?;
        let task = slot.lock().await;
        Ok(task
            .pairs
            .get(index)
            .is_some_and(|r| r.status == PairStatus::Queued))
    }

    pub async fn increment_completed(
        &self,
        task_id: TaskId,
        index: usize,
        outcome_id: MatchId,
    ) -> Result<Settled, MatchError> {
        let now = self.clock.now();
        self.settle(task_id, |task| task.record_success(index, outcome_id, now))
            .await
    }

    pub async fn increment_failed(
        &self,
        task_id: TaskId,
        index: usize,
        reason: impl Into<String>,
    ) -> Result<Settled, MatchError> {
        let now = self.clock.now();
        let reason = reason.into();
        self.settle(task_id, |task| task.record_failure(index, reason, now))
            .await
    }

    /// Cancel a task. Queued pairs are skipped right away; a terminal task is
    /// left untouched.
    pub async fn cancel(&self, task_id: TaskId) -> Result<Settled, MatchError> {
        let now = self.clock.now();
        self.settle(task_id, |task| task.request_cancel(now)).await
    }

    /// The worker pool can no longer run this task's remaining pairs.
    pub async fn abandon(&self, task_id: TaskId, reason: &str) -> Result<Settled, MatchError> {
        let now = self.clock.now();
        self.settle(task_id, |task| {
            let before = task.settled_pairs();
            task.abandon(reason, now);
            task.settled_pairs() != before
        })
        .await
    }

    async fn settle(
        &self,
        task_id: TaskId,
        apply: impl FnOnce(&mut BatchTask) -> bool,
    ) -> Result<Settled, MatchError> {
        let slot = self.slot(task_id).await?;
        let mut task = slot.lock().await;
        let was_terminal = task.is_terminal();
        let applied = apply(&mut task);
        Ok(Settled {
            applied,
            finished: !was_terminal && task.is_terminal(),
            progress: task.snapshot(),
        })
    }

    /// Drop terminal tasks that finished at or before `older_than`.
    /// Tasks still running are never purged. Returns how many were removed.
    pub async fn purge(&self, older_than: DateTime<Utc>) -> usize {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, slot| match slot.try_lock() {
            Ok(task) => !matches!(task.finished_at, Some(at) if at <= older_than),
            // Busy means someone is touching it right now; look again next round.
            Err(_) => true,
        });
        let purged = before - tasks.len();
        if purged > 0 {
            info!(purged, remaining = tasks.len(), "purged finished tasks");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Number of tasks not yet in a terminal state.
    pub async fn active(&self) -> usize {
        let slots: Vec<Slot> = self.tasks.read().await.values().cloned().collect();
        let mut active = 0;
        for slot in slots {
            if !slot.lock().await.is_terminal() {
                active += 1;
            }
        }
        active
    }
}

impl Settled {
    pub fn state(&self) -> BatchState {
        self.progress.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use std::time::Duration;
    use ulid::Ulid;

    fn registry() -> (TaskRegistry, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        (TaskRegistry::new(clock.clone()), clock)
    }

    fn pairs(n: usize) -> Vec<MatchRequestPair> {
        (0..n)
            .map(|i| MatchRequestPair::new(format!("r-{i}"), "j-1"))
            .collect()
    }

    fn new_id() -> TaskId {
        TaskId::from_ulid(Ulid::new())
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (reg, _) = registry();
        let id = new_id();
        assert_eq!(reg.get(id).await, Err(MatchError::TaskNotFound(id)));
        assert!(matches!(
            reg.increment_failed(id, 0, "x").await,
            Err(MatchError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_then_get() {
        let (reg, _) = registry();
        let id = new_id();
        reg.create(id, pairs(3)).await;

        let progress = reg.get(id).await.unwrap();
        assert_eq!(progress.state, BatchState::Pending);
        assert_eq!(progress.total_pairs, 3);
        assert_eq!(reg.len().await, 1);
        assert_eq!(progress.settled_pairs(), 0);
    }

    #[tokio::test]
    async fn finished_is_reported_once() {
        let (reg, _) = registry();
        let id = new_id();
        reg.create(id, pairs(2)).await;

        reg.begin_pair(id, 0).await.unwrap();
        reg.begin_pair(id, 1).await.unwrap();
        let first = reg.increment_completed(id, 0, MatchId::from_ulid(Ulid::new())).await.unwrap();
        let last = reg.increment_failed(id, 1, "resume not found").await.unwrap();
        let late = reg.cancel(id).await.unwrap();

        assert!(!first.finished);
        assert!(last.finished);
        assert_eq!(last.state(), BatchState::CompletedWithErrors);
        assert!(!late.applied);
        assert!(!late.finished);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let (reg, _) = registry();
        let reg = Arc::new(reg);
        let id = new_id();
        let n = 200;
        reg.create(id, pairs(n)).await;

        let mut handles = Vec::new();
        for i in 0..n {
            let reg = Arc::clone(&reg);
            handles.push(tokio::spawn(async move {
                reg.begin_pair(id, i).await.unwrap();
                if i % 3 == 0 {
                    reg.increment_failed(id, i, "boom").await.unwrap()
                } else {
                    reg.increment_completed(id, i, MatchId::from_ulid(Ulid::new()))
                        .await
                        .unwrap()
                }
            }));
        }
        let mut finished = 0;
        for h in handles {
            if h.await.unwrap().finished {
                finished += 1;
            }
        }

        let progress = reg.get(id).await.unwrap();
        assert_eq!(finished, 1);
        assert_eq!(progress.settled_pairs(), n);
        assert_eq!(progress.failed_pairs, (0..n).filter(|i| i % 3 == 0).count());
        assert_eq!(progress.state, BatchState::CompletedWithErrors);
    }

    #[tokio::test]
    async fn purge_only_drops_old_terminal_tasks() {
        let (reg, clock) = registry();
        let done = new_id();
        let running = new_id();
        reg.create(done, pairs(1)).await;
        reg.create(running, pairs(1)).await;

        reg.begin_pair(done, 0).await.unwrap();
        reg.increment_completed(done, 0, MatchId::from_ulid(Ulid::new())).await.unwrap();
        reg.begin_pair(running, 0).await.unwrap();

        // Not old enough yet.
        let cutoff = clock.now() - chrono::Duration::seconds(60);
        assert_eq!(reg.purge(cutoff).await, 0);

        clock.advance(Duration::from_secs(120));
        let cutoff = clock.now() - chrono::Duration::seconds(60);
        assert_eq!(reg.purge(cutoff).await, 1);

        assert!(matches!(reg.get(done).await, Err(MatchError::TaskNotFound(_))));
        assert!(reg.get(running).await.is_ok());
        assert_eq!(reg.active().await, 1);
    }

    #[tokio::test]
    async fn abandon_pending_task_fails_it() {
        let (reg, _) = registry();
        let id = new_id();
        reg.create(id, pairs(2)).await;

        let settled = reg.abandon(id, "worker pool closed").await.unwrap();
        assert!(settled.finished);
        assert_eq!(settled.state(), BatchState::Failed);
        assert_eq!(settled.progress.error.as_deref(), Some("worker pool closed"));
    }
}
