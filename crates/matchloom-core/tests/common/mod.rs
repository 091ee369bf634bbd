#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use matchloom_core::domain::{
    Evaluation, EvaluationError, MatchId, MatchOutcome, MatchRequestPair, OutcomeDraft,
    ProgressSnapshot, StoreError, TaskId,
};
use matchloom_core::impls::InMemoryResultStore;
use matchloom_core::ports::{MatchEvaluator, ResultStore};
use matchloom_core::{BatchOrchestrator, MatchError};

pub const POLL: Duration = Duration::from_millis(5);

pub fn pairs(resumes: &[&str], job: &str) -> Vec<MatchRequestPair> {
    resumes
        .iter()
        .map(|r| MatchRequestPair::new(*r, job))
        .collect()
}

/// Evaluator whose behavior is picked by resume id:
/// - `missing*` fails with ResumeNotFound
/// - `slow*` sleeps for `slow_for`
/// - `panic*` panics
/// - `gated*` waits for a permit on `gate`
/// - anything else scores 80
pub struct ScriptedEvaluator {
    pub gate: Arc<Semaphore>,
    pub slow_for: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            slow_for: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_slow_for(mut self, slow_for: Duration) -> Self {
        self.slow_for = slow_for;
        self
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl MatchEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, pair: &MatchRequestPair) -> Result<Evaluation, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let resume = pair.resume_id.as_str();
        let result = if resume.starts_with("missing") {
            Err(EvaluationError::ResumeNotFound(pair.resume_id.clone()))
        } else if resume.starts_with("panic") {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("scripted panic for {resume}");
        } else {
            if resume.starts_with("slow") {
                tokio::time::sleep(self.slow_for).await;
            }
            if resume.starts_with("gated") {
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
            }
            tokio::task::yield_now().await;
            Ok(Evaluation::new(80.0))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Wraps an in-memory store and fails the first `failures` inserts with
/// `Unavailable`.
pub struct FlakyStore {
    inner: InMemoryResultStore,
    failures: AtomicUsize,
    pub insert_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryResultStore::default(),
            failures: AtomicUsize::new(failures),
            insert_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ResultStore for FlakyStore {
    async fn insert(&self, draft: OutcomeDraft) -> Result<MatchOutcome, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(format!("injected failure ({left} left)")));
        }
        self.inner.insert(draft).await
    }

    async fn get(&self, id: MatchId) -> Result<MatchOutcome, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<MatchOutcome>, StoreError> {
        self.inner.list().await
    }

    async fn delete(&self, id: MatchId) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        self.inner.clear().await
    }
}

pub async fn settle(orch: &BatchOrchestrator, task_id: TaskId) -> ProgressSnapshot {
    tokio::time::timeout(Duration::from_secs(10), orch.wait_until_settled(task_id, POLL))
        .await
        .expect("batch did not settle in time")
        .expect("task exists")
}

/// Poll until `check` holds for the task's progress.
pub async fn wait_for(
    orch: &BatchOrchestrator,
    task_id: TaskId,
    check: impl Fn(&ProgressSnapshot) -> bool,
) -> ProgressSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let progress = orch.progress(task_id).await.expect("task exists");
            if check(&progress) {
                return progress;
            }
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

pub fn assert_task_not_found(result: Result<ProgressSnapshot, MatchError>) {
    assert!(matches!(result, Err(MatchError::TaskNotFound(_))), "{result:?}");
}

pub fn distinct_ids(outcomes: &[MatchOutcome]) -> usize {
    outcomes.iter().map(|o| o.id).collect::<HashSet<_>>().len()
}
