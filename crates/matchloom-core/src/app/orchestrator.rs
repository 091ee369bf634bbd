//! BatchOrchestrator - バッチ投入・進捗照会・結果管理の入口
//!
//! # フロー
//! 1. `submit()` で入力を検証し、Pending の BatchTask を登録して TaskId を即座に返す
//! 2. バックグラウンドの driver がペアごとに Semaphore の permit を取得して worker を起動
//! 3. worker: begin_pair → evaluate（timeout 付き）→ ResultStore::insert（retry 付き）→ increment
//! 4. 最後のペアが settle した時点で終端状態に遷移
//!
//! # 並行性
//! - 全バッチ共通の Semaphore で同時評価数を `max_concurrency` に制限する
//! - 上限を超えたペアは待つだけで、捨てられない
//! - worker が panic しても JoinSet 経由で検出し、そのペアを failed として数える

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::app::builder::OrchestratorBuilder;
use crate::app::retention::{RetentionLoop, purge_expired};
use crate::config::OrchestratorConfig;
use crate::domain::{
    BatchReport, Evaluation, EvaluationError, JobId, MatchError, MatchId, MatchOutcome,
    MatchRequestPair, OutcomeDraft, PairStart, PairStatus, ProgressSnapshot, ResumeId, StoreError,
    TaskId,
};
use crate::ports::{Clock, IdGenerator, MatchEvaluator, ResultStore};
use crate::registry::TaskRegistry;

const SHUTDOWN_REASON: &str = "orchestrator shut down";
const PANIC_REASON: &str = "evaluation panicked";

/// Cheap to clone; clones share the registry, store and worker pool.
#[derive(Clone)]
pub struct BatchOrchestrator {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) store: Arc<dyn ResultStore>,
    pub(crate) evaluator: Arc<dyn MatchEvaluator>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) permits: Arc<Semaphore>,
    /// Every batch driver spawned by `launch`.
    pub(crate) drivers: TaskTracker,
    pub(crate) config: OrchestratorConfig,
}

impl BatchOrchestrator {
    pub fn builder(evaluator: Arc<dyn MatchEvaluator>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(evaluator)
    }

    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    /// Accept a batch and return its id right away. Evaluation happens in the
    /// background; poll `progress` to follow it.
    ///
    /// Fails with `InvalidBatch` (and creates no task) when the batch is
    /// empty, too large, contains a blank id, or the orchestrator is shut down.
    pub async fn submit(&self, pairs: Vec<MatchRequestPair>) -> Result<TaskId, MatchError> {
        let (task_id, _driver) = self.launch(pairs).await?;
        Ok(task_id)
    }

    /// Match many resumes against one job.
    pub async fn submit_for_job(
        &self,
        job_id: &JobId,
        resume_ids: impl IntoIterator<Item = ResumeId>,
    ) -> Result<TaskId, MatchError> {
        let pairs = resume_ids
            .into_iter()
            .map(|resume_id| MatchRequestPair {
                resume_id,
                job_id: job_id.clone(),
            })
            .collect();
        self.submit(pairs).await
    }

    pub async fn progress(&self, task_id: TaskId) -> Result<ProgressSnapshot, MatchError> {
        self.inner.registry.get(task_id).await
    }

    /// Progress plus the status of every pair, in submission order.
    pub async fn report(&self, task_id: TaskId) -> Result<BatchReport, MatchError> {
        self.inner.registry.report(task_id).await
    }

    /// Poll until the task reaches a terminal state.
    pub async fn wait_until_settled(
        &self,
        task_id: TaskId,
        poll_every: Duration,
    ) -> Result<ProgressSnapshot, MatchError> {
        loop {
            let progress = self.progress(task_id).await?;
            if progress.is_terminal() {
                return Ok(progress);
            }
            tokio::time::sleep(poll_every).await;
        }
    }

    /// Stop scheduling the task's queued pairs. Pairs already being evaluated
    /// run to completion. Cancelling a finished task changes nothing.
    pub async fn cancel(&self, task_id: TaskId) -> Result<ProgressSnapshot, MatchError> {
        let settled = self.inner.registry.cancel(task_id).await?;
        if settled.applied {
            info!(
                %task_id,
                skipped = settled.progress.failed_pairs,
                state = ?settled.state(),
                "batch cancel requested"
            );
        }
        Ok(settled.progress)
    }

    /// Evaluate one pair and wait for its stored outcome.
    ///
    /// Goes through the same pool as batches. Unlike a batch, an evaluation
    /// failure is returned to the caller as `EvaluationFailure`.
    pub async fn match_one(&self, pair: MatchRequestPair) -> Result<MatchOutcome, MatchError> {
        let (task_id, driver) = self.launch(vec![pair]).await?;
        if let Err(e) = driver.await {
            error!(%task_id, error = %e, "single-match driver did not finish");
        }

        let report = self.inner.registry.report(task_id).await?;
        match report.pairs.into_iter().next().map(|r| r.status) {
            Some(PairStatus::Matched { outcome_id }) => Ok(self.inner.store.get(outcome_id).await?),
            Some(PairStatus::Failed { reason }) | Some(PairStatus::Skipped { reason }) => {
                Err(MatchError::EvaluationFailure(reason))
            }
            _ => Err(MatchError::EvaluationFailure(
                "match did not settle".to_string(),
            )),
        }
    }

    /// Stored outcomes, newest first.
    pub async fn list_results(&self) -> Result<Vec<MatchOutcome>, MatchError> {
        Ok(self.inner.store.list().await?)
    }

    pub async fn get_result(&self, id: MatchId) -> Result<MatchOutcome, MatchError> {
        Ok(self.inner.store.get(id).await?)
    }

    pub async fn delete_result(&self, id: MatchId) -> Result<(), MatchError> {
        self.inner.store.delete(id).await?;
        info!(match_id = %id, "match result deleted");
        Ok(())
    }

    /// Remove every stored outcome. Returns how many were removed.
    pub async fn clear_results(&self) -> Result<usize, MatchError> {
        let removed = self.inner.store.clear().await?;
        info!(removed, "match results cleared");
        Ok(removed)
    }

    /// Drop finished tasks older than the configured retention.
    pub async fn purge_expired(&self) -> usize {
        purge_expired(
            &self.inner.registry,
            self.inner.clock.as_ref(),
            self.inner.config.retention,
        )
        .await
    }

    /// Spawn the background loop that purges expired tasks every
    /// `purge_interval`.
    pub fn start_retention(&self) -> RetentionLoop {
        RetentionLoop::spawn(
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.clock),
            self.inner.config.retention,
            self.inner.config.purge_interval,
        )
    }

    /// Close the worker pool. In-flight evaluations finish; pairs that have
    /// not started yet are counted as failed. New submissions are rejected.
    pub fn shutdown(&self) {
        if !self.inner.permits.is_closed() {
            self.inner.permits.close();
            info!("orchestrator shutting down");
        }
        self.inner.drivers.close();
    }

    /// `shutdown`, then wait until every batch driver (and so every in-flight
    /// evaluation and store write) has finished.
    pub async fn shutdown_and_join(&self) {
        self.shutdown();
        self.inner.drivers.wait().await;
        info!(tracked_tasks = self.inner.registry.len().await, "orchestrator stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.permits.is_closed()
    }

    async fn launch(
        &self,
        pairs: Vec<MatchRequestPair>,
    ) -> Result<(TaskId, JoinHandle<()>), MatchError> {
        self.validate(&pairs)?;

        let task_id = self.inner.ids.generate_task_id();
        self.inner.registry.create(task_id, pairs.clone()).await;
        info!(%task_id, total_pairs = pairs.len(), "batch submitted");

        let inner = Arc::clone(&self.inner);
        let driver = self
            .inner
            .drivers
            .spawn(async move { inner.drive(task_id, pairs).await });
        Ok((task_id, driver))
    }

    fn validate(&self, pairs: &[MatchRequestPair]) -> Result<(), MatchError> {
        if self.is_shut_down() {
            return Err(MatchError::InvalidBatch(SHUTDOWN_REASON.to_string()));
        }
        if pairs.is_empty() {
            return Err(MatchError::InvalidBatch("batch contains no pairs".to_string()));
        }
        let limit = self.inner.config.max_batch_size;
        if pairs.len() > limit {
            return Err(MatchError::InvalidBatch(format!(
                "batch has {} pairs, limit is {limit}",
                pairs.len()
            )));
        }
        if let Some(index) = pairs.iter().position(MatchRequestPair::is_malformed) {
            return Err(MatchError::InvalidBatch(format!(
                "pair {index} has a blank resume or job id"
            )));
        }
        Ok(())
    }
}

impl Inner {
    /// Feed the task's pairs into the shared pool, then wait for every worker.
    async fn drive(self: Arc<Self>, task_id: TaskId, pairs: Vec<MatchRequestPair>) {
        let mut workers = JoinSet::new();
        let mut indices = HashMap::new();

        for (index, pair) in pairs.into_iter().enumerate() {
            // Skipped by cancel; don't wait for a permit just to do nothing.
            match self.registry.is_queued(task_id, index).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => break,
            }

            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    match self.registry.abandon(task_id, SHUTDOWN_REASON).await {
                        Ok(settled) if settled.finished => info!(
                            %task_id,
                            state = ?settled.state(),
                            failed = settled.progress.failed_pairs,
                            "batch settled"
                        ),
                        Ok(_) => debug!(%task_id, "remaining pairs skipped on shutdown"),
                        Err(e) => debug!(%task_id, error = %e, "task gone before shutdown"),
                    }
                    break;
                }
            };

            let inner = Arc::clone(&self);
            let handle = workers.spawn(async move {
                let _permit = permit;
                inner.run_pair(task_id, index, pair).await;
            });
            indices.insert(handle.id(), index);
        }

        while let Some(joined) = workers.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    indices.remove(&id);
                }
                Err(e) => {
                    let Some(index) = indices.remove(&e.id()) else {
                        continue;
                    };
                    error!(%task_id, pair_index = index, error = %e, "pair worker panicked");
                    self.settle_failed(task_id, index, PANIC_REASON).await;
                }
            }
        }
    }

    async fn run_pair(&self, task_id: TaskId, index: usize, pair: MatchRequestPair) {
        match self.registry.begin_pair(task_id, index).await {
            Ok(PairStart::Proceed) => {}
            Ok(PairStart::Settled) => return,
            Err(e) => {
                debug!(%task_id, pair_index = index, error = %e, "task gone before pair started");
                return;
            }
        }
        debug!(
            %task_id,
            pair_index = index,
            resume_id = %pair.resume_id,
            job_id = %pair.job_id,
            "evaluating pair"
        );

        match self.evaluate_and_store(&pair).await {
            Ok(outcome) => {
                match self
                    .registry
                    .increment_completed(task_id, index, outcome.id)
                    .await
                {
                    Ok(settled) => log_settled(task_id, &settled),
                    Err(e) => warn!(%task_id, error = %e, "task gone before pair settled"),
                }
            }
            Err(reason) => {
                warn!(
                    %task_id,
                    pair_index = index,
                    resume_id = %pair.resume_id,
                    job_id = %pair.job_id,
                    %reason,
                    "pair failed"
                );
                self.settle_failed(task_id, index, reason).await;
            }
        }
    }

    async fn settle_failed(&self, task_id: TaskId, index: usize, reason: impl Into<String>) {
        match self.registry.increment_failed(task_id, index, reason).await {
            Ok(settled) => log_settled(task_id, &settled),
            Err(e) => warn!(%task_id, error = %e, "task gone before pair settled"),
        }
    }

    async fn evaluate_and_store(&self, pair: &MatchRequestPair) -> Result<MatchOutcome, String> {
        let evaluation = self.evaluate(pair).await.map_err(|e| e.to_string())?;
        let draft = OutcomeDraft::new(pair, evaluation, self.clock.now());
        self.persist(draft)
            .await
            .map_err(|e| MatchError::from(e).to_string())
    }

    async fn evaluate(&self, pair: &MatchRequestPair) -> Result<Evaluation, EvaluationError> {
        match self.config.evaluation_timeout {
            Some(limit) => tokio::time::timeout(limit, self.evaluator.evaluate(pair))
                .await
                .unwrap_or_else(|_| {
                    Err(EvaluationError::TimedOut(
                        u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    ))
                }),
            None => self.evaluator.evaluate(pair).await,
        }
    }

    /// Insert with backoff on transient store failures.
    async fn persist(&self, draft: OutcomeDraft) -> Result<MatchOutcome, StoreError> {
        let policy = &self.config.store_retry;
        let mut attempts = 1;
        loop {
            match self.store.insert(draft.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempts < policy.max_attempts => {
                    let delay = policy.next_delay(attempts);
                    warn!(
                        attempts,
                        max_attempts = policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "store insert failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn log_settled(task_id: TaskId, settled: &crate::registry::Settled) {
    if settled.finished {
        info!(
            %task_id,
            state = ?settled.state(),
            completed = settled.progress.completed_pairs,
            failed = settled.progress.failed_pairs,
            "batch settled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::retry::RetryPolicy;
    use crate::domain::{BatchState, JobId};
    use crate::impls::InMemoryResultStore;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl MatchEvaluator for Echo {
        async fn evaluate(&self, pair: &MatchRequestPair) -> Result<Evaluation, EvaluationError> {
            if pair.resume_id.as_str() == "missing" {
                return Err(EvaluationError::ResumeNotFound(pair.resume_id.clone()));
            }
            Ok(Evaluation::new(75.0))
        }
    }

    fn orchestrator() -> BatchOrchestrator {
        BatchOrchestrator::builder(Arc::new(Echo))
            .with_config(OrchestratorConfig {
                max_batch_size: 3,
                store_retry: RetryPolicy::immediate(2),
                ..OrchestratorConfig::default()
            })
            .build()
            .unwrap()
    }

    const POLL: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn rejects_oversized_and_blank_batches() {
        let orch = orchestrator();
        let too_many = vec![MatchRequestPair::new("r", "j"); 4];
        assert!(matches!(
            orch.submit(too_many).await,
            Err(MatchError::InvalidBatch(_))
        ));
        assert!(matches!(
            orch.submit(vec![MatchRequestPair::new("  ", "j")]).await,
            Err(MatchError::InvalidBatch(_))
        ));
        assert!(orch.registry().is_empty().await);
    }

    #[tokio::test]
    async fn submit_for_job_fans_out_resumes() {
        let orch = orchestrator();
        let job = JobId::new("j-9");
        let task_id = orch
            .submit_for_job(&job, [ResumeId::new("r-1"), ResumeId::new("r-2")])
            .await
            .unwrap();

        let progress = orch.wait_until_settled(task_id, POLL).await.unwrap();
        assert_eq!(progress.state, BatchState::Completed);
        assert_eq!(progress.total_pairs, 2);

        let results = orch.list_results().await.unwrap();
        assert!(results.iter().all(|o| o.job_id == job));
    }

    #[tokio::test]
    async fn match_one_returns_outcome_or_failure() {
        let orch = orchestrator();

        let outcome = orch.match_one(MatchRequestPair::new("r-1", "j-1")).await.unwrap();
        assert_eq!(outcome.score, 75.0);
        assert_eq!(orch.get_result(outcome.id).await.unwrap(), outcome);

        let err = orch
            .match_one(MatchRequestPair::new("missing", "j-1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MatchError::EvaluationFailure("resume not found: missing".to_string())
        );
    }

    #[tokio::test]
    async fn shutdown_and_join_waits_for_in_flight_pairs() {
        let orch = orchestrator();
        let task_id = orch
            .submit(vec![MatchRequestPair::new("r-1", "j-1"), MatchRequestPair::new("r-2", "j-1")])
            .await
            .unwrap();

        orch.shutdown_and_join().await;

        let progress = orch.progress(task_id).await.unwrap();
        assert!(progress.is_terminal());
        assert_eq!(
            orch.list_results().await.unwrap().len(),
            progress.completed_pairs
        );
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let orch = orchestrator();
        orch.shutdown();
        assert!(orch.is_shut_down());
        assert!(matches!(
            orch.submit(vec![MatchRequestPair::new("r", "j")]).await,
            Err(MatchError::InvalidBatch(_))
        ));
    }

    #[tokio::test]
    async fn result_management_maps_store_errors() {
        let orch = BatchOrchestrator::builder(Arc::new(Echo))
            .with_store(Arc::new(InMemoryResultStore::default()))
            .build()
            .unwrap();
        let outcome = orch.match_one(MatchRequestPair::new("r-1", "j-1")).await.unwrap();

        orch.delete_result(outcome.id).await.unwrap();
        assert_eq!(
            orch.delete_result(outcome.id).await,
            Err(MatchError::NotFound(outcome.id))
        );
        assert_eq!(orch.clear_results().await.unwrap(), 0);
    }
}
