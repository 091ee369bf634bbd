//! InMemoryResultStore - デフォルトの結果ストア
//!
//! プロセスが生きている間だけ保持する。挿入順を保持し、`list` は新しい順に返す。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{MatchId, MatchOutcome, OutcomeDraft, StoreError};
use crate::ports::{IdGenerator, ResultStore, SystemClock, UlidGenerator};

pub struct InMemoryResultStore {
    /// Oldest first.
    outcomes: Mutex<Vec<MatchOutcome>>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryResultStore {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            outcomes: Mutex::new(Vec::new()),
            ids,
        }
    }

    pub async fn len(&self) -> usize {
        self.outcomes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.outcomes.lock().await.is_empty()
    }
}

impl Default for InMemoryResultStore {
    fn default() -> Self {
        Self::new(Arc::new(UlidGenerator::new(SystemClock)))
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn insert(&self, draft: OutcomeDraft) -> Result<MatchOutcome, StoreError> {
        let outcome = MatchOutcome::from_draft(self.ids.generate_match_id(), draft);
        self.outcomes.lock().await.push(outcome.clone());
        Ok(outcome)
    }

    async fn get(&self, id: MatchId) -> Result<MatchOutcome, StoreError> {
        let outcomes = self.outcomes.lock().await;
        outcomes
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<MatchOutcome>, StoreError> {
        let outcomes = self.outcomes.lock().await;
        Ok(outcomes.iter().rev().cloned().collect())
    }

    async fn delete(&self, id: MatchId) -> Result<(), StoreError> {
        let mut outcomes = self.outcomes.lock().await;
        let pos = outcomes
            .iter()
            .position(|o| o.id == id)
            .ok_or(StoreError::NotFound(id))?;
        outcomes.remove(pos);
        Ok(())
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let mut outcomes = self.outcomes.lock().await;
        let removed = outcomes.len();
        outcomes.clear();
        Ok(removed)
    }
}
