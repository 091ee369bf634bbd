//! JsonFileResultStore - JSON ファイルに永続化する結果ストア
//!
//! # 実装詳細
//! - 全件を 1 つの JSON ドキュメントとして保存
//! - 変更のたびに一時ファイルへ書き込み、rename で置き換える
//! - 書き込みに失敗した場合はメモリ上の状態を元に戻し `Unavailable` を返す

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{MatchId, MatchOutcome, OutcomeDraft, StoreError};
use crate::ports::{IdGenerator, ResultStore};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredResults {
    /// Oldest first.
    #[serde(default)]
    outcomes: Vec<MatchOutcome>,
}

pub struct JsonFileResultStore {
    path: PathBuf,
    outcomes: Mutex<Vec<MatchOutcome>>,
    ids: Arc<dyn IdGenerator>,
}

impl JsonFileResultStore {
    /// Open (or lazily create) the store at `path`.
    pub async fn open(
        path: impl Into<PathBuf>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let stored = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StoredResults>(&bytes)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == ErrorKind::NotFound => StoredResults::default(),
            Err(e) => return Err(unavailable(&path, e)),
        };
        debug!(path = %path.display(), count = stored.outcomes.len(), "opened result store");
        Ok(Self {
            path,
            outcomes: Mutex::new(stored.outcomes),
            ids,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, outcomes: &[MatchOutcome]) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            outcomes: &'a [MatchOutcome],
        }

        let bytes = serde_json::to_vec_pretty(&Borrowed { outcomes })
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| unavailable(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| unavailable(&self.path, e))
    }
}

fn unavailable(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {err}", path.display()))
}

#[async_trait]
impl ResultStore for JsonFileResultStore {
    async fn insert(&self, draft: OutcomeDraft) -> Result<MatchOutcome, StoreError> {
        let outcome = MatchOutcome::from_draft(self.ids.generate_match_id(), draft);
        let mut outcomes = self.outcomes.lock().await;
        outcomes.push(outcome.clone());
        if let Err(e) = self.persist(&outcomes).await {
            outcomes.pop();
            return Err(e);
        }
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
        let removed = outcomes.remove(pos);
        if let Err(e) = self.persist(&outcomes).await {
            outcomes.insert(pos, removed);
            return Err(e);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let mut outcomes = self.outcomes.lock().await;
        if outcomes.is_empty() {
            return Ok(0);
        }
        let previous = std::mem::take(&mut *outcomes);
        if let Err(e) = self.persist(&outcomes).await {
            *outcomes = previous;
            return Err(e);
        }
        Ok(previous.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Evaluation, MatchDetail, MatchRequestPair};
    use crate::ports::{SystemClock, UlidGenerator};
    use chrono::Utc;

    fn ids() -> Arc<dyn IdGenerator> {
        Arc::new(UlidGenerator::new(SystemClock))
    }

    fn draft(resume: &str) -> OutcomeDraft {
        let detail = MatchDetail::default()
            .with_dimension("skills", 90.0, "rust + tokio", "")
            .with_suggestion("add a project summary");
        OutcomeDraft::new(
            &MatchRequestPair::new(resume, "j-1"),
            Evaluation::new(84.0).with_detail(detail),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn outcomes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let stored = {
            let store = JsonFileResultStore::open(&path, ids()).await.unwrap();
            store.insert(draft("r-1")).await.unwrap();
            store.insert(draft("r-2")).await.unwrap()
        };

        let reopened = JsonFileResultStore::open(&path, ids()).await.unwrap();
        let listed = reopened.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], stored);
    }

    #[tokio::test]
    async fn delete_and_clear_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let store = JsonFileResultStore::open(&path, ids()).await.unwrap();
        assert_eq!(store.path(), path.as_path());
        let a = store.insert(draft("r-1")).await.unwrap();
        store.insert(draft("r-2")).await.unwrap();
        store.delete(a.id).await.unwrap();
        assert_eq!(
            JsonFileResultStore::open(&path, ids()).await.unwrap().list().await.unwrap().len(),
            1
        );

        assert_eq!(store.clear().await.unwrap(), 1);
        assert_eq!(store.clear().await.unwrap(), 0);
        assert!(
            JsonFileResultStore::open(&path, ids()).await.unwrap().list().await.unwrap().is_empty()
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = JsonFileResultStore::open(&path, ids()).await.err().unwrap();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("results.json");

        let store = JsonFileResultStore::open(&path, ids()).await.unwrap();
        let err = store.insert(draft("r-1")).await.unwrap_err();

        assert!(err.is_transient());
        assert!(store.list().await.unwrap().is_empty());
    }
}
