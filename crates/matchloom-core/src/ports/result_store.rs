//! ResultStore port - 完了したマッチ結果の永続化
//!
//! # 実装
//! - InMemoryResultStore: デフォルト
//! - JsonFileResultStore: JSON ファイルに永続化

use async_trait::async_trait;

use crate::domain::{MatchId, MatchOutcome, OutcomeDraft, StoreError};

/// Durable keyed storage of completed match outcomes.
///
/// # 設計原則
/// - id は `insert` が採番する（呼び出し側は選べない）
/// - `insert` が `Unavailable` を返した場合、何も書かれていない
/// - `clear` は冪等（空でもエラーにしない）
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a draft and return the stored outcome with its new id.
    async fn insert(&self, draft: OutcomeDraft) -> Result<MatchOutcome, StoreError>;

    async fn get(&self, id: MatchId) -> Result<MatchOutcome, StoreError>;

    /// All outcomes, newest first.
    async fn list(&self) -> Result<Vec<MatchOutcome>, StoreError>;

    /// Fails with `NotFound` when the id does not exist.
    async fn delete(&self, id: MatchId) -> Result<(), StoreError>;

    /// Remove everything. Returns how many outcomes were removed.
    async fn clear(&self) -> Result<usize, StoreError>;
}
