//! Domain model (IDs, pairs, batch tasks, outcomes, errors).
//!
//! ここはポートや実行基盤に依存しない純粋なデータと状態遷移だけを置く。

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod pair;
pub mod progress;
pub mod state;
pub mod task;

pub use self::errors::{EvaluationError, MatchError, StoreError};
pub use self::ids::{IdParseError, MatchId, TaskId};
pub use self::outcome::{DimensionScore, Evaluation, MatchDetail, MatchOutcome, OutcomeDraft};
pub use self::pair::{JobId, MatchRequestPair, ResumeId};
pub use self::progress::{BatchReport, PairReport, ProgressSnapshot};
pub use self::state::{BatchState, PairStatus};
pub use self::task::{BatchTask, PairStart};
