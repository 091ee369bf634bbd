//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（採点ロジック、永続化、時刻、ID 採番）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod evaluator;
pub mod id_generator;
pub mod result_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::evaluator::MatchEvaluator;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::result_store::ResultStore;
