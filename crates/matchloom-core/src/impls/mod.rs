//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryResultStore**: デフォルトの結果ストア
//! - **JsonFileResultStore**: JSON ファイルに永続化する結果ストア
//!
//! MatchEvaluator の実装はこのクレートには含めない（採点ロジックは外部）。

pub mod inmem_results;
pub mod json_results;

pub use self::inmem_results::InMemoryResultStore;
pub use self::json_results::JsonFileResultStore;
