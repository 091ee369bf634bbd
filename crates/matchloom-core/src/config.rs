//! OrchestratorConfig - 実行時設定
//!
//! TOML ファイル（任意）を読み込み、`MATCHLOOM_*` 環境変数で上書きする。
//! 値の検証は `OrchestratorBuilder::build()` で行う（Fail-fast）。
//!
//! ```toml
//! max_concurrency = 8
//! max_batch_size = 1000
//! evaluation_timeout_ms = 120000   # 0 = no timeout
//! retention_secs = 3600
//! purge_interval_secs = 60
//!
//! [store_retry]
//! max_attempts = 5
//! base_delay_ms = 200
//! multiplier = 2.0
//! max_delay_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::app::retry::RetryPolicy;

pub const ENV_PREFIX: &str = "MATCHLOOM_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    Env { key: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Upper bound on evaluations running at once, across all batches.
    pub max_concurrency: usize,

    /// Largest batch `submit` accepts.
    pub max_batch_size: usize,

    /// Per-pair evaluation limit. `None` waits forever.
    pub evaluation_timeout: Option<Duration>,

    /// How long a finished task stays queryable.
    pub retention: Duration,
    pub purge_interval: Duration,

    pub store_retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_batch_size: 1000,
            evaluation_timeout: Some(Duration::from_secs(120)),
            retention: Duration::from_secs(3600),
            purge_interval: Duration::from_secs(60),
            store_retry: RetryPolicy::default_v1(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    max_concurrency: Option<usize>,
    max_batch_size: Option<usize>,
    evaluation_timeout_ms: Option<u64>,
    retention_secs: Option<u64>,
    purge_interval_secs: Option<u64>,
    store_retry: Option<RetryFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryFile {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    multiplier: Option<f64>,
    max_delay_ms: Option<u64>,
}

impl OrchestratorConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(input)?;
        let mut config = Self::default();
        config.apply_file(file);
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Overlay `MATCHLOOM_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, which is asked for the full variable
    /// name (e.g. `MATCHLOOM_MAX_CONCURRENCY`).
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |name: &str| -> Option<(String, String)> {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = get("MAX_CONCURRENCY") {
            self.max_concurrency = parse_env(key, value)?;
        }
        if let Some((key, value)) = get("MAX_BATCH_SIZE") {
            self.max_batch_size = parse_env(key, value)?;
        }
        if let Some((key, value)) = get("EVALUATION_TIMEOUT_MS") {
            self.evaluation_timeout = timeout_from_ms(parse_env(key, value)?);
        }
        if let Some((key, value)) = get("RETENTION_SECS") {
            self.retention = Duration::from_secs(parse_env(key, value)?);
        }
        if let Some((key, value)) = get("PURGE_INTERVAL_SECS") {
            self.purge_interval = Duration::from_secs(parse_env(key, value)?);
        }
        if let Some((key, value)) = get("STORE_RETRY_MAX_ATTEMPTS") {
            self.store_retry.max_attempts = parse_env(key, value)?;
        }
        if let Some((key, value)) = get("STORE_RETRY_BASE_DELAY_MS") {
            self.store_retry.base_delay = Duration::from_millis(parse_env(key, value)?);
        }
        if let Some((key, value)) = get("STORE_RETRY_MULTIPLIER") {
            self.store_retry.multiplier = parse_env(key, value)?;
        }
        if let Some((key, value)) = get("STORE_RETRY_MAX_DELAY_MS") {
            self.store_retry.max_delay = Duration::from_millis(parse_env(key, value)?);
        }
        Ok(self)
    }

    /// Reject values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }
        if self.max_concurrency > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "max_concurrency must not exceed {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be at least 1".into()));
        }
        if self.purge_interval.is_zero() {
            return Err(ConfigError::Invalid("purge_interval must be positive".into()));
        }
        if chrono::Duration::from_std(self.retention).is_err() {
            return Err(ConfigError::Invalid("retention is out of range".into()));
        }
        let retry = &self.store_retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "store_retry.max_attempts must be at least 1".into(),
            ));
        }
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "store_retry.multiplier must be a finite number >= 1.0".into(),
            ));
        }
        if retry.max_delay < retry.base_delay {
            return Err(ConfigError::Invalid(
                "store_retry.max_delay_ms must be >= base_delay_ms".into(),
            ));
        }
        Ok(())
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.max_concurrency {
            self.max_concurrency = v;
        }
        if let Some(v) = file.max_batch_size {
            self.max_batch_size = v;
        }
        if let Some(v) = file.evaluation_timeout_ms {
            self.evaluation_timeout = timeout_from_ms(v);
        }
        if let Some(v) = file.retention_secs {
            self.retention = Duration::from_secs(v);
        }
        if let Some(v) = file.purge_interval_secs {
            self.purge_interval = Duration::from_secs(v);
        }
        if let Some(retry) = file.store_retry {
            if let Some(v) = retry.max_attempts {
                self.store_retry.max_attempts = v;
            }
            if let Some(v) = retry.base_delay_ms {
                self.store_retry.base_delay = Duration::from_millis(v);
            }
            if let Some(v) = retry.multiplier {
                self.store_retry.multiplier = v;
            }
            if let Some(v) = retry.max_delay_ms {
                self.store_retry.max_delay = Duration::from_millis(v);
            }
        }
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn parse_env<T: std::str::FromStr>(key: String, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { key, value })
}
