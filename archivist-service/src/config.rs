//! Service configuration.
//!
//! Settings are loaded once at startup from an optional `config` file merged
//! with `ARCHIVIST__`-prefixed environment variables.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_processing")]
    pub processing: ProcessingConfig,

    #[serde(default = "default_llm")]
    pub llm: LlmConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Worker pool and recovery sweep configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Number of long-lived pipeline workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Cap on documents processed in parallel. Defaults to the worker count
    /// when unset; kept as its own knob so the admission limit can be
    /// tightened without resizing the pool.
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// A document `Processing` for longer than this is considered abandoned
    /// and eligible for re-enqueue by the recovery sweep.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Interval between recovery sweep passes.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl ProcessingConfig {
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(self.workers).max(1)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Model endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Attempt cap for one invocation, counting the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts; attempt N waits N times this.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

pub(crate) fn default_processing() -> ProcessingConfig {
    ProcessingConfig {
        workers: default_workers(),
        max_concurrent: None,
        stale_after_secs: default_stale_after_secs(),
        sweep_interval_secs: default_sweep_interval_secs(),
    }
}

pub(crate) fn default_workers() -> usize {
    3
}

pub(crate) fn default_stale_after_secs() -> u64 {
    15 * 60
}

pub(crate) fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

pub(crate) fn default_llm() -> LlmConfig {
    LlmConfig {
        base_url: default_llm_url(),
        model: default_model(),
        max_retries: default_max_retries(),
        retry_base_delay_ms: default_retry_base_delay_ms(),
        max_tokens: default_max_tokens(),
        temperature: default_temperature(),
        top_p: default_top_p(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

pub(crate) fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}

pub(crate) fn default_model() -> String {
    "llama3.1:8b".to_string()
}

pub(crate) fn default_max_retries() -> u32 {
    3
}

pub(crate) fn default_retry_base_delay_ms() -> u64 {
    1000
}

pub(crate) fn default_max_tokens() -> u32 {
    1024
}

pub(crate) fn default_temperature() -> f32 {
    0.3
}

pub(crate) fn default_top_p() -> f32 {
    0.9
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_concurrent_defaults_to_worker_count() {
        let config = default_processing();
        assert_eq!(config.max_concurrent(), config.workers);
    }

    #[test]
    fn max_concurrent_is_independent_of_worker_count() {
        let config = ProcessingConfig {
            workers: 4,
            max_concurrent: Some(2),
            stale_after_secs: 60,
            sweep_interval_secs: 60,
        };
        assert_eq!(config.max_concurrent(), 2);
    }
}
