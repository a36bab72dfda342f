//! Configuration management for sculpt
//!
//! Repository-level settings for the pipeline: retry policy, oracle endpoint
//! and models, the sandboxed executor, and healing allow-lists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::DEFAULT_MAX_RETRIES;
use crate::{Result, SculptError};

/// Environment variable overriding `[oracle] base_url`
pub const ORACLE_URL_ENV: &str = "SCULPT_ORACLE_URL";

/// Top-level sculpt configuration
///
/// Loaded from `.sculpt/config.toml` under the working root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SculptConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub healing: HealingConfig,

    /// External shape rule table replacing the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<PathBuf>,
}

/// Retry and timeout policy for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum attempts for any retried phase
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Fixed delay between attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on a single oracle call before the fallback is used
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,
}

/// Oracle endpoint and model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub models: OracleModels,

    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time the circuit stays open
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Model used for each oracle role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleModels {
    #[serde(default = "default_reasoning_model")]
    pub architect: String,
    #[serde(default = "default_reasoning_model")]
    pub planner: String,
    #[serde(default = "default_code_model")]
    pub synthesizer: String,
    #[serde(default = "default_code_model")]
    pub repair: String,
}

/// Sandboxed interpreter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_executor_timeout_secs")]
    pub timeout_secs: u64,

    /// Directory receiving exported artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Healing allow-lists and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    /// Modules generated code may import
    #[serde(default = "default_allowed_imports")]
    pub allowed_imports: Vec<String>,

    /// Smallest plausible spacing for array operations, in mm
    #[serde(default = "default_min_array_spacing")]
    pub min_array_spacing: f64,
}

// Default value providers
fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_oracle_timeout_secs() -> u64 {
    60
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_reasoning_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_code_model() -> String {
    "qwen2.5-coder:7b".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_executor_timeout_secs() -> u64 {
    120
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_allowed_imports() -> Vec<String> {
    ["cadquery", "math", "pathlib", "numpy", "struct"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_min_array_spacing() -> f64 {
    0.5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            models: OracleModels::default(),
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for OracleModels {
    fn default() -> Self {
        Self {
            architect: default_reasoning_model(),
            planner: default_reasoning_model(),
            synthesizer: default_code_model(),
            repair: default_code_model(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_secs: default_executor_timeout_secs(),
            output_dir: default_output_dir(),
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            allowed_imports: default_allowed_imports(),
            min_array_spacing: default_min_array_spacing(),
        }
    }
}

impl HealingConfig {
    pub fn is_allowed_import(&self, module: &str) -> bool {
        let root = module.split('.').next().unwrap_or(module);
        self.allowed_imports.iter().any(|m| m == root)
    }
}

impl SculptConfig {
    /// Load configuration from `.sculpt/config.toml` or use defaults
    ///
    /// `SCULPT_ORACLE_URL` overrides the oracle base URL either way.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".sculpt/config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(ORACLE_URL_ENV) {
            if !url.trim().is_empty() {
                config.oracle.base_url = url;
            }
        }

        Ok(config)
    }

    /// Parse configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SculptError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Write default configuration to `.sculpt/config.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        let config_dir = root.join(".sculpt");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| SculptError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }
}
