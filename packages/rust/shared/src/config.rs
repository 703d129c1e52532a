//! Application configuration for HomeViz.
//!
//! User config lives at `~/.homeviz/homeviz.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HomeVizError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "homeviz.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".homeviz";

// ---------------------------------------------------------------------------
// Config structs (matching homeviz.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generative image service settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Rate-limit retry policy for external calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Quality gate behaviour.
    #[serde(default)]
    pub quality: QualityConfig,

    /// Prompt override database.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Tenant used when `--tenant` is not given.
    #[serde(default = "default_tenant")]
    pub tenant: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            tenant: default_tenant(),
        }
    }
}

fn default_tenant() -> String {
    "boss".into()
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for both edits and quality checks.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_model() -> String {
    "gemini-3-pro-image-preview".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_timeout_secs() -> u64 {
    180
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per external call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Sleep before each re-attempt, in seconds. The last entry repeats.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}
fn default_backoff_secs() -> Vec<u64> {
    vec![10, 30, 60, 60]
}

/// What to do when the final image is perceptually identical to the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdenticalOutputPolicy {
    /// Log a critical diagnostic and return the result anyway.
    #[default]
    Log,
    /// Abort the run with [`HomeVizError::IdenticalOutput`].
    Fail,
    /// Issue one extra refine edit, then log if still identical.
    Retry,
}

/// `[quality]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Scores below this (0.0–1.0) fail the quality gate.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    /// Corrective retries after a failed gate. Never less than one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Score assumed when the vision response cannot be parsed.
    #[serde(default = "default_score")]
    pub default_score: f64,

    /// Reaction to an output identical to the input.
    #[serde(default)]
    pub identical_policy: IdenticalOutputPolicy,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            max_retries: default_max_retries(),
            default_score: default_score(),
            identical_policy: IdenticalOutputPolicy::default(),
        }
    }
}

fn default_pass_threshold() -> f64 {
    0.7
}
fn default_max_retries() -> u32 {
    1
}
fn default_score() -> f64 {
    0.95
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the override database. Defaults to `~/.homeviz/homeviz.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl AppConfig {
    /// Check value ranges that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(HomeVizError::config("retry.max_attempts must be at least 1"));
        }
        if self.quality.max_retries == 0 {
            return Err(HomeVizError::config("quality.max_retries must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.quality.pass_threshold) {
            return Err(HomeVizError::config(
                "quality.pass_threshold must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.quality.default_score) {
            return Err(HomeVizError::config(
                "quality.default_score must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }

    /// Resolved path of the override database.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.storage.database {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(config_dir()?.join("homeviz.db")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.homeviz/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HomeVizError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.homeviz/homeviz.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HomeVizError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        HomeVizError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HomeVizError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HomeVizError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HomeVizError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the Gemini API key env var is set and non-empty; returns the key.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(HomeVizError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable."
        ))),
    }
}
