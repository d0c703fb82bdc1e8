//! Application configuration for Copyforge.
//!
//! User config lives at `~/.copyforge/copyforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CopyforgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "copyforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".copyforge";

// ---------------------------------------------------------------------------
// Config structs (matching copyforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Boundary service endpoints.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Submission limits and tabular handling.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Extra brand voice rules.
    #[serde(default)]
    pub voice: VoiceConfig,
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Concurrent generation calls per submission.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Regeneration attempts after a validation failure.
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_generation_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            concurrency: default_concurrency(),
            max_regenerations: default_max_regenerations(),
        }
    }
}

fn default_generation_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_temperature() -> f64 {
    0.4
}
fn default_max_tokens() -> u32 {
    1200
}
fn default_concurrency() -> u32 {
    4
}
fn default_max_regenerations() -> u32 {
    2
}

/// `[services]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_document_service")]
    pub document_analysis: ServiceEndpoint,

    #[serde(default = "default_ocr_service")]
    pub ocr: ServiceEndpoint,

    #[serde(default = "default_search_service")]
    pub search: ServiceEndpoint,

    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            document_analysis: default_document_service(),
            ocr: default_ocr_service(),
            search: default_search_service(),
            fetch: FetchConfig::default(),
        }
    }
}

/// An HTTP-backed capability. No endpoint means the capability is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

impl ServiceEndpoint {
    fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            endpoint: None,
            api_key_env: None,
            timeout_secs,
        }
    }

    /// Resolve the API key from the configured env var, if any.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_service_timeout() -> u64 {
    60
}
fn default_document_service() -> ServiceEndpoint {
    ServiceEndpoint::with_timeout(120)
}
fn default_ocr_service() -> ServiceEndpoint {
    ServiceEndpoint::with_timeout(60)
}
fn default_search_service() -> ServiceEndpoint {
    ServiceEndpoint::with_timeout(20)
}

/// `[services.fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0 Safari/537.36"
        .into()
}

/// How supplier copy in tabular files is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TabularCopy {
    /// Generate fresh copy for every row.
    #[default]
    Regenerate,
    /// Keep supplier descriptions, validated and clamped but never regenerated.
    KeepSupplied,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub tabular_copy: TabularCopy,

    #[serde(default = "default_submission_timeout")]
    pub submission_timeout_secs: u64,

    #[serde(default = "default_max_document_mb")]
    pub max_document_mb: u64,

    #[serde(default = "default_max_image_mb")]
    pub max_image_mb: u64,

    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tabular_copy: TabularCopy::default(),
            submission_timeout_secs: default_submission_timeout(),
            max_document_mb: default_max_document_mb(),
            max_image_mb: default_max_image_mb(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

fn default_submission_timeout() -> u64 {
    600
}
fn default_max_document_mb() -> u64 {
    50
}
fn default_max_image_mb() -> u64 {
    10
}
fn default_max_text_chars() -> usize {
    10_000
}

/// `[voice]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Phrases banned in addition to the built-in lexicon.
    #[serde(default)]
    pub extra_banned_phrases: Vec<String>,
}

// ---------------------------------------------------------------------------
// Runtime settings (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline settings used by the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tabular_copy: TabularCopy,
    pub submission_timeout: Duration,
    pub generation_timeout: Duration,
    pub generation_concurrency: usize,
    pub max_regenerations: u32,
    pub max_document_bytes: usize,
    pub max_image_bytes: usize,
    pub max_text_chars: usize,
    pub extra_banned_phrases: Vec<String>,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            tabular_copy: config.pipeline.tabular_copy,
            submission_timeout: Duration::from_secs(config.pipeline.submission_timeout_secs),
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
            generation_concurrency: config.generation.concurrency.max(1) as usize,
            max_regenerations: config.generation.max_regenerations,
            max_document_bytes: (config.pipeline.max_document_mb * 1024 * 1024) as usize,
            max_image_bytes: (config.pipeline.max_image_mb * 1024 * 1024) as usize,
            max_text_chars: config.pipeline.max_text_chars,
            extra_banned_phrases: config.voice.extra_banned_phrases.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.copyforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CopyforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.copyforge/copyforge.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| CopyforgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CopyforgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CopyforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CopyforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CopyforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the generation API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.generation.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(CopyforgeError::config(format!(
            "language model API key not found. Set the {var_name} environment variable."
        ))),
    }
}
