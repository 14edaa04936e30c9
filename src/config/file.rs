//! TOML configuration file loading
//!
//! Supports `~/.config/flowvoice/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct FlowvoiceConfigFile {
    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice session configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Speech recognition configuration
    #[serde(default)]
    pub recognizer: RecognizerFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "claude-sonnet-4-20250514")
    pub model: Option<String>,

    /// Preferred provider ("anthropic" or "openai")
    pub provider: Option<String>,
}

/// Voice session configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Persist tasks without confirmation when confidence allows
    pub auto_save: Option<bool>,

    /// Require confirmation for every task
    pub confirm_before_saving: Option<bool>,

    /// Default priority for extracted tasks ("low", "medium", "high")
    pub default_priority: Option<String>,

    /// Session inactivity timeout in seconds
    pub session_timeout_secs: Option<u64>,

    /// Gate fragments on wake words
    pub wake_word: Option<bool>,

    /// Wake phrases
    pub wake_words: Option<Vec<String>>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct RecognizerFileConfig {
    /// BCP 47 language tag (e.g. "en-US")
    pub language: Option<String>,

    /// Emit interim (non-final) results
    pub interim_results: Option<bool>,

    /// Number of alternative transcriptions to request
    pub max_alternatives: Option<u32>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
}

/// Storage configuration
#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// Data directory override
    pub data_dir: Option<PathBuf>,
}

/// Path to the config file: `~/.config/flowvoice/config.toml`
fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("flowvoice").join("config.toml"))
}

/// Load the TOML config file, falling back to defaults on any failure
pub fn load_config_file() -> FlowvoiceConfigFile {
    let Some(path) = config_file_path() else {
        return FlowvoiceConfigFile::default();
    };

    if !path.exists() {
        return FlowvoiceConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                FlowvoiceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            FlowvoiceConfigFile::default()
        }
    }
}
