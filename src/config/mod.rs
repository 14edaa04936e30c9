//! Configuration management for the flowvoice pipeline

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::recognizer::RecognizerConfig;
use crate::session::VoiceTaskConfig;
use crate::tasks::Priority;

/// Flowvoice configuration
///
/// Sources, in order of precedence: environment variables, then the TOML
/// config file, then built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database lives here)
    pub data_dir: PathBuf,

    /// User id attached to created tasks
    pub user_id: String,

    /// API keys
    pub api_keys: ApiKeys,

    /// Preferred LLM provider ("anthropic" or "openai")
    /// Set via `FLOWVOICE_LLM_PROVIDER` env var
    pub llm_provider: Option<String>,

    /// LLM model identifier for intent extraction
    pub llm_model: Option<String>,

    /// Voice session configuration
    pub voice: VoiceTaskConfig,

    /// Speech recognition configuration
    pub recognizer: RecognizerConfig,
}

/// API keys for intent extraction providers
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
}

impl Config {
    /// Load configuration (env > toml > default)
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();

        let api_keys = ApiKeys {
            anthropic: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .or(fc.api_keys.anthropic),
            openai: std::env::var("OPENAI_API_KEY").ok().or(fc.api_keys.openai),
        };

        let data_dir = std::env::var("FLOWVOICE_DATA_DIR")
            .ok()
            .map(PathBuf::from)
            .or(fc.storage.data_dir)
            .unwrap_or_else(default_data_dir);

        let user_id = std::env::var("FLOWVOICE_USER_ID")
            .ok()
            .unwrap_or_else(|| "local".to_string());

        let defaults = VoiceTaskConfig::default();
        let voice = VoiceTaskConfig {
            enable_auto_save: fc.voice.auto_save.unwrap_or(defaults.enable_auto_save),
            confirm_before_saving: fc
                .voice
                .confirm_before_saving
                .unwrap_or(defaults.confirm_before_saving),
            default_priority: fc
                .voice
                .default_priority
                .as_deref()
                .and_then(Priority::parse)
                .unwrap_or(defaults.default_priority),
            session_timeout: fc
                .voice
                .session_timeout_secs
                .map_or(defaults.session_timeout, Duration::from_secs),
            enable_wake_word: fc.voice.wake_word.unwrap_or(defaults.enable_wake_word),
            wake_words: fc.voice.wake_words.unwrap_or(defaults.wake_words),
        };

        let rec_defaults = RecognizerConfig::default();
        let recognizer = RecognizerConfig {
            language: fc.recognizer.language.unwrap_or(rec_defaults.language),
            interim_results: fc
                .recognizer
                .interim_results
                .unwrap_or(rec_defaults.interim_results),
            max_alternatives: fc
                .recognizer
                .max_alternatives
                .unwrap_or(rec_defaults.max_alternatives),
            continuous: rec_defaults.continuous,
            grammar: rec_defaults.grammar,
        };

        Self {
            data_dir,
            user_id,
            api_keys,
            llm_provider: std::env::var("FLOWVOICE_LLM_PROVIDER")
                .ok()
                .or(fc.llm.provider),
            llm_model: std::env::var("FLOWVOICE_LLM_MODEL").ok().or(fc.llm.model),
            voice,
            recognizer,
        }
    }

    /// Path to the SQLite database file, creating the data directory if needed
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        if let Err(e) = std::fs::create_dir_all(&self.data_dir) {
            tracing::warn!(
                path = %self.data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }
        self.data_dir.join("flowvoice.db")
    }
}

/// Default data directory: `~/.local/share/flowvoice/` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/flowvoice"),
        |d| d.data_dir().join("flowvoice"),
    )
}
