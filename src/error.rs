//! Error types for the flowvoice pipeline

use thiserror::Error;

/// Result type alias for flowvoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice task pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Speech recognition is unavailable on this host
    #[error("speech recognition not supported: {0}")]
    NotSupported(String),

    /// Intent extraction error (LLM transport or protocol failure)
    #[error("intent error: {0}")]
    Intent(String),

    /// Session lifecycle error
    #[error("session error: {0}")]
    Session(String),

    /// Task persistence error
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
