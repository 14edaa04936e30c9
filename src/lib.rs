//! Flowvoice - Voice-driven task creation pipeline for ProjectFlow
//!
//! This library provides the core functionality for turning spoken commands
//! into persisted tasks:
//! - Command classification (trigger phrases, regex detail extraction)
//! - Streaming speech recognition adapters
//! - LLM-backed intent extraction
//! - Voice session management with a pending-task confirmation queue
//! - SQLite task persistence
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               Transcript Source                      │
//! │        (streaming speech recognition backend)        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ transcript fragments
//! ┌────────────────────▼────────────────────────────────┐
//! │              Voice Task Manager                      │
//! │   Classifier  │  Intent Extractor  │  Pending Queue │
//! └────────────────────┬────────────────────────────────┘
//!                      │ confirmed tasks
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Task Store (SQLite)                  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod intent;
pub mod recognizer;
pub mod session;
pub mod tasks;

pub use config::Config;
pub use db::{DbConn, DbPool, TaskRepo};
pub use error::{Error, Result};
pub use intent::{Intent, IntentExtractor, LlmIntentExtractor};
pub use recognizer::{
    RecognitionBackend, Recognizer, RecognizerConfig, SourceEvent, TranscriptFragment,
    TranscriptSource,
};
pub use session::{
    PendingTask, SessionState, SessionStatus, VoiceEvent, VoiceSession, VoiceTaskConfig,
    VoiceTaskManager,
};
pub use tasks::{NewTask, Priority, ProjectContext, Task, TaskSource, TaskStatus, TaskStore};
