//! Transcript source adapter
//!
//! Wraps a continuous speech-recognition capability (a browser bridge, a
//! native engine, a test stub) and normalizes its event stream: a silence
//! timer stops listening after ten quiet seconds, and recoverable errors
//! (`no-speech`, `aborted`) trigger an automatic restart unless the caller
//! explicitly stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::classifier;
use crate::{Error, Result};

/// Silence window after which listening stops on its own (soft timeout)
const SILENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before restarting after a recoverable recognition error
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// One emitted unit from the transcript source
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptFragment {
    pub text: String,
    /// Recognition confidence, 0.0-1.0
    pub confidence: f32,
    /// Final fragments are stable; interim fragments may be revised
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptFragment {
    /// Build a final fragment stamped now
    #[must_use]
    pub fn final_text(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: true,
            timestamp: Utc::now(),
        }
    }

    /// Build an interim fragment stamped now
    #[must_use]
    pub fn interim_text(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: false,
            timestamp: Utc::now(),
        }
    }
}

/// Closed set of recognition error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Network,
    ServiceNotAllowed,
    Aborted,
    Other,
}

impl RecognitionErrorKind {
    /// Wire representation, matching the capability's error codes
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::AudioCapture => "audio-capture",
            Self::NotAllowed => "not-allowed",
            Self::Network => "network",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::Aborted => "aborted",
            Self::Other => "other",
        }
    }

    /// Whether the adapter should auto-restart after this error
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::NoSpeech | Self::Aborted)
    }
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized event from the transcript source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// The stream started
    Started,
    /// A transcript fragment arrived
    Result(TranscriptFragment),
    /// Voice activity began (informational)
    SpeechStart,
    /// Voice activity ended (informational)
    SpeechEnd,
    /// The capability heard speech it could not match
    NoMatch,
    /// A recognition error occurred
    Error(RecognitionErrorKind),
    /// The stream ended
    Ended,
}

/// Recognition capability configuration
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// BCP-47 language tag
    pub language: String,
    /// Keep streaming across utterances
    pub continuous: bool,
    /// Emit interim (revisable) fragments
    pub interim_results: bool,
    /// Max recognition alternatives per result
    pub max_alternatives: u32,
    /// Optional JSGF grammar hint biasing recognition toward command shapes
    pub grammar: Option<String>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
            grammar: Some(classifier::command_grammar()),
        }
    }
}

/// The streaming capability behind the adapter
///
/// Implementations push raw [`SourceEvent`]s into a channel whose receiver is
/// handed to [`Recognizer::new`]. `start` must eventually produce `Started`,
/// and `stop`/`abort` must eventually produce `Ended`.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Whether the capability is available on this host
    fn is_supported(&self) -> bool;

    /// Begin streaming with the given configuration
    ///
    /// # Errors
    ///
    /// Returns error if the capability cannot start
    async fn start(&self, config: &RecognizerConfig) -> Result<()>;

    /// Request a graceful stop (pending results are still delivered)
    async fn stop(&self);

    /// Drop the stream immediately, discarding pending results
    async fn abort(&self);
}

/// Control surface the session manager binds to
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Whether speech recognition is available here
    fn is_supported(&self) -> bool;

    /// Start listening; resolves immediately if already listening
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] on hosts without the capability, or a
    /// recognition error if the stream cannot start
    async fn start_listening(&self) -> Result<()>;

    /// Stop listening gracefully; no-op if not listening
    async fn stop_listening(&self);

    /// Abort listening immediately; no-op if not listening
    async fn abort_listening(&self);
}

/// Normalizing adapter over a [`RecognitionBackend`]
pub struct Recognizer {
    backend: Arc<dyn RecognitionBackend>,
    config: RecognizerConfig,
    /// Backend stream currently running
    streaming: Arc<AtomicBool>,
    /// Caller explicitly stopped; suppresses auto-restart
    stopped: Arc<AtomicBool>,
}

impl Recognizer {
    /// Create a recognizer over `backend`, consuming its raw event stream
    ///
    /// Returns the recognizer and the normalized event receiver the session
    /// manager should consume.
    #[must_use]
    pub fn new(
        backend: Arc<dyn RecognitionBackend>,
        raw_events: mpsc::UnboundedReceiver<SourceEvent>,
        config: RecognizerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SourceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let streaming = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(true));

        tokio::spawn(pump(
            Arc::clone(&backend),
            config.clone(),
            raw_events,
            tx,
            Arc::clone(&streaming),
            Arc::clone(&stopped),
        ));

        (
            Self {
                backend,
                config,
                streaming,
                stopped,
            },
            rx,
        )
    }
}

#[async_trait]
impl TranscriptSource for Recognizer {
    fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }

    async fn start_listening(&self) -> Result<()> {
        if !self.backend.is_supported() {
            return Err(Error::NotSupported(
                "no speech recognition capability on this host".to_string(),
            ));
        }

        // Idempotent: already streaming means nothing to do
        if self.streaming.swap(true, Ordering::SeqCst) {
            tracing::trace!("start_listening while already listening");
            return Ok(());
        }

        self.stopped.store(false, Ordering::SeqCst);

        if let Err(e) = self.backend.start(&self.config).await {
            self.streaming.store(false, Ordering::SeqCst);
            return Err(e);
        }

        tracing::debug!(language = %self.config.language, "listening started");
        Ok(())
    }

    async fn stop_listening(&self) {
        if !self.streaming.load(Ordering::SeqCst) {
            return;
        }
        self.stopped.store(true, Ordering::SeqCst);
        self.backend.stop().await;
        tracing::debug!("listening stopped");
    }

    async fn abort_listening(&self) {
        if !self.streaming.load(Ordering::SeqCst) {
            return;
        }
        self.stopped.store(true, Ordering::SeqCst);
        self.backend.abort().await;
        tracing::debug!("listening aborted");
    }
}

/// Forward raw backend events, applying the silence timer and restart policy
async fn pump(
    backend: Arc<dyn RecognitionBackend>,
    config: RecognizerConfig,
    mut raw: mpsc::UnboundedReceiver<SourceEvent>,
    out: mpsc::UnboundedSender<SourceEvent>,
    streaming: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
) {
    let mut silence_deadline: Option<Instant> = None;

    loop {
        let event = if let Some(deadline) = silence_deadline {
            tokio::select! {
                ev = raw.recv() => ev,
                () = tokio::time::sleep_until(deadline) => {
                    tracing::debug!("silence timeout, stopping listening");
                    silence_deadline = None;
                    backend.stop().await;
                    continue;
                }
            }
        } else {
            raw.recv().await
        };

        let Some(event) = event else {
            // Backend dropped its sender; adapter is done
            break;
        };

        match &event {
            SourceEvent::Started | SourceEvent::Result(_) => {
                silence_deadline = Some(Instant::now() + SILENCE_TIMEOUT);
            }
            SourceEvent::Ended => {
                silence_deadline = None;
                streaming.store(false, Ordering::SeqCst);
            }
            SourceEvent::Error(kind) if kind.is_recoverable() => {
                tracing::debug!(kind = %kind, "recoverable recognition error");
                schedule_restart(
                    Arc::clone(&backend),
                    config.clone(),
                    Arc::clone(&streaming),
                    Arc::clone(&stopped),
                );
            }
            SourceEvent::Error(kind) => {
                tracing::warn!(kind = %kind, "recognition error");
            }
            SourceEvent::SpeechStart | SourceEvent::SpeechEnd | SourceEvent::NoMatch => {}
        }

        if out.send(event).is_err() {
            // Consumer went away
            break;
        }
    }
}

/// Restart the backend after [`RESTART_DELAY`] unless the caller stopped
fn schedule_restart(
    backend: Arc<dyn RecognitionBackend>,
    config: RecognizerConfig,
    streaming: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
) {
    drop(tokio::spawn(async move {
        tokio::time::sleep(RESTART_DELAY).await;

        if stopped.load(Ordering::SeqCst) {
            return;
        }
        if streaming.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = backend.start(&config).await {
            streaming.store(false, Ordering::SeqCst);
            tracing::warn!(error = %e, "auto-restart failed");
        } else {
            tracing::debug!("listening auto-restarted");
        }
    }));
}
