//! Voice session manager
//!
//! The core state machine of the pipeline: owns the session lifecycle, wires
//! the transcript source to the command classifier and intent extractor, and
//! holds the queue of pending (unconfirmed) tasks. Callers consume a fixed
//! set of named [`VoiceEvent`]s from the receiver returned at construction.
//!
//! Fragments are handled strictly in delivery order by a single pump task;
//! the extractor call is awaited inside the pump, so at most one extraction
//! is ever in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::classifier;
use crate::intent::{Intent, IntentExtractor};
use crate::recognizer::{SourceEvent, TranscriptFragment, TranscriptSource};
use crate::tasks::{NewTask, Priority, ProjectContext, Task, TaskSource, TaskStatus, TaskStore};
use crate::{Error, Result};

/// Minimum usable fragment length after trimming
const MIN_FRAGMENT_CHARS: usize = 3;

/// Confidence below which a pending task always requires confirmation
const CONFIRMATION_THRESHOLD: f32 = 0.8;

/// Delay before restarting listening after the source ends mid-session
const RESTART_DELAY: Duration = Duration::from_millis(500);

/// Session manager configuration
#[derive(Debug, Clone)]
pub struct VoiceTaskConfig {
    /// Persist pending tasks immediately when no confirmation is needed
    pub enable_auto_save: bool,
    /// Require confirmation for every pending task regardless of confidence
    pub confirm_before_saving: bool,
    /// Priority applied when the extractor supplies none
    pub default_priority: Priority,
    /// Inactivity window after which the session is stale and listening is
    /// not auto-restarted
    pub session_timeout: Duration,
    /// Gate fragments on wake words
    pub enable_wake_word: bool,
    /// Wake phrases, matched by case-insensitive substring containment.
    /// Containment can false-positive on common words embedded in unrelated
    /// sentences; this is kept for compatibility with the recognition layer.
    pub wake_words: Vec<String>,
}

impl Default for VoiceTaskConfig {
    fn default() -> Self {
        Self {
            enable_auto_save: false,
            confirm_before_saving: false,
            default_priority: Priority::Medium,
            session_timeout: Duration::from_secs(300),
            enable_wake_word: false,
            wake_words: vec!["hey flow".to_string()],
        }
    }
}

/// Pipeline state as seen by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
    Processing,
}

/// A task candidate awaiting confirmation or auto-save
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub project_id: Option<String>,
    /// Recognition confidence of the originating fragment
    pub confidence: f32,
    /// Original fragment text, preserved for audit/display
    pub raw_speech_text: String,
    pub timestamp: DateTime<Utc>,
    /// Computed once at creation; never re-evaluated
    pub needs_confirmation: bool,
}

/// One active listening session
#[derive(Debug, Clone)]
pub struct VoiceSession {
    pub id: String,
    /// Immutable for the session's life
    pub project_context: Option<ProjectContext>,
    pub start_time: DateTime<Utc>,
    /// Updated on every accepted transcript fragment
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pending_tasks: Vec<PendingTask>,
}

impl VoiceSession {
    fn new(project_context: Option<ProjectContext>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_context,
            start_time: now,
            last_activity: now,
            is_active: true,
            pending_tasks: Vec::new(),
        }
    }
}

/// Snapshot returned by [`VoiceTaskManager::session_status`]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub is_active: bool,
    pub pending_tasks: usize,
    pub session_duration: Option<Duration>,
    pub project_context: Option<ProjectContext>,
}

impl SessionStatus {
    /// The "no session" snapshot
    #[must_use]
    pub const fn inactive() -> Self {
        Self {
            is_active: false,
            pending_tasks: 0,
            session_duration: None,
            project_context: None,
        }
    }
}

/// Events emitted by the manager
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// The pipeline changed state
    StatusChanged(SessionState),
    /// A pending task was queued and awaits an explicit confirm
    PendingTask(PendingTask),
    /// A pending task requires user confirmation before it can be saved
    ConfirmationNeeded(PendingTask),
    /// A task was persisted
    TaskCreated(Task),
    /// Something went wrong; the session continues
    Error { message: String },
}

struct Inner {
    source: Arc<dyn TranscriptSource>,
    extractor: Arc<dyn IntentExtractor>,
    store: Arc<dyn TaskStore>,
    user_id: String,
    config: Mutex<VoiceTaskConfig>,
    session: Mutex<Option<VoiceSession>>,
    state: Mutex<SessionState>,
    events: mpsc::UnboundedSender<VoiceEvent>,
    initialized: AtomicBool,
    /// Source event receiver, consumed by `initialize`
    source_events: std::sync::Mutex<Option<mpsc::UnboundedReceiver<SourceEvent>>>,
}

/// The voice task manager
///
/// Cheap to clone; all clones share the same session.
#[derive(Clone)]
pub struct VoiceTaskManager {
    inner: Arc<Inner>,
}

impl VoiceTaskManager {
    /// Create a manager and the event receiver its caller consumes
    ///
    /// `source_events` is the normalized stream from the transcript source
    /// (see [`crate::recognizer::Recognizer::new`]).
    #[must_use]
    pub fn with_receiver(
        source: Arc<dyn TranscriptSource>,
        source_events: mpsc::UnboundedReceiver<SourceEvent>,
        extractor: Arc<dyn IntentExtractor>,
        store: Arc<dyn TaskStore>,
        user_id: impl Into<String>,
        config: VoiceTaskConfig,
    ) -> (Self, mpsc::UnboundedReceiver<VoiceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            source,
            extractor,
            store,
            user_id: user_id.into(),
            config: Mutex::new(config),
            session: Mutex::new(None),
            state: Mutex::new(SessionState::Idle),
            events: tx,
            initialized: AtomicBool::new(false),
            source_events: std::sync::Mutex::new(Some(source_events)),
        });
        (Self { inner }, rx)
    }

    /// Wire the transcript source's event stream to the fragment handler
    ///
    /// Idempotent; a second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the source event receiver was externally consumed
    pub fn initialize(&self) -> Result<()> {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let rx = self
            .inner
            .source_events
            .lock()
            .map_err(|_| Error::Session("source event slot poisoned".to_string()))?
            .take()
            .ok_or_else(|| Error::Session("source events already consumed".to_string()))?;

        tokio::spawn(run_pump(Arc::clone(&self.inner), rx));
        tracing::debug!("voice task manager initialized");
        Ok(())
    }

    /// Start a new voice session, replacing any existing one
    ///
    /// # Errors
    ///
    /// Returns error if the manager cannot initialize or the transcript
    /// source cannot start (e.g. unsupported host). Fatal for this call,
    /// not for the process.
    pub async fn start_voice_task_creation(
        &self,
        project_context: Option<ProjectContext>,
    ) -> Result<String> {
        self.initialize()?;

        let session = VoiceSession::new(project_context);
        let session_id = session.id.clone();

        {
            let mut slot = self.inner.session.lock().await;
            if let Some(old) = slot.replace(session) {
                tracing::info!(old_session = %old.id, "replacing active voice session");
            }
        }

        if let Err(e) = self.inner.source.start_listening().await {
            // Roll back fully: a replaced session may have been Listening
            *self.inner.session.lock().await = None;
            set_state(&self.inner, SessionState::Idle).await;
            return Err(e);
        }

        set_state(&self.inner, SessionState::Listening).await;
        tracing::info!(session = %session_id, "voice session started");
        Ok(session_id)
    }

    /// End the current session and stop listening
    ///
    /// Idempotent: stopping with no active session changes nothing.
    pub async fn stop_voice_task_creation(&self) {
        {
            let mut slot = self.inner.session.lock().await;
            if let Some(session) = slot.take() {
                tracing::info!(
                    session = %session.id,
                    pending = session.pending_tasks.len(),
                    "voice session stopped"
                );
            }
        }

        self.inner.source.stop_listening().await;
        set_state(&self.inner, SessionState::Idle).await;
    }

    /// Confirm a pending task and persist it
    ///
    /// Returns the created task, or `None` when the id is unknown or
    /// persistence fails (both reported through the error event; a failed
    /// pending task stays queued for retry).
    pub async fn confirm_and_create_task(&self, pending_id: &str) -> Option<Task> {
        confirm_inner(&self.inner, pending_id).await
    }

    /// Drop a pending task without persisting it; no-op on unknown ids
    pub async fn reject_pending_task(&self, pending_id: &str) {
        let mut slot = self.inner.session.lock().await;
        if let Some(session) = slot.as_mut() {
            let before = session.pending_tasks.len();
            session.pending_tasks.retain(|p| p.id != pending_id);
            if session.pending_tasks.len() < before {
                tracing::debug!(pending = pending_id, "pending task rejected");
            }
        }
    }

    /// Empty the pending queue unconditionally
    pub async fn clear_pending_tasks(&self) {
        let mut slot = self.inner.session.lock().await;
        if let Some(session) = slot.as_mut() {
            session.pending_tasks.clear();
        }
    }

    /// Replace the manager configuration
    pub async fn update_config(&self, config: VoiceTaskConfig) {
        *self.inner.config.lock().await = config;
    }

    /// Snapshot of the current session
    pub async fn session_status(&self) -> SessionStatus {
        let slot = self.inner.session.lock().await;
        slot.as_ref().map_or(SessionStatus::inactive(), |s| SessionStatus {
            is_active: s.is_active,
            pending_tasks: s.pending_tasks.len(),
            session_duration: (Utc::now() - s.start_time).to_std().ok(),
            project_context: s.project_context.clone(),
        })
    }

    /// Cloned snapshot of the pending queue
    ///
    /// Mutating the returned tasks has no effect on the manager.
    pub async fn pending_tasks(&self) -> Vec<PendingTask> {
        let slot = self.inner.session.lock().await;
        slot.as_ref().map(|s| s.pending_tasks.clone()).unwrap_or_default()
    }

    /// Current pipeline state
    pub async fn state(&self) -> SessionState {
        *self.inner.state.lock().await
    }
}

/// State to land in once a processing step resolves
///
/// `Listening` only while a session is still active; a stopped session stays
/// `Idle` no matter when the step finishes.
async fn post_processing_state(inner: &Inner) -> SessionState {
    if inner.session.lock().await.as_ref().is_some_and(|s| s.is_active) {
        SessionState::Listening
    } else {
        SessionState::Idle
    }
}

/// Update the state and emit `StatusChanged` when it actually changed
async fn set_state(inner: &Inner, next: SessionState) {
    let mut state = inner.state.lock().await;
    if *state != next {
        *state = next;
        emit(inner, VoiceEvent::StatusChanged(next));
    }
}

fn emit(inner: &Inner, event: VoiceEvent) {
    // Caller may have dropped the receiver; events are best-effort
    let _ = inner.events.send(event);
}

/// Consume source events for the manager's lifetime
async fn run_pump(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<SourceEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SourceEvent::Result(fragment) => handle_fragment(&inner, fragment).await,
            SourceEvent::Ended => handle_ended(&inner).await,
            SourceEvent::Error(kind) if !kind.is_recoverable() => {
                emit(&inner, VoiceEvent::Error {
                    message: format!("Speech recognition error: {kind}"),
                });
            }
            SourceEvent::Error(_)
            | SourceEvent::Started
            | SourceEvent::SpeechStart
            | SourceEvent::SpeechEnd
            | SourceEvent::NoMatch => {}
        }
    }
    tracing::debug!("source event stream closed");
}

/// Handle one transcript fragment: filter, classify, extract, route
async fn handle_fragment(inner: &Arc<Inner>, fragment: TranscriptFragment) {
    // Interim fragments and fragments outside a session are ignored
    if !fragment.is_final {
        return;
    }

    let project_context = {
        let mut slot = inner.session.lock().await;
        let Some(session) = slot.as_mut().filter(|s| s.is_active) else {
            tracing::trace!("fragment without active session, ignoring");
            return;
        };
        session.last_activity = Utc::now();
        session.project_context.clone()
    };

    let text = fragment.text.trim();
    if text.chars().count() < MIN_FRAGMENT_CHARS {
        return;
    }

    let config = inner.config.lock().await.clone();

    if config.enable_wake_word && !contains_wake_word(text, &config.wake_words) {
        tracing::trace!(text, "no wake word, ignoring fragment");
        return;
    }

    let is_task = classifier::is_task_command(text);
    let is_project = !is_task && classifier::is_project_command(text);
    if !is_task && !is_project {
        // Intentional filtering, not an error
        tracing::trace!(text, "fragment matched no command");
        return;
    }

    set_state(inner, SessionState::Processing).await;
    let result = inner
        .extractor
        .process_voice_input(text, project_context.as_ref())
        .await;
    // The session may have been stopped while the extraction was in flight;
    // a stopped session must not come back as Listening
    set_state(inner, post_processing_state(inner).await).await;

    match result {
        Ok(Intent::CreateTask(data)) if is_task => {
            let pending = PendingTask {
                id: Uuid::new_v4().to_string(),
                title: data.title,
                description: data.description,
                priority: data.priority.unwrap_or(config.default_priority),
                project_id: data
                    .project_id
                    .or_else(|| project_context.map(|c| c.project_id)),
                confidence: fragment.confidence,
                raw_speech_text: text.to_string(),
                timestamp: Utc::now(),
                needs_confirmation: fragment.confidence < CONFIRMATION_THRESHOLD
                    || config.confirm_before_saving,
            };
            route_pending(inner, pending, config.enable_auto_save).await;
        }
        Ok(Intent::CreateProject(data)) if is_project => {
            // Project creation is always confirmation-gated
            let pending = PendingTask {
                id: Uuid::new_v4().to_string(),
                title: format!("Create project: {}", data.name),
                description: data.description.or_else(|| Some(text.to_string())),
                priority: Priority::High,
                project_id: None,
                confidence: fragment.confidence,
                raw_speech_text: text.to_string(),
                timestamp: Utc::now(),
                needs_confirmation: true,
            };
            if push_pending(inner, pending.clone()).await {
                emit(inner, VoiceEvent::ConfirmationNeeded(pending));
            }
        }
        Ok(Intent::Unknown { clarification }) => {
            // Soft "please repeat" signal
            emit(inner, VoiceEvent::Error {
                message: clarification
                    .unwrap_or_else(|| "Could not understand the command".to_string()),
            });
        }
        Ok(other) => {
            tracing::debug!(intent = ?other, "extractor returned unroutable intent");
        }
        Err(e) => {
            emit(inner, VoiceEvent::Error {
                message: format!("Failed to process speech: {e}"),
            });
        }
    }
}

/// Queue a pending task; false when the session went away mid-extraction
async fn push_pending(inner: &Inner, pending: PendingTask) -> bool {
    let mut slot = inner.session.lock().await;
    let Some(session) = slot.as_mut().filter(|s| s.is_active) else {
        tracing::debug!(
            title = %pending.title,
            "session ended during extraction, discarding result"
        );
        return false;
    };
    session.pending_tasks.push(pending);
    true
}

/// Route a freshly built task-intent pending task
async fn route_pending(inner: &Arc<Inner>, pending: PendingTask, auto_save: bool) {
    if !push_pending(inner, pending.clone()).await {
        return;
    }

    tracing::info!(
        title = %pending.title,
        confidence = pending.confidence,
        needs_confirmation = pending.needs_confirmation,
        "pending task queued"
    );

    if pending.needs_confirmation {
        emit(inner, VoiceEvent::ConfirmationNeeded(pending));
    } else if auto_save {
        let _ = confirm_inner(inner, &pending.id).await;
    } else {
        emit(inner, VoiceEvent::PendingTask(pending));
    }
}

/// Confirm + persist a pending task (shared by the public API and auto-save)
async fn confirm_inner(inner: &Inner, pending_id: &str) -> Option<Task> {
    let pending = {
        let slot = inner.session.lock().await;
        slot.as_ref()
            .and_then(|s| s.pending_tasks.iter().find(|p| p.id == pending_id))
            .cloned()
    };

    let Some(pending) = pending else {
        emit(inner, VoiceEvent::Error {
            message: format!("No pending task with id {pending_id}"),
        });
        return None;
    };

    set_state(inner, SessionState::Processing).await;

    let new_task = NewTask {
        title: pending.title.clone(),
        description: pending.description.clone(),
        priority: pending.priority,
        status: TaskStatus::Todo,
        project_id: pending.project_id.clone(),
        user_id: inner.user_id.clone(),
        source: TaskSource::Voice,
    };

    let outcome = inner.store.create_task(new_task).await;

    // Processing is over either way; where we land depends on whether a
    // session is still running
    set_state(inner, post_processing_state(inner).await).await;

    match outcome {
        Ok(task) => {
            let mut slot = inner.session.lock().await;
            if let Some(session) = slot.as_mut() {
                session.pending_tasks.retain(|p| p.id != pending_id);
            }
            drop(slot);

            tracing::info!(task = %task.id, title = %task.title, "task created");
            emit(inner, VoiceEvent::TaskCreated(task.clone()));
            Some(task)
        }
        Err(e) => {
            // Pending task stays queued so the caller can retry
            tracing::warn!(error = %e, pending = pending_id, "task creation failed");
            emit(inner, VoiceEvent::Error {
                message: format!("Failed to save task: {e}"),
            });
            None
        }
    }
}

/// Source stream ended: restart listening while the session is fresh
async fn handle_ended(inner: &Arc<Inner>) {
    let fresh = {
        let slot = inner.session.lock().await;
        let timeout = inner.config.lock().await.session_timeout;
        slot.as_ref().filter(|s| s.is_active).is_some_and(|s| {
            (Utc::now() - s.last_activity)
                .to_std()
                .is_ok_and(|idle| idle <= timeout)
        })
    };

    if !fresh {
        set_state(inner, SessionState::Idle).await;
        return;
    }

    tokio::time::sleep(RESTART_DELAY).await;

    // Session may have been stopped during the delay
    if inner.session.lock().await.as_ref().is_some_and(|s| s.is_active) {
        if let Err(e) = inner.source.start_listening().await {
            tracing::warn!(error = %e, "failed to restart listening");
            emit(inner, VoiceEvent::Error {
                message: format!("Failed to restart listening: {e}"),
            });
            set_state(inner, SessionState::Idle).await;
        } else {
            tracing::debug!("listening restarted after source end");
        }
    }
}

/// Case-insensitive substring wake-word check
fn contains_wake_word(text: &str, wake_words: &[String]) -> bool {
    let lower = text.to_lowercase();
    wake_words.iter().any(|w| lower.contains(&w.to_lowercase()))
}
