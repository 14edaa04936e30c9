//! Shared test utilities
//!
//! Stub implementations of every pipeline seam so sessions can run without
//! audio hardware, network access, or a real LLM.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use flowvoice::intent::{Intent, IntentExtractor, TaskIntentData};
use flowvoice::recognizer::{SourceEvent, TranscriptFragment, TranscriptSource};
use flowvoice::tasks::{NewTask, ProjectContext, Task, TaskStore};
use flowvoice::{Error, Result, VoiceEvent, VoiceTaskConfig, VoiceTaskManager};

/// Transcript source that only counts calls
#[derive(Default)]
pub struct StubSource {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub supported: AtomicBool,
}

impl StubSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            supported: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl TranscriptSource for StubSource {
    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    async fn start_listening(&self) -> Result<()> {
        if !self.is_supported() {
            return Err(Error::NotSupported("stub marked unsupported".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_listening(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn abort_listening(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Extractor that replays canned results
///
/// When the queue is empty it falls back to a `CreateTask` intent whose
/// title is the input text.
pub struct StubExtractor {
    canned: Mutex<VecDeque<Result<Intent>>>,
    pub calls: AtomicUsize,
    /// Artificial latency per call, for stop-while-extracting tests
    pub delay_ms: AtomicU64,
}

impl StubExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            canned: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn push(&self, result: Result<Intent>) {
        self.canned.lock().unwrap().push_back(result);
    }
}

impl Default for StubExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentExtractor for StubExtractor {
    async fn process_voice_input(
        &self,
        text: &str,
        _project: Option<&ProjectContext>,
    ) -> Result<Intent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(result) = self.canned.lock().unwrap().pop_front() {
            return result;
        }
        Ok(Intent::CreateTask(TaskIntentData {
            title: text.to_string(),
            description: None,
            priority: None,
            due_date: None,
            project_id: None,
        }))
    }
}

/// In-memory task store with a failure switch
#[derive(Default)]
pub struct MemoryStore {
    pub tasks: Mutex<Vec<Task>>,
    pub fail: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn saved(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, task: NewTask) -> Result<Task> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Persistence("store unavailable".to_string()));
        }

        let now = Utc::now();
        let stored = Task {
            id: Uuid::new_v4().to_string(),
            title: task.title,
            description: task.description,
            priority: task.priority,
            status: task.status,
            project_id: task.project_id,
            user_id: task.user_id,
            source: task.source,
            created_at: now,
            updated_at: now,
        };
        self.tasks.lock().unwrap().push(stored.clone());
        Ok(stored)
    }
}

/// Everything a session test needs in one place
pub struct Harness {
    pub manager: VoiceTaskManager,
    pub events: mpsc::UnboundedReceiver<VoiceEvent>,
    pub source_tx: mpsc::UnboundedSender<SourceEvent>,
    pub source: Arc<StubSource>,
    pub extractor: Arc<StubExtractor>,
    pub store: Arc<MemoryStore>,
}

/// Build a manager wired to stubs
#[must_use]
pub fn setup_manager(config: VoiceTaskConfig) -> Harness {
    let source = Arc::new(StubSource::new());
    let extractor = Arc::new(StubExtractor::new());
    let store = Arc::new(MemoryStore::new());
    let (source_tx, source_rx) = mpsc::unbounded_channel();

    let (manager, events) = VoiceTaskManager::with_receiver(
        Arc::clone(&source) as Arc<dyn TranscriptSource>,
        source_rx,
        Arc::clone(&extractor) as Arc<dyn IntentExtractor>,
        Arc::clone(&store) as Arc<dyn TaskStore>,
        "test-user",
        config,
    );

    Harness {
        manager,
        events,
        source_tx,
        source,
        extractor,
        store,
    }
}

/// Final transcript fragment wrapped as a source event
#[must_use]
pub fn spoken(text: &str, confidence: f32) -> SourceEvent {
    SourceEvent::Result(TranscriptFragment::final_text(text, confidence))
}

/// Next event that is not a `StatusChanged`, with a receive timeout
pub async fn next_task_event(rx: &mut mpsc::UnboundedReceiver<VoiceEvent>) -> VoiceEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if !matches!(event, VoiceEvent::StatusChanged(_)) {
            return event;
        }
    }
}

/// Assert that no non-status event arrives within a short grace window
pub async fn assert_no_task_event(rx: &mut mpsc::UnboundedReceiver<VoiceEvent>) {
    loop {
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Err(_) => return,
            Ok(Some(VoiceEvent::StatusChanged(_))) => {}
            Ok(Some(event)) => panic!("unexpected event: {event:?}"),
            Ok(None) => panic!("event channel closed"),
        }
    }
}
