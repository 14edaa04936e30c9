//! Voice session integration tests
//!
//! Exercises the full manager pipeline against stub seams: no audio
//! hardware, no network, no real LLM.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use flowvoice::intent::{Intent, ProjectIntentData, TaskIntentData};
use flowvoice::tasks::{Priority, ProjectContext, TaskSource, TaskStatus};
use flowvoice::{Error, SessionState, VoiceEvent, VoiceTaskConfig};

use common::{assert_no_task_event, next_task_event, setup_manager, spoken};

fn task_intent(title: &str) -> Intent {
    Intent::CreateTask(TaskIntentData {
        title: title.to_string(),
        description: None,
        priority: None,
        due_date: None,
        project_id: None,
    })
}

#[tokio::test]
async fn high_confidence_auto_save_creates_task() {
    let mut h = setup_manager(VoiceTaskConfig {
        enable_auto_save: true,
        ..VoiceTaskConfig::default()
    });
    h.extractor.push(Ok(task_intent("Buy milk")));

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("create a task to buy milk", 0.95))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::TaskCreated(task) = event else {
        panic!("expected TaskCreated, got {event:?}");
    };
    assert_eq!(task.title, "Buy milk");
    assert_eq!(task.source, TaskSource::Voice);
    assert_eq!(task.status, TaskStatus::Todo);
    assert_eq!(task.user_id, "test-user");

    // Saved task leaves the pending queue
    assert!(h.manager.pending_tasks().await.is_empty());
    assert_eq!(h.store.saved().len(), 1);
}

#[tokio::test]
async fn low_confidence_requires_confirmation() {
    let mut h = setup_manager(VoiceTaskConfig {
        enable_auto_save: true,
        ..VoiceTaskConfig::default()
    });
    h.extractor.push(Ok(task_intent("Call the dentist")));

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("add a task call the dentist", 0.5))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::ConfirmationNeeded(pending) = event else {
        panic!("expected ConfirmationNeeded, got {event:?}");
    };
    assert!(pending.needs_confirmation);
    assert!(h.store.saved().is_empty());

    // Explicit confirmation persists it
    let task = h
        .manager
        .confirm_and_create_task(&pending.id)
        .await
        .expect("confirm should create the task");
    assert_eq!(task.title, "Call the dentist");
    assert!(h.manager.pending_tasks().await.is_empty());
}

#[tokio::test]
async fn confirm_before_saving_gates_high_confidence() {
    let mut h = setup_manager(VoiceTaskConfig {
        enable_auto_save: true,
        confirm_before_saving: true,
        ..VoiceTaskConfig::default()
    });

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("create task review the budget", 0.99))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    assert!(matches!(event, VoiceEvent::ConfirmationNeeded(_)));
    assert!(h.store.saved().is_empty());
}

#[tokio::test]
async fn without_auto_save_task_stays_pending() {
    let mut h = setup_manager(VoiceTaskConfig::default());

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("new task water the plants", 0.95))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::PendingTask(pending) = event else {
        panic!("expected PendingTask, got {event:?}");
    };
    assert!(!pending.needs_confirmation);
    assert!(h.store.saved().is_empty());
    assert_eq!(h.manager.pending_tasks().await.len(), 1);
}

#[tokio::test]
async fn non_command_fragment_is_filtered() {
    let mut h = setup_manager(VoiceTaskConfig::default());

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("the weather is lovely today", 0.95))
        .unwrap();

    assert_no_task_event(&mut h.events).await;
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn short_and_interim_fragments_are_ignored() {
    let mut h = setup_manager(VoiceTaskConfig::default());

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx.send(spoken("um", 0.95)).unwrap();
    h.source_tx
        .send(flowvoice::SourceEvent::Result(
            flowvoice::TranscriptFragment::interim_text("create a task to buy milk", 0.95),
        ))
        .unwrap();

    assert_no_task_event(&mut h.events).await;
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fragment_without_session_is_dropped() {
    let mut h = setup_manager(VoiceTaskConfig::default());
    h.manager.initialize().unwrap();

    h.source_tx
        .send(spoken("create a task to buy milk", 0.95))
        .unwrap();

    assert_no_task_event(&mut h.events).await;
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn extractor_transport_failure_emits_error() {
    let mut h = setup_manager(VoiceTaskConfig::default());
    h.extractor
        .push(Err(Error::Intent("upstream timed out".to_string())));

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("create a task to buy milk", 0.95))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::Error { message } = event else {
        panic!("expected Error, got {event:?}");
    };
    assert!(message.contains("Failed to process speech"));

    // Session survives the failure
    assert!(h.manager.session_status().await.is_active);
}

#[tokio::test]
async fn unknown_intent_surfaces_clarification() {
    let mut h = setup_manager(VoiceTaskConfig::default());
    h.extractor.push(Ok(Intent::Unknown {
        clarification: Some("Did you mean a task or a project?".to_string()),
    }));

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("create a task or maybe not", 0.95))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::Error { message } = event else {
        panic!("expected Error, got {event:?}");
    };
    assert_eq!(message, "Did you mean a task or a project?");
}

#[tokio::test]
async fn project_command_is_always_confirmation_gated() {
    let mut h = setup_manager(VoiceTaskConfig {
        enable_auto_save: true,
        ..VoiceTaskConfig::default()
    });
    h.extractor.push(Ok(Intent::CreateProject(ProjectIntentData {
        name: "Website Redesign".to_string(),
        description: None,
    })));

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("create a project called website redesign", 0.99))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::ConfirmationNeeded(pending) = event else {
        panic!("expected ConfirmationNeeded, got {event:?}");
    };
    assert_eq!(pending.title, "Create project: Website Redesign");
    assert_eq!(pending.priority, Priority::High);
    assert!(pending.needs_confirmation);
    assert!(h.store.saved().is_empty());
}

#[tokio::test]
async fn session_context_fills_missing_project_id() {
    let mut h = setup_manager(VoiceTaskConfig::default());

    let ctx = ProjectContext {
        project_id: "proj-42".to_string(),
        project_name: "Apollo".to_string(),
    };
    h.manager
        .start_voice_task_creation(Some(ctx))
        .await
        .unwrap();
    h.source_tx
        .send(spoken("add a task draft the launch notes", 0.95))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::PendingTask(pending) = event else {
        panic!("expected PendingTask, got {event:?}");
    };
    assert_eq!(pending.project_id.as_deref(), Some("proj-42"));
}

#[tokio::test]
async fn failed_save_keeps_pending_task_for_retry() {
    let mut h = setup_manager(VoiceTaskConfig::default());

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("create task file the expense report", 0.95))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::PendingTask(pending) = event else {
        panic!("expected PendingTask, got {event:?}");
    };

    h.store.fail.store(true, Ordering::SeqCst);
    assert!(h.manager.confirm_and_create_task(&pending.id).await.is_none());

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::Error { message } = event else {
        panic!("expected Error, got {event:?}");
    };
    assert!(message.contains("Failed to save task"));

    // Still queued; retry succeeds once the store recovers
    assert_eq!(h.manager.pending_tasks().await.len(), 1);
    h.store.fail.store(false, Ordering::SeqCst);
    assert!(h.manager.confirm_and_create_task(&pending.id).await.is_some());
    assert!(h.manager.pending_tasks().await.is_empty());
}

#[tokio::test]
async fn confirm_unknown_id_reports_error() {
    let mut h = setup_manager(VoiceTaskConfig::default());
    h.manager.start_voice_task_creation(None).await.unwrap();

    assert!(h.manager.confirm_and_create_task("nope").await.is_none());

    let event = next_task_event(&mut h.events).await;
    assert!(matches!(event, VoiceEvent::Error { .. }));
    assert!(h.store.saved().is_empty());
}

#[tokio::test]
async fn reject_removes_only_the_named_task() {
    let mut h = setup_manager(VoiceTaskConfig::default());
    h.manager.start_voice_task_creation(None).await.unwrap();

    h.source_tx.send(spoken("create task first thing", 0.95)).unwrap();
    let first = match next_task_event(&mut h.events).await {
        VoiceEvent::PendingTask(p) => p,
        other => panic!("expected PendingTask, got {other:?}"),
    };

    h.source_tx.send(spoken("create task second thing", 0.95)).unwrap();
    match next_task_event(&mut h.events).await {
        VoiceEvent::PendingTask(_) => {}
        other => panic!("expected PendingTask, got {other:?}"),
    }

    h.manager.reject_pending_task(&first.id).await;

    let remaining = h.manager.pending_tasks().await;
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].id, first.id);

    // Rejecting an unknown id is a no-op
    h.manager.reject_pending_task("nope").await;
    assert_eq!(h.manager.pending_tasks().await.len(), 1);
}

#[tokio::test]
async fn starting_a_session_replaces_the_previous_one() {
    let mut h = setup_manager(VoiceTaskConfig::default());

    let first = h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx.send(spoken("create task old thing", 0.95)).unwrap();
    match next_task_event(&mut h.events).await {
        VoiceEvent::PendingTask(_) => {}
        other => panic!("expected PendingTask, got {other:?}"),
    }

    let second = h.manager.start_voice_task_creation(None).await.unwrap();
    assert_ne!(first, second);

    // Pending queue belongs to the session; the replacement starts clean
    assert!(h.manager.pending_tasks().await.is_empty());
    assert_eq!(h.source.starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let h = setup_manager(VoiceTaskConfig::default());

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.manager.stop_voice_task_creation().await;
    h.manager.stop_voice_task_creation().await;

    let status = h.manager.session_status().await;
    assert!(!status.is_active);
    assert_eq!(status.pending_tasks, 0);
}

#[tokio::test]
async fn stop_during_extraction_keeps_state_idle() {
    let h = setup_manager(VoiceTaskConfig::default());
    h.extractor.delay_ms.store(200, Ordering::SeqCst);

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("create a task to buy milk", 0.95))
        .unwrap();

    // Let the pump enter the extractor call, then stop mid-flight
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.manager.stop_voice_task_creation().await;
    assert_eq!(h.manager.state().await, SessionState::Idle);

    // The late result is discarded and must not flip the state back
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.manager.state().await, SessionState::Idle);
    assert!(h.manager.pending_tasks().await.is_empty());
    assert!(!h.manager.session_status().await.is_active);
}

#[tokio::test]
async fn failed_replacement_start_rolls_back_to_idle() {
    let h = setup_manager(VoiceTaskConfig::default());

    h.manager.start_voice_task_creation(None).await.unwrap();
    assert_eq!(h.manager.state().await, SessionState::Listening);

    // The replacement start fails; no session may survive, in any state
    h.source.supported.store(false, Ordering::SeqCst);
    assert!(h.manager.start_voice_task_creation(None).await.is_err());
    assert_eq!(h.manager.state().await, SessionState::Idle);
    assert!(!h.manager.session_status().await.is_active);
}

#[tokio::test]
async fn unsupported_source_fails_session_start() {
    let h = setup_manager(VoiceTaskConfig::default());
    h.source.supported.store(false, Ordering::SeqCst);

    assert!(h.manager.start_voice_task_creation(None).await.is_err());
    assert!(!h.manager.session_status().await.is_active);
}

#[tokio::test]
async fn wake_word_gates_fragments_when_enabled() {
    let mut h = setup_manager(VoiceTaskConfig {
        enable_wake_word: true,
        wake_words: vec!["hey flow".to_string()],
        ..VoiceTaskConfig::default()
    });

    h.manager.start_voice_task_creation(None).await.unwrap();

    // No wake word: dropped even though it is a valid command
    h.source_tx
        .send(spoken("create a task to buy milk", 0.95))
        .unwrap();
    assert_no_task_event(&mut h.events).await;

    // With wake word: processed
    h.source_tx
        .send(spoken("hey flow create a task to buy milk", 0.95))
        .unwrap();
    let event = next_task_event(&mut h.events).await;
    assert!(matches!(event, VoiceEvent::PendingTask(_)));
}

#[tokio::test]
async fn source_end_restarts_listening_while_session_is_fresh() {
    let h = setup_manager(VoiceTaskConfig::default());

    h.manager.start_voice_task_creation(None).await.unwrap();
    assert_eq!(h.source.starts.load(Ordering::SeqCst), 1);

    h.source_tx.send(flowvoice::SourceEvent::Ended).unwrap();

    // Restart happens after a short delay
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(h.source.starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn source_end_without_session_stays_idle() {
    let h = setup_manager(VoiceTaskConfig::default());
    h.manager.initialize().unwrap();

    h.source_tx.send(flowvoice::SourceEvent::Ended).unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(h.source.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn extractor_priority_overrides_default() {
    let mut h = setup_manager(VoiceTaskConfig::default());
    h.extractor.push(Ok(Intent::CreateTask(TaskIntentData {
        title: "Fix the outage".to_string(),
        description: None,
        priority: Some(Priority::High),
        due_date: None,
        project_id: None,
    })));

    h.manager.start_voice_task_creation(None).await.unwrap();
    h.source_tx
        .send(spoken("create an urgent task fix the outage", 0.95))
        .unwrap();

    let event = next_task_event(&mut h.events).await;
    let VoiceEvent::PendingTask(pending) = event else {
        panic!("expected PendingTask, got {event:?}");
    };
    assert_eq!(pending.priority, Priority::High);
}
