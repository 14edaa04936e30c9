use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use flowvoice::db::{self, TaskRepo};
use flowvoice::{
    classifier, Config, IntentExtractor, LlmIntentExtractor, RecognitionBackend, Recognizer,
    RecognizerConfig, SourceEvent, TranscriptFragment, VoiceEvent, VoiceTaskManager,
};
use flowvoice::tasks::ProjectContext;

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Flowvoice - Voice-driven task creation for ProjectFlow
#[derive(Parser)]
#[command(name = "flowvoice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interactive voice session with stdin as the transcript source
    Run {
        /// Project id to attach created tasks to
        #[arg(long)]
        project: Option<String>,

        /// Human-readable project name for the extraction prompt
        #[arg(long, requires = "project")]
        project_name: Option<String>,

        /// Persist tasks immediately when no confirmation is needed
        #[arg(long)]
        auto_save: bool,
    },
    /// Classify a single phrase without calling the LLM
    Classify {
        /// Phrase to classify
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,flowvoice=info",
        1 => "info,flowvoice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::Classify { text }) => {
            classify(&text);
            Ok(())
        }
        Some(Command::Run {
            project,
            project_name,
            auto_save,
        }) => run_session(project, project_name, auto_save).await,
        None => run_session(None, None, false).await,
    }
}

/// One-shot classification: trigger detection plus regex detail extraction
fn classify(text: &str) {
    if classifier::is_task_command(text) {
        let details = classifier::extract_task_details(text);
        println!("task command");
        println!("  title:    {}", details.title.as_deref().unwrap_or("-"));
        println!(
            "  desc:     {}",
            details.description.as_deref().unwrap_or("-")
        );
        println!(
            "  priority: {}",
            details.priority.map_or("-", |p| p.as_str())
        );
        println!(
            "  due:      {}",
            details
                .due_date
                .map_or_else(|| "-".to_string(), |d| d.to_string())
        );
    } else if classifier::is_project_command(text) {
        println!("project command");
    } else {
        println!("no command");
    }
}

/// Transcript backend that reads "speech" from stdin
///
/// Lets the whole pipeline run without audio hardware: each plain line
/// becomes a final transcript fragment with fixed confidence.
struct StdinBackend {
    events: mpsc::UnboundedSender<SourceEvent>,
    running: AtomicBool,
}

#[async_trait]
impl RecognitionBackend for StdinBackend {
    fn is_supported(&self) -> bool {
        true
    }

    async fn start(&self, _config: &RecognizerConfig) -> flowvoice::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let _ = self.events.send(SourceEvent::Started);
        Ok(())
    }

    async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(SourceEvent::Ended);
        }
    }

    async fn abort(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(SourceEvent::Ended);
        }
    }
}

async fn run_session(
    project: Option<String>,
    project_name: Option<String>,
    auto_save: bool,
) -> anyhow::Result<()> {
    let config = Config::load();

    let pool = db::init(config.db_path())?;
    let repo = TaskRepo::new(pool);

    let extractor = build_extractor(&config)?;

    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let backend = Arc::new(StdinBackend {
        events: raw_tx.clone(),
        running: AtomicBool::new(false),
    });
    let (recognizer, source_events) =
        Recognizer::new(backend, raw_rx, config.recognizer.clone());

    let mut voice_config = config.voice.clone();
    voice_config.enable_auto_save = voice_config.enable_auto_save || auto_save;

    let (manager, mut events) = VoiceTaskManager::with_receiver(
        Arc::new(recognizer),
        source_events,
        extractor,
        Arc::new(repo),
        config.user_id.clone(),
        voice_config,
    );

    // Event printer
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let project_context = project.map(|project_id| ProjectContext {
        project_name: project_name.unwrap_or_else(|| project_id.clone()),
        project_id,
    });

    let session_id = manager.start_voice_task_creation(project_context).await?;
    println!("session {session_id} started");
    println!("type speech, or :confirm <id> / :reject <id> / :pending / :status / :quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(cmd) = line.strip_prefix(':') {
            if !handle_command(&manager, cmd).await {
                break;
            }
        } else {
            let _ = raw_tx.send(SourceEvent::Result(TranscriptFragment::final_text(
                line, 0.95,
            )));
        }
    }

    manager.stop_voice_task_creation().await;
    println!("session stopped");
    Ok(())
}

/// Handle a `:command` line; returns false when the session should end
async fn handle_command(manager: &VoiceTaskManager, cmd: &str) -> bool {
    let (verb, arg) = cmd
        .split_once(char::is_whitespace)
        .map_or((cmd, ""), |(v, a)| (v, a.trim()));

    match verb {
        "confirm" => {
            if arg.is_empty() {
                println!("usage: :confirm <id>");
            } else if let Some(task) = manager.confirm_and_create_task(arg).await {
                println!("created task {}", task.id);
            }
        }
        "reject" => {
            if arg.is_empty() {
                println!("usage: :reject <id>");
            } else {
                manager.reject_pending_task(arg).await;
            }
        }
        "pending" => {
            let pending = manager.pending_tasks().await;
            if pending.is_empty() {
                println!("no pending tasks");
            }
            for p in pending {
                println!(
                    "  {}  [{}] {}{}",
                    p.id,
                    p.priority.as_str(),
                    p.title,
                    if p.needs_confirmation {
                        " (needs confirmation)"
                    } else {
                        ""
                    }
                );
            }
        }
        "status" => {
            let status = manager.session_status().await;
            println!(
                "active: {}, pending: {}, duration: {:?}",
                status.is_active, status.pending_tasks, status.session_duration
            );
        }
        "clear" => manager.clear_pending_tasks().await,
        "quit" | "stop" => return false,
        other => println!("unknown command: {other}"),
    }
    true
}

fn print_event(event: &VoiceEvent) {
    match event {
        VoiceEvent::StatusChanged(state) => println!("[state] {state:?}"),
        VoiceEvent::PendingTask(p) => {
            println!("[pending] {}  {} (confirm with :confirm {})", p.id, p.title, p.id);
        }
        VoiceEvent::ConfirmationNeeded(p) => {
            println!(
                "[confirm?] {}  {} (confidence {:.2})",
                p.id, p.title, p.confidence
            );
        }
        VoiceEvent::TaskCreated(task) => println!("[created] {}  {}", task.id, task.title),
        VoiceEvent::Error { message } => println!("[error] {message}"),
    }
}

/// Build the configured intent extractor (provider preference, then keys)
fn build_extractor(config: &Config) -> anyhow::Result<Arc<dyn IntentExtractor>> {
    let prefer_openai = config.llm_provider.as_deref() == Some("openai");

    let extractor = if prefer_openai {
        let key = config.api_keys.openai.clone().unwrap_or_default();
        let model = config
            .llm_model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        LlmIntentExtractor::new_openai(key, model)?
    } else if let Some(key) = config.api_keys.anthropic.clone() {
        let model = config
            .llm_model
            .clone()
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string());
        LlmIntentExtractor::new_anthropic(key, model)?
    } else if let Some(key) = config.api_keys.openai.clone() {
        let model = config
            .llm_model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        LlmIntentExtractor::new_openai(key, model)?
    } else {
        anyhow::bail!(
            "no LLM API key configured; set ANTHROPIC_API_KEY or OPENAI_API_KEY"
        );
    };

    Ok(Arc::new(extractor))
}
