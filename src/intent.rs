//! Intent extraction over a remote LLM
//!
//! Turns a raw transcript fragment into a structured [`Intent`]. The remote
//! model is asked for strict JSON at low temperature; a malformed response
//! degrades to [`Intent::Unknown`] with a retry clarification, while
//! transport failures surface as errors for the caller to report.

use async_trait::async_trait;
use serde::Deserialize;

use crate::tasks::{Priority, ProjectContext};
use crate::{Error, Result};

/// Sampling temperature: near-deterministic to bias toward parseable output
const TEMPERATURE: f64 = 0.1;

/// Max tokens for the structured response
const MAX_TOKENS: u32 = 512;

/// Clarification returned when the model's output cannot be parsed
const RETRY_CLARIFICATION: &str = "Sorry, I didn't catch that. Could you rephrase?";

/// Instructions prepended to every extraction request
const SYSTEM_PROMPT: &str = "You turn one voice transcript into exactly one JSON object and nothing else.\n\
Schema: {\"intent\": \"create_task\" | \"create_project\" | \"query\" | \"unknown\", \"data\": object?, \"clarification\": string?}\n\
For create_task, data is {\"title\": string, \"description\": string?, \"priority\": \"low\"|\"medium\"|\"high\"?, \"due_date\": \"YYYY-MM-DD\"?, \"project_id\": string?}.\n\
For create_project, data is {\"name\": string, \"description\": string?}.\n\
For query, data is {\"question\": string}.\n\
If the transcript is ambiguous, use intent \"unknown\" and set clarification to a short question for the user.\n\
Respond with JSON only, no prose, no code fences.";

/// Structured task payload from the extractor
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskIntentData {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Structured project payload from the extractor
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectIntentData {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Classified purpose of an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    CreateTask(TaskIntentData),
    CreateProject(ProjectIntentData),
    Query { question: String },
    Unknown { clarification: Option<String> },
}

/// Remote intent extraction capability
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    /// Classify one transcript, optionally scoped to a project
    ///
    /// # Errors
    ///
    /// Implementations may return an error on transport failure; the bundled
    /// extractor degrades both transport and parse failures to
    /// [`Intent::Unknown`] instead
    async fn process_voice_input(
        &self,
        text: &str,
        project: Option<&ProjectContext>,
    ) -> Result<Intent>;
}

/// LLM provider backend
#[derive(Clone, Copy, Debug)]
enum LlmProvider {
    Anthropic,
    OpenAi,
}

/// Extracts intents via a hosted LLM
pub struct LlmIntentExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: LlmProvider,
}

impl LlmIntentExtractor {
    /// Create an extractor backed by the Anthropic messages API
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new_anthropic(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "Anthropic API key required for intent extraction".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider: LlmProvider::Anthropic,
        })
    }

    /// Create an extractor backed by the `OpenAI` chat completions API
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new_openai(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for intent extraction".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider: LlmProvider::OpenAi,
        })
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "system": SYSTEM_PROMPT,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Anthropic request failed");
                Error::Intent(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Anthropic API error");
            return Err(Error::Intent(format!("Anthropic API error {status}: {body}")));
        }

        let result: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| Error::Intent(format!("failed to parse Anthropic response: {e}")))?;

        Ok(result
            .content
            .into_iter()
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "OpenAI request failed");
                Error::Intent(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "OpenAI API error");
            return Err(Error::Intent(format!("OpenAI API error {status}: {body}")));
        }

        let result: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| Error::Intent(format!("failed to parse OpenAI response: {e}")))?;

        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl IntentExtractor for LlmIntentExtractor {
    async fn process_voice_input(
        &self,
        text: &str,
        project: Option<&ProjectContext>,
    ) -> Result<Intent> {
        let prompt = build_prompt(text, project);
        tracing::debug!(text, "extracting intent");

        let result = match self.provider {
            LlmProvider::Anthropic => self.complete_anthropic(&prompt).await,
            LlmProvider::OpenAi => self.complete_openai(&prompt).await,
        };

        // Transport failures degrade the same way parse failures do; the
        // user hears a retry prompt instead of a hard error
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "intent extraction failed");
                return Ok(Intent::Unknown {
                    clarification: Some(RETRY_CLARIFICATION.to_string()),
                });
            }
        };

        let intent = parse_intent(&raw);
        tracing::debug!(?intent, "intent extracted");
        Ok(intent)
    }
}

/// Build the single-turn extraction prompt
fn build_prompt(text: &str, project: Option<&ProjectContext>) -> String {
    project.map_or_else(
        || format!("Transcript: {text}"),
        |p| {
            format!(
                "Active project: {} (id {})\nTranscript: {text}",
                p.project_name, p.project_id
            )
        },
    )
}

/// Parse the model's JSON response into an [`Intent`]
///
/// Any shape the schema does not cover degrades to `Unknown` with a generic
/// retry clarification; this function never errors.
#[must_use]
pub fn parse_intent(raw: &str) -> Intent {
    let trimmed = strip_code_fences(raw.trim());

    let Ok(wire) = serde_json::from_str::<WireIntent>(trimmed) else {
        tracing::warn!(raw, "unparseable intent response");
        return Intent::Unknown {
            clarification: Some(RETRY_CLARIFICATION.to_string()),
        };
    };

    match wire.intent.as_str() {
        "create_task" => wire
            .data
            .and_then(|d| serde_json::from_value::<TaskIntentData>(d).ok())
            .filter(|d| !d.title.trim().is_empty())
            .map_or_else(
                || Intent::Unknown {
                    clarification: wire
                        .clarification
                        .or_else(|| Some(RETRY_CLARIFICATION.to_string())),
                },
                Intent::CreateTask,
            ),
        "create_project" => wire
            .data
            .and_then(|d| serde_json::from_value::<ProjectIntentData>(d).ok())
            .filter(|d| !d.name.trim().is_empty())
            .map_or_else(
                || Intent::Unknown {
                    clarification: wire
                        .clarification
                        .or_else(|| Some(RETRY_CLARIFICATION.to_string())),
                },
                Intent::CreateProject,
            ),
        "query" => {
            let question = wire
                .data
                .as_ref()
                .and_then(|d| d.get("question"))
                .and_then(|q| q.as_str())
                .unwrap_or_default()
                .to_string();
            Intent::Query { question }
        }
        _ => Intent::Unknown {
            clarification: wire.clarification,
        },
    }
}

/// Strip a markdown code fence if the model wrapped its JSON in one
fn strip_code_fences(s: &str) -> &str {
    let s = s.strip_prefix("```json").or_else(|| s.strip_prefix("```")).unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

/// Wire shape of the model's response
#[derive(Debug, Deserialize)]
struct WireIntent {
    intent: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    clarification: Option<String>,
}

/// Anthropic messages API response
#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

/// `OpenAI` chat completions response
#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}
