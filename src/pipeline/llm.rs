//! Field Extractor: Markdown → [`ExtractionRecord`] via a language model.
//!
//! The request carries two messages, the field-set system prompt from
//! [`crate::prompts`] and a user message with the document Markdown and
//! filename, and asks the service for a JSON object response. Locally the
//! reply is only checked for JSON-object syntax: fields the model omits or
//! adds pass through unchanged.
//!
//! No retry happens here. Transport and credential errors are returned to
//! the orchestrator; a syntactically bad reply becomes
//! [`ExtractionRecord::ParseFailed`].

use crate::config::LanguageModelConfig;
use crate::error::{Pdf2FieldsError, ServiceKind};
use crate::pipeline::ensure_success;
use crate::prompts::user_prompt;
use crate::record::{coerce_to_strings, ExtractionRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SERVICE: ServiceKind = ServiceKind::LanguageModel;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// The parts of a completion the pipeline uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatCompletion {
    /// Text of the first choice. `None` when the service returned no content.
    pub content: Option<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A language-model service that can be asked for a JSON-object reply.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete_json(&self, messages: &[ChatMessage])
        -> Result<ChatCompletion, Pdf2FieldsError>;
}

/// Outcome of one field-extraction call.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldExtraction {
    pub record: ExtractionRecord,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Ask `client` to extract fields from one document's Markdown.
///
/// Empty `markdown` is sent as-is; the model is expected to answer with
/// `null` for every field.
pub async fn extract_fields(
    client: &dyn ChatClient,
    system_prompt: &str,
    markdown: &str,
    filename: &str,
    coerce_values: bool,
) -> Result<FieldExtraction, Pdf2FieldsError> {
    let messages = [
        ChatMessage::system(system_prompt),
        ChatMessage::user(user_prompt(markdown, filename)),
    ];

    let start = Instant::now();
    let completion = client.complete_json(&messages).await?;
    debug!(
        "{}: {} prompt tokens, {} completion tokens, {:?}",
        filename,
        completion.prompt_tokens,
        completion.completion_tokens,
        start.elapsed()
    );

    Ok(FieldExtraction {
        record: parse_record(completion.content.as_deref(), filename, coerce_values),
        prompt_tokens: completion.prompt_tokens,
        completion_tokens: completion.completion_tokens,
    })
}

/// Turn the model's reply text into a record.
///
/// Anything other than a JSON object (missing content, malformed JSON, a
/// bare array or string) yields [`ExtractionRecord::ParseFailed`].
pub fn parse_record(content: Option<&str>, filename: &str, coerce_values: bool) -> ExtractionRecord {
    let parsed = content.map(|c| serde_json::from_str::<Value>(c));
    match parsed {
        Some(Ok(Value::Object(mut fields))) => {
            if coerce_values {
                coerce_to_strings(&mut fields);
            }
            ExtractionRecord::extracted(filename, fields)
        }
        Some(Ok(other)) => {
            warn!("{}: model returned JSON that is not an object: {}", filename, other);
            ExtractionRecord::ParseFailed {
                filename: filename.to_string(),
            }
        }
        Some(Err(e)) => {
            warn!("{}: model reply is not valid JSON: {}", filename, e);
            ExtractionRecord::ParseFailed {
                filename: filename.to_string(),
            }
        }
        None => {
            warn!("{}: model reply had no content", filename);
            ExtractionRecord::ParseFailed {
                filename: filename.to_string(),
            }
        }
    }
}

// ── Azure OpenAI ─────────────────────────────────────────────────────────

/// Chat-completions client for an Azure OpenAI deployment.
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    config: LanguageModelConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl AzureOpenAiClient {
    /// Build a client whose requests time out after `timeout_secs`.
    pub fn new(config: LanguageModelConfig, timeout_secs: u64) -> Result<Self, Pdf2FieldsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Pdf2FieldsError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl ChatClient for AzureOpenAiClient {
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
    ) -> Result<ChatCompletion, Pdf2FieldsError> {
        let url = completions_url(&self.config);
        let body = build_request(&self.config, messages);

        let response = self
            .http
            .post(&url)
            .header("api-key", &self.config.key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Pdf2FieldsError::transport(SERVICE, e))?;
        let response = ensure_success(SERVICE, response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| Pdf2FieldsError::transport(SERVICE, e))?;

        parse_completion(&text)
    }
}

fn completions_url(config: &LanguageModelConfig) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        config.endpoint.trim_end_matches('/'),
        config.deployment,
        config.api_version
    )
}

fn build_request<'a>(config: &'a LanguageModelConfig, messages: &'a [ChatMessage]) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.deployment,
        messages,
        response_format: ResponseFormat {
            kind: "json_object",
        },
        temperature: config.temperature,
    }
}

/// Decode a chat-completions envelope. A body without choices is an error.
fn parse_completion(body: &str) -> Result<ChatCompletion, Pdf2FieldsError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| Pdf2FieldsError::InvalidServiceResponse {
            service: SERVICE,
            detail: format!("chat completion: {e}"),
        })?;

    let choice = parsed.choices.into_iter().next().ok_or_else(|| {
        Pdf2FieldsError::InvalidServiceResponse {
            service: SERVICE,
            detail: "response contained no choices".into(),
        }
    })?;
    if let Some(reason) = choice.finish_reason.as_deref() {
        if reason != "stop" {
            warn!("Completion finished with reason '{}'", reason);
        }
    }

    let (prompt_tokens, completion_tokens) = parsed
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));

    Ok(ChatCompletion {
        content: choice.message.content,
        prompt_tokens,
        completion_tokens,
    })
}
