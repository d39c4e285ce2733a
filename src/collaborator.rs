//! Text-understanding collaborator client
//!
//! Defines the client trait and wire types for the external service that
//! extracts concepts and picks taxonomy fields. Two implementations:
//! - `HttpClient`: OpenAI-compatible chat-completions endpoint over HTTPS
//! - `MockClient`: returns scripted responses (testing)
//!
//! Callers treat every error as "no answer": the extraction gateway falls
//! back to rules and the classifier leaves the node unclassified.

use crate::config::ExtractionConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Errors from collaborator client operations.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator not available: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("collaborator returned status {0}")]
    BadStatus(u16),
    #[error("response parse error: {0}")]
    ParseError(String),
}

/// Extraction request: the text plus per-category caps
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest {
    pub text: String,
    pub max_keywords: usize,
    pub max_persons: usize,
    pub max_projects: usize,
}

/// A labelled item; a missing confidence reads as 0.0 so the item never
/// clears the acceptance threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub label: String,
    #[serde(default)]
    pub confidence: f64,
}

impl RawItem {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Extraction response as the collaborator returns it, before filtering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub keywords: Vec<RawItem>,
    #[serde(default)]
    pub persons: Vec<RawItem>,
    #[serde(default)]
    pub projects: Vec<RawItem>,
}

/// One field in the catalogue offered to the collaborator
#[derive(Debug, Clone, Serialize)]
pub struct FieldOption {
    pub field_id: String,
    pub domain: String,
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldChoiceRequest {
    pub label: String,
    pub fields: Vec<FieldOption>,
}

/// The collaborator's pick. `field_id = None` means "unclassifiable".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChoice {
    #[serde(default)]
    pub field_id: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// Client trait for the text-understanding service.
///
/// Abstracts over transport (HTTP, mock) so the gateway and classifier
/// don't depend on how the service is reached.
#[async_trait]
pub trait UnderstandingClient: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<RawExtraction, CollaboratorError>;

    async fn choose_field(
        &self,
        request: &FieldChoiceRequest,
    ) -> Result<FieldChoice, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

const EXTRACTION_PROMPT: &str = "Extract named concepts from the user's text. \
Reply with only a JSON object of the form \
{\"keywords\":[{\"label\":\"...\",\"confidence\":0.0}],\"persons\":[...],\"projects\":[...]}. \
Keywords are technical terms, products and topics; persons are people's names; \
projects are named projects. Respect the caps given in the request.";

const FIELD_PROMPT: &str = "Pick the single best-fit field for the label from the catalogue. \
Reply with only a JSON object {\"field_id\":\"...\",\"confidence\":0.0}, \
or {\"field_id\":null,\"confidence\":0.0} if nothing fits.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for the production collaborator.
pub struct HttpClient {
    http_client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpClient {
    /// Build a client from the extraction settings.
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env`; a missing endpoint or key means the collaborator is
    /// unavailable.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, CollaboratorError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| CollaboratorError::Unavailable("no endpoint configured".to_string()))?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            CollaboratorError::Unavailable(format!("{} is not set", config.api_key_env))
        })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn complete(&self, system: &str, input: String) -> Result<serde_json::Value, CollaboratorError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: input,
                },
            ],
            temperature: 0.0,
        };

        debug!(model = %self.model, "sending collaborator request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::BadStatus(status.as_u16()));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::ParseError(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CollaboratorError::ParseError("empty response".to_string()))?;

        extract_json(&content)
            .ok_or_else(|| CollaboratorError::ParseError("no JSON object in response".to_string()))
    }
}

#[async_trait]
impl UnderstandingClient for HttpClient {
    async fn extract(&self, request: &ExtractionRequest) -> Result<RawExtraction, CollaboratorError> {
        let input =
            serde_json::to_string(request).map_err(|e| CollaboratorError::ParseError(e.to_string()))?;
        let value = self.complete(EXTRACTION_PROMPT, input).await?;
        serde_json::from_value(value).map_err(|e| CollaboratorError::ParseError(e.to_string()))
    }

    async fn choose_field(
        &self,
        request: &FieldChoiceRequest,
    ) -> Result<FieldChoice, CollaboratorError> {
        let input =
            serde_json::to_string(request).map_err(|e| CollaboratorError::ParseError(e.to_string()))?;
        let value = self.complete(FIELD_PROMPT, input).await?;
        serde_json::from_value(value).map_err(|e| CollaboratorError::ParseError(e.to_string()))
    }
}

/// Pull the first JSON object out of a chat completion.
///
/// Models wrap answers in prose or code fences, so each candidate span is
/// tried in turn: the whole reply, the body of a fenced block, then the
/// outermost braces.
pub(crate) fn extract_json(text: &str) -> Option<serde_json::Value> {
    let reply = text.trim();
    [Some(reply), fenced_block(reply), brace_span(reply)]
        .into_iter()
        .flatten()
        .find_map(parse_object)
}

fn parse_object(candidate: &str) -> Option<serde_json::Value> {
    serde_json::from_str::<serde_json::Value>(candidate.trim())
        .ok()
        .filter(serde_json::Value::is_object)
}

fn fenced_block(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    let body = &reply[open + 3..];
    // skip an info string such as `json`
    let body = &body[body.find('\n')? + 1..];
    body.find("```").map(|close| &body[..close])
}

fn brace_span(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

// ---------------------------------------------------------------------------
// Mock client
// ---------------------------------------------------------------------------

/// Mock client for testing; returns preconfigured responses.
#[derive(Default)]
pub struct MockClient {
    extraction: Option<RawExtraction>,
    field_choice: Option<FieldChoice>,
    extract_calls: AtomicUsize,
    choose_calls: AtomicUsize,
}

impl MockClient {
    /// A client that fails every call
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_extraction(mut self, extraction: RawExtraction) -> Self {
        self.extraction = Some(extraction);
        self
    }

    pub fn with_field_choice(mut self, field_id: Option<&str>, confidence: f64) -> Self {
        self.field_choice = Some(FieldChoice {
            field_id: field_id.map(str::to_string),
            confidence,
        });
        self
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn choose_calls(&self) -> usize {
        self.choose_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnderstandingClient for MockClient {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<RawExtraction, CollaboratorError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.extraction
            .clone()
            .ok_or_else(|| CollaboratorError::Unavailable("no scripted extraction".to_string()))
    }

    async fn choose_field(
        &self,
        _request: &FieldChoiceRequest,
    ) -> Result<FieldChoice, CollaboratorError> {
        self.choose_calls.fetch_add(1, Ordering::SeqCst);
        self.field_choice
            .clone()
            .ok_or_else(|| CollaboratorError::Unavailable("no scripted field choice".to_string()))
    }
}
