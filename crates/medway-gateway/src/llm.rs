//! LLM gateway
//!
//! TigerStyle: OpenAI-compatible chat completions over the `HttpClient` trait.
//! The endpoint comes with every call because each enterprise may use its own model.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use medway_core::http::{HttpClient, HttpRequest, ReqwestHttpClient};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::structured::strip_think;

const SERVICE: &str = "llm";

/// System prompt sent ahead of single-prompt calls
pub const SYSTEM_PROMPT_DEFAULT: &str = "You are a helpful assistant.";

/// Suffix that asks reasoning models to skip their scratchpad
const NO_THINK_SUFFIX: &str = "/no_think";

// =============================================================================
// Types
// =============================================================================

/// Model endpoint as stored in system configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEndpoint {
    /// Model name sent in the request body
    pub name: String,
    /// Bearer token
    pub key: String,
    /// Full request URL
    pub url: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl ModelEndpoint {
    pub fn new(name: impl Into<String>, key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            url: url.into(),
            kind: String::new(),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// `[system, user(prompt)]` for single-prompt classification calls
pub fn prompt_messages(prompt: impl Into<String>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT_DEFAULT),
        ChatMessage::user(prompt),
    ]
}

/// Fill every `{{NAME}}` placeholder listed in `values`
pub fn render_prompt(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in values {
        out = out.replace(&format!("{{{{{}}}}}", name), value);
    }
    out
}

/// Per-call options
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub endpoint: ModelEndpoint,
    /// Append `/no_think` to user turns and disable thinking
    pub disable_thinking: bool,
    pub temperature: Option<f32>,
}

impl CallOptions {
    pub fn new(endpoint: ModelEndpoint) -> Self {
        Self {
            endpoint,
            disable_thinking: true,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_thinking(mut self) -> Self {
        self.disable_thinking = false;
        self
    }
}

/// Incremental streaming output
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    ContentDelta { text: String },
    Done { stop_reason: String },
}

/// Stream of deltas; ends after a single `Done`
pub type DeltaStream = Pin<Box<dyn Stream<Item = GatewayResult<StreamDelta>> + Send>>;

// =============================================================================
// Trait
// =============================================================================

/// Text completion gateway
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Full reply text with any scratchpad removed
    async fn complete(&self, messages: &[ChatMessage], options: &CallOptions) -> GatewayResult<String>;

    /// Incremental reply terminated by `StreamDelta::Done`
    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        options: &CallOptions,
    ) -> GatewayResult<DeltaStream>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    enable_thinking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible gateway
#[derive(Clone)]
pub struct HttpLlmGateway {
    http_client: Arc<dyn HttpClient>,
}

impl HttpLlmGateway {
    pub fn new() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }

    fn build_request(
        messages: &[ChatMessage],
        options: &CallOptions,
        stream: bool,
    ) -> GatewayResult<HttpRequest> {
        assert!(!messages.is_empty(), "messages cannot be empty");
        let messages = messages
            .iter()
            .map(|m| {
                if options.disable_thinking && m.role == "user" {
                    ChatMessage::user(format!("{}{}", m.content, NO_THINK_SUFFIX))
                } else {
                    m.clone()
                }
            })
            .collect();

        let body = ChatCompletionRequest {
            model: &options.endpoint.name,
            messages,
            stream,
            enable_thinking: !options.disable_thinking,
            temperature: options.temperature,
        };

        HttpRequest::post(&options.endpoint.url)
            .bearer(&options.endpoint.key)
            .json(&body)
            .map_err(|e| GatewayError::request_failed(SERVICE, e))
    }
}

impl Default for HttpLlmGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmGateway for HttpLlmGateway {
    async fn complete(&self, messages: &[ChatMessage], options: &CallOptions) -> GatewayResult<String> {
        let request = Self::build_request(messages, options, false)?;
        let response = self
            .http_client
            .send(request)
            .await
            .map_err(|e| GatewayError::request_failed(SERVICE, e))?;

        if !response.is_success() {
            return Err(GatewayError::BadStatus {
                service: SERVICE.to_string(),
                status: response.status,
                body: response.text().unwrap_or_default(),
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .map_err(|e| GatewayError::malformed_response(SERVICE, e))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::malformed_response(SERVICE, "no completion choices"))?;

        Ok(strip_think(&choice.message.content))
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        options: &CallOptions,
    ) -> GatewayResult<DeltaStream> {
        let request = Self::build_request(messages, options, true)?;
        let byte_stream = self
            .http_client
            .send_streaming(request)
            .await
            .map_err(|e| GatewayError::request_failed(SERVICE, e))?;
        Ok(Box::pin(parse_sse_stream(byte_stream)))
    }
}

// =============================================================================
// SSE Parsing
// =============================================================================

/// Convert OpenAI-style SSE chunks into deltas
///
/// Emits exactly one `Done`, from `finish_reason` or the `[DONE]` marker,
/// whichever comes first. Scratchpad markers are dropped.
pub fn parse_sse_stream(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, String>> + Send + 'static,
) -> impl Stream<Item = GatewayResult<StreamDelta>> + Send {
    byte_stream
        .scan((String::new(), false), |(buffer, seen_done), chunk| {
            let deltas = match chunk {
                Ok(chunk) => match std::str::from_utf8(&chunk) {
                    Ok(text) => {
                        buffer.push_str(text);
                        drain_lines(buffer, seen_done)
                    }
                    Err(_) => vec![Err(GatewayError::malformed_response(
                        SERVICE,
                        "stream chunk is not UTF-8",
                    ))],
                },
                Err(e) => vec![Err(GatewayError::request_failed(SERVICE, e))],
            };
            futures::future::ready(Some(deltas))
        })
        .flat_map(stream::iter)
}

fn drain_lines(buffer: &mut String, seen_done: &mut bool) -> Vec<GatewayResult<StreamDelta>> {
    let mut deltas = Vec::new();
    while let Some(newline_idx) = buffer.find('\n') {
        let line = buffer[..newline_idx].trim().to_string();
        buffer.drain(..=newline_idx);

        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            continue;
        };
        if data == "[DONE]" {
            if !*seen_done {
                *seen_done = true;
                deltas.push(Ok(StreamDelta::Done {
                    stop_reason: "stop".to_string(),
                }));
            }
            continue;
        }

        let Ok(event) = serde_json::from_str::<Value>(data) else {
            continue;
        };
        if let Some(error) = event.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            deltas.push(Err(GatewayError::request_failed(SERVICE, message)));
            continue;
        }

        let Some(choice) = event
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
        else {
            continue;
        };
        if let Some(content) = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())
        {
            let scratch = matches!(content, "<think>" | "</think>");
            if !content.is_empty() && !scratch {
                deltas.push(Ok(StreamDelta::ContentDelta {
                    text: content.to_string(),
                }));
            }
        }
        if let Some(reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            if !*seen_done {
                *seen_done = true;
                deltas.push(Ok(StreamDelta::Done {
                    stop_reason: reason.to_string(),
                }));
            }
        }
    }
    deltas
}

/// Concatenate a delta stream into the final text
pub async fn collect_stream(mut stream: DeltaStream) -> GatewayResult<String> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::ContentDelta { text: piece } => text.push_str(&piece),
            StreamDelta::Done { .. } => break,
        }
    }
    Ok(text)
}
