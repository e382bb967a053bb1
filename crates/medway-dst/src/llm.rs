//! Simulated LLM gateway for deterministic testing
//!
//! TigerStyle: Canned responses by prompt pattern, fault injection, call counting.

use async_trait::async_trait;
use futures::stream;
use medway_gateway::{
    strip_think, CallOptions, ChatMessage, DeltaStream, GatewayError, GatewayResult, LlmGateway,
    StreamDelta,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::fault::{FaultInjector, FaultType};

const SERVICE: &str = "llm";

const LLM_FAULTS: &[FaultType] = &[
    FaultType::LlmTimeout,
    FaultType::LlmFailure,
    FaultType::LlmMalformedOutput,
];

/// Simulated model
///
/// The response is the first registered pattern found in the latest message
/// containing any pattern, else the default response.
pub struct SimLlmGateway {
    responses: Vec<(String, String)>,
    default_response: String,
    faults: Arc<FaultInjector>,
    calls: AtomicU64,
    prompts: Mutex<Vec<String>>,
}

impl SimLlmGateway {
    pub fn new(faults: Arc<FaultInjector>) -> Self {
        Self {
            responses: Vec::new(),
            default_response: "好的。".to_string(),
            faults,
            calls: AtomicU64::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer `response` to prompts containing `pattern`
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.push((pattern.into(), response.into()));
        self
    }

    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Completed and streamed calls so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Last message of every call, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn respond(&self, operation: &str, messages: &[ChatMessage]) -> GatewayResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(last) = messages.last() {
            self.prompts
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(last.content.clone());
        }

        match self.faults.should_inject(operation, LLM_FAULTS) {
            Some(FaultType::LlmTimeout) => {
                return Err(GatewayError::Timeout {
                    service: SERVICE.to_string(),
                    timeout_ms: 0,
                })
            }
            Some(FaultType::LlmFailure) => {
                return Err(GatewayError::request_failed(
                    SERVICE,
                    "simulated provider error",
                ))
            }
            Some(FaultType::LlmMalformedOutput) => {
                return Ok("抱歉，我无法以 JSON 格式回答。".to_string())
            }
            _ => {}
        }

        for message in messages.iter().rev() {
            for (pattern, response) in &self.responses {
                if message.content.contains(pattern.as_str()) {
                    return Ok(response.clone());
                }
            }
        }
        Ok(self.default_response.clone())
    }
}

#[async_trait]
impl LlmGateway for SimLlmGateway {
    async fn complete(&self, messages: &[ChatMessage], _options: &CallOptions) -> GatewayResult<String> {
        let text = self.respond("llm_complete", messages)?;
        Ok(strip_think(&text))
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        _options: &CallOptions,
    ) -> GatewayResult<DeltaStream> {
        let text = strip_think(&self.respond("llm_stream", messages)?);
        let mut deltas: Vec<GatewayResult<StreamDelta>> = text
            .chars()
            .map(|c| Ok(StreamDelta::ContentDelta { text: c.to_string() }))
            .collect();
        deltas.push(Ok(StreamDelta::Done {
            stop_reason: "stop".to_string(),
        }));
        Ok(Box::pin(stream::iter(deltas)))
    }
}
