//! Layer 3: conversation continuity
//!
//! Decides whether the current agent keeps the turn or the request goes back
//! to global dispatch.

use medway_gateway::{parse_structured, prompt_messages, CallOptions, LlmGateway};
use serde::Deserialize;

use crate::error::{DecisionError, DecisionResult};
use crate::prompts::{render, CONTINUITY_PROMPT};
use crate::registry::AgentRegistryEntry;

/// Continuity verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityAction {
    Continue,
    Interrupt,
}

#[derive(Deserialize)]
struct ContinuityOutput {
    #[serde(default)]
    action: String,
}

/// Ask whether `query` continues the conversation with `agent`
///
/// Anything but `CONTINUE` counts as an interruption.
pub async fn check(
    llm: &dyn LlmGateway,
    options: &CallOptions,
    agent: &AgentRegistryEntry,
    history: &str,
    query: &str,
) -> DecisionResult<ContinuityAction> {
    let prompt = render(
        CONTINUITY_PROMPT,
        &[
            ("AGENT_NAME", &agent.agent_name),
            ("AGENT_DESC", &agent.description),
            ("MSG_HISTORY", history),
            ("USER_QUERY", query),
        ],
    );
    let raw = llm
        .complete(&prompt_messages(prompt), options)
        .await
        .map_err(|e| DecisionError::llm("continuity", e))?;
    let output: ContinuityOutput = parse_structured(&raw).map_err(|e| DecisionError::llm("continuity", e))?;
    Ok(if output.action.trim() == "CONTINUE" {
        ContinuityAction::Continue
    } else {
        ContinuityAction::Interrupt
    })
}
