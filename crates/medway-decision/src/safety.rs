//! Layer 2: safety audit
//!
//! TigerStyle: One model call; only the three red-line categories stop the
//! pipeline, anything else passes.

use medway_gateway::{parse_structured, prompt_messages, CallOptions, LlmGateway};
use serde::Deserialize;

use crate::error::{DecisionError, DecisionResult};
use crate::prompts::{render, SAFETY_AUDIT_PROMPT};

/// Reply for politically sensitive or jailbreak input
pub const REPLY_PROHIBITED: &str =
    "抱歉，我是一个专注于医疗领域的智能助手。您输入的内容涉及敏感话题，我无法回答。";

/// Reply for life-threatening situations
pub const REPLY_EMERGENCY: &str =
    "⚠️【紧急警报】检测到您可能处于危急医疗状况！AI无法替代急救，请立即拨打 120！";

/// Reply for illegal medical requests
pub const REPLY_ILLEGAL_MEDICAL: &str =
    "抱歉，根据医疗法规，我无法提供违禁药品或违规医疗证明的相关服务。请通过正规渠道就医。";

/// Audit classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyCategory {
    Safe,
    Prohibited,
    Emergency,
    IllegalMedical,
}

impl SafetyCategory {
    /// Unrecognized labels pass as SAFE
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "PROHIBITED" => Self::Prohibited,
            "EMERGENCY" => Self::Emergency,
            "ILLEGAL_MEDICAL" => Self::IllegalMedical,
            _ => Self::Safe,
        }
    }

    /// Fixed reply that ends the turn, `None` for SAFE
    pub fn reply(&self) -> Option<&'static str> {
        match self {
            Self::Safe => None,
            Self::Prohibited => Some(REPLY_PROHIBITED),
            Self::Emergency => Some(REPLY_EMERGENCY),
            Self::IllegalMedical => Some(REPLY_ILLEGAL_MEDICAL),
        }
    }
}

#[derive(Deserialize)]
struct AuditOutput {
    #[serde(default)]
    category: String,
}

/// Classify `query`; model and parse failures are errors
pub async fn audit(llm: &dyn LlmGateway, options: &CallOptions, query: &str) -> DecisionResult<SafetyCategory> {
    let prompt = render(SAFETY_AUDIT_PROMPT, &[("USER_QUERY", query)]);
    let raw = llm
        .complete(&prompt_messages(prompt), options)
        .await
        .map_err(|e| DecisionError::llm("safety audit", e))?;
    let output: AuditOutput = parse_structured(&raw).map_err(|e| DecisionError::llm("safety audit", e))?;
    Ok(SafetyCategory::from_label(&output.category))
}
