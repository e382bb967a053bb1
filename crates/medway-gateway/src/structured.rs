//! Structured model output
//!
//! Models wrap JSON in code fences and may prepend a `<think>` scratchpad.
//! Both are stripped before parsing.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::error::{GatewayError, GatewayResult};

fn think_block() -> &'static Regex {
    static THINK: OnceLock<Regex> = OnceLock::new();
    THINK.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>\s*").expect("valid think pattern"))
}

/// Remove scratchpad blocks and surrounding whitespace
pub fn strip_think(text: &str) -> String {
    let stripped = think_block().replace_all(text.trim(), "");
    stripped.replace("<think>\n", "").trim().to_string()
}

/// Strip code fences and scratchpad tags from a model reply
pub fn clean_structured_output(text: &str) -> String {
    let text = strip_think(text);
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Clean and decode a JSON reply
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> GatewayResult<T> {
    let cleaned = clean_structured_output(text);
    serde_json::from_str(&cleaned)
        .map_err(|e| GatewayError::malformed_output(e.to_string(), cleaned))
}
