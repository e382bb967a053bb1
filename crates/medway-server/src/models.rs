//! Wire types of the dispatcher API
//!
//! TigerStyle: Every response is the platform envelope, HTTP 200 included
//! for errors; the `code` field carries the outcome.

use medway_decision::{Decision, DecisionRequest};
use serde::{Deserialize, Serialize};

/// Envelope code of a successful call
pub const CODE_SUCCESS: &str = "success";

/// Envelope message of a successful call
pub const MESSAGE_SUCCESS: &str = "执行成功";

/// Classification returned when the dispatcher answers the turn itself
pub const CLASSIFICATION_INTERCEPTED: &str = "agent-unknown";

/// Platform response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: String,
    pub message: String,
    pub sys_track_code: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(sys_track_code: &str, data: T) -> Self {
        Self {
            code: CODE_SUCCESS.to_string(),
            message: MESSAGE_SUCCESS.to_string(),
            sys_track_code: sys_track_code.to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: &str, message: impl Into<String>, sys_track_code: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            sys_track_code: sys_track_code.to_string(),
            data: None,
        }
    }
}

// =============================================================================
// send_msg
// =============================================================================

/// Attachment reference; a turn with files may have an empty query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub file_id: String,
}

/// Inbound user turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendMsgRequest {
    pub query: String,
    pub conversation_id: String,
    pub user_id: String,
    pub enterprise_id: String,
    pub sys_track_code: String,
    pub channel: String,
    pub channel_app: String,
    pub message_id: String,
    pub files: Option<Vec<FileRef>>,
}

impl SendMsgRequest {
    /// First missing required field, if any
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("sys_track_code", &self.sys_track_code),
            ("user_id", &self.user_id),
            ("enterprise_id", &self.enterprise_id),
            ("conversation_id", &self.conversation_id),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(format!("{{{}}} is empty", field));
        }
        if self.files.is_none() && self.query.trim().is_empty() {
            return Err("{query} is empty".to_string());
        }
        Ok(())
    }

    pub fn to_decision_request(&self) -> DecisionRequest {
        DecisionRequest::new(&self.conversation_id, &self.enterprise_id, &self.user_id, &self.query)
            .with_track_code(&self.sys_track_code)
    }
}

/// Reply text and completion marker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MsgData {
    pub msg: Option<String>,
    pub endflag: String,
}

/// Decision payload inside the envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionData {
    /// Target agent code, or `agent-unknown` when intercepted
    pub classification: String,
    /// Interception reply; empty when routed
    pub unknown: String,
    pub data: MsgData,
}

impl From<Decision> for DecisionData {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Intercepted { message, .. } => Self {
                classification: CLASSIFICATION_INTERCEPTED.to_string(),
                unknown: message.clone(),
                data: MsgData {
                    msg: Some(message),
                    endflag: String::new(),
                },
            },
            Decision::Route { agent_code, .. } => Self {
                classification: agent_code,
                ..Self::default()
            },
        }
    }
}

// =============================================================================
// Memory callbacks
// =============================================================================

/// Memory callback body: the operation's own fields plus the track code
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryCall<T> {
    #[serde(default)]
    pub sys_track_code: String,
    #[serde(flatten)]
    pub body: T,
}

/// Result of a checkpoint or finalize call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointData {
    pub conversation_id: String,
    pub checkpoint_message_id: String,
}

// =============================================================================
// Registry and health
// =============================================================================

/// Selected instance of an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceData {
    pub agent_code: String,
    pub address: String,
    pub send_msg_url: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub agent_code: String,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use medway_decision::DecidedBy;

    #[test]
    fn test_validate_required_fields() {
        let mut request = SendMsgRequest {
            query: "我头疼".into(),
            conversation_id: "conv-1".into(),
            user_id: "u-1".into(),
            enterprise_id: "ent-1".into(),
            sys_track_code: "stc-1".into(),
            ..Default::default()
        };
        assert!(request.validate().is_ok());

        request.sys_track_code.clear();
        assert_eq!(request.validate().unwrap_err(), "{sys_track_code} is empty");

        request.sys_track_code = "stc-1".into();
        request.query.clear();
        assert_eq!(request.validate().unwrap_err(), "{query} is empty");

        request.files = Some(vec![FileRef {
            kind: "image".into(),
            file_id: "f-1".into(),
        }]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_intercepted_payload() {
        let data = DecisionData::from(Decision::Intercepted {
            message: "停车场位于门诊楼地下一层。".into(),
            by: DecidedBy::FastRule,
        });
        let value = serde_json::to_value(Envelope::success("stc-1", data)).unwrap();
        assert_eq!(value["code"], "success");
        assert_eq!(value["message"], "执行成功");
        assert_eq!(value["data"]["classification"], "agent-unknown");
        assert_eq!(value["data"]["unknown"], "停车场位于门诊楼地下一层。");
        assert_eq!(value["data"]["data"]["msg"], "停车场位于门诊楼地下一层。");
    }

    #[test]
    fn test_routed_payload_and_error_envelope() {
        let data = DecisionData::from(Decision::Route {
            agent_code: "symptom_triage_agent".into(),
            by: DecidedBy::Supervisor,
        });
        let value = serde_json::to_value(Envelope::success("stc-2", data)).unwrap();
        assert_eq!(value["data"]["classification"], "symptom_triage_agent");
        assert_eq!(value["data"]["unknown"], "");
        assert!(value["data"]["data"]["msg"].is_null());

        let value = serde_json::to_value(Envelope::<DecisionData>::error("cl-err", "model failed", "stc-3")).unwrap();
        assert_eq!(value["code"], "cl-err");
        assert!(value["data"].is_null());
    }
}
