//! Instance records and agent URLs

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Record an agent instance publishes under its lease
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub version: String,
    /// Agent code
    pub code: String,
    #[serde(default)]
    pub name: String,
}

impl InstanceRecord {
    pub fn new(code: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            version: String::new(),
            code: code.into(),
            name: String::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// `ip:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn to_json(&self) -> RegistryResult<String> {
        serde_json::to_string(self).map_err(|e| RegistryError::InvalidInstanceRecord {
            key: self.address(),
            reason: e.to_string(),
        })
    }

    pub fn from_json(key: &str, raw: &str) -> RegistryResult<Self> {
        serde_json::from_str(raw).map_err(|e| RegistryError::InvalidInstanceRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

/// URL of `method` on an agent instance
///
/// Agent codes map to paths by turning `-` into `/`:
/// `power-ai-agent-triage` → `/power/ai/agent/triage/{method}`.
pub fn proxy_url(address: &str, agent_code: &str, method: &str) -> String {
    format!(
        "http://{}/{}/{}",
        address,
        agent_code.replace('-', "/"),
        method.trim_start_matches('/')
    )
}

/// URL of the conversational endpoint of an agent instance
pub fn send_msg_url(address: &str, agent_code: &str) -> String {
    proxy_url(address, agent_code, "send_msg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_wire_names() {
        let record = InstanceRecord::new("power-ai-decision", "10.1.2.3", 8080)
            .with_version("1.4.0")
            .with_name("decision");
        let raw = record.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["ip"], "10.1.2.3");
        assert_eq!(value["port"], 8080);
        assert_eq!(value["code"], "power-ai-decision");
        assert_eq!(InstanceRecord::from_json("k", &raw).unwrap(), record);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = InstanceRecord::from_json("/service/instance/a/x", "{").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInstanceRecord { .. }));
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            send_msg_url("10.0.0.7:9001", "power-ai-agent-triage"),
            "http://10.0.0.7:9001/power/ai/agent/triage/send_msg"
        );
        assert_eq!(
            proxy_url("h:1", "power-ai-decision", "/memory/turn"),
            "http://h:1/power/ai/decision/memory/turn"
        );
    }
}
