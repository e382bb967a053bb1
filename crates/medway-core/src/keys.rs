//! Coordination-store key layout
//!
//! TigerStyle: Every key is built here; nothing else formats store paths.
//!
//! ```text
//! /service/instance/{agent_code}/{ip}:{port}
//! /agent/config/{classify}/{agent_code}/{enterprise|default}/{key}
//! /system/config/_internal_/{enterprise|default}/{key}
//! ```

use crate::constants::ENTERPRISE_ID_DEFAULT;

/// Root of all instance records
pub const INSTANCE_PREFIX: &str = "/service/instance/";

/// Root of per-agent configuration
pub const AGENT_CONFIG_PREFIX: &str = "/agent/config/";

/// Root of system configuration
pub const SYSTEM_CONFIG_PREFIX: &str = "/system/config/_internal_";

/// Classification of general agent configuration
pub const CLASSIFY_GENERAL: &str = "_general_config_";

/// Classification of decision configuration
pub const CLASSIFY_DECISION: &str = "_decision_config_";

/// Enterprise segment, `"default"` when empty
pub fn enterprise_scope(enterprise_id: &str) -> &str {
    if enterprise_id.is_empty() {
        ENTERPRISE_ID_DEFAULT
    } else {
        enterprise_id
    }
}

// =============================================================================
// Instances
// =============================================================================

/// Prefix covering every instance of `agent_code`
pub fn instance_prefix(agent_code: &str) -> String {
    debug_assert!(!agent_code.is_empty());
    format!("{}{}/", INSTANCE_PREFIX, agent_code)
}

/// Key of one instance record
pub fn instance_key(agent_code: &str, address: &str) -> String {
    format!("{}{}", instance_prefix(agent_code), address)
}

/// Split an instance key into `(agent_code, address)`
pub fn parse_instance_key(key: &str) -> Option<(String, String)> {
    let rest = key.strip_prefix(INSTANCE_PREFIX)?;
    let (code, address) = rest.split_once('/')?;
    if code.is_empty() || address.is_empty() || address.contains('/') {
        return None;
    }
    Some((code.to_string(), address.to_string()))
}

// =============================================================================
// Configuration
// =============================================================================

/// Key of an agent configuration entry
pub fn agent_config_key(classify: &str, agent_code: &str, enterprise_id: &str, key: &str) -> String {
    format!(
        "{}{}/{}/{}/{}",
        AGENT_CONFIG_PREFIX,
        classify,
        agent_code,
        enterprise_scope(enterprise_id),
        key
    )
}

/// General configuration key
pub fn general_config_key(agent_code: &str, enterprise_id: &str, key: &str) -> String {
    agent_config_key(CLASSIFY_GENERAL, agent_code, enterprise_id, key)
}

/// Decision configuration key
pub fn decision_config_key(agent_code: &str, enterprise_id: &str, key: &str) -> String {
    agent_config_key(CLASSIFY_DECISION, agent_code, enterprise_id, key)
}

/// System configuration key
pub fn system_config_key(enterprise_id: &str, key: &str) -> String {
    format!(
        "{}/{}/{}",
        SYSTEM_CONFIG_PREFIX,
        enterprise_scope(enterprise_id),
        key
    )
}

/// Watch prefix for the general configuration of one agent
pub fn general_config_prefix(agent_code: &str) -> String {
    format!("{}{}/{}/", AGENT_CONFIG_PREFIX, CLASSIFY_GENERAL, agent_code)
}

/// Watch prefix for all decision configuration
pub fn decision_config_prefix() -> String {
    format!("{}{}/", AGENT_CONFIG_PREFIX, CLASSIFY_DECISION)
}

/// Watch prefix for all system configuration
pub fn system_config_prefix() -> String {
    format!("{}/", SYSTEM_CONFIG_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_key_roundtrip() {
        let key = instance_key("power-ai-agent-triage", "10.0.0.5:8081");
        assert_eq!(key, "/service/instance/power-ai-agent-triage/10.0.0.5:8081");
        assert_eq!(
            parse_instance_key(&key),
            Some((
                "power-ai-agent-triage".to_string(),
                "10.0.0.5:8081".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_instance_key_rejects_foreign_keys() {
        assert_eq!(parse_instance_key("/agent/config/x"), None);
        assert_eq!(parse_instance_key("/service/instance/only-code"), None);
        assert_eq!(parse_instance_key("/service/instance//1.2.3.4:1"), None);
    }

    #[test]
    fn test_instance_prefix_does_not_cover_longer_codes() {
        let prefix = instance_prefix("agent-a");
        assert!(!instance_key("agent-ab", "1.1.1.1:1").starts_with(&prefix));
    }

    #[test]
    fn test_config_keys() {
        assert_eq!(
            general_config_key("power-ai-decision", "", "welcome"),
            "/agent/config/_general_config_/power-ai-decision/default/welcome"
        );
        assert_eq!(
            decision_config_key("power-ai-agent-triage", "ent-9", "prompt"),
            "/agent/config/_decision_config_/power-ai-agent-triage/ent-9/prompt"
        );
        assert_eq!(
            system_config_key("ent-9", "system-llm"),
            "/system/config/_internal_/ent-9/system-llm"
        );
        assert!(system_config_key("", "system-llm").starts_with(&system_config_prefix()));
        assert!(general_config_key("a", "e", "k").starts_with(&general_config_prefix("a")));
        assert!(decision_config_key("a", "e", "k").starts_with(&decision_config_prefix()));
    }
}
