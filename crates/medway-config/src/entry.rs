//! Configuration entries

use serde::{Deserialize, Serialize};

use crate::error::{ConfigStoreError, ConfigStoreResult};

/// One configuration item as stored under a config key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfigEntry {
    pub key: String,
    pub value: String,
    pub name: String,
    pub remark: String,
    /// `_general_config_` or `_decision_config_`
    pub classify: String,
    pub agent_code: String,
    pub modify_from: String,
    pub conf_type: String,
    pub update_time: String,
}

impl AgentConfigEntry {
    pub fn new(classify: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            classify: classify.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }

    pub fn to_json(&self) -> ConfigStoreResult<String> {
        serde_json::to_string(self).map_err(|e| ConfigStoreError::malformed(&self.key, e.to_string()))
    }

    pub fn from_json(store_key: &str, raw: &str) -> ConfigStoreResult<Self> {
        serde_json::from_str(raw).map_err(|e| ConfigStoreError::malformed(store_key, e.to_string()))
    }
}
