//! Configuration for Medway
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a Medway process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedwayConfig {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub decision: DecisionConfig,

    #[serde(default)]
    pub lock_table: LockTableConfig,
}

impl MedwayConfig {
    /// Load from a JSON file, or defaults when the file does not exist
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| Error::ConfigFileUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::DeserializationFailed {
            reason: format!("config: {}", e),
        })
    }

    /// Apply `MEDWAY_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(code) = lookup("MEDWAY_AGENT_CODE") {
            self.node.agent_code = code;
        }
        if let Some(ip) = lookup("MEDWAY_ADVERTISE_IP") {
            self.node.advertise_ip = ip;
        }
        if let Some(port) = lookup("MEDWAY_ADVERTISE_PORT") {
            self.node.advertise_port = port
                .parse()
                .map_err(|_| Error::invalid_config("node.advertise_port", "not a port number"))?;
        }
        if let Some(bind) = lookup("MEDWAY_BIND") {
            self.node.bind_address = bind;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        self.registry.validate()?;
        self.memory.validate()?;
        self.decision.validate()?;
        self.lock_table.validate()?;
        Ok(())
    }
}

// =============================================================================
// Node
// =============================================================================

/// Identity this process registers under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_agent_code")]
    pub agent_code: String,

    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// Address other services use to reach this instance
    #[serde(default = "default_advertise_ip")]
    pub advertise_ip: String,

    #[serde(default = "default_advertise_port")]
    pub advertise_port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_agent_code() -> String {
    AGENT_CODE_DECISION.to_string()
}

fn default_agent_name() -> String {
    "decision".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_advertise_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_advertise_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            agent_code: default_agent_code(),
            agent_name: default_agent_name(),
            version: default_version(),
            advertise_ip: default_advertise_ip(),
            advertise_port: default_advertise_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl NodeConfig {
    fn validate(&self) -> Result<()> {
        if self.agent_code.is_empty() {
            return Err(Error::invalid_config("node.agent_code", "must not be empty"));
        }
        if !self.bind_address.contains(':') {
            return Err(Error::invalid_config(
                "node.bind_address",
                "must be in host:port format",
            ));
        }
        if self.advertise_port == 0 {
            return Err(Error::invalid_config("node.advertise_port", "must be non-zero"));
        }
        Ok(())
    }

    /// `ip:port` under which the instance registers
    pub fn advertise_address(&self) -> String {
        format!("{}:{}", self.advertise_ip, self.advertise_port)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Lease and retry timing for the service registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    #[serde(default = "default_register_retry_delay_ms")]
    pub register_retry_delay_ms: u64,

    #[serde(default = "default_reregister_delay_ms")]
    pub reregister_delay_ms: u64,

    #[serde(default = "default_watch_retry_delay_ms")]
    pub watch_retry_delay_ms: u64,
}

fn default_lease_ttl_secs() -> u64 {
    LEASE_TTL_SECS_DEFAULT
}

fn default_register_retry_delay_ms() -> u64 {
    REGISTER_RETRY_DELAY_MS_DEFAULT
}

fn default_reregister_delay_ms() -> u64 {
    REREGISTER_DELAY_MS_DEFAULT
}

fn default_watch_retry_delay_ms() -> u64 {
    WATCH_RETRY_DELAY_MS_DEFAULT
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl_secs(),
            register_retry_delay_ms: default_register_retry_delay_ms(),
            reregister_delay_ms: default_reregister_delay_ms(),
            watch_retry_delay_ms: default_watch_retry_delay_ms(),
        }
    }
}

impl RegistryConfig {
    fn validate(&self) -> Result<()> {
        if !(LEASE_TTL_SECS_MIN..=LEASE_TTL_SECS_MAX).contains(&self.lease_ttl_secs) {
            return Err(Error::invalid_config(
                "registry.lease_ttl_secs",
                format!(
                    "{} outside {}..={}",
                    self.lease_ttl_secs, LEASE_TTL_SECS_MIN, LEASE_TTL_SECS_MAX
                ),
            ));
        }
        if self.reregister_delay_ms >= self.lease_ttl_secs * 1000 {
            return Err(Error::invalid_config(
                "registry.reregister_delay_ms",
                "must be shorter than the lease TTL",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Memory
// =============================================================================

/// Session memory limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Checkpoint is requested once estimated tokens reach this share of the window
    #[serde(default = "default_token_threshold_ratio")]
    pub token_threshold_ratio: f64,

    #[serde(default = "default_recent_turns")]
    pub default_recent_turns: usize,

    #[serde(default = "default_context_window_tokens")]
    pub model_context_window: usize,

    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,

    #[serde(default = "default_max_response_length")]
    pub max_response_length: usize,

    #[serde(default = "default_max_user_id_length")]
    pub max_user_id_length: usize,

    #[serde(default = "default_max_agent_code_length")]
    pub max_agent_code_length: usize,

    #[serde(default = "default_max_summary_length")]
    pub max_summary_length: usize,

    #[serde(default = "default_session_key_prefix")]
    pub session_key_prefix: String,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_checkpoint_max_retries")]
    pub checkpoint_max_retries: usize,
}

fn default_token_threshold_ratio() -> f64 {
    MEMORY_TOKEN_THRESHOLD_RATIO_DEFAULT
}

fn default_recent_turns() -> usize {
    MEMORY_RECENT_TURNS_DEFAULT
}

fn default_context_window_tokens() -> usize {
    MEMORY_CONTEXT_WINDOW_TOKENS_DEFAULT
}

fn default_max_query_length() -> usize {
    MEMORY_QUERY_LENGTH_BYTES_MAX
}

fn default_max_response_length() -> usize {
    MEMORY_RESPONSE_LENGTH_BYTES_MAX
}

fn default_max_user_id_length() -> usize {
    MEMORY_USER_ID_LENGTH_BYTES_MAX
}

fn default_max_agent_code_length() -> usize {
    MEMORY_AGENT_CODE_LENGTH_BYTES_MAX
}

fn default_max_summary_length() -> usize {
    MEMORY_SUMMARY_LENGTH_BYTES_MAX
}

fn default_session_key_prefix() -> String {
    "short_term_memory:session:".to_string()
}

fn default_session_ttl_secs() -> u64 {
    MEMORY_SESSION_TTL_SECS_DEFAULT
}

fn default_checkpoint_max_retries() -> usize {
    MEMORY_CHECKPOINT_RETRIES_COUNT_MAX
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            token_threshold_ratio: default_token_threshold_ratio(),
            default_recent_turns: default_recent_turns(),
            model_context_window: default_context_window_tokens(),
            max_query_length: default_max_query_length(),
            max_response_length: default_max_response_length(),
            max_user_id_length: default_max_user_id_length(),
            max_agent_code_length: default_max_agent_code_length(),
            max_summary_length: default_max_summary_length(),
            session_key_prefix: default_session_key_prefix(),
            session_ttl_secs: default_session_ttl_secs(),
            checkpoint_max_retries: default_checkpoint_max_retries(),
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.token_threshold_ratio > 0.0 && self.token_threshold_ratio <= 1.0) {
            return Err(Error::invalid_config(
                "memory.token_threshold_ratio",
                "must be in (0, 1]",
            ));
        }
        if !(1..=MEMORY_RECENT_TURNS_MAX).contains(&self.default_recent_turns) {
            return Err(Error::invalid_config(
                "memory.default_recent_turns",
                format!("must be in 1..={}", MEMORY_RECENT_TURNS_MAX),
            ));
        }
        if self.model_context_window == 0 {
            return Err(Error::invalid_config(
                "memory.model_context_window",
                "must be positive",
            ));
        }
        if self.session_ttl_secs == 0 {
            return Err(Error::invalid_config("memory.session_ttl_secs", "must be positive"));
        }
        if self.checkpoint_max_retries == 0 {
            return Err(Error::invalid_config(
                "memory.checkpoint_max_retries",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Cache key holding the session of `conversation_id`
    pub fn session_key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.session_key_prefix, conversation_id)
    }
}

// =============================================================================
// Decision
// =============================================================================

/// Dispatch thresholds and vector-search layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Candidate count at or below which registry rows are used directly
    #[serde(default = "default_rag_top_k")]
    pub rag_top_k: usize,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,

    #[serde(default = "default_score_gap_threshold")]
    pub score_gap_threshold: f64,

    #[serde(default = "default_fallback_agent")]
    pub default_agent: String,

    #[serde(default = "default_vector_search_timeout_ms")]
    pub vector_search_timeout_ms: u64,

    #[serde(default = "default_registry_collection")]
    pub registry_collection: String,

    #[serde(default = "default_vector_field")]
    pub vector_field: String,

    #[serde(default = "default_recent_turns")]
    pub recent_turns: usize,

    #[serde(default = "default_token_threshold_ratio")]
    pub token_threshold_ratio: f64,
}

fn default_rag_top_k() -> usize {
    RAG_TOP_K_DEFAULT
}

fn default_score_threshold() -> f64 {
    SCORE_THRESHOLD_DEFAULT
}

fn default_score_gap_threshold() -> f64 {
    SCORE_GAP_THRESHOLD_DEFAULT
}

fn default_fallback_agent() -> String {
    AGENT_CODE_FALLBACK_DEFAULT.to_string()
}

fn default_vector_search_timeout_ms() -> u64 {
    VECTOR_SEARCH_TIMEOUT_MS_DEFAULT
}

fn default_registry_collection() -> String {
    "Sys_agent_registry_".to_string()
}

fn default_vector_field() -> String {
    "emb_field".to_string()
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            rag_top_k: default_rag_top_k(),
            score_threshold: default_score_threshold(),
            score_gap_threshold: default_score_gap_threshold(),
            default_agent: default_fallback_agent(),
            vector_search_timeout_ms: default_vector_search_timeout_ms(),
            registry_collection: default_registry_collection(),
            vector_field: default_vector_field(),
            recent_turns: default_recent_turns(),
            token_threshold_ratio: default_token_threshold_ratio(),
        }
    }
}

impl DecisionConfig {
    fn validate(&self) -> Result<()> {
        if self.rag_top_k == 0 {
            return Err(Error::invalid_config("decision.rag_top_k", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(Error::invalid_config(
                "decision.score_threshold",
                "must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.score_gap_threshold) {
            return Err(Error::invalid_config(
                "decision.score_gap_threshold",
                "must be in [0, 1]",
            ));
        }
        if self.default_agent.is_empty() {
            return Err(Error::invalid_config(
                "decision.default_agent",
                "must not be empty",
            ));
        }
        if self.vector_search_timeout_ms == 0
            || self.vector_search_timeout_ms > VECTOR_SEARCH_TIMEOUT_MS_MAX
        {
            return Err(Error::invalid_config(
                "decision.vector_search_timeout_ms",
                format!("must be in 1..={}", VECTOR_SEARCH_TIMEOUT_MS_MAX),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Lock Table
// =============================================================================

/// Bounds on the per-conversation lock table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockTableConfig {
    #[serde(default = "default_lock_capacity")]
    pub capacity: usize,

    #[serde(default = "default_lock_idle_evict_ms")]
    pub idle_evict_ms: u64,
}

fn default_lock_capacity() -> usize {
    LOCK_TABLE_CAPACITY_COUNT_DEFAULT
}

fn default_lock_idle_evict_ms() -> u64 {
    LOCK_TABLE_IDLE_EVICT_MS_DEFAULT
}

impl Default for LockTableConfig {
    fn default() -> Self {
        Self {
            capacity: default_lock_capacity(),
            idle_evict_ms: default_lock_idle_evict_ms(),
        }
    }
}

impl LockTableConfig {
    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::invalid_config("lock_table.capacity", "must be positive"));
        }
        Ok(())
    }
}
