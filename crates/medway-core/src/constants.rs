//! TigerStyle constants for Medway
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Agent Identity
// =============================================================================

/// Agent code of the dispatcher itself
pub const AGENT_CODE_DECISION: &str = "power-ai-decision";

/// Agent that receives turns no candidate could claim
pub const AGENT_CODE_FALLBACK_DEFAULT: &str = "power-ai-agent-triage";

/// Enterprise scope used when a request carries none
pub const ENTERPRISE_ID_DEFAULT: &str = "default";

// =============================================================================
// Registry Limits
// =============================================================================

/// Default instance lease TTL in seconds
pub const LEASE_TTL_SECS_DEFAULT: u64 = 60;

/// Minimum instance lease TTL in seconds
pub const LEASE_TTL_SECS_MIN: u64 = 5;

/// Maximum instance lease TTL in seconds
pub const LEASE_TTL_SECS_MAX: u64 = 300;

/// Delay before retrying a failed registration (5 sec)
pub const REGISTER_RETRY_DELAY_MS_DEFAULT: u64 = 5 * 1000;

/// Delay before re-registering after the keepalive stream closes (2 sec)
pub const REREGISTER_DELAY_MS_DEFAULT: u64 = 2 * 1000;

/// Delay before re-subscribing a closed watch stream (5 sec)
pub const WATCH_RETRY_DELAY_MS_DEFAULT: u64 = 5 * 1000;

/// Delay between attempts to seed default configuration (5 sec)
pub const CONFIG_SEED_RETRY_DELAY_MS: u64 = 5 * 1000;

/// Maximum buffered watch events per subscriber
pub const WATCH_CHANNEL_CAPACITY_COUNT: usize = 1024;

// =============================================================================
// Decision Limits
// =============================================================================

/// Candidate count above which supervisor dispatch uses vector search
pub const RAG_TOP_K_DEFAULT: usize = 3;

/// Minimum top-1 score for skipping the tie-break call
pub const SCORE_THRESHOLD_DEFAULT: f64 = 0.85;

/// Minimum top-1 over top-2 lead for skipping the tie-break call
pub const SCORE_GAP_THRESHOLD_DEFAULT: f64 = 0.15;

/// Vector search timeout in milliseconds (5 sec)
pub const VECTOR_SEARCH_TIMEOUT_MS_DEFAULT: u64 = 5 * 1000;

/// Maximum vector search timeout in milliseconds (1 min)
pub const VECTOR_SEARCH_TIMEOUT_MS_MAX: u64 = 60 * 1000;

// =============================================================================
// Memory Limits
// =============================================================================

/// Ratio of the context window at which a checkpoint is requested
pub const MEMORY_TOKEN_THRESHOLD_RATIO_DEFAULT: f64 = 0.75;

/// Message rows kept verbatim in the checkpoint window
pub const MEMORY_RECENT_TURNS_DEFAULT: usize = 8;

/// Maximum message rows kept verbatim in the checkpoint window
pub const MEMORY_RECENT_TURNS_MAX: usize = 20;

/// Model context window in tokens
pub const MEMORY_CONTEXT_WINDOW_TOKENS_DEFAULT: usize = 16_000;

/// Maximum user query length in bytes
pub const MEMORY_QUERY_LENGTH_BYTES_MAX: usize = 10_000;

/// Maximum agent response length in bytes
pub const MEMORY_RESPONSE_LENGTH_BYTES_MAX: usize = 50_000;

/// Maximum user id length in bytes
pub const MEMORY_USER_ID_LENGTH_BYTES_MAX: usize = 100;

/// Maximum agent code length in bytes
pub const MEMORY_AGENT_CODE_LENGTH_BYTES_MAX: usize = 50;

/// Maximum checkpoint summary length in bytes
pub const MEMORY_SUMMARY_LENGTH_BYTES_MAX: usize = 2_000;

/// Session idle TTL in the cache layer (30 min)
pub const MEMORY_SESSION_TTL_SECS_DEFAULT: u64 = 30 * 60;

/// Attempts to insert a checkpoint row before giving up
pub const MEMORY_CHECKPOINT_RETRIES_COUNT_MAX: usize = 3;

/// Characters per estimated token
pub const MEMORY_TOKEN_CHARS_PER_TOKEN: usize = 4;

/// Default number of per-conversation locks retained
pub const LOCK_TABLE_CAPACITY_COUNT_DEFAULT: usize = 10_000;

/// Idle time after which an unheld conversation lock may be evicted (30 min)
pub const LOCK_TABLE_IDLE_EVICT_MS_DEFAULT: u64 = 30 * 60 * 1000;

// =============================================================================
// HTTP
// =============================================================================

/// Default outbound HTTP timeout in milliseconds (2 min)
pub const HTTP_TIMEOUT_MS_DEFAULT: u64 = 120 * 1000;

// Compile-time assertions for constant validity
const _: () = {
    assert!(LEASE_TTL_SECS_MIN <= LEASE_TTL_SECS_DEFAULT);
    assert!(LEASE_TTL_SECS_DEFAULT <= LEASE_TTL_SECS_MAX);
    assert!(REREGISTER_DELAY_MS_DEFAULT < LEASE_TTL_SECS_DEFAULT * 1000);
    assert!(MEMORY_RECENT_TURNS_DEFAULT <= MEMORY_RECENT_TURNS_MAX);
    assert!(MEMORY_TOKEN_CHARS_PER_TOKEN > 0);
    assert!(VECTOR_SEARCH_TIMEOUT_MS_DEFAULT <= VECTOR_SEARCH_TIMEOUT_MS_MAX);
    assert!(RAG_TOP_K_DEFAULT > 0);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_are_ratios() {
        assert!(SCORE_THRESHOLD_DEFAULT > 0.0 && SCORE_THRESHOLD_DEFAULT <= 1.0);
        assert!(SCORE_GAP_THRESHOLD_DEFAULT > 0.0 && SCORE_GAP_THRESHOLD_DEFAULT < 1.0);
        assert!(MEMORY_TOKEN_THRESHOLD_RATIO_DEFAULT > 0.0);
        assert!(MEMORY_TOKEN_THRESHOLD_RATIO_DEFAULT <= 1.0);
    }

    #[test]
    fn test_limits_have_units_in_names() {
        let _: u64 = LEASE_TTL_SECS_DEFAULT;
        let _: u64 = REGISTER_RETRY_DELAY_MS_DEFAULT;
        let _: usize = MEMORY_QUERY_LENGTH_BYTES_MAX;
        let _: usize = LOCK_TABLE_CAPACITY_COUNT_DEFAULT;
    }
}
