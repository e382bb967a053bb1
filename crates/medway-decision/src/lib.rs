//! Medway Decision
//!
//! Chooses, turn by turn, which specialist agent answers a conversation.
//!
//! # Overview
//!
//! - [`RuleCache`]: layer 1 keyword and regex replies, no model call
//! - [`safety::audit`]: layer 2 red-line classification
//! - [`continuity::check`]: layer 3 keep or release the current agent
//! - [`Supervisor`]: layer 4 domain, candidates, score short-circuit, tie-break
//! - [`DecisionPipeline`]: the four layers plus history loading and checkpoints
//!
//! # TigerStyle
//!
//! - Cheaper layers run first and end the turn when they answer it
//! - Model and parse failures in layers 2 to 4 are errors, never guesses
//! - Rule snapshots are immutable and swapped whole

pub mod continuity;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod rules;
pub mod safety;
pub mod supervisor;

pub use continuity::ContinuityAction;
pub use error::{
    DecisionError, DecisionResult, ERROR_CODE_BAD_REQUEST, ERROR_CODE_CACHE, ERROR_CODE_HISTORY,
    ERROR_CODE_LLM,
};
pub use pipeline::{DecidedBy, Decision, DecisionPipeline, DecisionRequest, PipelineDeps};
pub use registry::{AgentRegistryEntry, AgentRegistryStore, MemoryAgentRegistry};
pub use rules::{
    CompiledRule, FastRule, MatchType, MemoryRuleSource, RuleCache, RuleHit, RuleSet, RuleSource,
    RULE_RELOAD_INTERVAL_MS_DEFAULT,
};
pub use safety::{SafetyCategory, REPLY_EMERGENCY, REPLY_ILLEGAL_MEDICAL, REPLY_PROHIBITED};
pub use supervisor::{domain_filter, is_domain_id, short_circuit, Candidate, DispatchInput, Supervisor, SCORE_EPSILON};
