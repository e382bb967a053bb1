//! Medway Agent
//!
//! Shared core for specialist agents. An agent implements
//! [`AgentCapability`] (intent, knowledge, reply); [`AgentRunner`] supplies
//! session memory and turn persistence around it.
//!
//! # Overview
//!
//! - [`AgentCapability`]: the three business steps
//! - [`AgentRunner`]: memory load, steps, turn write
//! - [`KnowledgeCapability`]: reusable retrieval-backed implementation

pub mod capability;
pub mod error;
pub mod knowledge;
pub mod runner;

pub use capability::{AgentCapability, AgentReply, Intent, KnowledgeHit, TurnContext, INTENT_UNKNOWN};
pub use error::{AgentError, AgentResult};
pub use knowledge::{KnowledgeCapability, KnowledgeConfig, KnowledgeGateways, KNOWLEDGE_PASSAGES_COUNT_MAX};
pub use runner::{AgentRequest, AgentRunner};
