//! Medway DST - Deterministic Simulation Testing
//!
//! Simulated time, randomness, faults and model backends for testing the
//! dispatcher without a network.
//!
//! # Overview
//!
//! - Deterministic time control ([`SimClock`], [`SimTime`])
//! - Reproducible random numbers and ids ([`DeterministicRng`])
//! - Fault injection ([`FaultInjector`]) with medical-dispatch fault types
//! - Simulated LLM, embedding, rerank and vector search with call counters
//! - Fault-injecting coordination store, session cache and message store
//!
//! # TigerStyle
//!
//! - All operations are deterministic given the same seed
//! - Always log the seed for reproducibility
//! - Explicit fault types and probabilities

pub mod clock;
pub mod fault;
pub mod llm;
pub mod memory;
pub mod rng;
pub mod search;
pub mod store;

pub use clock::{SimClock, SimTime};
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultStats, FaultType};
pub use llm::SimLlmGateway;
pub use memory::{SimCacheLayer, SimMessageStore};
pub use rng::DeterministicRng;
pub use search::{sim_hit, SimEmbedder, SimReranker, SimVectorSearch, SIM_EMBEDDING_DIMENSION_COUNT};
pub use store::SimCoordinationStore;
