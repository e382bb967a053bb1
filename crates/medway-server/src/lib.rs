//! Medway Server
//!
//! HTTP surface of the dispatcher: the `send_msg` endpoint, the session
//! memory callbacks used by specialist agents, and instance lookup.

pub mod api;
pub mod backends;
pub mod bootstrap;
pub mod config;
pub mod models;
pub mod state;

pub use api::router;
pub use config::{BackendsConfig, CacheBackend, CoordinationBackend, MessageBackend, ServerConfig, VectorStoreConfig};
pub use state::AppState;
