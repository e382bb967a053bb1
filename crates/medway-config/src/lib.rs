//! Medway Config
//!
//! Agent and system configuration held in the coordination store, with
//! seeding of defaults, enterprise fallback and live watch updates.
//!
//! # Overview
//!
//! - [`ConfigStore`]: cached lookups, default seeding, watch loops
//! - [`AgentConfigEntry`]: one stored configuration item
//! - [`ModelResolver`]: per-enterprise model endpoints from system config

pub mod entry;
pub mod error;
pub mod resolver;
pub mod store;

pub use entry::AgentConfigEntry;
pub use error::{ConfigStoreError, ConfigStoreResult};
pub use resolver::ModelResolver;
pub use store::{ConfigListener, ConfigStore};
