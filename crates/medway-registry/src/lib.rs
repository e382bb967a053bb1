//! Medway Registry
//!
//! Agent instance registration and discovery over the coordination store.
//!
//! # Overview
//!
//! The registry provides:
//! - A self-healing registration loop under a renewed lease
//! - A local address cache filled by discovery and kept current by a watch
//! - Round-robin selection per agent code

pub mod error;
pub mod instance;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use instance::{proxy_url, send_msg_url, InstanceRecord};
pub use registry::{RegistryTasks, ServiceRegistry};
