//! Medway Core
//!
//! Core types, errors, configuration and the coordination-store client for
//! the Medway dispatch-and-memory core.
//!
//! # TigerStyle
//!
//! - Explicit limits with big-endian naming (e.g., `MEMORY_QUERY_LENGTH_BYTES_MAX`)
//! - Assertions on preconditions
//! - Time and randomness only through [`TimeProvider`] and [`RngProvider`]

pub mod config;
pub mod constants;
pub mod error;
pub mod etcd;
pub mod http;
pub mod io;
pub mod keys;
pub mod store;
pub mod telemetry;

pub use config::{
    DecisionConfig, LockTableConfig, MedwayConfig, MemoryConfig, NodeConfig, RegistryConfig,
};
pub use constants::*;
pub use error::{Error, Result};
pub use etcd::EtcdCoordinationStore;
pub use http::{ByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use io::{IoContext, RngProvider, StdRngProvider, TimeProvider, WallClockTime};
pub use store::{
    CoordinationStore, KeepAliveStream, LeaseId, LeaseTick, MemoryCoordinationStore, WatchEvent,
    WatchEventKind, WatchStream,
};
pub use telemetry::{init_telemetry, TelemetryConfig};
