//! Medway Memory
//!
//! Per-conversation short-term memory: a cached session document plus an
//! append-only message history, compressed by checkpoints into a summary and
//! a window of recent turns.
//!
//! # Overview
//!
//! - [`SessionMemoryManager`]: query, write, checkpoint and finalize
//! - [`Session`] and [`MemoryMode`]: the cached session document
//! - [`CacheLayer`], [`MessageStore`]: storage seams with in-memory backends
//! - [`RedisCacheLayer`], [`PgMessageStore`]: networked backends for deployment
//! - [`SessionLockTable`]: bounded per-conversation mutexes
//!
//! # TigerStyle
//!
//! - Only a checkpoint moves a session into SUMMARY_N
//! - Writes to one conversation are serialized by its mutex
//! - Explicit byte limits on every stored text field

pub mod builder;
pub mod cache;
pub mod error;
pub mod lock;
pub mod manager;
pub mod message;
pub mod postgres;
pub mod redis_cache;
pub mod session;

pub use builder::{compose_summary_and_recent, estimate_tokens, recent_window, render_transcript};
pub use cache::{CacheLayer, MemoryCacheLayer};
pub use error::{MemoryError, MemoryResult};
pub use lock::SessionLockTable;
pub use manager::{
    CheckpointRequest, MemoryContext, MemoryQuery, SessionMemoryManager, TurnWrite, TurnWritten,
};
pub use message::{
    MemoryMessageStore, Message, MessageStore, MessageStoreError, MessageStoreResult,
    CHECKPOINT_QUERY,
};
pub use postgres::PgMessageStore;
pub use redis_cache::RedisCacheLayer;
pub use session::{
    FlowContext, GlobalState, MemoryMode, MessageContext, PendingAction, Session, SessionMeta,
    SharedEntities, UserSnapshot, WindowMessage,
};
