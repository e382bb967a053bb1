//! Medway Gateways
//!
//! Narrow clients for the external model and search services the dispatcher
//! depends on: chat completion, embedding, rerank and vector search.
//!
//! # Overview
//!
//! - [`LlmGateway`]: `complete` and `stream_complete`
//! - [`Embedder`], [`Reranker`]: scoring support for supervisor dispatch
//! - [`VectorSearch`]: filtered top-K similarity search with a timeout
//! - [`parse_structured`]: fence and scratchpad removal before JSON decoding

pub mod embed;
pub mod endpoint;
pub mod error;
pub mod llm;
pub mod rerank;
pub mod structured;
pub mod vector;

pub use embed::{Embedder, HttpEmbedder};
pub use endpoint::{EndpointResolver, ModelKind, StaticEndpointResolver};
pub use error::{GatewayError, GatewayResult};
pub use llm::{
    collect_stream, parse_sse_stream, prompt_messages, render_prompt, CallOptions, ChatMessage,
    DeltaStream, HttpLlmGateway, LlmGateway, ModelEndpoint, StreamDelta, SYSTEM_PROMPT_DEFAULT,
};
pub use rerank::{HttpReranker, Reranker};
pub use structured::{clean_structured_output, parse_structured, strip_think};
pub use vector::{MilvusConfig, MilvusVectorSearch, SearchHit, VectorQuery, VectorSearch};
