//! Text embedding gateway

use async_trait::async_trait;
use medway_core::http::{HttpClient, HttpRequest};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::llm::ModelEndpoint;

const SERVICE: &str = "embedding";

/// Text to vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String], endpoint: &ModelEndpoint) -> GatewayResult<Vec<Vec<f32>>>;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client
#[derive(Clone)]
pub struct HttpEmbedder {
    http_client: Arc<dyn HttpClient>,
}

impl HttpEmbedder {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String], endpoint: &ModelEndpoint) -> GatewayResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": endpoint.name,
            "input": texts,
        });
        let request = HttpRequest::post(&endpoint.url)
            .bearer(&endpoint.key)
            .json(&body)
            .map_err(|e| GatewayError::request_failed(SERVICE, e))?;

        let response = self
            .http_client
            .send(request)
            .await
            .map_err(|e| GatewayError::request_failed(SERVICE, e))?;
        if !response.is_success() {
            return Err(GatewayError::BadStatus {
                service: SERVICE.to_string(),
                status: response.status,
                body: response.text().unwrap_or_default(),
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| GatewayError::malformed_response(SERVICE, e))?;
        if parsed.data.len() != texts.len() {
            return Err(GatewayError::CountMismatch {
                service: SERVICE.to_string(),
                expected: texts.len(),
                actual: parsed.data.len(),
            });
        }
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }
}
