//! Rerank gateway

use async_trait::async_trait;
use medway_core::http::{HttpClient, HttpRequest};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::llm::ModelEndpoint;

const SERVICE: &str = "rerank";

/// Relevance scoring of documents against a query
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score per document, in input order
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        endpoint: &ModelEndpoint,
    ) -> GatewayResult<Vec<f64>>;
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankRow>,
}

#[derive(Debug, Deserialize)]
struct RerankRow {
    index: usize,
    relevance_score: f64,
}

/// Place scores by their reported index; documents without a row score 0
fn scores_by_index(rows: Vec<RerankRow>, document_count: usize) -> GatewayResult<Vec<f64>> {
    let mut scores = vec![0.0; document_count];
    for row in rows {
        let slot = scores.get_mut(row.index).ok_or_else(|| {
            GatewayError::malformed_response(
                SERVICE,
                format!("index {} out of range for {} documents", row.index, document_count),
            )
        })?;
        *slot = row.relevance_score;
    }
    Ok(scores)
}

/// Cohere/Jina-style `/rerank` client
#[derive(Clone)]
pub struct HttpReranker {
    http_client: Arc<dyn HttpClient>,
}

impl HttpReranker {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        endpoint: &ModelEndpoint,
    ) -> GatewayResult<Vec<f64>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": endpoint.name,
            "query": query,
            "documents": documents,
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

        let parsed: RerankResponse = response
            .json()
            .map_err(|e| GatewayError::malformed_response(SERVICE, e))?;
        scores_by_index(parsed.results, documents.len())
    }
}
