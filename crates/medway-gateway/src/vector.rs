//! Vector search gateway
//!
//! TigerStyle: Every search carries an explicit timeout from configuration.
//! Inner-product metric; higher scores are closer.

use async_trait::async_trait;
use medway_core::constants::VECTOR_SEARCH_TIMEOUT_MS_DEFAULT;
use medway_core::http::{HttpClient, HttpRequest};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

const SERVICE: &str = "vector-search";

/// Hybrid vector + scalar-filter query
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub collection: String,
    pub vector_field: String,
    /// One ranked result list is returned per vector
    pub vectors: Vec<Vec<f32>>,
    pub top_k: usize,
    /// Boolean expression over scalar fields; empty means no filter
    pub filter: String,
    pub output_fields: Vec<String>,
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    /// Requested scalar fields rendered as strings
    pub fields: BTreeMap<String, String>,
}

impl SearchHit {
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Similarity search over a vector index
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(&self, query: &VectorQuery) -> GatewayResult<Vec<Vec<SearchHit>>>;
}

// =============================================================================
// Milvus REST
// =============================================================================

/// Milvus connection settings
#[derive(Debug, Clone)]
pub struct MilvusConfig {
    /// Base URL, e.g. `http://milvus:19530`
    pub url: String,
    /// `user:password` or API token; empty for none
    pub token: String,
    pub timeout_ms: u64,
}

impl MilvusConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: String::new(),
            timeout_ms: VECTOR_SEARCH_TIMEOUT_MS_DEFAULT,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        assert!(timeout_ms > 0, "timeout must be positive");
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug, Deserialize)]
struct MilvusResponse {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

/// Milvus v2 REST search client
#[derive(Clone)]
pub struct MilvusVectorSearch {
    config: MilvusConfig,
    http_client: Arc<dyn HttpClient>,
}

impl MilvusVectorSearch {
    pub fn new(config: MilvusConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    fn search_url(&self) -> String {
        format!(
            "{}/v2/vectordb/entities/search",
            self.config.url.trim_end_matches('/')
        )
    }

    async fn search_one(&self, query: &VectorQuery, vector: &[f32]) -> GatewayResult<Vec<SearchHit>> {
        let mut body = serde_json::json!({
            "collectionName": query.collection,
            "annsField": query.vector_field,
            "data": [vector],
            "limit": query.top_k,
            "outputFields": query.output_fields,
            "searchParams": {
                "metricType": "IP",
                "params": { "ef": query.top_k * 2 },
            },
        });
        if !query.filter.is_empty() {
            body["filter"] = Value::String(query.filter.clone());
        }

        let request = HttpRequest::post(self.search_url())
            .bearer(&self.config.token)
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

        let parsed: MilvusResponse = response
            .json()
            .map_err(|e| GatewayError::malformed_response(SERVICE, e))?;
        if parsed.code != 0 {
            return Err(GatewayError::malformed_response(
                SERVICE,
                format!("code {}: {}", parsed.code, parsed.message),
            ));
        }
        Ok(parsed.data.into_iter().map(row_to_hit).collect())
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn row_to_hit(mut row: Map<String, Value>) -> SearchHit {
    let id = row.remove("id").map(|v| value_to_string(&v)).unwrap_or_default();
    let score = row
        .remove("distance")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let fields = row
        .iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect();
    SearchHit { id, score, fields }
}

#[async_trait]
impl VectorSearch for MilvusVectorSearch {
    async fn search(&self, query: &VectorQuery) -> GatewayResult<Vec<Vec<SearchHit>>> {
        assert!(query.top_k > 0, "top_k must be positive");
        let timeout_ms = self.config.timeout_ms;

        let all = async {
            let mut results = Vec::with_capacity(query.vectors.len());
            for vector in &query.vectors {
                results.push(self.search_one(query, vector).await?);
            }
            Ok::<_, GatewayError>(results)
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), all).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(collection = %query.collection, timeout_ms, "Vector search timed out");
                Err(GatewayError::Timeout {
                    service: SERVICE.to_string(),
                    timeout_ms,
                })
            }
        }
    }
}
