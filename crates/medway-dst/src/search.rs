//! Simulated embedding, rerank and vector-search backends
//!
//! TigerStyle: Deterministic outputs, fault injection, call counting.

use async_trait::async_trait;
use medway_gateway::{
    Embedder, GatewayError, GatewayResult, ModelEndpoint, Reranker, SearchHit, VectorQuery,
    VectorSearch,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::fault::{FaultInjector, FaultType};

/// Dimension of simulated embeddings
pub const SIM_EMBEDDING_DIMENSION_COUNT: usize = 8;

/// Build a hit with string fields
pub fn sim_hit(id: &str, score: f64, fields: &[(&str, &str)]) -> SearchHit {
    SearchHit {
        id: id.to_string(),
        score,
        fields: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

// =============================================================================
// Embedder
// =============================================================================

/// Hash-derived unit vectors
pub struct SimEmbedder {
    faults: Arc<FaultInjector>,
    calls: AtomicU64,
}

impl SimEmbedder {
    pub fn new(faults: Arc<FaultInjector>) -> Self {
        Self {
            faults,
            calls: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(text: &str) -> Vec<f32> {
        let mut vector: Vec<f32> = (0..SIM_EMBEDDING_DIMENSION_COUNT)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                (text, i).hash(&mut hasher);
                (hasher.finish() % 1000) as f32 / 1000.0
            })
            .collect();
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for SimEmbedder {
    async fn embed(&self, texts: &[String], _endpoint: &ModelEndpoint) -> GatewayResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .faults
            .should_inject("embed", &[FaultType::EmbedFailure])
            .is_some()
        {
            return Err(GatewayError::request_failed("embedding", "simulated failure"));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

// =============================================================================
// Reranker
// =============================================================================

/// Scores documents by registered substrings
pub struct SimReranker {
    scores: Vec<(String, f64)>,
    default_score: f64,
    faults: Arc<FaultInjector>,
    calls: AtomicU64,
}

impl SimReranker {
    pub fn new(faults: Arc<FaultInjector>) -> Self {
        Self {
            scores: Vec::new(),
            default_score: 0.0,
            faults,
            calls: AtomicU64::new(0),
        }
    }

    /// Documents containing `pattern` score `score`
    pub fn with_score(mut self, pattern: impl Into<String>, score: f64) -> Self {
        self.scores.push((pattern.into(), score));
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reranker for SimReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        _endpoint: &ModelEndpoint,
    ) -> GatewayResult<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .faults
            .should_inject("rerank", &[FaultType::RerankFailure])
            .is_some()
        {
            return Err(GatewayError::request_failed("rerank", "simulated failure"));
        }
        Ok(documents
            .iter()
            .map(|doc| {
                self.scores
                    .iter()
                    .find(|(pattern, _)| doc.contains(pattern.as_str()))
                    .map(|(_, score)| *score)
                    .unwrap_or(self.default_score)
            })
            .collect())
    }
}

// =============================================================================
// Vector Search
// =============================================================================

/// In-memory collections with `field=='value'` filters
pub struct SimVectorSearch {
    collections: HashMap<String, Vec<SearchHit>>,
    faults: Arc<FaultInjector>,
    calls: AtomicU64,
}

impl SimVectorSearch {
    pub fn new(faults: Arc<FaultInjector>) -> Self {
        Self {
            collections: HashMap::new(),
            faults,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_hit(mut self, collection: impl Into<String>, hit: SearchHit) -> Self {
        self.collections.entry(collection.into()).or_default().push(hit);
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conjunction of `field=='value'` terms joined by `&&`
    fn matches(filter: &str, hit: &SearchHit) -> bool {
        filter
            .split("&&")
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .all(|term| match term.split_once("==") {
                Some((field, value)) => {
                    let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
                    hit.field(field.trim()) == value
                }
                None => false,
            })
    }
}

#[async_trait]
impl VectorSearch for SimVectorSearch {
    async fn search(&self, query: &VectorQuery) -> GatewayResult<Vec<Vec<SearchHit>>> {
        assert!(query.top_k > 0, "top_k must be positive");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .faults
            .should_inject("vector_search", &[FaultType::SearchTimeout])
            .is_some()
        {
            return Err(GatewayError::Timeout {
                service: "vector-search".to_string(),
                timeout_ms: 0,
            });
        }

        let mut hits: Vec<SearchHit> = self
            .collections
            .get(&query.collection)
            .map(|hits| {
                hits.iter()
                    .filter(|hit| Self::matches(&query.filter, hit))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.top_k);
        Ok(query.vectors.iter().map(|_| hits.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> ModelEndpoint {
        ModelEndpoint::new("sim", "", "sim://")
    }

    #[tokio::test]
    async fn test_embedder_is_deterministic() {
        let embedder = SimEmbedder::new(Arc::new(FaultInjector::none()));
        let texts = vec!["头疼".to_string(), "头疼".to_string(), "发烧".to_string()];
        let vectors = embedder.embed(&texts, &endpoint()).await.unwrap();
        assert_eq!(vectors[0], vectors[1]);
        assert_ne!(vectors[0], vectors[2]);
        assert_eq!(vectors[0].len(), SIM_EMBEDDING_DIMENSION_COUNT);
    }

    #[tokio::test]
    async fn test_reranker_scores() {
        let reranker = SimReranker::new(Arc::new(FaultInjector::none())).with_score("分诊", 0.9);
        let docs = vec!["症状分诊".to_string(), "挂号".to_string()];
        let scores = reranker.rerank("q", &docs, &endpoint()).await.unwrap();
        assert_eq!(scores, vec![0.9, 0.0]);
    }

    #[tokio::test]
    async fn test_vector_search_filter_and_top_k() {
        let search = SimVectorSearch::new(Arc::new(FaultInjector::none()))
            .with_hit("c", sim_hit("1", 0.2, &[("domain_category", "medical")]))
            .with_hit("c", sim_hit("2", 0.8, &[("domain_category", "medical")]))
            .with_hit("c", sim_hit("3", 0.9, &[("domain_category", "billing")]));
        let query = VectorQuery {
            collection: "c".to_string(),
            vector_field: "emb_field".to_string(),
            vectors: vec![vec![0.0]],
            top_k: 1,
            filter: "domain_category=='medical'".to_string(),
            output_fields: vec![],
        };
        let hits = search.search(&query).await.unwrap();
        assert_eq!(hits[0].len(), 1);
        assert_eq!(hits[0][0].id, "2");
        assert_eq!(search.call_count(), 1);
    }
}
