//! Layer 4: supervisor dispatch
//!
//! TigerStyle: Domain first, then candidates; the tie-break model call runs
//! only when the reranked scores leave the choice open.

use medway_core::config::DecisionConfig;
use medway_gateway::{
    clean_structured_output, parse_structured, prompt_messages, CallOptions, Embedder, EndpointResolver,
    GatewayError, LlmGateway, ModelKind, Reranker, SearchHit, VectorQuery, VectorSearch,
};
use medway_memory::Session;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{DecisionError, DecisionResult};
use crate::prompts::{render, DOMAIN_PROMPT, LAST_AGENT_NONE, SELECT_AGENT_PROMPT};
use crate::registry::{AgentRegistryEntry, AgentRegistryStore};

/// Tolerance for score comparisons; rerank scores arrive as decimal fractions
pub const SCORE_EPSILON: f64 = 1e-9;

/// Scalar fields read back from the agent index
pub const REGISTRY_OUTPUT_FIELDS: [&str; 4] = ["agent_code", "agent_name", "domain_category", "description"];

/// A routable agent with its match score
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub agent_code: String,
    pub agent_name: String,
    pub domain_category: String,
    pub description: String,
    /// Rerank relevance; 0 for candidates taken straight from the registry
    pub score: f64,
}

impl From<AgentRegistryEntry> for Candidate {
    fn from(entry: AgentRegistryEntry) -> Self {
        Self {
            agent_code: entry.agent_key,
            agent_name: entry.agent_name,
            domain_category: entry.domain_id,
            description: entry.description,
            score: 0.0,
        }
    }
}

impl From<SearchHit> for Candidate {
    fn from(hit: SearchHit) -> Self {
        Self {
            agent_code: hit.field("agent_code").to_string(),
            agent_name: hit.field("agent_name").to_string(),
            domain_category: hit.field("domain_category").to_string(),
            description: hit.field("description").to_string(),
            score: hit.score,
        }
    }
}

/// Top candidate when its score settles the choice without a model call
///
/// `candidates` must be sorted by score, highest first.
pub fn short_circuit<'a>(candidates: &'a [Candidate], config: &DecisionConfig) -> Option<&'a Candidate> {
    let top1 = candidates.first()?;
    if top1.score + SCORE_EPSILON < config.score_threshold {
        return None;
    }
    match candidates.get(1) {
        None => Some(top1),
        Some(top2) if top1.score - top2.score + SCORE_EPSILON >= config.score_gap_threshold => Some(top1),
        Some(_) => None,
    }
}

/// A domain id is lowercase ascii letters, digits and underscores
pub fn is_domain_id(domain: &str) -> bool {
    !domain.is_empty()
        && domain
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Vector filter restricting hits to `domain`; `None` for anything but a domain id
pub fn domain_filter(domain: &str) -> Option<String> {
    is_domain_id(domain).then(|| format!("domain_category=='{}'", domain))
}

/// `- [code]: description` per candidate
pub fn render_candidates(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("- [{}]: {}\n", c.agent_code, c.description))
        .collect()
}

#[derive(Deserialize)]
struct SelectOutput {
    #[serde(default)]
    target_agent: String,
}

/// Inputs of one dispatch
#[derive(Debug, Clone, Copy)]
pub struct DispatchInput<'a> {
    pub enterprise_id: &'a str,
    pub query: &'a str,
    pub previous_domain: &'a str,
    pub history: &'a str,
    pub session: &'a Session,
}

/// Global dispatch over the agent catalogue
pub struct Supervisor {
    llm: Arc<dyn LlmGateway>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    search: Arc<dyn VectorSearch>,
    resolver: Arc<dyn EndpointResolver>,
    registry: Arc<dyn AgentRegistryStore>,
    config: DecisionConfig,
}

impl Supervisor {
    pub fn new(
        llm: Arc<dyn LlmGateway>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        search: Arc<dyn VectorSearch>,
        resolver: Arc<dyn EndpointResolver>,
        registry: Arc<dyn AgentRegistryStore>,
        config: DecisionConfig,
    ) -> Self {
        assert!(config.rag_top_k > 0, "rag_top_k must be positive");
        Self {
            llm,
            embedder,
            reranker,
            search,
            resolver,
            registry,
            config,
        }
    }

    /// Pick the agent for this turn
    pub async fn dispatch(&self, input: DispatchInput<'_>, options: &CallOptions) -> DecisionResult<String> {
        let domain = self.identify_domain(input, options).await?;
        let candidates = self.candidates(input.enterprise_id, &domain, input.query).await?;

        if candidates.is_empty() {
            tracing::info!(domain = %domain, agent_code = %self.config.default_agent, "No candidates, using default agent");
            return Ok(self.config.default_agent.clone());
        }
        if let Some(top) = short_circuit(&candidates, &self.config) {
            tracing::debug!(agent_code = %top.agent_code, score = top.score, "Dispatch settled by score");
            return Ok(top.agent_code.clone());
        }
        self.select(input, &candidates, options).await
    }

    /// Domain id named by the model
    pub async fn identify_domain(&self, input: DispatchInput<'_>, options: &CallOptions) -> DecisionResult<String> {
        let prompt = render(
            DOMAIN_PROMPT,
            &[
                ("PREVIOUS_DOMAIN", input.previous_domain),
                ("RECENT_HISTORY", input.history),
                ("USER_QUERY", input.query),
            ],
        );
        let raw = self
            .llm
            .complete(&prompt_messages(prompt), options)
            .await
            .map_err(|e| DecisionError::llm("domain", e))?;
        Ok(clean_structured_output(&raw))
    }

    /// Registry rows when few enough, otherwise vector search plus rerank
    ///
    /// A domain that is not a domain id yields no candidates.
    pub async fn candidates(&self, enterprise_id: &str, domain: &str, query: &str) -> DecisionResult<Vec<Candidate>> {
        let Some(filter) = domain_filter(domain) else {
            tracing::warn!(domain = %domain, "Model named a malformed domain, skipping candidates");
            return Ok(Vec::new());
        };
        let entries = self.registry.active_in_domain(domain).await?;
        if entries.len() <= self.config.rag_top_k {
            return Ok(entries.into_iter().map(Candidate::from).collect());
        }

        let embedding = self
            .resolver
            .resolve(enterprise_id, ModelKind::Embedding)
            .await
            .map_err(|source| DecisionError::Search { source })?;
        let texts = vec![query.to_string()];
        let vectors = self
            .embedder
            .embed(&texts, &embedding)
            .await
            .map_err(|source| DecisionError::Search { source })?;
        let search = VectorQuery {
            collection: self.config.registry_collection.clone(),
            vector_field: self.config.vector_field.clone(),
            vectors,
            top_k: self.config.rag_top_k,
            filter,
            output_fields: REGISTRY_OUTPUT_FIELDS.iter().map(|f| f.to_string()).collect(),
        };
        let hits = self
            .search
            .search(&search)
            .await
            .map_err(|source| DecisionError::Search { source })?
            .into_iter()
            .next()
            .unwrap_or_default();
        self.rerank(enterprise_id, query, hits).await
    }

    async fn rerank(&self, enterprise_id: &str, query: &str, hits: Vec<SearchHit>) -> DecisionResult<Vec<Candidate>> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = self
            .resolver
            .resolve(enterprise_id, ModelKind::Rerank)
            .await
            .map_err(|source| DecisionError::Search { source })?;
        let documents: Vec<String> = hits.iter().map(|h| h.field("description").to_string()).collect();
        let scores = self
            .reranker
            .rerank(query, &documents, &endpoint)
            .await
            .map_err(|source| DecisionError::Search { source })?;
        if scores.len() != hits.len() {
            return Err(DecisionError::Search {
                source: GatewayError::CountMismatch {
                    service: "rerank".to_string(),
                    expected: hits.len(),
                    actual: scores.len(),
                },
            });
        }

        let mut candidates: Vec<Candidate> = hits
            .into_iter()
            .zip(scores)
            .map(|(hit, score)| Candidate {
                score,
                ..Candidate::from(hit)
            })
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(candidates)
    }

    /// Tie-break between candidates
    ///
    /// A blank target is a model failure. A target outside `candidates`
    /// routes to the default agent.
    pub async fn select(
        &self,
        input: DispatchInput<'_>,
        candidates: &[Candidate],
        options: &CallOptions,
    ) -> DecisionResult<String> {
        let last_agent = match input.session.flow_context.current_agent_key.as_str() {
            "" => LAST_AGENT_NONE,
            key => key,
        };
        let slots = serde_json::to_string(&input.session.shared_entities()).unwrap_or_else(|_| "{}".to_string());
        let listing = render_candidates(candidates);
        let prompt = render(
            SELECT_AGENT_PROMPT,
            &[
                ("LAST_AGENT", last_agent),
                ("GLOBAL_SLOTS", &slots),
                ("HISTORY", input.history),
                ("CANDIDATE_AGENTS", &listing),
                ("USER_INPUT", input.query),
            ],
        );
        let raw = self
            .llm
            .complete(&prompt_messages(prompt), options)
            .await
            .map_err(|e| DecisionError::llm("agent selection", e))?;
        let output: SelectOutput = parse_structured(&raw).map_err(|e| DecisionError::llm("agent selection", e))?;
        let target = output.target_agent.trim().trim_start_matches('[').trim_end_matches(']').trim();
        if target.is_empty() {
            return Err(DecisionError::llm(
                "agent selection",
                GatewayError::malformed_output("target_agent is empty", raw),
            ));
        }
        if !candidates.iter().any(|c| c.agent_code == target) {
            tracing::warn!(
                target_agent = %target,
                candidates = candidates.len(),
                agent_code = %self.config.default_agent,
                "Model chose an agent outside the candidates, using default agent"
            );
            return Ok(self.config.default_agent.clone());
        }
        Ok(target.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(code: &str, score: f64) -> Candidate {
        Candidate {
            agent_code: code.to_string(),
            agent_name: code.to_string(),
            domain_category: "medical_service".to_string(),
            description: format!("{} desc", code),
            score,
        }
    }

    #[test]
    fn test_short_circuit_thresholds() {
        let config = DecisionConfig::default();

        let clear = [candidate("a", 0.90), candidate("b", 0.70)];
        assert_eq!(short_circuit(&clear, &config).unwrap().agent_code, "a");

        let close = [candidate("a", 0.90), candidate("b", 0.80)];
        assert!(short_circuit(&close, &config).is_none());

        // 0.95 - 0.80 is 0.1499999... in binary floating point
        let exact_gap = [candidate("a", 0.95), candidate("b", 0.80)];
        assert_eq!(short_circuit(&exact_gap, &config).unwrap().agent_code, "a");

        let at_threshold = [candidate("a", 0.85), candidate("b", 0.70)];
        assert_eq!(short_circuit(&at_threshold, &config).unwrap().agent_code, "a");

        let low = [candidate("a", 0.80)];
        assert!(short_circuit(&low, &config).is_none());

        let single = [candidate("a", 0.85)];
        assert_eq!(short_circuit(&single, &config).unwrap().agent_code, "a");

        assert!(short_circuit(&[], &config).is_none());
    }

    #[test]
    fn test_domain_filter() {
        assert_eq!(
            domain_filter("medical_service").as_deref(),
            Some("domain_category=='medical_service'")
        );
        assert_eq!(domain_filter("icd10_codes").as_deref(), Some("domain_category=='icd10_codes'"));
        assert!(domain_filter("").is_none());
        assert!(domain_filter("x' || domain_category!='").is_none());
        assert!(domain_filter("Medical").is_none());
        assert!(domain_filter("医疗").is_none());
    }

    #[test]
    fn test_render_candidates() {
        let listing = render_candidates(&[candidate("a", 0.0), candidate("b", 0.0)]);
        assert_eq!(listing, "- [a]: a desc\n- [b]: b desc\n");
    }
}
