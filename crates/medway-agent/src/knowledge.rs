//! Retrieval-backed capability
//!
//! TigerStyle: Classify with the model, retrieve with vector search plus
//! rerank, answer with the model over the retrieved passages. Prompts and the
//! collection come from [`KnowledgeConfig`].

use async_trait::async_trait;
use medway_gateway::{
    clean_structured_output, prompt_messages, render_prompt, CallOptions, Embedder, EndpointResolver,
    LlmGateway, ModelKind, Reranker, VectorQuery, VectorSearch,
};
use std::sync::Arc;

use crate::capability::{AgentCapability, AgentReply, Intent, KnowledgeHit, TurnContext};
use crate::error::{AgentError, AgentResult};

/// Knowledge passages shown to the answer prompt
pub const KNOWLEDGE_PASSAGES_COUNT_MAX: usize = 10;

/// Prompts and index layout of a retrieval agent
///
/// Intent prompt placeholders: `{{HISTORY}}`, `{{USER_QUERY}}`.
/// Answer prompt placeholders: `{{INTENT}}`, `{{KNOWLEDGE}}`, `{{HISTORY}}`,
/// `{{USER_QUERY}}`.
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    pub agent_code: String,
    pub intent_prompt: String,
    pub answer_prompt: String,
    pub collection: String,
    pub vector_field: String,
    /// Field holding passage text; also the rerank document
    pub content_field: String,
    pub output_fields: Vec<String>,
    pub top_k: usize,
    /// Rerank score below which passages are dropped
    pub min_score: f64,
    /// Answer when nothing relevant was retrieved; empty means ask the model anyway
    pub fallback_reply: String,
}

impl KnowledgeConfig {
    pub fn new(agent_code: &str, collection: &str) -> Self {
        Self {
            agent_code: agent_code.to_string(),
            intent_prompt: String::new(),
            answer_prompt: String::new(),
            collection: collection.to_string(),
            vector_field: "emb_field".to_string(),
            content_field: "content".to_string(),
            output_fields: vec!["content".to_string()],
            top_k: 3,
            min_score: 0.0,
            fallback_reply: String::new(),
        }
    }

    pub fn with_prompts(mut self, intent_prompt: &str, answer_prompt: &str) -> Self {
        self.intent_prompt = intent_prompt.to_string();
        self.answer_prompt = answer_prompt.to_string();
        self
    }

    pub fn with_fallback_reply(mut self, reply: &str) -> Self {
        self.fallback_reply = reply.to_string();
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }
}

/// Gateways a retrieval agent calls
#[derive(Clone)]
pub struct KnowledgeGateways {
    pub llm: Arc<dyn LlmGateway>,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
    pub search: Arc<dyn VectorSearch>,
    pub resolver: Arc<dyn EndpointResolver>,
}

/// Intent, retrieval and answer over one knowledge collection
pub struct KnowledgeCapability {
    config: KnowledgeConfig,
    gateways: KnowledgeGateways,
}

impl KnowledgeCapability {
    pub fn new(config: KnowledgeConfig, gateways: KnowledgeGateways) -> Self {
        assert!(config.top_k > 0, "top_k must be positive");
        assert!(!config.agent_code.is_empty(), "agent_code must be set");
        Self { config, gateways }
    }

    async fn llm_options(&self, enterprise_id: &str, step: &'static str) -> AgentResult<CallOptions> {
        let endpoint = self
            .gateways
            .resolver
            .resolve(enterprise_id, ModelKind::Llm)
            .await
            .map_err(|e| AgentError::step(&self.config.agent_code, step, e))?;
        Ok(CallOptions::new(endpoint))
    }

    async fn complete(&self, enterprise_id: &str, step: &'static str, prompt: String) -> AgentResult<String> {
        let options = self.llm_options(enterprise_id, step).await?;
        let raw = self
            .gateways
            .llm
            .complete(&prompt_messages(prompt), &options)
            .await
            .map_err(|e| AgentError::step(&self.config.agent_code, step, e))?;
        Ok(clean_structured_output(&raw))
    }
}

fn render_knowledge(knowledge: &[KnowledgeHit]) -> String {
    knowledge
        .iter()
        .take(KNOWLEDGE_PASSAGES_COUNT_MAX)
        .enumerate()
        .map(|(i, hit)| format!("{}. {}\n", i + 1, hit.content.trim()))
        .collect()
}

#[async_trait]
impl AgentCapability for KnowledgeCapability {
    fn code(&self) -> &str {
        &self.config.agent_code
    }

    async fn extract_intent(&self, ctx: &TurnContext) -> AgentResult<Intent> {
        if self.config.intent_prompt.is_empty() {
            return Ok(Intent::unknown());
        }
        let prompt = render_prompt(
            &self.config.intent_prompt,
            &[("HISTORY", &ctx.history), ("USER_QUERY", &ctx.query)],
        );
        let label = self.complete(&ctx.enterprise_id, "extract_intent", prompt).await?;
        Ok(if label.is_empty() {
            Intent::unknown()
        } else {
            Intent::new(label)
        })
    }

    async fn search_knowledge(&self, ctx: &TurnContext, _intent: &Intent) -> AgentResult<Vec<KnowledgeHit>> {
        let code = self.config.agent_code.as_str();
        let gateways = &self.gateways;

        let embedding = gateways
            .resolver
            .resolve(&ctx.enterprise_id, ModelKind::Embedding)
            .await
            .map_err(|e| AgentError::step(code, "search_knowledge", e))?;
        let vectors = gateways
            .embedder
            .embed(&[ctx.query.clone()], &embedding)
            .await
            .map_err(|e| AgentError::step(code, "search_knowledge", e))?;
        let query = VectorQuery {
            collection: self.config.collection.clone(),
            vector_field: self.config.vector_field.clone(),
            vectors,
            top_k: self.config.top_k,
            filter: String::new(),
            output_fields: self.config.output_fields.clone(),
        };
        let hits = gateways
            .search
            .search(&query)
            .await
            .map_err(|e| AgentError::step(code, "search_knowledge", e))?
            .into_iter()
            .next()
            .unwrap_or_default();
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let rerank = gateways
            .resolver
            .resolve(&ctx.enterprise_id, ModelKind::Rerank)
            .await
            .map_err(|e| AgentError::step(code, "search_knowledge", e))?;
        let documents: Vec<String> = hits
            .iter()
            .map(|h| h.field(&self.config.content_field).to_string())
            .collect();
        let scores = gateways
            .reranker
            .rerank(&ctx.query, &documents, &rerank)
            .await
            .map_err(|e| AgentError::step(code, "search_knowledge", e))?;

        let mut knowledge: Vec<KnowledgeHit> = hits
            .into_iter()
            .zip(documents)
            .zip(scores)
            .filter(|(_, score)| *score >= self.config.min_score)
            .map(|((hit, content), score)| KnowledgeHit {
                id: hit.id,
                content,
                score,
                fields: hit.fields,
            })
            .collect();
        knowledge.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(knowledge)
    }

    async fn respond(
        &self,
        ctx: &TurnContext,
        intent: &Intent,
        knowledge: &[KnowledgeHit],
    ) -> AgentResult<AgentReply> {
        if knowledge.is_empty() && !self.config.fallback_reply.is_empty() {
            tracing::debug!(agent_code = %self.config.agent_code, "No knowledge retrieved, using fallback reply");
            return Ok(AgentReply::done(self.config.fallback_reply.clone()));
        }
        let listing = render_knowledge(knowledge);
        let prompt = render_prompt(
            &self.config.answer_prompt,
            &[
                ("INTENT", &intent.label),
                ("KNOWLEDGE", &listing),
                ("HISTORY", &ctx.history),
                ("USER_QUERY", &ctx.query),
            ],
        );
        let answer = self.complete(&ctx.enterprise_id, "respond", prompt).await?;
        if answer.is_empty() {
            return Ok(AgentReply::done(self.config.fallback_reply.clone()));
        }
        Ok(AgentReply::done(answer))
    }
}
