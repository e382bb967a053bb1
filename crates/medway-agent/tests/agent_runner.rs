//! Agent turns over simulated gateways and in-memory session memory

use medway_agent::{AgentRequest, AgentRunner, KnowledgeCapability, KnowledgeConfig, KnowledgeGateways};
use medway_core::config::{LockTableConfig, MemoryConfig};
use medway_core::io::IoContext;
use medway_dst::{
    sim_hit, DeterministicRng, FaultConfig, FaultInjector, FaultType, SimClock, SimEmbedder, SimLlmGateway,
    SimReranker, SimVectorSearch,
};
use medway_gateway::StaticEndpointResolver;
use medway_memory::{MemoryCacheLayer, MemoryMessageStore, SessionMemoryManager};
use std::sync::Arc;

const AGENT: &str = "hospital_info_agent";
const COLLECTION: &str = "kb_hospital_info";
const INTENT_PROMPT: &str = "你是医院咨询意图识别器。\n历史：{{HISTORY}}\n问题：{{USER_QUERY}}\n只输出意图标签。";
const ANSWER_PROMPT: &str =
    "你是医院知识问答助手。\n意图：{{INTENT}}\n资料：\n{{KNOWLEDGE}}历史：{{HISTORY}}\n问题：{{USER_QUERY}}";
const FALLBACK: &str = "暂未找到相关信息，请咨询导诊台。";

struct Harness {
    runner: AgentRunner,
    llm: Arc<SimLlmGateway>,
    reranker: Arc<SimReranker>,
    messages: Arc<MemoryMessageStore>,
    memory: Arc<SessionMemoryManager>,
}

fn harness(llm: SimLlmGateway, search: SimVectorSearch, config: KnowledgeConfig) -> Harness {
    let clock = SimClock::from_millis(1_700_000_000_000);
    let io = IoContext::new(Arc::new(clock.clone()), Arc::new(DeterministicRng::new(11)));
    let messages = Arc::new(MemoryMessageStore::new(Arc::new(clock.clone())));
    let memory = Arc::new(SessionMemoryManager::new(
        MemoryConfig::default(),
        &LockTableConfig::default(),
        Arc::new(MemoryCacheLayer::new(Arc::new(clock))),
        messages.clone(),
        io,
    ));

    let faults = Arc::new(FaultInjector::none());
    let llm = Arc::new(llm);
    let reranker = Arc::new(
        SimReranker::new(faults.clone())
            .with_score("门诊时间", 0.92)
            .with_score("停车", 0.15),
    );
    let gateways = KnowledgeGateways {
        llm: llm.clone(),
        embedder: Arc::new(SimEmbedder::new(faults)),
        reranker: reranker.clone(),
        search: Arc::new(search),
        resolver: Arc::new(StaticEndpointResolver::placeholder()),
    };
    let capability = Arc::new(KnowledgeCapability::new(config, gateways));
    Harness {
        runner: AgentRunner::new(capability, memory.clone()),
        llm,
        reranker,
        messages,
        memory,
    }
}

fn llm_with(faults: FaultInjector) -> SimLlmGateway {
    SimLlmGateway::new(Arc::new(faults))
        .with_response("意图识别器", "outpatient_hours")
        .with_response("知识问答助手", "门诊时间为工作日早上8点至下午5点。")
}

fn indexed_search() -> SimVectorSearch {
    SimVectorSearch::new(Arc::new(FaultInjector::none()))
        .with_hit(COLLECTION, sim_hit("kb-1", 0.81, &[("content", "门诊时间：工作日8:00-17:00")]))
        .with_hit(COLLECTION, sim_hit("kb-2", 0.77, &[("content", "停车场位于门诊楼地下一层")]))
}

fn config() -> KnowledgeConfig {
    KnowledgeConfig::new(AGENT, COLLECTION)
        .with_prompts(INTENT_PROMPT, ANSWER_PROMPT)
        .with_min_score(0.5)
}

fn request(query: &str) -> AgentRequest {
    AgentRequest::new("conv-9", "ent-1", "patient-9", query)
}

#[tokio::test]
async fn test_turn_is_answered_and_recorded() {
    let h = harness(llm_with(FaultInjector::none()), indexed_search(), config());

    let reply = h.runner.handle(&request("门诊几点开门？")).await.unwrap();
    assert_eq!(reply.content, "门诊时间为工作日早上8点至下午5点。");
    assert!(reply.end_flag);
    assert_eq!(h.runner.code(), AGENT);

    assert_eq!(h.llm.call_count(), 2);
    assert_eq!(h.reranker.call_count(), 1);
    let prompts = h.llm.prompts();
    assert!(prompts[1].contains("意图：outpatient_hours"));
    assert!(prompts[1].contains("1. 门诊时间：工作日8:00-17:00"));
    assert!(!prompts[1].contains("停车场"), "low-scoring passage must be dropped");

    assert_eq!(h.messages.row_count().await, 1);
    let session = h.memory.get("conv-9").await.unwrap().unwrap();
    assert_eq!(session.flow_context.turn_count, 1);
    assert_eq!(session.flow_context.current_agent_key, AGENT);
    assert_eq!(session.flow_context.last_bot_message, reply.content);
}

#[tokio::test]
async fn test_second_turn_sees_history() {
    let h = harness(llm_with(FaultInjector::none()), indexed_search(), config());

    h.runner.handle(&request("门诊几点开门？")).await.unwrap();
    h.runner.handle(&request("周六呢？")).await.unwrap();

    let prompts = h.llm.prompts();
    assert_eq!(prompts.len(), 4);
    assert!(prompts[2].contains("门诊几点开门？"));
    assert!(prompts[2].contains("问题：周六呢？"));
    assert_eq!(h.messages.row_count().await, 2);
    let session = h.memory.get("conv-9").await.unwrap().unwrap();
    assert_eq!(session.flow_context.turn_count, 2);
}

#[tokio::test]
async fn test_empty_retrieval_uses_fallback_reply() {
    let search = SimVectorSearch::new(Arc::new(FaultInjector::none()));
    let h = harness(
        llm_with(FaultInjector::none()),
        search,
        config().with_fallback_reply(FALLBACK),
    );

    let reply = h.runner.handle(&request("医院有没有食堂？")).await.unwrap();
    assert_eq!(reply.content, FALLBACK);
    assert_eq!(h.llm.call_count(), 1, "only intent extraction reaches the model");
    assert_eq!(h.reranker.call_count(), 0);
    assert_eq!(h.messages.row_count().await, 1);
}

#[tokio::test]
async fn test_missing_intent_prompt_skips_classification() {
    let config = KnowledgeConfig::new(AGENT, COLLECTION).with_prompts("", ANSWER_PROMPT);
    let h = harness(llm_with(FaultInjector::none()), indexed_search(), config);

    h.runner.handle(&request("门诊几点开门？")).await.unwrap();
    assert_eq!(h.llm.call_count(), 1);
    assert!(h.llm.prompts()[0].contains("意图：unknown"));
}

#[tokio::test]
async fn test_model_failure_records_nothing() {
    let mut faults = FaultInjector::new(DeterministicRng::new(3));
    faults.register(FaultConfig::times(FaultType::LlmFailure, 1));
    let h = harness(llm_with(faults), indexed_search(), config());

    let err = h.runner.handle(&request("门诊几点开门？")).await.unwrap_err();
    assert_eq!(err.code(), "cl-err");
    assert_eq!(h.messages.row_count().await, 0);

    let reply = h.runner.handle(&request("门诊几点开门？")).await.unwrap();
    assert!(!reply.content.is_empty());
    assert_eq!(h.messages.row_count().await, 1);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let h = harness(llm_with(FaultInjector::none()), indexed_search(), config());

    let err = h.runner.handle(&request("   ")).await.unwrap_err();
    assert_eq!(err.code(), "bad-request");

    let err = h
        .runner
        .handle(&AgentRequest::new("", "ent-1", "patient-9", "门诊几点开门？"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "bad-request");

    let long_query = "疼".repeat(10_000);
    let err = h.runner.handle(&request(&long_query)).await.unwrap_err();
    assert_eq!(err.code(), "bad-request");

    assert_eq!(h.llm.call_count(), 0);
    assert_eq!(h.messages.row_count().await, 0);
}
