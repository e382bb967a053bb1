//! HTTP API tests
//!
//! TigerStyle: Real router, simulated models, in-memory storage.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use medway_core::config::{DecisionConfig, LockTableConfig, MemoryConfig, RegistryConfig};
use medway_core::io::IoContext;
use medway_core::keys::instance_key;
use medway_core::store::{CoordinationStore, MemoryCoordinationStore};
use medway_decision::{AgentRegistryEntry, DecisionPipeline, FastRule, MemoryAgentRegistry, PipelineDeps, RuleCache};
use medway_dst::{
    sim_hit, DeterministicRng, FaultConfig, FaultInjector, FaultType, SimClock, SimEmbedder, SimLlmGateway,
    SimReranker, SimVectorSearch,
};
use medway_gateway::StaticEndpointResolver;
use medway_memory::{MemoryCacheLayer, MemoryMessageStore, MessageStore, SessionMemoryManager};
use medway_registry::{InstanceRecord, ServiceRegistry};
use medway_server::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const AGENT_CODE: &str = "power-ai-decision";
const MEDICAL: &str = "medical_service";
const TRIAGE: &str = "symptom_triage_agent";
const PARKING_REPLY: &str = "停车场位于门诊楼地下一层。";

struct Harness {
    app: Router,
    messages: MemoryMessageStore,
    store: MemoryCoordinationStore,
}

fn harness(llm_faults: FaultInjector) -> Harness {
    let clock = SimClock::from_millis(1_700_000_000_000);
    let io = IoContext::new(Arc::new(clock.clone()), Arc::new(DeterministicRng::new(42)));
    let messages = MemoryMessageStore::new(io.time.clone());
    let memory = Arc::new(SessionMemoryManager::new(
        MemoryConfig::default(),
        &LockTableConfig::default(),
        Arc::new(MemoryCacheLayer::new(io.time.clone())),
        Arc::new(messages.clone()),
        io.clone(),
    ));

    let llm = SimLlmGateway::new(Arc::new(llm_faults))
        .with_response("安全审计员", r#"{"category":"SAFE"}"#)
        .with_response("对话流向判断器", r#"{"action":"CONTINUE"}"#)
        .with_response("业务领域路由器", MEDICAL)
        .with_response("调度专家", format!(r#"{{"target_agent":"{}"}}"#, TRIAGE));
    let no_faults = Arc::new(FaultInjector::none());
    let search = SimVectorSearch::new(no_faults.clone()).with_hit(
        "Sys_agent_registry_",
        sim_hit(
            TRIAGE,
            0.5,
            &[
                ("agent_code", TRIAGE),
                ("agent_name", "智能分诊"),
                ("domain_category", MEDICAL),
                ("description", "询问症状并推荐就诊科室"),
            ],
        ),
    );
    let pipeline = DecisionPipeline::new(
        PipelineDeps {
            rules: Arc::new(RuleCache::with_rules(vec![FastRule::keyword(1, "停车", 10, PARKING_REPLY)])),
            llm: Arc::new(llm),
            embedder: Arc::new(SimEmbedder::new(no_faults.clone())),
            reranker: Arc::new(SimReranker::new(no_faults).with_score("询问症状", 0.95)),
            search: Arc::new(search),
            resolver: Arc::new(StaticEndpointResolver::placeholder()),
            registry: Arc::new(MemoryAgentRegistry::new(vec![AgentRegistryEntry::new(
                TRIAGE,
                MEDICAL,
                "智能分诊",
                "询问症状并推荐就诊科室",
            )])),
            memory,
        },
        DecisionConfig::default(),
    );

    let store = MemoryCoordinationStore::new(io.time.clone());
    let registry = Arc::new(ServiceRegistry::new(
        Arc::new(store.clone()),
        RegistryConfig::default(),
        io.time.clone(),
    ));
    let state = AppState::new(AGENT_CODE, pipeline, registry, io.time);

    Harness {
        app: router(state),
        messages,
        store,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(serde_json::to_vec(&value).unwrap()),
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn turn(query: &str) -> Value {
    json!({
        "query": query,
        "conversation_id": "conv-1",
        "user_id": "patient-1",
        "enterprise_id": "ent-1",
        "sys_track_code": "stc-1",
        "channel": "wechat",
    })
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_health() {
    let h = harness(FaultInjector::none());
    let (status, body) = call(&h.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agent_code"], AGENT_CODE);
}

#[tokio::test]
async fn test_fast_rule_reply_is_intercepted() {
    let h = harness(FaultInjector::none());
    let (status, body) = call(&h.app, "POST", "/power/ai/decision/send_msg", Some(turn("请问停车在哪里"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "success");
    assert_eq!(body["message"], "执行成功");
    assert_eq!(body["sys_track_code"], "stc-1");
    assert_eq!(body["data"]["classification"], "agent-unknown");
    assert_eq!(body["data"]["unknown"], PARKING_REPLY);
    assert_eq!(body["data"]["data"]["msg"], PARKING_REPLY);
}

#[tokio::test]
async fn test_turn_is_routed_to_specialist() {
    let h = harness(FaultInjector::none());
    let (_, body) = call(&h.app, "POST", "/v1/decision", Some(turn("我头疼三天了"))).await;
    assert_eq!(body["code"], "success");
    assert_eq!(body["data"]["classification"], TRIAGE);
    assert_eq!(body["data"]["unknown"], "");
    assert!(body["data"]["data"]["msg"].is_null());
}

#[tokio::test]
async fn test_missing_field_is_bad_request() {
    let h = harness(FaultInjector::none());
    let mut request = turn("我头疼");
    request["user_id"] = json!("");
    let (status, body) = call(&h.app, "POST", "/v1/decision", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "bad-request");
    assert_eq!(body["message"], "{user_id} is empty");
    assert_eq!(body["sys_track_code"], "stc-1");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let h = harness(FaultInjector::none());
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/decision")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "bad-request");
}

#[tokio::test]
async fn test_model_failure_is_cl_err() {
    let mut faults = FaultInjector::new(DeterministicRng::new(7));
    faults.register(FaultConfig::new(FaultType::LlmFailure, 1.0));
    let h = harness(faults);
    let (status, body) = call(&h.app, "POST", "/v1/decision", Some(turn("我头疼三天了"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "cl-err");
    assert_eq!(body["sys_track_code"], "stc-1");
    assert!(body["data"].is_null());
}

// =============================================================================
// Memory callbacks
// =============================================================================

fn turn_callback(user_query: &str, agent_response: &str) -> Value {
    json!({
        "sys_track_code": "stc-2",
        "conversation_id": "conv-1",
        "user_id": "patient-1",
        "agent_code": TRIAGE,
        "user_query": user_query,
        "agent_response": agent_response,
    })
}

#[tokio::test]
async fn test_turn_callback_is_visible_in_context() {
    let h = harness(FaultInjector::none());
    let (_, body) = call(&h.app, "POST", "/v1/memory/turn", Some(turn_callback("我头疼", "头疼多久了？"))).await;
    assert_eq!(body["code"], "success");
    let message_id = body["data"]["message_id"].as_str().unwrap().to_string();
    assert!(h.messages.exists(&message_id).await.unwrap());
    assert_eq!(h.messages.row_count().await, 1);

    let (_, body) = call(
        &h.app,
        "POST",
        "/v1/memory/context",
        Some(json!({"conversation_id": "conv-1", "query": "三天了"})),
    )
    .await;
    assert_eq!(body["code"], "success");
    assert_eq!(body["data"]["history"], "用户: 我头疼\nAI: 头疼多久了？");
    assert_eq!(body["data"]["session"]["flow_context"]["turn_count"], 1);
}

#[tokio::test]
async fn test_memory_callbacks_follow_the_conversation() {
    let h = harness(FaultInjector::none());
    for (query, response) in [("我头疼", "头疼多久了？"), ("三天了", "有发烧吗？")] {
        let (_, body) = call(&h.app, "POST", "/v1/memory/turn", Some(turn_callback(query, response))).await;
        assert_eq!(body["code"], "success");
        assert_eq!(body["sys_track_code"], "stc-2");
        assert_eq!(body["data"]["mode"], "FULL_HISTORY");
    }

    let (_, body) = call(
        &h.app,
        "POST",
        "/v1/memory/context",
        Some(json!({"conversation_id": "conv-1", "query": "没有发烧"})),
    )
    .await;
    assert_eq!(body["code"], "success");
    assert_eq!(body["data"]["mode"], "FULL_HISTORY");
    assert!(body["data"]["history"].as_str().unwrap().contains("我头疼"));
    assert!(body["data"]["history"].as_str().unwrap().contains("有发烧吗？"));

    let (_, body) = call(
        &h.app,
        "POST",
        "/v1/memory/checkpoint",
        Some(json!({"conversation_id": "conv-1", "summary": "患者头痛三天", "recent_turns": 1})),
    )
    .await;
    assert_eq!(body["code"], "success");
    let checkpoint_id = body["data"]["checkpoint_message_id"].as_str().unwrap().to_string();
    assert!(h.messages.exists(&checkpoint_id).await.unwrap());

    let (_, body) = call(
        &h.app,
        "POST",
        "/v1/memory/context",
        Some(json!({"conversation_id": "conv-1", "query": "没有发烧"})),
    )
    .await;
    assert_eq!(body["data"]["mode"], "SUMMARY_N");
    assert_eq!(
        body["data"]["session"]["message_context"]["checkpoint_message_id"],
        checkpoint_id.as_str()
    );
}

#[tokio::test]
async fn test_memory_rejects_missing_conversation() {
    let h = harness(FaultInjector::none());
    let (status, body) = call(
        &h.app,
        "POST",
        "/v1/memory/finalize",
        Some(json!({"sys_track_code": "stc-3", "summary": "结束"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "bad-request");
    assert_eq!(body["sys_track_code"], "stc-3");
}

// =============================================================================
// Registry
// =============================================================================

#[tokio::test]
async fn test_registry_lookup() {
    let h = harness(FaultInjector::none());
    let record = InstanceRecord::new("power-ai-agent-triage", "10.0.0.5", 8081);
    h.store
        .put(
            &instance_key("power-ai-agent-triage", &record.address()),
            &record.to_json().unwrap(),
        )
        .await
        .unwrap();

    let (_, body) = call(&h.app, "GET", "/v1/registry/power-ai-agent-triage", None).await;
    assert_eq!(body["code"], "success");
    assert_eq!(body["data"]["address"], "10.0.0.5:8081");
    assert_eq!(
        body["data"]["send_msg_url"],
        "http://10.0.0.5:8081/power/ai/agent/triage/send_msg"
    );

    let (status, body) = call(&h.app, "GET", "/v1/registry/power-ai-agent-billing", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "registry-err");
}
