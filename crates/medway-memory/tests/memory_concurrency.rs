//! Concurrent writes and checkpoint ordering

use async_trait::async_trait;
use medway_core::config::{LockTableConfig, MemoryConfig};
use medway_core::io::{IoContext, RngProvider, TimeProvider, WallClockTime};
use medway_dst::DeterministicRng;
use medway_memory::{
    CacheLayer, MemoryCacheLayer, MemoryMessageStore, MemoryMode, MemoryQuery, MemoryResult,
    MessageStore, SessionMemoryManager, TurnWrite, CHECKPOINT_QUERY,
};
use std::sync::Arc;

/// Yields between every cache call so unserialized writers would interleave
struct YieldingCache {
    inner: MemoryCacheLayer,
}

#[async_trait]
impl CacheLayer for YieldingCache {
    async fn get(&self, key: &str) -> MemoryResult<Option<String>> {
        tokio::task::yield_now().await;
        let value = self.inner.get(key).await;
        tokio::task::yield_now().await;
        value
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> MemoryResult<()> {
        tokio::task::yield_now().await;
        self.inner.set_with_ttl(key, value, ttl_secs).await
    }

    async fn exists(&self, key: &str) -> MemoryResult<bool> {
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> MemoryResult<bool> {
        self.inner.delete(key).await
    }
}

fn manager() -> (Arc<SessionMemoryManager>, MemoryMessageStore) {
    let time: Arc<dyn TimeProvider> = Arc::new(WallClockTime::new());
    let rng: Arc<dyn RngProvider> = Arc::new(DeterministicRng::new(99));
    let cache = YieldingCache {
        inner: MemoryCacheLayer::new(time.clone()),
    };
    let messages = MemoryMessageStore::new(time.clone());
    let manager = SessionMemoryManager::new(
        MemoryConfig::default(),
        &LockTableConfig::default(),
        Arc::new(cache),
        Arc::new(messages.clone()),
        IoContext::new(time, rng),
    );
    (Arc::new(manager), messages)
}

fn turn(conversation_id: &str, i: usize) -> TurnWrite {
    TurnWrite {
        conversation_id: conversation_id.to_string(),
        user_id: "patient-1".to_string(),
        agent_code: "power-ai-agent-triage".to_string(),
        user_query: format!("问题{}", i),
        agent_response: format!("回答{}", i),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_count_every_turn() {
    let (manager, _) = manager();
    manager.write_turn(&turn("conv-1", 0)).await.unwrap();

    let writers = 64;
    let handles: Vec<_> = (1..=writers)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.write_turn(&turn("conv-1", i)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let session = manager.get("conv-1").await.unwrap().unwrap();
    assert_eq!(session.flow_context.turn_count, 1 + writers as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conversations_do_not_share_counts() {
    let (manager, _) = manager();
    let handles: Vec<_> = (0..40)
        .map(|i| {
            let manager = manager.clone();
            let conversation_id = format!("conv-{}", i % 4);
            tokio::spawn(async move { manager.write_turn(&turn(&conversation_id, i)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    for c in 0..4 {
        let session = manager.get(&format!("conv-{}", c)).await.unwrap().unwrap();
        assert_eq!(session.flow_context.turn_count, 10);
    }
}

#[tokio::test]
async fn test_checkpoints_advance_the_segment() {
    let (manager, messages) = manager();
    let conversation_id = "conv-2";

    for i in 0..3 {
        manager
            .record_message(conversation_id, &format!("问{}", i), &format!("答{}", i), "agent")
            .await
            .unwrap();
    }
    let first = manager.checkpoint(conversation_id, "第一段摘要", 8).await.unwrap();

    manager.record_message(conversation_id, "问3", "答3", "agent").await.unwrap();
    let ctx = manager
        .query_context(&MemoryQuery::new(conversation_id, "q"))
        .await
        .unwrap();
    assert_eq!(ctx.full_history, "用户: 问3\nAI: 答3");

    let second = manager.checkpoint(conversation_id, "第二段摘要", 1).await.unwrap();
    assert_ne!(first, second);

    let session = manager.get(conversation_id).await.unwrap().unwrap();
    assert_eq!(session.message_context.checkpoint_message_id, second);
    assert_eq!(session.message_context.summary, "第二段摘要");
    assert_eq!(session.mode(), MemoryMode::SummaryN);

    // the newer checkpoint row follows the older one in the history
    let rows = messages.list_by_conversation(conversation_id).await.unwrap();
    let positions: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, m)| m.query == CHECKPOINT_QUERY)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(positions.len(), 2);
    assert_eq!(rows[positions[0]].message_id, first);
    assert_eq!(rows[positions[1]].message_id, second);

    let ctx = manager
        .query_context(&MemoryQuery::new(conversation_id, "q"))
        .await
        .unwrap();
    assert_eq!(ctx.full_history, "");
    assert_eq!(ctx.history, "历史摘要: 第二段摘要\n用户: 问3\nAI: 答3");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_checkpoint_and_writes_interleave_safely() {
    let (manager, _) = manager();
    let conversation_id = "conv-3";
    for i in 0..5 {
        manager
            .record_message(conversation_id, &format!("问{}", i), "答", "agent")
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..20 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            if i % 5 == 0 {
                manager.checkpoint(conversation_id, "摘要", 2).await.map(|_| ())
            } else {
                manager.write_turn(&turn(conversation_id, i)).await.map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let session = manager.get(conversation_id).await.unwrap().unwrap();
    assert_eq!(session.flow_context.turn_count, 16);
    assert_eq!(session.mode(), MemoryMode::SummaryN);
    assert!(!session.message_context.checkpoint_message_id.is_empty());
}
