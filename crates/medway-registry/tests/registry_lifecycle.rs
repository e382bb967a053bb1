//! Registration, watch and selection against a simulated clock

use futures::StreamExt;
use medway_core::config::RegistryConfig;
use medway_core::io::TimeProvider;
use medway_core::keys::instance_key;
use medway_core::store::{CoordinationStore, MemoryCoordinationStore, WatchEventKind};
use medway_dst::{DeterministicRng, FaultConfig, FaultInjector, FaultType, SimClock, SimCoordinationStore};
use medway_registry::{InstanceRecord, RegistryError, RegistryTasks, ServiceRegistry};
use std::collections::HashMap;
use std::sync::Arc;

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

fn memory_store(clock: &SimClock) -> MemoryCoordinationStore {
    MemoryCoordinationStore::new(Arc::new(clock.clone()))
}

fn registry_over(store: Arc<dyn CoordinationStore>, clock: &SimClock) -> Arc<ServiceRegistry> {
    let time: Arc<dyn TimeProvider> = Arc::new(clock.clone());
    Arc::new(ServiceRegistry::new(store, RegistryConfig::default(), time))
}

async fn publish(store: &MemoryCoordinationStore, code: &str, ip: &str) -> String {
    let record = InstanceRecord::new(code, ip, 9000);
    let key = instance_key(code, &record.address());
    store.put(&key, &record.to_json().unwrap()).await.unwrap();
    key
}

#[tokio::test]
async fn test_register_publishes_and_revokes_on_shutdown() {
    let clock = SimClock::from_millis(0);
    let store = memory_store(&clock);
    let registry = registry_over(Arc::new(store.clone()), &clock);
    let record = InstanceRecord::new("power-ai-decision", "10.0.0.1", 8080).with_version("1.0.0");
    let key = instance_key("power-ai-decision", "10.0.0.1:8080");

    let tasks = RegistryTasks::start(registry, Some(record.clone()));
    settle().await;

    let raw = store.get(&key).await.unwrap().expect("record registered");
    assert_eq!(InstanceRecord::from_json(&key, &raw).unwrap(), record);
    assert_eq!(store.lease_count().await, 1);

    tasks.join().await;
    assert_eq!(store.get(&key).await.unwrap(), None);
    assert_eq!(store.lease_count().await, 0);
}

#[tokio::test]
async fn test_register_retries_until_store_recovers() {
    let clock = SimClock::from_millis(0);
    let store = memory_store(&clock);
    let registry = registry_over(Arc::new(store.clone()), &clock);
    let key = instance_key("agent-x", "10.0.0.2:1");

    store.set_available(false);
    let _tasks = RegistryTasks::start(registry, Some(InstanceRecord::new("agent-x", "10.0.0.2", 1)));
    settle().await;

    store.set_available(true);
    assert_eq!(store.get(&key).await.unwrap(), None);

    // retry delay is 5 s
    clock.advance_ms(4_999);
    settle().await;
    assert_eq!(store.get(&key).await.unwrap(), None);

    clock.advance_ms(1);
    settle().await;
    assert!(store.get(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reregisters_after_keepalive_loss() {
    let clock = SimClock::from_millis(0);
    let inner = memory_store(&clock);
    let mut faults = FaultInjector::new(DeterministicRng::new(11));
    faults.register(FaultConfig::times(FaultType::KeepaliveLoss, 1));
    let store = SimCoordinationStore::new(inner.clone(), Arc::new(faults));
    let registry = registry_over(Arc::new(store), &clock);
    let key = instance_key("agent-y", "10.0.0.3:1");
    let mut events = inner.watch(&key).await.unwrap();

    let _tasks = RegistryTasks::start(registry, Some(InstanceRecord::new("agent-y", "10.0.0.3", 1)));
    settle().await;
    let first = events.next().await.unwrap();
    assert_eq!(first.kind, WatchEventKind::Put);

    // re-register delay is 2 s
    clock.advance_ms(2_000);
    settle().await;
    let second = events.next().await.unwrap();
    assert_eq!(second.kind, WatchEventKind::Put);
    assert_eq!(second.key, key);
}

#[tokio::test]
async fn test_watch_tracks_joins_leaves_and_expiry() {
    let clock = SimClock::from_millis(0);
    let store = memory_store(&clock);
    let registry = registry_over(Arc::new(store.clone()), &clock);
    let first = publish(&store, "agent-a", "10.1.0.1").await;

    let _tasks = RegistryTasks::start(registry.clone(), None);
    settle().await;
    assert_eq!(registry.instances("agent-a").await, vec!["10.1.0.1:9000"]);

    publish(&store, "agent-a", "10.1.0.2").await;
    settle().await;
    assert_eq!(
        registry.instances("agent-a").await,
        vec!["10.1.0.1:9000", "10.1.0.2:9000"]
    );

    store.delete(&first).await.unwrap();
    settle().await;
    assert_eq!(registry.instances("agent-a").await, vec!["10.1.0.2:9000"]);

    let lease = store.grant_lease(10).await.unwrap();
    let record = InstanceRecord::new("agent-a", "10.1.0.3", 9000);
    store
        .put_with_lease(
            &instance_key("agent-a", &record.address()),
            &record.to_json().unwrap(),
            lease,
        )
        .await
        .unwrap();
    settle().await;
    assert_eq!(registry.instances("agent-a").await.len(), 2);

    clock.advance_ms(10_000);
    assert_eq!(store.expire_leases().await, 1);
    settle().await;
    assert_eq!(registry.instances("agent-a").await, vec!["10.1.0.2:9000"]);
}

#[tokio::test]
async fn test_watch_resubscribes_and_catches_up() {
    let clock = SimClock::from_millis(0);
    let store = memory_store(&clock);
    let registry = registry_over(Arc::new(store.clone()), &clock);
    publish(&store, "agent-b", "10.2.0.1").await;

    let _tasks = RegistryTasks::start(registry.clone(), None);
    settle().await;

    store.close_watches();
    settle().await;
    publish(&store, "agent-b", "10.2.0.2").await;
    settle().await;
    assert_eq!(registry.instances("agent-b").await.len(), 1);

    // watch retry delay is 5 s
    clock.advance_ms(5_000);
    settle().await;
    assert_eq!(registry.instances("agent-b").await.len(), 2);
}

#[tokio::test]
async fn test_round_robin_fairness() {
    let clock = SimClock::from_millis(0);
    let store = memory_store(&clock);
    let registry = registry_over(Arc::new(store.clone()), &clock);
    for ip in ["10.3.0.1", "10.3.0.2", "10.3.0.3"] {
        publish(&store, "agent-c", ip).await;
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..300 {
        *counts
            .entry(registry.select("agent-c").await.unwrap())
            .or_default() += 1;
    }

    assert_eq!(counts.len(), 3);
    assert!(counts.values().all(|&n| n == 100));
}

#[tokio::test]
async fn test_empty_code_discovers_once_then_fails() {
    let clock = SimClock::from_millis(0);
    let store = memory_store(&clock);
    let registry = registry_over(Arc::new(store.clone()), &clock);

    assert!(matches!(
        registry.select("agent-d").await,
        Err(RegistryError::NoInstanceAvailable { .. })
    ));

    publish(&store, "agent-d", "10.4.0.1").await;
    assert_eq!(registry.select("agent-d").await.unwrap(), "10.4.0.1:9000");
}
