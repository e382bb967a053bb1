//! Per-conversation lock table
//!
//! TigerStyle: Bounded. An entry is evicted only when nobody holds or waits
//! on its mutex, so concurrent callers for one conversation always share a
//! single mutex.

use medway_core::config::LockTableConfig;
use medway_core::io::TimeProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

struct LockEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    last_used_ms: u64,
}

/// Mutex per conversation id
pub struct SessionLockTable {
    entries: Mutex<HashMap<String, LockEntry>>,
    capacity: usize,
    idle_evict_ms: u64,
    time: Arc<dyn TimeProvider>,
}

impl std::fmt::Debug for SessionLockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLockTable")
            .field("capacity", &self.capacity)
            .field("idle_evict_ms", &self.idle_evict_ms)
            .field("len", &self.len())
            .finish()
    }
}

impl SessionLockTable {
    pub fn new(config: &LockTableConfig, time: Arc<dyn TimeProvider>) -> Self {
        assert!(config.capacity > 0, "lock table capacity must be positive");
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: config.capacity,
            idle_evict_ms: config.idle_evict_ms,
            time,
        }
    }

    /// Mutex of `conversation_id`, created on first use
    pub fn lock_for(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let now_ms = self.time.now_ms();
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(entry) = entries.get_mut(conversation_id) {
            entry.last_used_ms = now_ms;
            return entry.lock.clone();
        }

        if entries.len() >= self.capacity {
            Self::evict(&mut entries, now_ms, self.idle_evict_ms, self.capacity);
        }

        let lock = Arc::new(tokio::sync::Mutex::new(()));
        entries.insert(
            conversation_id.to_string(),
            LockEntry {
                lock: lock.clone(),
                last_used_ms: now_ms,
            },
        );
        lock
    }

    /// Acquire the mutex of `conversation_id`
    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        self.lock_for(conversation_id).lock_owned().await
    }

    /// Drop unheld entries idle longer than the threshold; if the table is
    /// still full, drop the least recently used unheld entries.
    fn evict(entries: &mut HashMap<String, LockEntry>, now_ms: u64, idle_evict_ms: u64, capacity: usize) {
        entries.retain(|_, entry| {
            Arc::strong_count(&entry.lock) > 1 || now_ms.saturating_sub(entry.last_used_ms) < idle_evict_ms
        });
        if entries.len() < capacity {
            return;
        }

        let mut unheld: Vec<(String, u64)> = entries
            .iter()
            .filter(|(_, entry)| Arc::strong_count(&entry.lock) == 1)
            .map(|(key, entry)| (key.clone(), entry.last_used_ms))
            .collect();
        unheld.sort_by_key(|(_, last_used_ms)| *last_used_ms);
        let excess = entries.len() + 1 - capacity;
        for (key, _) in unheld.into_iter().take(excess) {
            entries.remove(&key);
        }
        if entries.len() >= capacity {
            tracing::warn!(
                len = entries.len(),
                capacity,
                "Lock table over capacity, every entry is held"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medway_dst::SimClock;

    fn table(capacity: usize, idle_evict_ms: u64) -> (SimClock, SessionLockTable) {
        let clock = SimClock::from_millis(0);
        let config = LockTableConfig {
            capacity,
            idle_evict_ms,
        };
        let table = SessionLockTable::new(&config, Arc::new(clock.clone()));
        (clock, table)
    }

    #[test]
    fn test_same_conversation_same_mutex() {
        let (_, table) = table(4, 1_000);
        let a = table.lock_for("c1");
        let b = table.lock_for("c1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_bounded_by_capacity() {
        let (clock, table) = table(3, 60_000);
        for i in 0..10 {
            clock.advance_ms(1);
            table.lock_for(&format!("c{}", i));
        }
        assert!(table.len() <= 3);
    }

    #[test]
    fn test_held_entries_survive_eviction() {
        let (clock, table) = table(2, 10);
        let held = table.lock_for("held");
        table.lock_for("idle");
        clock.advance_ms(100);
        table.lock_for("new");

        let again = table.lock_for("held");
        assert!(Arc::ptr_eq(&held, &again));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_over_capacity_when_all_held() {
        let (_, table) = table(1, 10);
        let _a = table.lock_for("a");
        let _b = table.lock_for("b");
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_acquire_serializes() {
        let (_, table) = table(4, 1_000);
        let guard = table.acquire("c").await;
        assert!(table.lock_for("c").try_lock().is_err());
        drop(guard);
        assert!(table.lock_for("c").try_lock().is_ok());
    }
}
