//! Deterministic clocks for simulation
//!
//! TigerStyle: Explicit time control, no system time dependencies.
//!
//! - [`SimClock`]: time moves only on `advance_ms`; sleepers wait for it
//! - [`SimTime`]: sleeping advances the shared clock instantly

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medway_core::io::TimeProvider;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Manually advanced clock
#[derive(Debug, Clone)]
pub struct SimClock {
    current_time_ms: Arc<AtomicU64>,
    notify: Arc<Notify>,
}

impl SimClock {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self::from_millis(start_time.timestamp_millis().max(0) as u64)
    }

    pub fn from_millis(ms: u64) -> Self {
        Self {
            current_time_ms: Arc::new(AtomicU64::new(ms)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.current_ms() as i64).unwrap_or_default()
    }

    pub fn current_ms(&self) -> u64 {
        self.current_time_ms.load(Ordering::SeqCst)
    }

    /// Move time forward and wake every sleeper
    pub fn advance_ms(&self, ms: u64) {
        self.current_time_ms.fetch_add(ms, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wait until the clock has been advanced by at least `ms`
    pub async fn sleep_until_advanced(&self, ms: u64) {
        let target_ms = self.current_ms() + ms;
        loop {
            let notified = self.notify.notified();
            if self.current_ms() >= target_ms {
                return;
            }
            notified.await;
        }
    }
}

impl Default for SimClock {
    /// 2024-01-01T00:00:00Z
    fn default() -> Self {
        Self::from_millis(1_704_067_200_000)
    }
}

#[async_trait]
impl TimeProvider for SimClock {
    fn now_ms(&self) -> u64 {
        self.current_ms()
    }

    async fn sleep_ms(&self, ms: u64) {
        self.sleep_until_advanced(ms).await;
    }
}

/// Clock whose sleeps advance time instantly
#[derive(Debug, Clone)]
pub struct SimTime {
    clock: SimClock,
}

impl SimTime {
    pub fn new(clock: SimClock) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }
}

#[async_trait]
impl TimeProvider for SimTime {
    fn now_ms(&self) -> u64 {
        self.clock.current_ms()
    }

    async fn sleep_ms(&self, ms: u64) {
        self.clock.advance_ms(ms);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance() {
        let clock = SimClock::from_millis(0);
        clock.advance_ms(1000);
        clock.advance_ms(500);
        assert_eq!(clock.now_ms(), 1500);
        assert_eq!(clock.now_secs(), 1);
    }

    #[test]
    fn test_default_start() {
        let clock = SimClock::default();
        assert_eq!(clock.now().to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_sleep_waits_for_advance() {
        let clock = SimClock::from_millis(0);
        let sleeper = clock.clone();
        let handle = tokio::spawn(async move {
            sleeper.sleep_ms(100).await;
            sleeper.now_ms()
        });

        tokio::task::yield_now().await;
        clock.advance_ms(50);
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        clock.advance_ms(50);

        assert_eq!(handle.await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_sim_time_sleep_advances() {
        let time = SimTime::new(SimClock::from_millis(0));
        time.sleep_ms(2_000).await;
        assert_eq!(time.now_ms(), 2_000);
        assert_eq!(time.clock().current_ms(), 2_000);
    }
}
