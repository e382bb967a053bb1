//! Clock and id providers
//!
//! TigerStyle: Registry loops, lease expiry and memory timestamps read time
//! through [`TimeProvider`]; checkpoint and message ids come from
//! [`RngProvider`]. Simulation swaps both for deterministic versions.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Time Provider
// ============================================================================

/// Source of wall time and sleeps
///
/// - `WallClockTime`: production
/// - `SimClock` (medway-dst): manually advanced
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;

    /// Sleep for `ms` milliseconds
    async fn sleep_ms(&self, ms: u64);

    /// Seconds since the Unix epoch, as stored in session metadata
    fn now_secs(&self) -> i64 {
        (self.now_ms() / 1000) as i64
    }
}

/// Production time provider using the system clock
#[derive(Debug, Clone, Default)]
pub struct WallClockTime;

impl WallClockTime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for WallClockTime {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

// ============================================================================
// RNG Provider
// ============================================================================

/// Randomness for ids and jitter
pub trait RngProvider: Send + Sync + std::fmt::Debug {
    /// Next random u64
    fn next_u64(&self) -> u64;

    /// Random f64 in [0, 1)
    fn next_f64(&self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Random version-4 UUID string
    fn gen_uuid(&self) -> String {
        let high = self.next_u64();
        let low = self.next_u64();
        let bits = ((high as u128) << 64) | low as u128;
        uuid::Builder::from_random_bytes(bits.to_be_bytes())
            .into_uuid()
            .to_string()
    }
}

/// Production RNG: xorshift64* over an atomic state
///
/// Not cryptographically secure. Ids only need uniqueness.
#[derive(Debug)]
pub struct StdRngProvider {
    state: AtomicU64,
}

impl Default for StdRngProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StdRngProvider {
    /// Seed from the system clock
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u64) -> Self {
        // xorshift never leaves zero
        let seed = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self {
            state: AtomicU64::new(seed),
        }
    }
}

impl RngProvider for StdRngProvider {
    fn next_u64(&self) -> u64 {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            let mut x = state;
            x ^= x >> 12;
            x ^= x << 25;
            x ^= x >> 27;
            match self
                .state
                .compare_exchange_weak(state, x, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return x.wrapping_mul(0x2545_F491_4F6C_DD1D),
                Err(s) => state = s,
            }
        }
    }
}

// ============================================================================
// I/O Context
// ============================================================================

/// Time and randomness handed to every service
#[derive(Clone, Debug)]
pub struct IoContext {
    pub time: Arc<dyn TimeProvider>,
    pub rng: Arc<dyn RngProvider>,
}

impl Default for IoContext {
    fn default() -> Self {
        Self::production()
    }
}

impl IoContext {
    pub fn production() -> Self {
        Self {
            time: Arc::new(WallClockTime::new()),
            rng: Arc::new(StdRngProvider::new()),
        }
    }

    pub fn new(time: Arc<dyn TimeProvider>, rng: Arc<dyn RngProvider>) -> Self {
        Self { time, rng }
    }

    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    pub fn now_secs(&self) -> i64 {
        self.time.now_secs()
    }

    pub async fn sleep_ms(&self, ms: u64) {
        self.time.sleep_ms(ms).await;
    }

    pub fn gen_uuid(&self) -> String {
        self.rng.gen_uuid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_now_is_recent() {
        let clock = WallClockTime::new();
        let now = clock.now_ms();
        assert!(now > 1_577_836_800_000);
        assert_eq!(clock.now_secs(), (clock.now_ms() / 1000) as i64);
    }

    #[test]
    fn test_seeded_rng_repeats() {
        let a = StdRngProvider::with_seed(7);
        let b = StdRngProvider::with_seed(7);
        assert_eq!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_gen_uuid_is_v4() {
        let rng = StdRngProvider::with_seed(42);
        let id = rng.gen_uuid();
        let parsed = uuid::Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(id, rng.gen_uuid());
    }

    #[test]
    fn test_zero_seed_still_advances() {
        let rng = StdRngProvider::with_seed(0);
        assert_ne!(rng.next_u64(), 0);
    }
}
