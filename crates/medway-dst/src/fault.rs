//! Fault injection for deterministic testing
//!
//! TigerStyle: Explicit fault types, probabilistic injection.

use crate::rng::DeterministicRng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Types of faults that can be injected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultType {
    // Model faults
    /// Model call exceeds its deadline
    LlmTimeout,
    /// Model provider returns an error
    LlmFailure,
    /// Model answers with text that is not the requested JSON
    LlmMalformedOutput,
    /// Embedding call fails
    EmbedFailure,
    /// Rerank call fails
    RerankFailure,
    /// Vector search exceeds its deadline
    SearchTimeout,

    // Storage faults
    /// Coordination store rejects the operation
    StoreUnavailable,
    /// Lease renewal stops; the keepalive stream closes
    KeepaliveLoss,
    /// Session cache read or write fails
    CacheFailure,
    /// Message store read or write fails
    MessageStoreFailure,
    /// Message insert hits an existing primary key
    DuplicateKey,
}

impl FaultType {
    /// Get a human-readable name for this fault type
    pub fn name(&self) -> &'static str {
        match self {
            FaultType::LlmTimeout => "llm_timeout",
            FaultType::LlmFailure => "llm_failure",
            FaultType::LlmMalformedOutput => "llm_malformed_output",
            FaultType::EmbedFailure => "embed_failure",
            FaultType::RerankFailure => "rerank_failure",
            FaultType::SearchTimeout => "search_timeout",
            FaultType::StoreUnavailable => "store_unavailable",
            FaultType::KeepaliveLoss => "keepalive_loss",
            FaultType::CacheFailure => "cache_failure",
            FaultType::MessageStoreFailure => "message_store_failure",
            FaultType::DuplicateKey => "duplicate_key",
        }
    }
}

/// Configuration for a fault injection rule
#[derive(Debug, Clone)]
pub struct FaultConfig {
    pub fault_type: FaultType,
    /// Probability of injection (0.0 - 1.0)
    pub probability: f64,
    /// Only operations whose name contains this
    pub operation_filter: Option<String>,
    /// Only trigger after this many operations
    pub after_operations: u64,
    /// Maximum number of times to trigger
    pub max_triggers: Option<u64>,
    pub enabled: bool,
}

impl FaultConfig {
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1]"
        );

        Self {
            fault_type,
            probability,
            operation_filter: None,
            after_operations: 0,
            max_triggers: None,
            enabled: true,
        }
    }

    /// Fault that fires on the first `count` matching operations
    pub fn times(fault_type: FaultType, count: u64) -> Self {
        Self::new(fault_type, 1.0).max_triggers(count)
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    pub fn after(mut self, operations: u64) -> Self {
        self.after_operations = operations;
        self
    }

    pub fn max_triggers(mut self, max: u64) -> Self {
        self.max_triggers = Some(max);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug)]
struct FaultState {
    config: FaultConfig,
    trigger_count: AtomicU64,
}

/// Fault injector for deterministic testing
#[derive(Debug)]
pub struct FaultInjector {
    faults: Vec<FaultState>,
    rng: DeterministicRng,
    operation_count: AtomicU64,
}

impl FaultInjector {
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            faults: Vec::new(),
            rng,
            operation_count: AtomicU64::new(0),
        }
    }

    /// Injector that never fires
    pub fn none() -> Self {
        Self::new(DeterministicRng::default())
    }

    pub fn register(&mut self, config: FaultConfig) {
        self.faults.push(FaultState {
            config,
            trigger_count: AtomicU64::new(0),
        });
    }

    /// Fault to inject for `operation`, if any
    ///
    /// Only faults in `accepted` are considered, so a gateway never receives
    /// a fault it cannot express.
    pub fn should_inject(&self, operation: &str, accepted: &[FaultType]) -> Option<FaultType> {
        let op_count = self.operation_count.fetch_add(1, Ordering::SeqCst);

        for state in &self.faults {
            let config = &state.config;
            if !config.enabled || !accepted.contains(&config.fault_type) {
                continue;
            }
            if let Some(filter) = &config.operation_filter {
                if !operation.contains(filter.as_str()) {
                    continue;
                }
            }
            if op_count < config.after_operations {
                continue;
            }
            let trigger_count = state.trigger_count.load(Ordering::SeqCst);
            if let Some(max) = config.max_triggers {
                if trigger_count >= max {
                    continue;
                }
            }

            if self.rng.next_bool(config.probability) {
                state.trigger_count.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(
                    fault = config.fault_type.name(),
                    operation,
                    trigger_count = trigger_count + 1,
                    "Injecting fault"
                );
                return Some(config.fault_type.clone());
            }
        }
        None
    }

    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::SeqCst)
    }

    /// Times `fault_type` has fired
    pub fn trigger_count(&self, fault_type: &FaultType) -> u64 {
        self.faults
            .iter()
            .filter(|s| &s.config.fault_type == fault_type)
            .map(|s| s.trigger_count.load(Ordering::SeqCst))
            .sum()
    }

    pub fn stats(&self) -> Vec<FaultStats> {
        self.faults
            .iter()
            .map(|state| FaultStats {
                fault_type: state.config.fault_type.name().to_string(),
                probability: state.config.probability,
                trigger_count: state.trigger_count.load(Ordering::SeqCst),
                enabled: state.config.enabled,
            })
            .collect()
    }
}

/// Statistics for a fault configuration
#[derive(Debug, Clone)]
pub struct FaultStats {
    pub fault_type: String,
    pub probability: f64,
    pub trigger_count: u64,
    pub enabled: bool,
}

/// Builder for a [`FaultInjector`] with several faults
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    faults: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            faults: Vec::new(),
        }
    }

    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.faults.push(config);
        self
    }

    /// Model timeouts, failures and malformed output
    pub fn with_llm_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::LlmTimeout, probability))
            .with_fault(FaultConfig::new(FaultType::LlmFailure, probability))
            .with_fault(FaultConfig::new(FaultType::LlmMalformedOutput, probability))
    }

    /// Store, cache and message-store failures
    pub fn with_storage_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::StoreUnavailable, probability))
            .with_fault(FaultConfig::new(FaultType::CacheFailure, probability))
            .with_fault(FaultConfig::new(FaultType::MessageStoreFailure, probability))
    }

    pub fn build(self) -> FaultInjector {
        let mut injector = FaultInjector::new(self.rng);
        for fault in self.faults {
            injector.register(fault);
        }
        injector
    }
}
