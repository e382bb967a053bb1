//! Logging setup
//!
//! TigerStyle: One explicit configuration, installed once at process start.

use crate::error::{Error, Result};

/// Default service name in log records
pub const SERVICE_NAME_DEFAULT: &str = "medway";

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup record
    pub service_name: String,
    /// Log filter directive when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable text
    pub json_output: bool,
    /// Whether to write to stdout at all
    pub stdout_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME_DEFAULT.to_string(),
            log_level: "info".to_string(),
            json_output: false,
            stdout_enabled: true,
        }
    }
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn without_stdout(mut self) -> Self {
        self.stdout_enabled = false;
        self
    }

    /// Build from environment
    ///
    /// Reads:
    /// - `MEDWAY_SERVICE_NAME` (default: "medway")
    /// - `RUST_LOG` (default: "info")
    /// - `MEDWAY_LOG_JSON` (default: false)
    pub fn from_env() -> Self {
        let service_name = std::env::var("MEDWAY_SERVICE_NAME")
            .unwrap_or_else(|_| SERVICE_NAME_DEFAULT.to_string());
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let json_output = std::env::var("MEDWAY_LOG_JSON")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);

        Self {
            service_name,
            log_level,
            json_output,
            stdout_enabled: true,
        }
    }
}

/// Install the global tracing subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    if !config.stdout_enabled {
        return Ok(());
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let installed = if config.json_output {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
    };
    installed.map_err(|e| Error::internal(format!("failed to install tracing subscriber: {}", e)))?;

    tracing::info!(service = %config.service_name, json = config.json_output, "Telemetry initialized");
    Ok(())
}
