//! Observability configuration.
//!
//! Parameters for system instrumentation:
//! - Log filtering
//! - Metrics collection

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default tracing filter; `RUST_LOG` takes precedence when set.
    #[validate(custom(function = validation::validate_log_filter))]
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Collect Prometheus metrics for simulated workloads.
    #[serde(default)]
    pub metrics: bool,
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            metrics: false,
        }
    }
}
