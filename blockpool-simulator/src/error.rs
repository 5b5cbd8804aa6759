use thiserror::Error;

use blockpool_config::ConfigError;
use blockpool_core::PoolError;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Step {step}: {op} unexpectedly failed: {source}")]
    Rejected {
        step: usize,
        op: &'static str,
        #[source]
        source: PoolError,
    },

    #[error("Step {step}: pool invariant violated: {source}")]
    Invariant {
        step: usize,
        #[source]
        source: PoolError,
    },

    #[error("Step {step}: contents of block at offset {offset} changed")]
    DataCorruption { step: usize, offset: usize },

    #[error("Step {step}: injected fault '{fault}' was accepted by the pool")]
    FaultAccepted { step: usize, fault: &'static str },

    #[error("Step {step}: expectation failed: {message}")]
    Expectation { step: usize, message: String },

    #[error("Unknown block label '{0}'")]
    UnknownLabel(String),

    #[error("State hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scenario parsing error: {0}")]
    Scenario(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
