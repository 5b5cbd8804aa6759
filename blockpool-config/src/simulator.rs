//! Simulated workload configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::size::deserialize_size;
use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SimulatorConfig {
    /// Seed for deterministic simulation.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of operations to run.
    #[validate(range(min = 1, max = 100000000))]
    #[serde(default = "default_operations")]
    pub operations: usize,

    /// Largest single request in bytes.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_request", deserialize_with = "deserialize_size")]
    pub max_request: usize,

    /// Relative frequency of each operation.
    #[validate(custom(function = validation::validate_weights))]
    #[serde(default)]
    pub weights: OperationWeights,

    /// Fault injection.
    #[validate(nested)]
    #[serde(default)]
    pub chaos: ChaosConfig,
}

fn default_seed() -> u64 {
    42
}

fn default_operations() -> usize {
    10_000
}

fn default_max_request() -> usize {
    512
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            operations: default_operations(),
            max_request: default_max_request(),
            weights: OperationWeights::default(),
            chaos: ChaosConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct OperationWeights {
    pub alloc: u32,
    pub free: u32,
    pub resize: u32,
}

impl OperationWeights {
    /// Sum of all weights, widened so `u32::MAX` weights cannot overflow.
    pub fn total(&self) -> u64 {
        u64::from(self.alloc) + u64::from(self.free) + u64::from(self.resize)
    }
}

impl Default for OperationWeights {
    fn default() -> Self {
        Self {
            alloc: 5,
            free: 4,
            resize: 1,
        }
    }
}

#[derive(Default, Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ChaosConfig {
    /// Inject invalid frees (double frees, foreign handles).
    #[serde(default)]
    pub enabled: bool,

    /// Per-operation fault probability (0.0 to 1.0).
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default)]
    pub fault_probability: f64,
}
