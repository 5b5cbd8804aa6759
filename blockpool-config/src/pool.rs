//! Memory pool parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::size::deserialize_size;

/// Pool sizing.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct PoolConfig {
    /// Arena capacity in bytes.
    #[validate(range(min = 1, max = 1073741824))]
    #[serde(default = "default_capacity", deserialize_with = "deserialize_size")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    64 * 1024
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}
