//! Scripted pool scenarios.
//!
//! A scenario names its blocks with labels and lists the operations to
//! apply in order, interleaved with layout expectations:
//!
//! ```yaml
//! capacity: 100
//! steps:
//!   - op: alloc
//!     label: a
//!     size: 30
//!   - op: free
//!     label: a
//!   - op: expect
//!     blocks: 1
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use blockpool_config::deserialize_size;
use blockpool_core::alloc::BlockState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Arena size in bytes, with an optional unit suffix.
    #[serde(deserialize_with = "deserialize_size")]
    pub capacity: usize,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScenarioStep {
    Alloc {
        label: String,
        size: usize,
        /// Error kind the pool must report instead of succeeding.
        #[serde(default)]
        expect_error: Option<String>,
    },
    Free {
        label: String,
        #[serde(default)]
        expect_error: Option<String>,
    },
    /// Resizing an unbound label allocates it.
    Resize {
        label: String,
        size: usize,
        #[serde(default)]
        expect_error: Option<String>,
    },
    /// Writes `byte` over the whole block.
    Fill { label: String, byte: u8 },
    /// Checks that the first `len` bytes (default: all) equal `byte`.
    CheckContents {
        label: String,
        byte: u8,
        #[serde(default)]
        len: Option<usize>,
    },
    Expect {
        #[serde(default)]
        layout: Option<Vec<ExpectedBlock>>,
        #[serde(default)]
        free_bytes: Option<usize>,
        #[serde(default)]
        largest_free: Option<usize>,
        #[serde(default)]
        blocks: Option<usize>,
    },
}

impl ScenarioStep {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioStep::Alloc { .. } => "alloc",
            ScenarioStep::Free { .. } => "free",
            ScenarioStep::Resize { .. } => "resize",
            ScenarioStep::Fill { .. } => "fill",
            ScenarioStep::CheckContents { .. } => "check_contents",
            ScenarioStep::Expect { .. } => "expect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedBlock {
    pub offset: usize,
    pub size: usize,
    pub state: BlockState,
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

/// Reads a scenario from a YAML file.
pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<Scenario, crate::SimulationError> {
    let text = std::fs::read_to_string(path)?;
    Ok(Scenario::from_yaml(&text)?)
}
