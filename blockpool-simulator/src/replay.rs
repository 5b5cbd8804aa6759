//! Replay module.
//!
//! Plays a [`Scenario`] against a fresh pool, step by step. Every step is
//! followed by a chain verification and folded into the state digest, so a
//! replay is as reproducible as a seeded simulation.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use blockpool_core::alloc::{BlockHandle, PoolAllocator, PoolSummary};
use blockpool_core::PoolError;

use crate::scenario::{ExpectedBlock, Scenario, ScenarioStep};
use crate::state::StateHasher;
use crate::SimulationError;

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: usize,
    pub digest: String,
    pub summary: PoolSummary,
}

/// Replays `scenario` and returns the digest of the run.
///
/// Labels stay bound to their handle after a free, so a scenario can free
/// the same label twice to exercise double-free detection.
pub fn replay_scenario(scenario: &Scenario) -> Result<ReplayReport, SimulationError> {
    let mut pool = PoolAllocator::new(scenario.capacity)?;
    let mut labels: HashMap<&str, BlockHandle> = HashMap::new();
    let mut hasher = StateHasher::new();

    info!(
        capacity = scenario.capacity,
        steps = scenario.steps.len(),
        "replaying scenario"
    );

    for (step, action) in scenario.steps.iter().enumerate() {
        debug!(step, op = action.name(), "scenario step");
        match action {
            ScenarioStep::Alloc {
                label,
                size,
                expect_error,
            } => {
                let result = pool.alloc(*size);
                if let Some(handle) = settle(step, "alloc", result, expect_error, &mut hasher)? {
                    labels.insert(label.as_str(), handle);
                }
            }
            ScenarioStep::Free { label, expect_error } => {
                let handle = bound(&labels, label)?;
                let result = pool.free(handle).map(|()| handle);
                settle(step, "free", result, expect_error, &mut hasher)?;
            }
            ScenarioStep::Resize {
                label,
                size,
                expect_error,
            } => {
                let current = labels.get(label.as_str()).copied();
                let result = pool.resize(current, *size);
                if let Some(handle) = settle(step, "resize", result, expect_error, &mut hasher)? {
                    labels.insert(label.as_str(), handle);
                }
            }
            ScenarioStep::Fill { label, byte } => {
                let handle = bound(&labels, label)?;
                pool.bytes_mut(handle)
                    .map_err(|source| rejected(step, "fill", source))?
                    .fill(*byte);
            }
            ScenarioStep::CheckContents { label, byte, len } => {
                let handle = bound(&labels, label)?;
                let bytes = pool
                    .bytes(handle)
                    .map_err(|source| rejected(step, "check_contents", source))?;
                let len = len.unwrap_or(bytes.len());
                let intact = len <= bytes.len() && bytes[..len].iter().all(|b| b == byte);
                if !intact {
                    return Err(SimulationError::DataCorruption {
                        step,
                        offset: handle.offset(),
                    });
                }
            }
            ScenarioStep::Expect {
                layout,
                free_bytes,
                largest_free,
                blocks,
            } => {
                if let Some(layout) = layout {
                    check_layout(step, &pool, layout)?;
                }
                expect_eq(step, "free_bytes", *free_bytes, pool.free_bytes())?;
                expect_eq(step, "largest_free", *largest_free, pool.largest_free_block())?;
                expect_eq(step, "blocks", *blocks, pool.block_count())?;
            }
        }

        pool.verify()
            .map_err(|source| SimulationError::Invariant { step, source })?;
        hasher.record_layout(&pool);
    }

    let digest = hasher.finalize_hex();
    let summary = pool.deinit();
    info!(%digest, leaked_blocks = summary.leaked_blocks, "scenario replayed");
    Ok(ReplayReport {
        steps: scenario.steps.len(),
        digest,
        summary,
    })
}

/// Matches an operation result against the scenario's expectation and
/// records it. Returns the handle of a successful operation.
fn settle(
    step: usize,
    op: &'static str,
    result: Result<BlockHandle, PoolError>,
    expect_error: &Option<String>,
    hasher: &mut StateHasher,
) -> Result<Option<BlockHandle>, SimulationError> {
    match (result, expect_error) {
        (Ok(handle), None) => {
            hasher.record(op, "ok", Some(handle.offset()));
            Ok(Some(handle))
        }
        (Ok(handle), Some(kind)) => Err(SimulationError::Expectation {
            step,
            message: format!(
                "{op} succeeded at offset {} but {kind} was expected",
                handle.offset()
            ),
        }),
        (Err(err), Some(kind)) if err.kind() == kind.as_str() => {
            hasher.record(op, err.kind(), None);
            Ok(None)
        }
        (Err(err), Some(kind)) => Err(SimulationError::Expectation {
            step,
            message: format!("{op} failed with {} but {kind} was expected", err.kind()),
        }),
        (Err(source), None) => Err(rejected(step, op, source)),
    }
}

fn bound(
    labels: &HashMap<&str, BlockHandle>,
    label: &str,
) -> Result<BlockHandle, SimulationError> {
    labels
        .get(label)
        .copied()
        .ok_or_else(|| SimulationError::UnknownLabel(label.to_string()))
}

fn rejected(step: usize, op: &'static str, source: PoolError) -> SimulationError {
    SimulationError::Rejected { step, op, source }
}

fn check_layout(
    step: usize,
    pool: &PoolAllocator,
    expected: &[ExpectedBlock],
) -> Result<(), SimulationError> {
    let actual: Vec<ExpectedBlock> = pool
        .blocks()
        .map(|b| ExpectedBlock {
            offset: b.offset,
            size: b.size,
            state: b.state,
        })
        .collect();
    if actual == expected {
        Ok(())
    } else {
        Err(SimulationError::Expectation {
            step,
            message: format!("layout {actual:?} does not match {expected:?}"),
        })
    }
}

fn expect_eq(
    step: usize,
    what: &str,
    expected: Option<usize>,
    actual: usize,
) -> Result<(), SimulationError> {
    match expected {
        Some(expected) if expected != actual => Err(SimulationError::Expectation {
            step,
            message: format!("{what} is {actual}, expected {expected}"),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(text: &str) -> Scenario {
        Scenario::from_yaml(text).unwrap()
    }

    const FRAGMENTATION: &str = r#"
capacity: 100
steps:
  - { op: alloc, label: a, size: 30 }
  - { op: alloc, label: b, size: 40 }
  - { op: alloc, label: c, size: 30 }
  - { op: free, label: a }
  - { op: free, label: c }
  - { op: alloc, label: d, size: 40, expect_error: no_space }
  - op: expect
    free_bytes: 60
    largest_free: 30
    layout:
      - { offset: 0, size: 30, state: free }
      - { offset: 30, size: 40, state: used }
      - { offset: 70, size: 30, state: free }
  - { op: free, label: b }
  - { op: expect, blocks: 1, largest_free: 100 }
"#;

    #[test]
    fn test_fragmentation_scenario() {
        let report = replay_scenario(&scenario(FRAGMENTATION)).unwrap();
        assert_eq!(report.steps, 9);
        assert_eq!(report.summary.leaked_blocks, 0);
        assert_eq!(report.digest.len(), 64);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let first = replay_scenario(&scenario(FRAGMENTATION)).unwrap();
        let second = replay_scenario(&scenario(FRAGMENTATION)).unwrap();
        assert_eq!(first.digest, second.digest);
    }

    #[test]
    fn test_double_free_and_contents() {
        let report = replay_scenario(&scenario(
            r#"
capacity: 64
steps:
  - { op: resize, label: a, size: 8 }
  - { op: fill, label: a, byte: 171 }
  - { op: resize, label: a, size: 4 }
  - { op: check_contents, label: a, byte: 171 }
  - { op: alloc, label: guard, size: 8 }
  - { op: resize, label: a, size: 16 }
  - { op: check_contents, label: a, byte: 171, len: 8 }
  - op: expect
    layout:
      - { offset: 0, size: 8, state: free }
      - { offset: 8, size: 8, state: used }
      - { offset: 16, size: 16, state: used }
      - { offset: 32, size: 32, state: free }
  - { op: free, label: a }
  - { op: free, label: a, expect_error: double_free }
"#,
        ))
        .unwrap();
        assert_eq!(report.summary.leaked_blocks, 1);
    }

    #[test]
    fn test_bundled_scenario() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../scenarios/coalesce.yaml");
        let report = replay_scenario(&crate::load_scenario(path).unwrap()).unwrap();
        assert_eq!(report.summary.capacity, 1024);
        assert_eq!(report.summary.leaked_blocks, 0);
        assert_eq!(report.summary.stats.rejected_frees, 1);
    }

    #[test]
    fn test_failed_expectation_reported() {
        let err = replay_scenario(&scenario(
            r#"
capacity: 32
steps:
  - { op: alloc, label: a, size: 8 }
  - { op: expect, blocks: 1 }
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, SimulationError::Expectation { step: 1, .. }));
    }

    #[test]
    fn test_unexpected_success_reported() {
        let err = replay_scenario(&scenario(
            r#"
capacity: 32
steps:
  - { op: alloc, label: a, size: 8, expect_error: no_space }
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, SimulationError::Expectation { step: 0, .. }));
    }

    #[test]
    fn test_unknown_label_reported() {
        let err = replay_scenario(&scenario(
            "capacity: 32\nsteps:\n  - { op: free, label: ghost }\n",
        ))
        .unwrap_err();
        assert!(matches!(err, SimulationError::UnknownLabel(label) if label == "ghost"));
    }
}
