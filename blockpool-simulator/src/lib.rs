/*!
# blockpool Simulator

Deterministic workload simulation and scenario replay for the pool
allocator. A seeded RNG drives a mix of allocations, frees and resizes; every
block carries a byte pattern that is checked whenever the block is freed or
moved, and the descriptor chain is verified after every step.

## Key Components:
- **Workload Driver:** Weighted random alloc/free/resize sequence.
- **Chaos Engine:** Optional double-free and foreign-handle injection.
- **State Digest:** BLAKE3 hash over operations and layouts for reproducibility.
- **Replay Engine:** Scripted YAML scenarios with layout expectations.
*/

use opentelemetry::KeyValue;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};
use validator::Validate;

use blockpool_config::{ConfigError, SimulatorConfig};
use blockpool_core::{BlockHandle, PoolAllocator, PoolError};
use blockpool_telemetry::{EventLogger, MetricsRecorder};

pub mod chaos;
pub mod error;
pub mod replay;
pub mod scenario;
pub mod state;

pub use error::SimulationError;
pub use replay::{replay_scenario, ReplayReport};
pub use scenario::{load_scenario, Scenario, ScenarioStep};

use chaos::ChaosEngine;
use state::StateHasher;

#[derive(Debug, Clone, Copy)]
struct LiveBlock {
    handle: BlockHandle,
    /// Bytes written with the block's pattern.
    len: usize,
    tag: u8,
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub operations: usize,
    pub allocations: usize,
    pub frees: usize,
    pub resizes: usize,
    /// Requests refused for lack of space.
    pub failed_requests: usize,
    pub faults_injected: usize,
    pub peak_used_bytes: usize,
    pub peak_blocks: usize,
    pub digest: String,
}

impl SimulationReport {
    /// Compares the run digest with a previously recorded one.
    pub fn validate_digest(&self, expected: &str) -> Result<(), SimulationError> {
        if self.digest.eq_ignore_ascii_case(expected.trim()) {
            Ok(())
        } else {
            Err(SimulationError::HashMismatch {
                expected: expected.trim().to_string(),
                actual: self.digest.clone(),
            })
        }
    }
}

/// Drives a randomized workload against one pool.
pub struct Simulator {
    pool: PoolAllocator,
    rng: SmallRng,
    config: SimulatorConfig,
    live: Vec<LiveBlock>,
    chaos: Option<ChaosEngine>,
    state_hasher: StateHasher,
    metrics: Option<MetricsRecorder>,
    report: SimulationReport,
    next_tag: u8,
}

impl Simulator {
    /// Creates a simulator over a fresh pool of `capacity` bytes.
    ///
    /// `config` is validated first; weights or fault probabilities that
    /// cannot drive a run are reported as [`SimulationError::Config`].
    pub fn new(capacity: usize, config: SimulatorConfig) -> Result<Self, SimulationError> {
        config.validate().map_err(ConfigError::from)?;
        let pool = PoolAllocator::new(capacity)?;
        let chaos = if config.chaos.enabled {
            Some(ChaosEngine::new()?)
        } else {
            None
        };

        Ok(Self {
            pool,
            rng: SmallRng::seed_from_u64(config.seed),
            live: Vec::new(),
            chaos,
            state_hasher: StateHasher::new(),
            metrics: None,
            report: SimulationReport {
                seed: config.seed,
                operations: 0,
                allocations: 0,
                frees: 0,
                resizes: 0,
                failed_requests: 0,
                faults_injected: 0,
                peak_used_bytes: 0,
                peak_blocks: 0,
                digest: String::new(),
            },
            config,
            next_tag: 0,
        })
    }

    /// Records every operation outcome into `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn pool(&self) -> &PoolAllocator {
        &self.pool
    }

    /// Runs `operations` steps, then releases every remaining block and
    /// checks that the pool collapsed back into a single free block.
    pub fn run(mut self, operations: usize) -> Result<SimulationReport, SimulationError> {
        info!(
            seed = self.config.seed,
            operations,
            capacity = self.pool.capacity(),
            chaos = self.chaos.is_some(),
            "simulation started"
        );

        for step in 0..operations {
            self.step(step)?;
        }

        let step = operations;
        while let Some(block) = self.live.pop() {
            self.release(step, block)?;
        }
        if self.pool.block_count() != 1 || self.pool.free_bytes() != self.pool.capacity() {
            return Err(SimulationError::Invariant {
                step,
                source: PoolError::Corrupted(format!(
                    "{} descriptors remain after releasing every block",
                    self.pool.block_count()
                )),
            });
        }

        self.report.operations = operations;
        self.report.digest = self.state_hasher.finalize_hex();
        EventLogger::log_event(
            "simulation_finished",
            &[
                KeyValue::new("seed", self.config.seed as i64),
                KeyValue::new("operations", operations as i64),
                KeyValue::new("digest", self.report.digest.clone()),
            ],
        );

        let summary = self.pool.deinit();
        debug!(?summary, "simulation pool released");
        Ok(self.report)
    }

    fn step(&mut self, step: usize) -> Result<(), SimulationError> {
        if let Some(probability) = self.fault_probability() {
            if self.rng.random_bool(probability) {
                self.inject_fault(step)?;
            }
        }

        let weights = self.config.weights;
        let roll = self.rng.random_range(0..weights.total());
        let alloc = u64::from(weights.alloc);
        if roll < alloc || self.live.is_empty() {
            self.allocate(step)?;
        } else if roll < alloc + u64::from(weights.free) {
            let index = self.rng.random_range(0..self.live.len());
            let block = self.live.swap_remove(index);
            self.release(step, block)?;
        } else {
            self.grow(step)?;
        }

        self.pool
            .verify()
            .map_err(|source| SimulationError::Invariant { step, source })?;
        self.state_hasher.record_layout(&self.pool);

        self.report.peak_used_bytes = self.report.peak_used_bytes.max(self.pool.used_bytes());
        self.report.peak_blocks = self.report.peak_blocks.max(self.pool.block_count());
        if let Some(metrics) = &self.metrics {
            metrics.set_pool_usage(self.pool.used_bytes(), self.pool.block_count());
        }
        Ok(())
    }

    fn allocate(&mut self, step: usize) -> Result<(), SimulationError> {
        let size = self.request_size();
        self.observe_request(size);

        match self.pool.alloc(size) {
            Ok(handle) => {
                let tag = self.fresh_tag();
                fill_pattern(self.pool.bytes_mut(handle)?, tag);
                self.live.push(LiveBlock {
                    handle,
                    len: size,
                    tag,
                });
                self.report.allocations += 1;
                self.record("alloc", "ok", Some(handle.offset()));
                Ok(())
            }
            Err(err @ PoolError::NoSpace { .. }) => {
                self.report.failed_requests += 1;
                self.record("alloc", err.kind(), None);
                Ok(())
            }
            Err(source) => Err(SimulationError::Rejected {
                step,
                op: "alloc",
                source,
            }),
        }
    }

    fn release(&mut self, step: usize, block: LiveBlock) -> Result<(), SimulationError> {
        self.check_pattern(step, &block)?;
        self.pool
            .free(block.handle)
            .map_err(|source| SimulationError::Rejected {
                step,
                op: "free",
                source,
            })?;
        if let Some(chaos) = &mut self.chaos {
            chaos.retire(block.handle);
        }
        self.report.frees += 1;
        self.record("free", "ok", Some(block.handle.offset()));
        Ok(())
    }

    fn grow(&mut self, step: usize) -> Result<(), SimulationError> {
        let index = self.rng.random_range(0..self.live.len());
        let block = self.live[index];
        let new_size = self.request_size();
        self.observe_request(new_size);

        match self.pool.resize(Some(block.handle), new_size) {
            Ok(handle) => {
                let moved = LiveBlock { handle, ..block };
                self.check_pattern(step, &moved)?;
                if handle != block.handle {
                    if let Some(chaos) = &mut self.chaos {
                        chaos.retire(block.handle);
                    }
                }

                let len = block.len.max(new_size);
                fill_pattern(&mut self.pool.bytes_mut(handle)?[..len], block.tag);
                self.live[index] = LiveBlock { len, ..moved };
                self.report.resizes += 1;
                self.record("resize", "ok", Some(handle.offset()));
                Ok(())
            }
            Err(err @ PoolError::NoSpace { .. }) => {
                // A failed grow must leave the original block intact.
                self.check_pattern(step, &block)?;
                self.report.failed_requests += 1;
                self.record("resize", err.kind(), None);
                Ok(())
            }
            Err(source) => Err(SimulationError::Rejected {
                step,
                op: "resize",
                source,
            }),
        }
    }

    fn inject_fault(&mut self, step: usize) -> Result<(), SimulationError> {
        let Some(chaos) = self.chaos.as_mut() else {
            return Ok(());
        };
        let live = &self.live;
        let (fault, result) = chaos.inject(&mut self.rng, &mut self.pool, |offset| {
            live.iter().any(|block| block.handle.offset() == offset)
        });

        match result {
            Err(err) if fault.is_expected(&err) => {
                self.report.faults_injected += 1;
                self.record(fault.name(), err.kind(), None);
                self.pool
                    .verify()
                    .map_err(|source| SimulationError::Invariant { step, source })
            }
            Err(source) => Err(SimulationError::Rejected {
                step,
                op: fault.name(),
                source,
            }),
            Ok(()) => Err(SimulationError::FaultAccepted {
                step,
                fault: fault.name(),
            }),
        }
    }

    fn check_pattern(&self, step: usize, block: &LiveBlock) -> Result<(), SimulationError> {
        let bytes = self
            .pool
            .bytes(block.handle)
            .map_err(|source| SimulationError::Rejected {
                step,
                op: "read",
                source,
            })?;
        let intact = bytes.len() >= block.len
            && bytes[..block.len]
                .iter()
                .enumerate()
                .all(|(i, &b)| b == pattern_byte(block.tag, i));
        if intact {
            Ok(())
        } else {
            Err(SimulationError::DataCorruption {
                step,
                offset: block.handle.offset(),
            })
        }
    }

    fn fault_probability(&self) -> Option<f64> {
        self.chaos
            .as_ref()
            .map(|_| self.config.chaos.fault_probability)
            .filter(|&p| p > 0.0)
    }

    fn request_size(&mut self) -> usize {
        let max = self.config.max_request.min(self.pool.capacity()).max(1);
        self.rng.random_range(1..=max)
    }

    fn fresh_tag(&mut self) -> u8 {
        self.next_tag = self.next_tag.wrapping_add(1);
        self.next_tag
    }

    fn observe_request(&self, size: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_request(size);
        }
    }

    fn record(&mut self, op: &str, outcome: &str, offset: Option<usize>) {
        self.state_hasher.record(op, outcome, offset);
        if let Some(metrics) = &self.metrics {
            metrics.record_operation(op, outcome);
        }
    }
}

fn pattern_byte(tag: u8, index: usize) -> u8 {
    tag.wrapping_add(index as u8)
}

fn fill_pattern(bytes: &mut [u8], tag: u8) {
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = pattern_byte(tag, i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockpool_config::{ChaosConfig, OperationWeights};

    fn config(seed: u64) -> SimulatorConfig {
        SimulatorConfig {
            seed,
            operations: 500,
            max_request: 256,
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn test_simulator_runs() {
        let report = Simulator::new(8 * 1024, config(42)).unwrap().run(500).unwrap();
        assert_eq!(report.operations, 500);
        assert!(report.allocations > 0);
        assert!(report.frees > 0);
        assert_eq!(report.digest.len(), 64);
    }

    #[test]
    fn test_same_seed_same_digest() {
        let first = Simulator::new(4096, config(9)).unwrap().run(300).unwrap();
        let second = Simulator::new(4096, config(9)).unwrap().run(300).unwrap();
        let other = Simulator::new(4096, config(10)).unwrap().run(300).unwrap();

        assert_eq!(first.digest, second.digest);
        assert_ne!(first.digest, other.digest);
        first.validate_digest(&second.digest.to_uppercase()).unwrap();
        assert!(matches!(
            first.validate_digest(&other.digest),
            Err(SimulationError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_small_pool_reports_failed_requests() {
        let settings = SimulatorConfig {
            max_request: 200,
            weights: OperationWeights {
                alloc: 8,
                free: 1,
                resize: 1,
            },
            ..config(3)
        };
        let report = Simulator::new(512, settings).unwrap().run(200).unwrap();
        assert!(report.failed_requests > 0);
        assert!(report.peak_used_bytes <= 512);
    }

    #[test]
    fn test_chaos_faults_are_rejected() {
        let settings = SimulatorConfig {
            chaos: ChaosConfig {
                enabled: true,
                fault_probability: 0.3,
            },
            ..config(11)
        };
        let report = Simulator::new(8 * 1024, settings).unwrap().run(400).unwrap();
        assert!(report.faults_injected > 0);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let zero_weights = SimulatorConfig {
            weights: OperationWeights {
                alloc: 0,
                free: 0,
                resize: 0,
            },
            ..config(1)
        };
        assert!(matches!(
            Simulator::new(1024, zero_weights),
            Err(SimulationError::Config(ConfigError::Validation(_)))
        ));

        let certain_faults = SimulatorConfig {
            chaos: ChaosConfig {
                enabled: true,
                fault_probability: 1.5,
            },
            ..config(1)
        };
        assert!(matches!(
            Simulator::new(1024, certain_faults),
            Err(SimulationError::Config(ConfigError::Validation(_)))
        ));
    }

    #[test]
    fn test_metrics_receive_operations() {
        let metrics = MetricsRecorder::new().unwrap();
        Simulator::new(4096, config(5))
            .unwrap()
            .with_metrics(metrics.clone())
            .run(100)
            .unwrap();

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains(r#"op="alloc",outcome="ok""#));
        assert!(text.contains("blockpool_request_size_bytes_count"));
    }
}
