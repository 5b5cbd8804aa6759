//! # blockpool Configuration System
//!
//! Layered configuration for the pool, its telemetry and the workload
//! simulator.
//!
//! ## Features
//! - **Unified Configuration**: Single source of truth across all crates
//! - **Validation**: Field ranges and cross-field consistency checked on load
//! - **Environment Awareness**: Per-environment override files and `BLOCKPOOL_*` variables
//! - **Readable Sizes**: Byte sizes accept unit suffixes (`64k`, `1MiB`)

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod pool;
mod simulator;
mod size;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use pool::PoolConfig;
pub use simulator::ChaosConfig;
pub use simulator::OperationWeights;
pub use simulator::SimulatorConfig;
pub use size::{deserialize_size, parse_size};
pub use telemetry::TelemetryConfig;

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct BlockpoolConfig {
    /// Arena sizing.
    #[validate(nested)]
    #[serde(default)]
    pub pool: PoolConfig,

    /// Logging and metrics.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Randomized workload parameters.
    #[validate(nested)]
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl BlockpoolConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/blockpool.yaml`, if present
    /// 3. `config/<BLOCKPOOL_ENV>.yaml` (default environment: `development`)
    /// 4. `BLOCKPOOL_*` environment variables, nested with `__`
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(BlockpoolConfig::default()));

        if Path::new("config/blockpool.yaml").exists() {
            figment = figment.merge(Yaml::file("config/blockpool.yaml"));
        }

        let env = std::env::var("BLOCKPOOL_ENV").unwrap_or_else(|_| "development".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment.merge(Env::prefixed("BLOCKPOOL_").split("__")))
    }

    /// Load configuration from a specific file, still honouring
    /// `BLOCKPOOL_*` overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::extract(
            Figment::from(Serialized::defaults(BlockpoolConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed("BLOCKPOOL_").split("__")),
        )
    }

    /// Runs field validation plus the checks that span several sections.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.simulator.max_request > self.pool.capacity {
            return Err(ConfigError::Inconsistent(format!(
                "simulator.max_request ({}) exceeds pool.capacity ({})",
                self.simulator.max_request, self.pool.capacity
            )));
        }
        Ok(())
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.check()?;
        Ok(config)
    }
}
