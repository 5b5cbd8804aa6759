use thiserror::Error;
use tokio::task::JoinError;

use blockpool_config::ConfigError;
use blockpool_core::{ListError, PoolError};
use blockpool_simulator::SimulationError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Simulation failed: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("List error: {0}")]
    List(#[from] ListError),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_yaml::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] JoinError),
}
