//! ## blockpool-cli
//! **Command-line front end for the pool allocator**
//!
//! Runs seeded workload simulations, replays YAML scenarios, fuzzes over
//! consecutive seeds and demonstrates the pool-backed linked list.
//!
//! ### Expectations:
//! - Configuration from `config/` files, `--config` and `BLOCKPOOL_*` variables
//! - Reports printed as YAML on stdout, logs on stderr
//! - A bug report file for every failed simulation

use clap::Parser;

mod commands;
mod error;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    commands::run_command(cli).await?;
    Ok(())
}
