use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand};
use opentelemetry::KeyValue;
use tracing::{error, info, instrument};

use blockpool_config::{parse_size, BlockpoolConfig, SimulatorConfig};
use blockpool_core::list::PoolList;
use blockpool_core::PoolAllocator;
use blockpool_simulator::{load_scenario, replay_scenario, SimulationReport, Simulator};
use blockpool_telemetry::{EventLogger, MetricsRecorder};

use crate::error::CliError;

/// Fault probability used by `--chaos` when the configuration leaves it at zero.
const DEFAULT_FAULT_PROBABILITY: f64 = 0.05;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file; defaults to `config/blockpool.yaml` and `config/<env>.yaml`
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a seeded randomized workload against one pool
    Simulate(SimulateArgs),
    /// Replay a YAML scenario file
    Replay(ReplayArgs),
    /// Run simulations over consecutive seeds until one fails
    Fuzz(FuzzArgs),
    /// Build a pool-backed linked list and print it with the block chain
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(long)]
    pub seed: Option<u64>,
    /// Number of operations to run
    #[arg(long)]
    pub operations: Option<usize>,
    /// Pool capacity, e.g. `4096` or `64k`
    #[arg(long, value_parser = parse_size)]
    pub capacity: Option<usize>,
    /// Inject double frees and foreign handles
    #[arg(long)]
    pub chaos: bool,
    /// Expected state digest
    #[arg(long)]
    pub validate_hash: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    #[arg(short, long)]
    pub scenario: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct FuzzArgs {
    /// Initial seed for fuzzing (will auto-increment)
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Number of fuzzing iterations (0 for unlimited)
    #[arg(long, default_value_t = 0)]
    pub iterations: usize,
    /// Operations per iteration
    #[arg(long, default_value_t = 1000)]
    pub operations: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, default_value = "1k", value_parser = parse_size)]
    pub capacity: usize,
    /// Value to delete after building the list
    #[arg(long)]
    pub delete: Option<u16>,
    /// Values appended in order
    #[arg(required = true)]
    pub values: Vec<u16>,
}

pub async fn run_command(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => BlockpoolConfig::load_from_path(path)?,
        None => BlockpoolConfig::load()?,
    };
    EventLogger::init(&config.telemetry.log_filter);

    let metrics = if config.telemetry.metrics {
        Some(MetricsRecorder::new().map_err(|e| CliError::Metrics(e.to_string()))?)
    } else {
        None
    };

    match cli.command {
        Commands::Simulate(args) => run_simulation_mode(args, &config, metrics.clone()).await?,
        Commands::Replay(args) => run_replay_mode(args).await?,
        Commands::Fuzz(args) => run_fuzz_mode(args, &config, metrics.clone()).await?,
        Commands::List(args) => run_list_demo(args)?,
    }

    if let Some(metrics) = metrics {
        let text = metrics
            .gather_metrics()
            .map_err(|e| CliError::Metrics(e.to_string()))?;
        print!("{text}");
    }
    Ok(())
}

#[instrument(level = "info", name = "run_simulation_mode", skip(config, metrics))]
async fn run_simulation_mode(
    args: SimulateArgs,
    config: &BlockpoolConfig,
    metrics: Option<MetricsRecorder>,
) -> Result<(), CliError> {
    let mut settings = config.simulator.clone();
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    if args.chaos {
        enable_chaos(&mut settings);
    }
    let capacity = args.capacity.unwrap_or(config.pool.capacity);
    let operations = args.operations.unwrap_or(settings.operations);

    let report = simulate(capacity, operations, settings, metrics).await?;
    println!("{}", serde_yaml::to_string(&report)?);

    if let Some(expected) = args.validate_hash.as_deref() {
        if let Err(err) = report.validate_digest(expected) {
            generate_bug_report(&format!(
                "Simulation error: state hash mismatch!\nExpected: {}\nGot: {}\n",
                expected, report.digest
            ));
            return Err(err.into());
        }
        info!(digest = %report.digest, "state digest validated");
    }
    Ok(())
}

#[instrument(level = "info", name = "run_replay_mode")]
async fn run_replay_mode(args: ReplayArgs) -> Result<(), CliError> {
    let scenario = load_scenario(&args.scenario)?;
    let report = tokio::task::spawn_blocking(move || replay_scenario(&scenario)).await?;
    let report = match report {
        Ok(report) => report,
        Err(err) => {
            generate_bug_report(&format!(
                "Replay of {} failed.\nError: {err}\n",
                args.scenario.display()
            ));
            return Err(err.into());
        }
    };

    EventLogger::log_event(
        "replay_complete",
        &[
            KeyValue::new("scenario", args.scenario.display().to_string()),
            KeyValue::new("digest", report.digest.clone()),
        ],
    );
    println!("{}", serde_yaml::to_string(&report)?);
    Ok(())
}

#[instrument(level = "info", name = "run_fuzz_mode", skip(config, metrics))]
async fn run_fuzz_mode(
    args: FuzzArgs,
    config: &BlockpoolConfig,
    metrics: Option<MetricsRecorder>,
) -> Result<(), CliError> {
    let mut seed = args.seed;
    let mut count = 0;
    loop {
        let mut settings = config.simulator.clone();
        settings.seed = seed;
        enable_chaos(&mut settings);

        let report = simulate(
            config.pool.capacity,
            args.operations,
            settings,
            metrics.clone(),
        )
        .await?;
        info!(seed, digest = %report.digest, "fuzz iteration passed");

        count += 1;
        if args.iterations > 0 && count >= args.iterations {
            break;
        }
        seed = seed.wrapping_add(1);
    }
    info!(iterations = count, "fuzzing finished");
    Ok(())
}

fn run_list_demo(args: ListArgs) -> Result<(), CliError> {
    let mut pool = PoolAllocator::new(args.capacity)?;
    let mut list = PoolList::new();
    for value in &args.values {
        list.insert(&mut pool, *value)?;
    }
    if let Some(value) = args.delete {
        list.delete(&mut pool, value)?;
    }

    println!("list:   {}", list.display(&pool));
    println!("nodes:  {}", list.count(&pool)?);
    for block in pool.blocks() {
        println!("block:  {:>6} {:>6} {:?}", block.offset, block.size, block.state);
    }

    list.cleanup(&mut pool)?;
    let summary = pool.deinit();
    println!("leaked: {}", summary.leaked_blocks);
    Ok(())
}

/// Runs one simulation on a blocking worker, writing a bug report on failure.
async fn simulate(
    capacity: usize,
    operations: usize,
    settings: SimulatorConfig,
    metrics: Option<MetricsRecorder>,
) -> Result<SimulationReport, CliError> {
    let seed = settings.seed;
    let described = serde_yaml::to_string(&settings)?;
    let result = tokio::task::spawn_blocking(move || {
        let mut simulator = Simulator::new(capacity, settings)?;
        if let Some(metrics) = metrics {
            simulator = simulator.with_metrics(metrics);
        }
        simulator.run(operations)
    })
    .await?;

    result.map_err(|err| {
        error!(seed, %err, "simulation failed");
        generate_bug_report(&format!(
            "Simulation failed.\nCapacity: {capacity}\nOperations: {operations}\n\
             Error: {err}\nSettings:\n{described}"
        ));
        err.into()
    })
}

fn enable_chaos(settings: &mut SimulatorConfig) {
    settings.chaos.enabled = true;
    if settings.chaos.fault_probability == 0.0 {
        settings.chaos.fault_probability = DEFAULT_FAULT_PROBABILITY;
    }
}

/// Generates a bug report file with the given report details.
fn generate_bug_report(report: &str) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let filename = format!("bug_report_{}.txt", now);
    match File::create(&filename) {
        Ok(mut file) => {
            if let Err(e) = file.write_all(report.as_bytes()) {
                eprintln!("Failed to write bug report: {:?}", e);
            } else {
                eprintln!("Bug report written to {}", filename);
            }
        }
        Err(e) => eprintln!("Failed to create bug report file: {:?}", e),
    }
}
