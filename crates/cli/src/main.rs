//! Courier worker - claims logistics tasks and runs them until stopped.

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use courier_engine::{EngineClient, MemoryEngine};
use courier_lifecycle::{
    shutdown_signal, LifecycleCoordinator, LivenessServer, LogPipeline, StopOutcome,
};
use courier_logistics::{
    seed_data, Delivery, Drive, HazmatTransport, LogisticsManager, Pickup, StandardTransport,
};
use courier_work::{create_worker, Worker};
use tracing::{error, info, warn};

use crate::config::CourierConfig;

#[derive(Parser)]
#[command(name = "courier-worker")]
#[command(about = "Logistics task worker", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker until SIGINT or SIGTERM
    Run(RunArgs),
    /// Seed the demo hazmat delivery, then run the worker
    Seed(RunArgs),
    /// Print the effective configuration
    CheckConfig,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Liveness port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Concurrent dispatches per worker (overrides config)
    #[arg(long)]
    concurrency: Option<usize>,
}

impl RunArgs {
    fn apply(&self, config: &mut CourierConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(concurrency) = self.concurrency {
            config.worker.concurrency = concurrency;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CourierConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            config.validate()?;
            serve(config, false).await
        }
        Commands::Seed(args) => {
            args.apply(&mut config);
            config.validate()?;
            serve(config, true).await
        }
        Commands::CheckConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Compose collaborators, start them and run until a termination signal.
async fn serve(config: CourierConfig, seed: bool) -> Result<()> {
    let guard = logging::init_logging(&config.logging)?;
    info!("Starting courier worker");

    let engine = MemoryEngine::new();
    if seed {
        let seeded = seed_data(&engine).await?;
        info!("Seeded demo job {}", seeded.job_id);
    }
    let client: Arc<dyn EngineClient> = Arc::new(engine);

    let mut coordinator = LifecycleCoordinator::new(config.teardown_timeout());
    let liveness = LivenessServer::bind(config.server.port, coordinator.subscribe()).await?;
    coordinator.register(Arc::new(liveness))?;

    for worker in workers(&config, client) {
        worker.on_error(|err| match err.task_id() {
            Some(task_id) => error!(task.id = %task_id, "Worker error: {}", err),
            None => error!("Worker error: {}", err),
        });
        coordinator.register(Arc::new(worker))?;
    }
    coordinator.register(Arc::new(LogPipeline::new(guard)))?;

    coordinator.start().await?;
    info!("Courier worker started");

    let report = coordinator.run_until(shutdown_signal()).await?;

    // The log pipeline is flushed by now; report the teardown on stderr.
    for entry in &report.subsystems {
        match &entry.outcome {
            StopOutcome::Stopped { .. } => {}
            StopOutcome::Failed(e) => eprintln!("{}: stop failed: {}", entry.name, e),
            StopOutcome::TimedOut => eprintln!("{}: stop timed out", entry.name),
        }
    }
    if report.interrupted() > 0 {
        warn!("{} task(s) interrupted by shutdown", report.interrupted());
    }
    Ok(())
}

/// One worker per handled stage type.
fn workers(config: &CourierConfig, client: Arc<dyn EngineClient>) -> Vec<Worker> {
    let manager = LogisticsManager::new(config.logistics_config());
    let options = config.worker_options();

    vec![
        create_worker::<HazmatTransport, Delivery, _>(client.clone(), manager.clone(), options.clone()),
        create_worker::<HazmatTransport, Pickup, _>(client.clone(), manager.clone(), options.clone()),
        create_worker::<StandardTransport, Drive, _>(client, manager, options),
    ]
}
