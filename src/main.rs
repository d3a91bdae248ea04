use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jobwatch::backend::SimulatedBackend;
use jobwatch::config::AppConfig;
use jobwatch::core::{cancel_allowed, status_label};
use jobwatch::detail::fetch_snapshot;
use jobwatch::logging::{self, LogConfig};
use jobwatch::rpc::{RpcBackend, RpcServer};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

const TUI_LOG_FILE: &str = "jobwatch.log";

#[derive(Parser)]
#[command(name = "jobwatch")]
#[command(about = "Live detail view for a replication job", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./jobwatch.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive detail view for a job
    Watch { job_id: String },
    /// Fetch one snapshot of a job and print it as JSON
    Show { job_id: String },
    /// Serve a simulated backend over JSON-RPC
    Serve {
        /// Job ids to create; one random id when omitted
        #[arg(long = "seed")]
        seeds: Vec<String>,
    },
}

#[derive(Args, Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    rpc_addr: Option<SocketAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    json_logs: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), &cli.overrides)?;

    let log_file = match (&cli.command, &config.log_file) {
        (Commands::Watch { .. }, None) => Some(PathBuf::from(TUI_LOG_FILE)),
        (_, file) => file.clone(),
    };
    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
        file: log_file,
    })?;

    match cli.command {
        Commands::Watch { job_id } => run_watch(&config, job_id)
            .await
            .context("Failed to run detail view")?,
        Commands::Show { job_id } => run_show(&config, &job_id)
            .await
            .with_context(|| format!("Failed to show job {}", job_id))?,
        Commands::Serve { seeds } => run_serve(&config, seeds)
            .await
            .context("Failed to serve simulated backend")?,
    }

    Ok(())
}

async fn run_watch(config: &AppConfig, job_id: String) -> Result<()> {
    let backend = Arc::new(RpcBackend::new(config.rpc_addr));
    jobwatch::cli::tui::run(backend, job_id, config.session_options()).await
}

async fn run_show(config: &AppConfig, job_id: &str) -> Result<()> {
    let backend = RpcBackend::new(config.rpc_addr);
    let timeout = config.fetch_timeout_ms.map(Duration::from_millis);
    let record = fetch_snapshot(&backend, job_id, timeout).await?;

    #[derive(Serialize)]
    struct Shown<'a> {
        status: &'static str,
        cancellable: bool,
        #[serde(flatten)]
        record: &'a jobwatch::core::JobRecord,
    }

    let shown = Shown {
        status: status_label(record.progress),
        cancellable: cancel_allowed(record.progress),
        record: &record,
    };
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

async fn run_serve(config: &AppConfig, seeds: Vec<String>) -> Result<()> {
    let (backend, simulator) = SimulatedBackend::new();

    let seeds = if seeds.is_empty() {
        vec![uuid::Uuid::now_v7().to_string()]
    } else {
        seeds
    };
    for id in &seeds {
        simulator.seed(id).await;
        info!(job_id = %id, "Seeded job");
    }

    let server = RpcServer::bind(Arc::new(backend), config.rpc_addr).await?;
    info!(addr = %server.local_addr()?, jobs = seeds.len(), "Simulated backend ready");

    let shutdown = CancellationToken::new();
    let pipeline = tokio::spawn({
        let simulator = simulator.clone();
        let shutdown = shutdown.clone();
        let tick = Duration::from_millis(config.pipeline_tick_ms);
        async move { simulator.run_pipeline(tick, shutdown).await }
    });

    tokio::select! {
        result = server.start() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    server.shutdown();
    shutdown.cancel();
    let _ = pipeline.await;
    Ok(())
}
