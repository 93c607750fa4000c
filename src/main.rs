//! warden - request-filtering orchestration daemon
//!
//! Usage:
//!   warden                          → read messages on stdin, reply on stdout
//!   warden --config warden.toml     → load settings and endpoints from TOML
//!   warden --print-config           → print the effective config and exit

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden::bootstrap::{boot, Collaborators};
use warden::config::WardenConfig;
use warden::scheduler::Scheduler;
use warden::{logging, stdio};
use warden_router::OutboundQueue;

const DEFAULT_CONFIG: &str = "warden.toml";

#[derive(Parser)]
#[command(
    name = "warden",
    about = "Request-filtering orchestration daemon",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Path to the config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write daily log files to this directory (in addition to stderr)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print the effective config and exit
    #[arg(long, default_value_t = false)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let (config, source) = WardenConfig::read(&config_path);
    if cli.print_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    let _log_guard = logging::init(&config.logging, cli.log_dir.as_deref())?;
    info!("warden v{} starting", env!("CARGO_PKG_VERSION"));
    source.report();

    let (queue, follow_ups) = OutboundQueue::new();
    let (mut collaborators, _pipeline) = Collaborators::in_process(&config);
    collaborators.follow_ups = Some(Arc::new(queue));
    let runtime = boot(&config, collaborators).await?;

    let scheduler = Scheduler::from_config(
        &config.scheduler,
        runtime.store.clone(),
        runtime.orchestrator.clone(),
    );
    let loops = scheduler.start();

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stats = stdio::serve(
        &runtime.router,
        stdin,
        tokio::io::stdout(),
        Some(follow_ups),
        shutdown,
    )
    .await?;

    scheduler.stop();
    for handle in loops {
        if let Err(e) = handle.await {
            warn!("scheduler loop ended abnormally: {}", e);
        }
    }
    info!(
        received = stats.received,
        rejected = stats.rejected,
        "warden stopped"
    );
    Ok(())
}
