//! Grader worker
//!
//! Pulls grading jobs from the grading queue over HTTPS, runs each one
//! through the external grading tool and reports the result back.
//!
//! Architecture:
//! - Configuration: one immutable value resolved from the environment
//! - Client: typed HTTPS exchanges with the queue (grader-client)
//! - Executor: subprocess protocol with the grading tool
//! - Orchestrator: sequential poll → execute → report state machine
//! - Wake-up listener: out-of-band UDP channel shortening empty-queue waits

mod config;
mod executor;
mod http;
mod pidfile;
mod poller;
mod wakeup;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::executor::GraderProcess;
use crate::poller::{Orchestrator, WaitMode};
use crate::wakeup::{LiteralToken, WakeSignal, WakeupListener};
use grader_client::QueueClient;

#[derive(Parser)]
#[command(name = "grader-server")]
#[command(about = "Evaluation worker for the grading queue", long_about = None)]
struct Cli {
    /// Be more verbose
    #[arg(short, long)]
    verbose: bool,

    /// Log all JSON data in and out (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    /// Listen on UDP and wait for a wake-up signal when the queue is empty
    #[arg(short, long, conflicts_with = "server")]
    listen: bool,

    /// Server mode: poll continuously, refuse to start a second instance
    #[arg(short, long)]
    server: bool,

    /// Test communication with the queue, then exit
    #[arg(short, long)]
    test: bool,

    /// Write logs into file LOGFILE
    #[arg(short = 'L', long, value_name = "LOGFILE")]
    logfile: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = load_config()?;

    let client = http::build_client(&config)?;
    let queue = Arc::new(QueueClient::with_client(config.endpoints(), client));

    if cli.test {
        return run_test(&queue).await;
    }

    info!("starting grader worker");

    if cli.server {
        pidfile::acquire(&config.pidfile)?;
    }

    let mode = if cli.listen {
        WaitMode::Listen
    } else if cli.server {
        WaitMode::Continuous
    } else {
        WaitMode::OneShot
    };

    let wake = Arc::new(WakeSignal::new());
    if mode == WaitMode::Listen {
        let listener = WakeupListener::bind(
            &config.wakeup_addr,
            Arc::clone(&wake),
            Box::new(LiteralToken::new(config.wakeup_token.clone())),
        )
        .await?;
        tokio::spawn(listener.run());
    }

    let backend = GraderProcess::new(&config.grader_command, config.job_timeout)?;
    let orchestrator = Orchestrator::new(&config, queue, backend, mode, wake);

    info!("worker initialized, entering poll loop (mode: {mode:?})");
    if let Err(e) = orchestrator.run().await {
        error!("worker failed: {e:#}");
        return Err(e);
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(_) => {
            info!("failed to load config from environment, using defaults");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// One exchange against the queue's test endpoint; exit code 0 iff it answers
/// with errorcode 0.
async fn run_test(queue: &QueueClient) -> Result<()> {
    println!(
        "testing connection with the queue at `{}`...",
        queue.test_url()
    );

    let ack = queue
        .test_connection()
        .await
        .context("queue test exchange failed")?;

    if ack.errorcode == 0 {
        println!(
            "test successful, received answer: (#{}) {}",
            ack.errorcode,
            ack.message()
        );
        Ok(())
    } else {
        anyhow::bail!(
            "test failed, received answer: (#{}) {}",
            ack.errorcode,
            ack.message()
        )
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let default_filter = if cli.debug {
        "grader_server=debug,grader_client=debug"
    } else if cli.verbose {
        "grader_server=info,grader_client=info"
    } else {
        "grader_server=warn,grader_client=warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    match &cli.logfile {
        Some(path) => {
            let file = std::fs::File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }

    Ok(())
}
