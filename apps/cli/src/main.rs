//! frcnn CLI - launches Faster R-CNN training jobs
//!
//! Submits distributed training jobs to SageMaker, checks on and stops them,
//! and runs single-host training under `mpirun`.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::types::{BootstrapArgs, JobArgs, LocalArgs, SubmitArgs};
use commands::{bootstrap, local, status, train};

/// frcnn - distributed Faster R-CNN training launcher
#[derive(Parser, Debug)]
#[command(
    name = "frcnn-cli",
    author,
    version,
    about = "Launch Faster R-CNN training jobs",
    long_about = "Builds hyperparameters, data channels and MPI distribution settings for Faster R-CNN training,\nthen submits the job to SageMaker or runs it on this host."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Launcher config file, merged over ~/.frcnn/config.toml and ./frcnn.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter launcher config
    ///
    /// Creates ./frcnn.toml (or --path) with the user, bucket and region filled in
    /// and defaults for everything else.
    Bootstrap(BootstrapArgs),

    /// Submit a training job
    ///
    /// Resolves configuration, builds the job name, output location, channels and
    /// distribution settings, then creates the SageMaker training job.
    Submit(SubmitArgs),

    /// Show the status of a training job
    Status(JobArgs),

    /// Stop a running training job
    Stop(JobArgs),

    /// Run training on this host under mpirun
    Local(LocalArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr; stdout carries command output (including --json).
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = args.config.as_deref();
    match args.command {
        Command::Bootstrap(cmd) => bootstrap::execute(cmd).await?,
        Command::Submit(cmd) => train::execute(config_path, cmd).await?,
        Command::Status(cmd) => status::execute(config_path, cmd).await?,
        Command::Stop(cmd) => status::stop(config_path, cmd).await?,
        Command::Local(cmd) => {
            let code = local::execute(cmd).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
