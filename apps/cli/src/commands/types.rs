//! Command type definitions shared between main.rs and tests.

use clap::Args;
use std::path::PathBuf;

/// Overrides applied on top of config files and `FRCNN_*` variables.
#[derive(Args, Debug, Clone, Default)]
pub struct LaunchOverrides {
    /// User identifier prefixed to the job name
    #[arg(long)]
    pub user: Option<String>,

    /// S3 bucket holding data and outputs
    #[arg(long)]
    pub bucket: Option<String>,

    /// AWS region
    #[arg(long)]
    pub region: Option<String>,

    /// IAM role the training job runs as
    #[arg(long)]
    pub role_arn: Option<String>,

    /// Training container image URI
    #[arg(long)]
    pub image_uri: Option<String>,

    /// Training instance type (e.g., ml.p3dn.24xlarge)
    #[arg(long)]
    pub instance_type: Option<String>,

    /// Path to the `aws` executable
    #[arg(long)]
    pub aws_bin: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub overrides: LaunchOverrides,

    /// Append a random suffix to the job name
    #[arg(long)]
    pub unique: bool,

    /// Block until the job finishes, printing status changes
    #[arg(long)]
    pub wait: bool,

    /// Seconds between status checks with --wait
    #[arg(long, default_value_t = 30)]
    pub poll_seconds: u64,

    /// Print the request that would be sent without submitting
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Training job name
    pub job_name: String,

    /// AWS region (overrides config)
    #[arg(long)]
    pub region: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BootstrapArgs {
    /// User identifier prefixed to job names
    #[arg(long)]
    pub user: String,

    /// S3 bucket holding data and outputs
    #[arg(long)]
    pub bucket: String,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Where to write the config (defaults to ./frcnn.toml)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LocalArgs {
    /// Number of worker processes (one per GPU)
    pub num_processes: u32,

    /// Training configuration file
    pub config: PathBuf,

    /// Directory containing tools/train.py
    #[arg(long, default_value = ".")]
    pub models_root: PathBuf,

    /// MPI launcher executable
    #[arg(long, default_value = "mpirun")]
    pub launcher: PathBuf,

    /// Print the command instead of running it
    #[arg(long)]
    pub dry_run: bool,
}
