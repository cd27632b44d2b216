//! Status and stop for submitted jobs.

use crate::commands::types::{JobArgs, LaunchOverrides};
use crate::config::load_config;
use anyhow::{Context, Result};
use colored::Colorize;
use frcnn_launch::{JobHandle, JobName, JobStatus, SageMakerSubmitter};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn attach(config_path: Option<&Path>, args: &JobArgs) -> Result<JobHandle> {
    let overrides = LaunchOverrides { region: args.region.clone(), ..Default::default() };
    let config = load_config(config_path, &overrides).context("Failed to load launcher configuration")?;
    let region = config.resolve_region()?;
    let backend = SageMakerSubmitter::new(region).with_aws_bin(config.aws_bin());
    Ok(JobHandle::attach(Arc::new(backend), JobName(args.job_name.clone())))
}

/// Execute the status command.
pub async fn execute(config_path: Option<&Path>, args: JobArgs) -> Result<()> {
    let handle = attach(config_path, &args)?;
    let status = handle.status().await?;

    if args.json {
        let out = json!({ "job_name": handle.job_name(), "status": status });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let rendered = match &status {
        JobStatus::Completed => status.to_string().green(),
        JobStatus::Failed { .. } => status.to_string().red(),
        JobStatus::Stopping | JobStatus::Stopped => status.to_string().yellow(),
        JobStatus::InProgress { .. } => status.to_string().cyan(),
    };
    println!("{}: {}", handle.job_name().as_str().bold(), rendered);
    Ok(())
}

/// Execute the stop command.
pub async fn stop(config_path: Option<&Path>, args: JobArgs) -> Result<()> {
    let handle = attach(config_path, &args)?;
    handle.cancel().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json!({ "job_name": handle.job_name(), "stop_requested": true }))?);
    } else {
        println!("{} {}", "Stop requested for".yellow(), handle.job_name().as_str().bold());
    }
    Ok(())
}
