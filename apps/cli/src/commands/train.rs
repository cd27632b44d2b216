//! Training job submission.

use crate::commands::types::SubmitArgs;
use crate::config::load_config;
use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use frcnn_launch::layout::source_archive_under;
use frcnn_launch::{
    CreateTrainingJobRequest, JobDescriptor, JobLaunchConfigurator, JobName, JobStatus, JobSubmitter,
    NullProgressSink, ProgressSink, SageMakerSubmitter, StdoutProgressSink, SubmitOptions, channel_env_var, submit,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub async fn execute(config_path: Option<&Path>, args: SubmitArgs) -> Result<()> {
    let config = load_config(config_path, &args.overrides).context("Failed to load launcher configuration")?;
    let settings = config
        .resolve()
        .context("Incomplete launcher configuration. Run `frcnn-cli bootstrap` or pass the missing flag.")?;

    let backend = SageMakerSubmitter::new(settings.region.clone()).with_aws_bin(settings.aws_bin.clone());
    let configurator = JobLaunchConfigurator::new(settings).with_unique_names(args.unique);
    let descriptor = configurator.build(Utc::now()).context("Invalid training job")?;

    if args.dry_run {
        return print_plan(&descriptor, args.json);
    }

    let backend: Arc<dyn JobSubmitter> = Arc::new(backend);
    let progress: Box<dyn ProgressSink> =
        if args.json { Box::new(NullProgressSink) } else { Box::new(StdoutProgressSink) };

    let handle = submit(backend, &descriptor, SubmitOptions::default(), progress.as_ref()).await?;
    let final_status = if args.wait {
        Some(handle.wait(Duration::from_secs(args.poll_seconds.max(1)), progress.as_ref()).await?)
    } else {
        None
    };

    if args.json {
        let out = json!({
            "job_name": handle.job_name(),
            "arn": handle.arn(),
            "output_path": descriptor.output_path,
            "submitted_at": handle.submitted_at(),
            "status": final_status,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return ensure_completed(handle.job_name(), final_status.as_ref());
    }

    println!();
    println!("{}", "Training job submitted".bold().green());
    println!("  Job: {}", handle.job_name().as_str().cyan());
    println!("  Output: {}", descriptor.output_path.dimmed());
    if let Some(status) = &final_status {
        println!("  Final status: {}", status.to_string().bold());
    } else {
        println!();
        println!(
            "  {}",
            format!("Check progress with `frcnn-cli status {}`.", handle.job_name()).dimmed()
        );
    }
    println!();
    ensure_completed(handle.job_name(), final_status.as_ref())
}

/// A waited-on job that ended in any state other than `Completed` is a command failure.
fn ensure_completed(job_name: &JobName, final_status: Option<&JobStatus>) -> Result<()> {
    match final_status {
        Some(status) if *status != JobStatus::Completed => {
            anyhow::bail!("Training job {} did not complete: {}", job_name, status)
        }
        _ => Ok(()),
    }
}

fn print_plan(descriptor: &JobDescriptor, json_output: bool) -> Result<()> {
    let submit_directory = if descriptor.source.source_dir.starts_with("s3://") {
        descriptor.source.source_dir.clone()
    } else {
        source_archive_under(&descriptor.output_path)
    };
    let request = CreateTrainingJobRequest::from_descriptor(descriptor, &submit_directory)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }

    println!();
    println!("{}", "Training job plan (dry run)".bold().cyan());
    println!("  Job: {}", descriptor.job_name.as_str().cyan());
    println!("  Region: {}", descriptor.region);
    println!(
        "  Instances: {} x {} ({} processes)",
        descriptor.instance.instance_count,
        descriptor.instance.instance_type,
        descriptor.distribution.total_processes()
    );
    println!("  Global batch: {}", descriptor.training.global_batch_size());
    println!("  Output: {}", descriptor.output_path.dimmed());
    println!("  Source: {}", submit_directory.dimmed());
    println!();
    println!("{}", "Channels:".bold());
    for (name, uri) in descriptor.channels.iter() {
        println!("  {:<10} {:<22} {}", name.cyan(), channel_env_var(name).dimmed(), uri);
    }
    println!();
    println!("{}", "Hyperparameters:".bold());
    for (key, value) in &request.hyper_parameters {
        println!("  {:<42} {}", key, value.dimmed());
    }
    println!();
    Ok(())
}
