//! Writes a starter launcher configuration.

use crate::commands::types::BootstrapArgs;
use anyhow::{Context, Result};
use colored::Colorize;
use frcnn_launch::LauncherConfig;

pub async fn execute(args: BootstrapArgs) -> Result<()> {
    let path = args.path.unwrap_or_else(LauncherConfig::default_local_path);
    if path.exists() && !args.force {
        anyhow::bail!("{} already exists. Use --force to overwrite.", path.display());
    }

    let config = LauncherConfig::starter(&args.user, &args.bucket, &args.region);
    config
        .save_to_file(&path)
        .with_context(|| format!("Failed to write launcher config: {}", path.display()))?;

    println!();
    println!("{}", "Launcher config written".bold().cyan());
    println!("  Wrote: {}", path.display().to_string().dimmed());
    println!();
    println!("  {}", "Next: set role_arn and image_uri, then run `frcnn-cli submit --dry-run`.".dimmed());
    println!();
    Ok(())
}
