//! Single-host training under mpirun.

use crate::commands::types::LocalArgs;
use anyhow::Result;
use frcnn_launch::LocalLaunch;

/// Runs the local launch and returns the child's exit code.
pub async fn execute(args: LocalArgs) -> Result<i32> {
    let mut launch = LocalLaunch::new(args.num_processes, args.config, args.models_root);
    launch.launcher = args.launcher;
    launch.validate()?;

    if args.dry_run {
        let launch = launch.resolved()?;
        let rendered: Vec<String> =
            launch.launcher_args().iter().map(|a| a.to_string_lossy().into_owned()).collect();
        println!("cd {}", launch.models_root.display());
        println!("PYTHONPATH={}", launch.python_path(None).to_string_lossy());
        println!("{} {}", launch.launcher.display(), rendered.join(" "));
        return Ok(0);
    }

    let status = launch.run().await?;
    // Killed by a signal: no code, report a generic failure.
    Ok(status.code().unwrap_or(1))
}
