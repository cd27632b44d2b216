//! Single-host launch of the training entry point under `mpirun`.

use crate::error::{LaunchError, LaunchResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::info;

/// Training entry point, relative to the models root.
pub const TRAIN_ENTRY_POINT: &str = "tools/train.py";

/// Flags always passed to the entry point: validate during training, scale
/// the learning rate with the worker count, mixed precision.
pub const TRAIN_FLAGS: [&str; 3] = ["--validate", "--autoscale-lr", "--amp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalLaunch {
    pub num_processes: u32,
    pub config_path: PathBuf,
    /// Directory containing `tools/train.py`; prepended to `PYTHONPATH`.
    pub models_root: PathBuf,
    pub launcher: PathBuf,
    pub python: PathBuf,
}

impl LocalLaunch {
    #[must_use]
    pub fn new(num_processes: u32, config_path: impl Into<PathBuf>, models_root: impl Into<PathBuf>) -> Self {
        Self {
            num_processes,
            config_path: config_path.into(),
            models_root: models_root.into(),
            launcher: PathBuf::from("mpirun"),
            python: PathBuf::from("python"),
        }
    }

    pub fn validate(&self) -> LaunchResult<()> {
        if self.num_processes == 0 {
            return Err(LaunchError::InvalidConfig("number of processes must be >= 1".to_string()));
        }
        if self.config_path.as_os_str().is_empty() {
            return Err(LaunchError::InvalidConfig("training config path is required".to_string()));
        }
        Ok(())
    }

    /// Arguments handed to the launcher, in order.
    #[must_use]
    pub fn launcher_args(&self) -> Vec<OsString> {
        let n = self.num_processes.to_string();
        let hosts = format!("localhost:{n}");
        let mut args: Vec<OsString> = [
            "-np",
            n.as_str(),
            "-H",
            hosts.as_str(),
            "--allow-run-as-root",
            "-bind-to",
            "none",
            "-map-by",
            "slot",
            "-mca",
            "pml",
            "ob1",
            "-mca",
            "btl",
            "^openib",
            "-x",
            "NCCL_DEBUG=INFO",
            "-x",
            "PYTHONPATH",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(self.python.clone().into_os_string());
        args.push(self.models_root.join(TRAIN_ENTRY_POINT).into_os_string());
        args.push(self.config_path.clone().into_os_string());
        args.extend(TRAIN_FLAGS.into_iter().map(OsString::from));
        args
    }

    /// `PYTHONPATH` with the models root prepended to `existing`.
    #[must_use]
    pub fn python_path(&self, existing: Option<&Path>) -> OsString {
        let mut paths = vec![self.models_root.clone()];
        if let Some(existing) = existing.filter(|p| !p.as_os_str().is_empty()) {
            paths.extend(std::env::split_paths(existing));
        }
        std::env::join_paths(paths).unwrap_or_else(|_| self.models_root.clone().into_os_string())
    }

    /// Copy with `models_root` and `config_path` made absolute against the
    /// current directory. The child runs inside the models root, so relative
    /// paths would otherwise be resolved twice.
    pub fn resolved(&self) -> LaunchResult<Self> {
        Ok(Self {
            models_root: std::path::absolute(&self.models_root)?,
            config_path: std::path::absolute(&self.config_path)?,
            ..self.clone()
        })
    }

    pub fn command(&self) -> LaunchResult<Command> {
        let launch = self.resolved()?;
        let existing = std::env::var_os("PYTHONPATH");
        let mut cmd = Command::new(&launch.launcher);
        cmd.args(launch.launcher_args())
            .env("PYTHONPATH", launch.python_path(existing.as_deref().map(Path::new)))
            .current_dir(&launch.models_root);
        Ok(cmd)
    }

    /// Runs the launcher with inherited stdio. Exit status belongs to the child.
    pub async fn run(&self) -> LaunchResult<ExitStatus> {
        self.validate()?;
        info!(processes = self.num_processes, config = %self.config_path.display(), "starting local training");
        let status = self.command()?.status().await.map_err(|e| {
            LaunchError::Backend(format!("failed to start `{}`: {e}", self.launcher.display()))
        })?;
        Ok(status)
    }
}
