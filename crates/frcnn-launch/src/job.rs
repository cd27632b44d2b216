use crate::channels::DataChannelMap;
use crate::distribution::DistributionSpec;
use crate::error::{LaunchError, LaunchResult};
use crate::hyperparams::{HyperParameters, TrainingConfiguration};
use crate::naming::JobName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compute resources for the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub instance_type: String,
    pub instance_count: u32,
    pub volume_size_gb: u32,
    pub max_runtime_seconds: u64,
}

/// Training code the framework container runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Script path relative to `source_dir`.
    pub entry_point: String,
    /// Local directory to pack, or an `s3://` URI of an already packed `sourcedir.tar.gz`.
    pub source_dir: String,
    /// Model config file inside the source tree, handed over as `configuration`.
    pub configuration: String,
}

/// Framework container tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkSpec {
    pub image_uri: String,
    pub framework_version: String,
    pub py_version: String,
}

/// Everything submitted to start one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_name: JobName,
    pub created_at: DateTime<Utc>,
    pub region: String,
    pub role_arn: String,
    pub framework: FrameworkSpec,
    pub source: SourceSpec,
    pub instance: InstanceSpec,
    pub distribution: DistributionSpec,
    pub output_path: String,
    pub training: TrainingConfiguration,
    pub channels: DataChannelMap,
}

impl JobDescriptor {
    pub fn validate(&self) -> LaunchResult<()> {
        self.job_name.validate()?;
        self.training.validate()?;
        self.channels.validate()?;

        if self.region.trim().is_empty() {
            return Err(invalid("region is required"));
        }
        if self.role_arn.trim().is_empty() {
            return Err(invalid("role_arn is required"));
        }
        if self.framework.image_uri.trim().is_empty() {
            return Err(invalid("image_uri is required"));
        }
        if self.source.entry_point.trim().is_empty() {
            return Err(invalid("source.entry_point is required"));
        }
        if self.source.source_dir.trim().is_empty() {
            return Err(invalid("source.source_dir is required"));
        }
        if !self.instance.instance_type.starts_with("ml.") {
            return Err(invalid(&format!(
                "instance type `{}` must be an `ml.` instance type",
                self.instance.instance_type
            )));
        }
        if self.instance.instance_count == 0 {
            return Err(invalid("instance_count must be >= 1"));
        }
        if self.instance.instance_count != self.training.instance_count {
            return Err(invalid(&format!(
                "instance_count {} does not match hyperparameter instance_count {}",
                self.instance.instance_count, self.training.instance_count
            )));
        }
        if self.distribution.processes_per_host != self.training.gpus_per_host {
            return Err(invalid(&format!(
                "processes_per_host {} does not match gpus_per_host {}",
                self.distribution.processes_per_host, self.training.gpus_per_host
            )));
        }
        if self.instance.volume_size_gb == 0 {
            return Err(invalid("volume_size_gb must be >= 1"));
        }
        if self.instance.max_runtime_seconds == 0 {
            return Err(invalid("max_runtime_seconds must be >= 1"));
        }
        if !self.output_path.starts_with("s3://") {
            return Err(invalid("output_path must be an s3:// URI"));
        }
        Ok(())
    }

    /// Hyperparameters handed to the training entry point: the training
    /// configuration plus `configuration`, `s3_path` and `instance_name`.
    pub fn hyperparameters(&self) -> LaunchResult<HyperParameters> {
        let mut map = self.training.to_hyperparameters()?;
        map.insert("configuration".to_string(), self.source.configuration.clone().into());
        map.insert("s3_path".to_string(), self.output_path.clone().into());
        map.insert("instance_name".to_string(), self.job_name.0.clone().into());
        Ok(map)
    }
}

fn invalid(msg: &str) -> LaunchError {
    LaunchError::InvalidConfig(msg.to_string())
}
