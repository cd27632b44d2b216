//! SageMaker backend driven through the `aws` command line tool.
//!
//! Credentials, profiles and endpoints are whatever the local `aws`
//! installation is configured with. Failures from the service are carried
//! back verbatim (stderr of the `aws` process).

use crate::error::{LaunchError, LaunchResult};
use crate::job::JobDescriptor;
use crate::layout::source_archive_under;
use crate::naming::JobName;
use crate::submitter::{JobStatus, JobSubmitter, SubmissionReceipt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

/// Log level handed to the framework container (Python `logging.INFO`).
const CONTAINER_LOG_LEVEL: i32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateTrainingJobRequest {
    pub training_job_name: String,
    pub hyper_parameters: BTreeMap<String, String>,
    pub algorithm_specification: AlgorithmSpecification,
    pub role_arn: String,
    pub input_data_config: Vec<InputChannel>,
    pub output_data_config: OutputDataConfig,
    pub resource_config: ResourceConfig,
    pub stopping_condition: StoppingCondition,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlgorithmSpecification {
    pub training_image: String,
    pub training_input_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InputChannel {
    pub channel_name: String,
    pub data_source: DataSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataSource {
    pub s3_data_source: S3DataSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3DataSource {
    pub s3_data_type: String,
    pub s3_uri: String,
    pub s3_data_distribution_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutputDataConfig {
    pub s3_output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceConfig {
    pub instance_type: String,
    pub instance_count: u32,
    #[serde(rename = "VolumeSizeInGB")]
    pub volume_size_in_gb: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoppingCondition {
    pub max_runtime_in_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl CreateTrainingJobRequest {
    /// Request document for `descriptor`, with training code at `submit_directory`.
    ///
    /// Hyperparameter values are JSON-encoded, which is what the framework
    /// containers decode on the other side.
    pub fn from_descriptor(descriptor: &JobDescriptor, submit_directory: &str) -> LaunchResult<Self> {
        let mut hp = descriptor.hyperparameters()?;
        hp.extend(descriptor.distribution.framework_hyperparameters(&descriptor.instance.instance_type));
        hp.insert("sagemaker_program".to_string(), descriptor.source.entry_point.clone().into());
        hp.insert("sagemaker_submit_directory".to_string(), submit_directory.into());
        hp.insert("sagemaker_region".to_string(), descriptor.region.clone().into());
        hp.insert("sagemaker_container_log_level".to_string(), CONTAINER_LOG_LEVEL.into());
        hp.insert("sagemaker_job_name".to_string(), descriptor.job_name.0.clone().into());

        let hyper_parameters = hp
            .into_iter()
            .map(|(k, v)| serde_json::to_string(&v).map(|encoded| (k, encoded)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let input_data_config = descriptor
            .channels
            .iter()
            .map(|(name, uri)| InputChannel {
                channel_name: name.to_string(),
                data_source: DataSource {
                    s3_data_source: S3DataSource {
                        s3_data_type: "S3Prefix".to_string(),
                        s3_uri: uri.to_string(),
                        s3_data_distribution_type: "FullyReplicated".to_string(),
                    },
                },
            })
            .collect();

        Ok(Self {
            training_job_name: descriptor.job_name.0.clone(),
            hyper_parameters,
            algorithm_specification: AlgorithmSpecification {
                training_image: descriptor.framework.image_uri.clone(),
                training_input_mode: "File".to_string(),
            },
            role_arn: descriptor.role_arn.clone(),
            input_data_config,
            output_data_config: OutputDataConfig { s3_output_path: descriptor.output_path.clone() },
            resource_config: ResourceConfig {
                instance_type: descriptor.instance.instance_type.clone(),
                instance_count: descriptor.instance.instance_count,
                volume_size_in_gb: descriptor.instance.volume_size_gb,
            },
            stopping_condition: StoppingCondition {
                max_runtime_in_seconds: descriptor.instance.max_runtime_seconds,
            },
            tags: vec![
                Tag { key: "frcnn:framework-version".to_string(), value: descriptor.framework.framework_version.clone() },
                Tag { key: "frcnn:py-version".to_string(), value: descriptor.framework.py_version.clone() },
            ],
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateTrainingJobResponse {
    training_job_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTrainingJobResponse {
    training_job_status: String,
    #[serde(default)]
    secondary_status: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
}

/// Maps the service's `TrainingJobStatus` (plus details) onto [`JobStatus`].
pub fn parse_job_status(status: &str, secondary: Option<String>, failure_reason: Option<String>) -> LaunchResult<JobStatus> {
    match status {
        "InProgress" => Ok(JobStatus::InProgress { secondary }),
        "Completed" => Ok(JobStatus::Completed),
        "Failed" => Ok(JobStatus::Failed { reason: failure_reason.unwrap_or_else(|| "unknown".to_string()) }),
        "Stopping" => Ok(JobStatus::Stopping),
        "Stopped" => Ok(JobStatus::Stopped),
        other => Err(LaunchError::Backend(format!("unknown training job status `{other}`"))),
    }
}

#[derive(Debug, Clone)]
pub struct SageMakerSubmitter {
    region: String,
    aws_bin: PathBuf,
}

impl SageMakerSubmitter {
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self { region: region.into(), aws_bin: PathBuf::from("aws") }
    }

    #[must_use]
    pub fn with_aws_bin(mut self, aws_bin: impl Into<PathBuf>) -> Self {
        self.aws_bin = aws_bin.into();
        self
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    async fn aws(&self, args: &[&str]) -> LaunchResult<Output> {
        debug!(bin = %self.aws_bin.display(), command = ?args.iter().take(2).collect::<Vec<_>>(), "running aws");
        Command::new(&self.aws_bin)
            .args(args)
            .args(["--region", self.region.as_str()])
            .output()
            .await
            .map_err(|e| LaunchError::Backend(format!("failed to run `{}`: {e}", self.aws_bin.display())))
    }

    /// Packs a local source tree and uploads it; `s3://` sources are used as they are.
    async fn stage_source(&self, descriptor: &JobDescriptor) -> LaunchResult<String> {
        let source_dir = descriptor.source.source_dir.as_str();
        if source_dir.starts_with("s3://") {
            return Ok(source_dir.to_string());
        }

        let source_dir = Path::new(source_dir);
        if !source_dir.is_dir() {
            return Err(LaunchError::InvalidConfig(format!(
                "source_dir does not exist: {}",
                source_dir.display()
            )));
        }

        let staging = tempfile::tempdir()?;
        let archive = staging.path().join("sourcedir.tar.gz");
        let tar = Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(source_dir)
            .arg(".")
            .output()
            .await?;
        if !tar.status.success() {
            return Err(LaunchError::Backend(format!(
                "packing {} failed: {}",
                source_dir.display(),
                String::from_utf8_lossy(&tar.stderr).trim()
            )));
        }

        let destination = source_archive_under(&descriptor.output_path);
        let archive = archive.to_string_lossy();
        let upload = self.aws(&["s3", "cp", &*archive, destination.as_str()]).await?;
        if !upload.status.success() {
            return Err(submission_error(&descriptor.job_name, &upload));
        }
        info!(source = %source_dir.display(), destination = %destination, "uploaded training source");
        Ok(destination)
    }
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn submission_error(job_name: &JobName, output: &Output) -> LaunchError {
    LaunchError::Submission { job: job_name.to_string(), message: stderr_text(output) }
}

#[async_trait]
impl JobSubmitter for SageMakerSubmitter {
    fn id(&self) -> &'static str {
        "sagemaker"
    }

    async fn create(&self, descriptor: &JobDescriptor) -> LaunchResult<SubmissionReceipt> {
        let submit_directory = self.stage_source(descriptor).await?;
        let request = CreateTrainingJobRequest::from_descriptor(descriptor, &submit_directory)?;
        let body = serde_json::to_string(&request)?;
        debug!(request = %body, "create-training-job");

        let output = self
            .aws(&["sagemaker", "create-training-job", "--output", "json", "--cli-input-json", body.as_str()])
            .await?;
        if !output.status.success() {
            return Err(submission_error(&descriptor.job_name, &output));
        }

        let response: CreateTrainingJobResponse = serde_json::from_slice(&output.stdout)?;
        Ok(SubmissionReceipt { job_name: descriptor.job_name.clone(), arn: Some(response.training_job_arn) })
    }

    async fn describe(&self, job_name: &JobName) -> LaunchResult<JobStatus> {
        let output = self
            .aws(&["sagemaker", "describe-training-job", "--output", "json", "--training-job-name", job_name.as_str()])
            .await?;
        if !output.status.success() {
            return Err(LaunchError::Backend(stderr_text(&output)));
        }
        let response: DescribeTrainingJobResponse = serde_json::from_slice(&output.stdout)?;
        parse_job_status(&response.training_job_status, response.secondary_status, response.failure_reason)
    }

    async fn stop(&self, job_name: &JobName) -> LaunchResult<()> {
        let output = self
            .aws(&["sagemaker", "stop-training-job", "--training-job-name", job_name.as_str()])
            .await?;
        if !output.status.success() {
            return Err(LaunchError::Backend(stderr_text(&output)));
        }
        Ok(())
    }
}
