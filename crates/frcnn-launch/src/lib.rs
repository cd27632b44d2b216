//! Faster R-CNN training launcher
//!
//! Builds and submits distributed Faster R-CNN training jobs:
//! - Typed hyperparameters (`TrainingConfiguration`)
//! - Data channels, output layout and job naming
//! - Distribution descriptors for MPI or the native data-parallel library
//! - Submission through a `JobSubmitter` backend (SageMaker via the `aws` CLI)
//! - Single-host launches under `mpirun` (`LocalLaunch`)

pub mod channels;
pub mod config;
pub mod configurator;
pub mod distribution;
pub mod error;
pub mod hyperparams;
pub mod job;
pub mod layout;
pub mod local;
pub mod naming;
pub mod progress;
pub mod sagemaker;
pub mod submitter;

pub use channels::{DataChannelMap, channel_env_var};
pub use config::{ConfigError, LaunchSettings, LauncherConfig};
pub use configurator::JobLaunchConfigurator;
pub use distribution::{DistributionSpec, DistributionStrategy, build_distribution_descriptor};
pub use error::{LaunchError, LaunchResult};
pub use hyperparams::{HyperParameters, Schedule, TrainingConfiguration};
pub use job::{FrameworkSpec, InstanceSpec, JobDescriptor, SourceSpec};
pub use layout::{S3Layout, build_output_location};
pub use local::LocalLaunch;
pub use naming::{JobName, build_job_name, format_date, format_timestamp};
pub use progress::{LaunchEvent, NullProgressSink, ProgressSink, StdoutProgressSink};
pub use sagemaker::{CreateTrainingJobRequest, SageMakerSubmitter};
pub use submitter::{JobHandle, JobStatus, JobSubmitter, SubmissionReceipt, SubmitOptions, submit};
