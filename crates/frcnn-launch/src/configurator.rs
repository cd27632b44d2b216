use crate::channels::DataChannelMap;
use crate::config::LaunchSettings;
use crate::distribution::{DistributionSpec, build_distribution_descriptor};
use crate::error::LaunchResult;
use crate::job::{FrameworkSpec, InstanceSpec, JobDescriptor, SourceSpec};
use crate::layout::S3Layout;
use crate::naming::{JobName, build_job_name, format_date, format_timestamp};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Assembles job descriptors from resolved settings.
///
/// Deterministic for a given `now`; the only randomness is the opt-in unique suffix.
#[derive(Debug, Clone)]
pub struct JobLaunchConfigurator {
    settings: LaunchSettings,
    layout: S3Layout,
    unique_names: bool,
}

impl JobLaunchConfigurator {
    #[must_use]
    pub fn new(settings: LaunchSettings) -> Self {
        let layout = S3Layout::new(&settings.bucket);
        Self { settings, layout, unique_names: false }
    }

    /// Append a random suffix to every job name so same-minute launches do not share an output prefix.
    #[must_use]
    pub fn with_unique_names(mut self, unique: bool) -> Self {
        self.unique_names = unique;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    #[must_use]
    pub fn layout(&self) -> &S3Layout {
        &self.layout
    }

    #[must_use]
    pub fn job_name(&self, now: DateTime<Utc>) -> JobName {
        let name = build_job_name(&self.settings.user_id, &format_timestamp(now));
        if self.unique_names { name.with_unique_suffix() } else { name }
    }

    #[must_use]
    pub fn distribution(&self) -> DistributionSpec {
        let hp = &self.settings.hyperparameters;
        DistributionSpec {
            strategy: self.settings.strategy,
            custom_mpi_options: self.settings.custom_mpi_options.clone(),
            ..build_distribution_descriptor(hp.gpus_per_host, hp.instance_count)
        }
    }

    /// Configured channels, or `coco` and `weights` under the bucket's data prefix.
    #[must_use]
    pub fn channels(&self) -> DataChannelMap {
        self.settings.channels.clone().unwrap_or_else(|| DataChannelMap::default_for(&self.layout))
    }

    /// Builds and validates the descriptor for a launch at `now`.
    pub fn build(&self, now: DateTime<Utc>) -> LaunchResult<JobDescriptor> {
        let job_name = self.job_name(now);
        let date = format_date(now);
        let output_path = self.layout.output_path(&date, &job_name);
        let s = &self.settings;

        let descriptor = JobDescriptor {
            created_at: now,
            region: s.region.clone(),
            role_arn: s.role_arn.clone(),
            framework: FrameworkSpec {
                image_uri: s.image_uri.clone(),
                framework_version: s.framework_version.clone(),
                py_version: s.py_version.clone(),
            },
            source: SourceSpec {
                entry_point: s.entry_point.clone(),
                source_dir: s.source_dir.clone(),
                configuration: s.configuration.clone(),
            },
            instance: InstanceSpec {
                instance_type: s.instance_type.clone(),
                instance_count: s.hyperparameters.instance_count,
                volume_size_gb: s.volume_size_gb,
                max_runtime_seconds: s.max_runtime_seconds,
            },
            distribution: self.distribution(),
            output_path,
            training: s.hyperparameters.clone(),
            channels: self.channels(),
            job_name,
        };
        descriptor.validate()?;
        debug!(
            job = %descriptor.job_name,
            global_batch = descriptor.training.global_batch_size(),
            processes = descriptor.distribution.total_processes(),
            "assembled job descriptor"
        );
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LauncherConfig;
    use crate::distribution::DistributionStrategy;
    use crate::error::LaunchError;
    use crate::progress::NullProgressSink;
    use crate::submitter::tests::ScriptedSubmitter;
    use crate::submitter::{SubmitOptions, submit};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn settings(bucket: &str, user: &str) -> LaunchSettings {
        let config: LauncherConfig = toml::from_str(&format!(
            r#"
user_id = "{user}"
bucket = "{bucket}"
region = "us-east-1"
role_arn = "arn:aws:iam::123456789012:role/SageMakerRole"
image_uri = "123456789012.dkr.ecr.us-east-1.amazonaws.com/frcnn:latest"
"#
        ))
        .unwrap();
        config.resolve().unwrap()
    }

    #[test]
    fn test_default_channels_under_bucket() {
        let configurator = JobLaunchConfigurator::new(settings("s3://b/", "u"));
        let channels = configurator.channels();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels.get("coco"), Some("s3://b/faster-rcnn/data/coco/"));
    }

    #[test]
    fn test_distribution_follows_hyperparameters() {
        let mut s = settings("b", "u");
        s.hyperparameters.gpus_per_host = 4;
        s.hyperparameters.instance_count = 2;
        s.strategy = DistributionStrategy::DataParallel;
        let spec = JobLaunchConfigurator::new(s).distribution();
        assert_eq!(spec.processes_per_host, 4);
        assert_eq!(spec.host_count, 2);
        assert_eq!(spec.strategy, DistributionStrategy::DataParallel);
    }

    #[test]
    fn test_invalid_hyperparameters_fail_build() {
        let mut s = settings("b", "u");
        s.hyperparameters.warmup_steps = 0;
        let err = JobLaunchConfigurator::new(s).build(Utc::now()).unwrap_err();
        assert!(matches!(err, LaunchError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_end_to_end_submission_shape() {
        let mut s = settings("b", "u");
        let mut channels = DataChannelMap::new();
        channels.insert("coco", "s3://b/c/");
        channels.insert("weights", "s3://b/w/");
        s.channels = Some(channels);

        let now = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let descriptor = JobLaunchConfigurator::new(s).build(now).unwrap();
        assert_eq!(descriptor.job_name.as_str(), "u-frcnn-01-01-2021-00-00");
        assert_eq!(
            descriptor.output_path,
            "s3://b/faster-rcnn/outputs/01-01-2021/output/u-frcnn-01-01-2021-00-00"
        );

        let options = SubmitOptions::default();
        assert!(!options.wait);

        let backend = Arc::new(ScriptedSubmitter::default());
        let handle = submit(backend.clone(), &descriptor, options, &NullProgressSink).await.unwrap();
        assert_eq!(handle.job_name().as_str(), "u-frcnn-01-01-2021-00-00");
        assert_eq!(*backend.describes.lock().unwrap(), 0);

        let created = backend.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].output_path, descriptor.output_path);
        assert_eq!(created[0].channels.get("coco"), Some("s3://b/c/"));
        assert_eq!(created[0].channels.get("weights"), Some("s3://b/w/"));
    }

    #[test]
    fn test_unique_names_differ_within_a_minute() {
        let now = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let configurator = JobLaunchConfigurator::new(settings("b", "u")).with_unique_names(true);
        let a = configurator.build(now).unwrap();
        let b = configurator.build(now).unwrap();
        assert_ne!(a.job_name, b.job_name);
        assert_ne!(a.output_path, b.output_path);
    }
}
