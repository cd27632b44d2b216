//! Launcher configuration files.
//!
//! Precedence, lowest first:
//! 1. Defaults
//! 2. Global config file (~/.frcnn/config.toml)
//! 3. Local config file (./frcnn.toml)
//! 4. Explicit `--config` file
//! 5. Environment variables (`FRCNN_*`)
//! 6. CLI arguments (applied by the binary)

use crate::channels::DataChannelMap;
use crate::distribution::{DEFAULT_MPI_OPTIONS, DistributionStrategy};
use crate::hyperparams::TrainingConfiguration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LOCAL_CONFIG_FILE: &str = "frcnn.toml";

pub const DEFAULT_INSTANCE_TYPE: &str = "ml.p3dn.24xlarge";
pub const DEFAULT_VOLUME_SIZE_GB: u32 = 500;
pub const DEFAULT_MAX_RUNTIME_SECONDS: u64 = 5 * 24 * 60 * 60;
pub const DEFAULT_FRAMEWORK_VERSION: &str = "2.3.1";
pub const DEFAULT_PY_VERSION: &str = "py37";
pub const DEFAULT_ENTRY_POINT: &str = "tools/train_sagemaker.py";
pub const DEFAULT_SOURCE_DIR: &str = ".";
pub const DEFAULT_CONFIGURATION: &str = "configs/sagemaker_default_model_config.py";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    #[error("Missing required setting `{0}` (set it in frcnn.toml, FRCNN_* or on the command line)")]
    Missing(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    #[serde(default, rename = "type")]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub volume_size_gb: Option<u32>,
    #[serde(default)]
    pub max_runtime_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default)]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub source_dir: Option<String>,
    #[serde(default)]
    pub configuration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameworkConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub py_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionConfig {
    #[serde(default)]
    pub strategy: Option<DistributionStrategy>,
    #[serde(default)]
    pub custom_mpi_options: Option<String>,
}

/// Launcher configuration as read from one source. Every field is optional;
/// sources are merged and then resolved into [`LaunchSettings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LauncherConfig {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub image_uri: Option<String>,
    /// Path to the `aws` executable.
    #[serde(default)]
    pub aws_bin: Option<PathBuf>,
    #[serde(default)]
    pub instance: InstanceConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub framework: FrameworkConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    /// Replaces, rather than merges with, hyperparameters from earlier sources.
    #[serde(default)]
    pub hyperparameters: Option<TrainingConfiguration>,
    /// Replaces channels from earlier sources. Defaults to the bucket's data prefix.
    #[serde(default)]
    pub channels: Option<DataChannelMap>,
}

/// Fully resolved settings for one launch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSettings {
    pub user_id: String,
    pub bucket: String,
    pub region: String,
    pub role_arn: String,
    pub image_uri: String,
    pub aws_bin: PathBuf,
    pub instance_type: String,
    pub volume_size_gb: u32,
    pub max_runtime_seconds: u64,
    pub framework_version: String,
    pub py_version: String,
    pub entry_point: String,
    pub source_dir: String,
    pub configuration: String,
    pub strategy: DistributionStrategy,
    pub custom_mpi_options: String,
    pub hyperparameters: TrainingConfiguration,
    pub channels: Option<DataChannelMap>,
}

macro_rules! merge_opt {
    ($dst:expr, $src:expr) => {
        if let Some(ref v) = $src {
            $dst = Some(v.clone());
        }
    };
}

impl LauncherConfig {
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::ReadError(format!("Failed to create directory: {}", e)))?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::ReadError(format!("Failed to write file: {}", e)))
    }

    pub fn default_global_path() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".frcnn").join("config.toml")
    }

    pub fn default_local_path() -> PathBuf {
        PathBuf::from(LOCAL_CONFIG_FILE)
    }

    /// Loads global, local and (if given) explicit config files, then the environment.
    ///
    /// Missing global/local files are skipped; a missing explicit file and any
    /// parse error are reported.
    pub fn discover_and_load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();

        for path in [Self::default_global_path(), Self::default_local_path()] {
            match Self::load_from_file(&path) {
                Ok(found) => config.merge(&found),
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(path) = explicit {
            config.merge(&Self::load_from_file(path)?);
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Values from `other` override values in `self` when set.
    pub fn merge(&mut self, other: &Self) {
        merge_opt!(self.user_id, other.user_id);
        merge_opt!(self.bucket, other.bucket);
        merge_opt!(self.region, other.region);
        merge_opt!(self.role_arn, other.role_arn);
        merge_opt!(self.image_uri, other.image_uri);
        merge_opt!(self.aws_bin, other.aws_bin);
        merge_opt!(self.instance.instance_type, other.instance.instance_type);
        merge_opt!(self.instance.volume_size_gb, other.instance.volume_size_gb);
        merge_opt!(self.instance.max_runtime_seconds, other.instance.max_runtime_seconds);
        merge_opt!(self.source.entry_point, other.source.entry_point);
        merge_opt!(self.source.source_dir, other.source.source_dir);
        merge_opt!(self.source.configuration, other.source.configuration);
        merge_opt!(self.framework.version, other.framework.version);
        merge_opt!(self.framework.py_version, other.framework.py_version);
        merge_opt!(self.distribution.strategy, other.distribution.strategy);
        merge_opt!(self.distribution.custom_mpi_options, other.distribution.custom_mpi_options);
        merge_opt!(self.hyperparameters, other.hyperparameters);
        merge_opt!(self.channels, other.channels);
    }

    /// Applies `FRCNN_*` overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str, slot: &mut Option<String>| {
            if let Some(v) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(v);
            }
        };
        read("FRCNN_USER", &mut self.user_id);
        read("FRCNN_BUCKET", &mut self.bucket);
        read("FRCNN_REGION", &mut self.region);
        read("FRCNN_ROLE_ARN", &mut self.role_arn);
        read("FRCNN_IMAGE_URI", &mut self.image_uri);
    }

    /// Region only, for commands that address an existing job.
    pub fn resolve_region(&self) -> ConfigResult<String> {
        required(self.region.as_ref(), "region")
    }

    #[must_use]
    pub fn aws_bin(&self) -> PathBuf {
        self.aws_bin.clone().unwrap_or_else(|| PathBuf::from("aws"))
    }

    pub fn resolve(&self) -> ConfigResult<LaunchSettings> {
        let settings = LaunchSettings {
            user_id: required(self.user_id.as_ref(), "user_id")?,
            bucket: required(self.bucket.as_ref(), "bucket")?,
            region: self.resolve_region()?,
            role_arn: required(self.role_arn.as_ref(), "role_arn")?,
            image_uri: required(self.image_uri.as_ref(), "image_uri")?,
            aws_bin: self.aws_bin(),
            instance_type: self.instance.instance_type.clone().unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
            volume_size_gb: self.instance.volume_size_gb.unwrap_or(DEFAULT_VOLUME_SIZE_GB),
            max_runtime_seconds: self.instance.max_runtime_seconds.unwrap_or(DEFAULT_MAX_RUNTIME_SECONDS),
            framework_version: self.framework.version.clone().unwrap_or_else(|| DEFAULT_FRAMEWORK_VERSION.to_string()),
            py_version: self.framework.py_version.clone().unwrap_or_else(|| DEFAULT_PY_VERSION.to_string()),
            entry_point: self.source.entry_point.clone().unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string()),
            source_dir: self.source.source_dir.clone().unwrap_or_else(|| DEFAULT_SOURCE_DIR.to_string()),
            configuration: self.source.configuration.clone().unwrap_or_else(|| DEFAULT_CONFIGURATION.to_string()),
            strategy: self.distribution.strategy.unwrap_or_default(),
            custom_mpi_options: self
                .distribution
                .custom_mpi_options
                .clone()
                .unwrap_or_else(|| DEFAULT_MPI_OPTIONS.to_string()),
            hyperparameters: self.hyperparameters.clone().unwrap_or_default(),
            channels: self.channels.clone(),
        };

        if settings.user_id.chars().any(|c| !c.is_ascii_alphanumeric() && c != '-') {
            return Err(ConfigError::InvalidValue(format!(
                "user_id `{}` may only contain letters, digits and `-`",
                settings.user_id
            )));
        }
        Ok(settings)
    }

    /// Starter file written by `bootstrap`.
    #[must_use]
    pub fn starter(user_id: &str, bucket: &str, region: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            bucket: Some(bucket.to_string()),
            region: Some(region.to_string()),
            instance: InstanceConfig {
                instance_type: Some(DEFAULT_INSTANCE_TYPE.to_string()),
                volume_size_gb: Some(DEFAULT_VOLUME_SIZE_GB),
                max_runtime_seconds: Some(DEFAULT_MAX_RUNTIME_SECONDS),
            },
            source: SourceConfig {
                entry_point: Some(DEFAULT_ENTRY_POINT.to_string()),
                source_dir: Some(DEFAULT_SOURCE_DIR.to_string()),
                configuration: Some(DEFAULT_CONFIGURATION.to_string()),
            },
            hyperparameters: Some(TrainingConfiguration::default()),
            ..Self::default()
        }
    }
}

fn required(value: Option<&String>, name: &'static str) -> ConfigResult<String> {
    value.filter(|v| !v.trim().is_empty()).cloned().ok_or(ConfigError::Missing(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparams::Schedule;
    use tempfile::TempDir;

    const FULL: &str = r#"
user_id = "jbsnyder"
bucket = "my-bucket"
region = "us-west-2"
role_arn = "arn:aws:iam::123456789012:role/SageMakerRole"
image_uri = "123456789012.dkr.ecr.us-west-2.amazonaws.com/frcnn:tf2.3"

[instance]
type = "ml.p4d.24xlarge"
volume_size_gb = 200

[distribution]
strategy = "data_parallel"

[hyperparameters]
schedule = "cosine"
instance_count = 2

[channels]
coco = "s3://my-bucket/coco/"
weights = "s3://my-bucket/weights/"
"#;

    #[test]
    fn test_load_and_resolve() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("frcnn.toml");
        std::fs::write(&path, FULL).unwrap();

        let settings = LauncherConfig::load_from_file(&path).unwrap().resolve().unwrap();
        assert_eq!(settings.user_id, "jbsnyder");
        assert_eq!(settings.instance_type, "ml.p4d.24xlarge");
        assert_eq!(settings.volume_size_gb, 200);
        assert_eq!(settings.max_runtime_seconds, DEFAULT_MAX_RUNTIME_SECONDS);
        assert_eq!(settings.strategy, DistributionStrategy::DataParallel);
        assert_eq!(settings.hyperparameters.schedule, Schedule::Cosine);
        assert_eq!(settings.hyperparameters.instance_count, 2);
        assert_eq!(settings.channels.unwrap().get("coco"), Some("s3://my-bucket/coco/"));
    }

    #[test]
    fn test_unknown_keys_fail_to_parse() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("frcnn.toml");
        std::fs::write(&path, "bucket = \"b\"\n[hyperparameters]\nlearnin_rate = 0.1\n").unwrap();

        let err = LauncherConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = LauncherConfig::load_from_file(Path::new("/nonexistent/frcnn.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_merge_overrides_only_set_values() {
        let mut base: LauncherConfig = toml::from_str(FULL).unwrap();
        let over: LauncherConfig = toml::from_str("bucket = \"other\"\n[instance]\nvolume_size_gb = 50\n").unwrap();
        base.merge(&over);

        assert_eq!(base.bucket.as_deref(), Some("other"));
        assert_eq!(base.region.as_deref(), Some("us-west-2"));
        assert_eq!(base.instance.instance_type.as_deref(), Some("ml.p4d.24xlarge"));
        assert_eq!(base.instance.volume_size_gb, Some(50));
        assert!(base.hyperparameters.is_some());
    }

    #[test]
    fn test_env_overrides_files() {
        let mut config: LauncherConfig = toml::from_str(FULL).unwrap();
        config.apply_env(|key| match key {
            "FRCNN_BUCKET" => Some("env-bucket".to_string()),
            "FRCNN_USER" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.bucket.as_deref(), Some("env-bucket"));
        assert_eq!(config.user_id.as_deref(), Some("jbsnyder"));
    }

    #[test]
    fn test_resolve_reports_first_missing_field() {
        let config: LauncherConfig = toml::from_str("user_id = \"u\"\n").unwrap();
        assert!(matches!(config.resolve(), Err(ConfigError::Missing("bucket"))));
    }

    #[test]
    fn test_resolve_rejects_bad_user_id() {
        let mut config: LauncherConfig = toml::from_str(FULL).unwrap();
        config.user_id = Some("j_b".to_string());
        assert!(matches!(config.resolve(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_starter_round_trips_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("frcnn.toml");
        let starter = LauncherConfig::starter("u", "b", "us-east-1");
        starter.save_to_file(&path).unwrap();

        let loaded = LauncherConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, starter);
        assert!(matches!(loaded.resolve(), Err(ConfigError::Missing("role_arn"))));
    }
}
