//! CLI configuration loading and merging.

use crate::commands::types::LaunchOverrides;
use frcnn_launch::{ConfigError, LauncherConfig};
use std::path::Path;

/// Load and merge launcher configuration.
///
/// Configuration precedence:
/// 1. CLI arguments
/// 2. Environment variables (FRCNN_*)
/// 3. Explicit --config file
/// 4. Local config file (./frcnn.toml)
/// 5. Global config file (~/.frcnn/config.toml)
/// 6. Defaults
pub fn load_config(explicit: Option<&Path>, overrides: &LaunchOverrides) -> Result<LauncherConfig, ConfigError> {
    let mut config = LauncherConfig::discover_and_load(explicit)?;
    config.merge(&LauncherConfig {
        user_id: overrides.user.clone(),
        bucket: overrides.bucket.clone(),
        region: overrides.region.clone(),
        role_arn: overrides.role_arn.clone(),
        image_uri: overrides.image_uri.clone(),
        aws_bin: overrides.aws_bin.clone(),
        instance: frcnn_launch::config::InstanceConfig {
            instance_type: overrides.instance_type.clone(),
            ..Default::default()
        },
        ..Default::default()
    });
    Ok(config)
}
