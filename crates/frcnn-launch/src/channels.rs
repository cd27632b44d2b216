use crate::error::{LaunchError, LaunchResult};
use crate::layout::S3Layout;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Channels every Faster R-CNN job reads: the COCO dataset and pretrained backbone weights.
pub const DEFAULT_CHANNELS: [&str; 2] = ["coco", "weights"];

/// Logical channel name -> remote storage URI.
///
/// The service downloads each URI into a local directory before the job
/// starts and exposes it as `SM_CHANNEL_<NAME>`. URIs are kept exactly as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataChannelMap(BTreeMap<String, String>);

impl DataChannelMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `coco` and `weights` under the bucket's data prefix.
    #[must_use]
    pub fn default_for(layout: &S3Layout) -> Self {
        DEFAULT_CHANNELS
            .iter()
            .map(|c| ((*c).to_string(), layout.data_channel_uri(c)))
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, uri: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), uri.into())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn validate(&self) -> LaunchResult<()> {
        if self.0.is_empty() {
            return Err(LaunchError::InvalidChannel("at least one channel is required".to_string()));
        }
        for (name, uri) in &self.0 {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return Err(LaunchError::InvalidChannel(format!(
                    "channel name `{name}` must be non-empty and use only letters, digits, `_` or `-`"
                )));
            }
            let bucket = uri
                .strip_prefix("s3://")
                .map(|rest| rest.split('/').next().unwrap_or_default())
                .ok_or_else(|| {
                    LaunchError::InvalidChannel(format!("channel `{name}`: `{uri}` is not an s3:// URI"))
                })?;
            if bucket.is_empty() {
                return Err(LaunchError::InvalidChannel(format!("channel `{name}`: `{uri}` has no bucket")));
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for DataChannelMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Environment variable the service sets for a channel inside the job container.
#[must_use]
pub fn channel_env_var(name: &str) -> String {
    format!("SM_CHANNEL_{}", name.to_uppercase())
}
