use crate::error::{LaunchError, LaunchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timestamp format embedded in job names, e.g. `27-12-2020-16-30`.
pub const JOB_TIMESTAMP_FORMAT: &str = "%d-%m-%Y-%H-%M";
/// Date format used for output prefixes, e.g. `27-12-2020`.
pub const OUTPUT_DATE_FORMAT: &str = "%d-%m-%Y";

const MAX_JOB_NAME_LEN: usize = 63;

/// Name of a training job on the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(pub String);

impl JobName {
    /// `"{user_id}-frcnn-{timestamp}"`. Not validated; see [`JobName::validate`].
    #[must_use]
    pub fn build(user_id: &str, timestamp: &str) -> Self {
        Self(format!("{user_id}-frcnn-{timestamp}"))
    }

    /// Appends 8 random hex characters, trimming the stem to stay within the length limit.
    #[must_use]
    pub fn with_unique_suffix(&self) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        let suffix = &suffix[..8];
        let limit = MAX_JOB_NAME_LEN - suffix.len() - 1;
        // Cut on a char boundary; the stem is arbitrary text until validated.
        let cut = self
            .0
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|&end| end <= limit)
            .last()
            .unwrap_or(0);
        let stem = self.0[..cut].trim_end_matches('-');
        Self(format!("{stem}-{suffix}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Service naming rules: 1-63 characters of `[A-Za-z0-9-]`, starting and
    /// ending with an alphanumeric character.
    pub fn validate(&self) -> LaunchResult<()> {
        let name = self.0.as_str();
        let fail = |reason: &str| LaunchError::InvalidJobName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(fail("must not be empty"));
        }
        if name.len() > MAX_JOB_NAME_LEN {
            return Err(fail(&format!("must be at most {MAX_JOB_NAME_LEN} characters")));
        }
        if let Some(c) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
            return Err(fail(&format!("character `{c}` is not allowed")));
        }
        if name.starts_with('-') || name.ends_with('-') {
            return Err(fail("must start and end with a letter or digit"));
        }
        Ok(())
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(JOB_TIMESTAMP_FORMAT).to_string()
}

#[must_use]
pub fn format_date(at: DateTime<Utc>) -> String {
    at.format(OUTPUT_DATE_FORMAT).to_string()
}

/// Job name for `user_id` at an already formatted `timestamp`.
#[must_use]
pub fn build_job_name(user_id: &str, timestamp: &str) -> JobName {
    JobName::build(user_id, timestamp)
}
