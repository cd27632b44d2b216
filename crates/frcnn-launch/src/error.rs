use thiserror::Error;

pub type LaunchResult<T> = std::result::Result<T, LaunchError>;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid launch configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid job name `{name}`: {reason}")]
    InvalidJobName { name: String, reason: String },

    #[error("invalid data channel: {0}")]
    InvalidChannel(String),

    /// Error reported by the training service, carried verbatim.
    #[error("submission of {job} failed: {message}")]
    Submission { job: String, message: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
