//! Submission seam between the launcher and the training service.
//!
//! Submission is one acknowledged call. The returned [`JobHandle`] is the only
//! local view of the remote job: it can ask for status, request a stop or
//! poll until the job reaches a terminal state.

use crate::error::LaunchResult;
use crate::job::JobDescriptor;
use crate::naming::JobName;
use crate::progress::{LaunchEvent, ProgressSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Shortest pause between status calls in [`JobHandle::wait`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    InProgress { secondary: Option<String> },
    Completed,
    Failed { reason: String },
    Stopping,
    Stopped,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Stopped)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress { secondary: Some(s) } => write!(f, "in progress ({s})"),
            Self::InProgress { secondary: None } => f.write_str("in progress"),
            Self::Completed => f.write_str("completed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Stopping => f.write_str("stopping"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Acknowledgement returned by the service on submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub job_name: JobName,
    pub arn: Option<String>,
}

#[async_trait]
pub trait JobSubmitter: Send + Sync {
    fn id(&self) -> &'static str;

    async fn create(&self, descriptor: &JobDescriptor) -> LaunchResult<SubmissionReceipt>;

    async fn describe(&self, job_name: &JobName) -> LaunchResult<JobStatus>;

    async fn stop(&self, job_name: &JobName) -> LaunchResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Block until the job is terminal. Off by default.
    pub wait: bool,
    pub poll_interval: Duration,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self { wait: false, poll_interval: DEFAULT_POLL_INTERVAL }
    }
}

/// Local handle to a submitted job.
#[derive(Clone)]
pub struct JobHandle {
    receipt: SubmissionReceipt,
    submitted_at: DateTime<Utc>,
    backend: Arc<dyn JobSubmitter>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("receipt", &self.receipt)
            .field("submitted_at", &self.submitted_at)
            .field("backend", &self.backend.id())
            .finish()
    }
}

impl JobHandle {
    /// Handle for a job submitted earlier, e.g. by another invocation.
    #[must_use]
    pub fn attach(backend: Arc<dyn JobSubmitter>, job_name: JobName) -> Self {
        Self {
            receipt: SubmissionReceipt { job_name, arn: None },
            submitted_at: Utc::now(),
            backend,
        }
    }

    #[must_use]
    pub fn job_name(&self) -> &JobName {
        &self.receipt.job_name
    }

    #[must_use]
    pub fn arn(&self) -> Option<&str> {
        self.receipt.arn.as_deref()
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub async fn status(&self) -> LaunchResult<JobStatus> {
        self.backend.describe(self.job_name()).await
    }

    /// Asks the service to stop the job. Returns once the request is accepted.
    pub async fn cancel(&self) -> LaunchResult<()> {
        info!(job = %self.job_name(), "requesting stop");
        self.backend.stop(self.job_name()).await
    }

    /// Polls until the job is terminal, reporting every status change.
    ///
    /// `poll_interval` is raised to [`MIN_POLL_INTERVAL`] if shorter.
    pub async fn wait(&self, poll_interval: Duration, progress: &dyn ProgressSink) -> LaunchResult<JobStatus> {
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let mut last: Option<JobStatus> = None;
        loop {
            let status = self.status().await?;
            if status.is_terminal() {
                progress.on_event(LaunchEvent::Finished { job_name: self.job_name().clone(), status: status.clone() });
                return Ok(status);
            }
            if last.as_ref() != Some(&status) {
                progress.on_event(LaunchEvent::Status { job_name: self.job_name().clone(), status: status.clone() });
                last = Some(status);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Validates and submits a job.
///
/// With `options.wait == false` this returns as soon as the service
/// acknowledges the job. Service errors are returned unchanged and never retried.
pub async fn submit(
    backend: Arc<dyn JobSubmitter>,
    descriptor: &JobDescriptor,
    options: SubmitOptions,
    progress: &dyn ProgressSink,
) -> LaunchResult<JobHandle> {
    descriptor.validate()?;
    debug!(backend = backend.id(), job = %descriptor.job_name, "submitting");

    let receipt = backend.create(descriptor).await?;
    info!(job = %receipt.job_name, output = %descriptor.output_path, "training job submitted");
    progress.on_event(LaunchEvent::Submitted { job_name: receipt.job_name.clone(), arn: receipt.arn.clone() });

    let handle = JobHandle { receipt, submitted_at: Utc::now(), backend };
    if options.wait {
        handle.wait(options.poll_interval, progress).await?;
    }
    Ok(handle)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::LaunchError;
    use crate::job::tests::sample_descriptor;
    use crate::progress::NullProgressSink;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records calls and replays a scripted status sequence.
    #[derive(Default)]
    pub(crate) struct ScriptedSubmitter {
        pub created: Mutex<Vec<JobDescriptor>>,
        pub statuses: Mutex<VecDeque<JobStatus>>,
        pub describes: Mutex<usize>,
        pub stopped: Mutex<Vec<JobName>>,
        pub reject_with: Option<String>,
    }

    #[async_trait]
    impl JobSubmitter for ScriptedSubmitter {
        fn id(&self) -> &'static str {
            "scripted"
        }

        async fn create(&self, descriptor: &JobDescriptor) -> LaunchResult<SubmissionReceipt> {
            if let Some(message) = &self.reject_with {
                return Err(LaunchError::Submission {
                    job: descriptor.job_name.to_string(),
                    message: message.clone(),
                });
            }
            self.created.lock().unwrap().push(descriptor.clone());
            Ok(SubmissionReceipt {
                job_name: descriptor.job_name.clone(),
                arn: Some(format!("arn:aws:sagemaker:us-east-1:123456789012:training-job/{}", descriptor.job_name)),
            })
        }

        async fn describe(&self, _job_name: &JobName) -> LaunchResult<JobStatus> {
            *self.describes.lock().unwrap() += 1;
            let mut statuses = self.statuses.lock().unwrap();
            Ok(statuses.pop_front().unwrap_or(JobStatus::Completed))
        }

        async fn stop(&self, job_name: &JobName) -> LaunchResult<()> {
            self.stopped.lock().unwrap().push(job_name.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<LaunchEvent>>);

    impl ProgressSink for RecordingSink {
        fn on_event(&self, event: LaunchEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn test_submit_without_wait_does_not_poll() {
        let backend = Arc::new(ScriptedSubmitter::default());
        let descriptor = sample_descriptor();

        let handle = submit(backend.clone(), &descriptor, SubmitOptions::default(), &NullProgressSink)
            .await
            .unwrap();

        assert_eq!(handle.job_name(), &descriptor.job_name);
        assert!(handle.arn().unwrap().ends_with("u-frcnn-01-01-2021-00-00"));
        assert_eq!(backend.created.lock().unwrap().len(), 1);
        assert_eq!(*backend.describes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_descriptor_is_never_submitted() {
        let backend = Arc::new(ScriptedSubmitter::default());
        let mut descriptor = sample_descriptor();
        descriptor.training.ls = 1.5;

        let err = submit(backend.clone(), &descriptor, SubmitOptions::default(), &NullProgressSink).await;
        assert!(matches!(err, Err(LaunchError::InvalidConfig(_))));
        assert!(backend.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_error_is_surfaced_verbatim() {
        let message = "An error occurred (ResourceLimitExceeded) when calling the CreateTrainingJob operation";
        let backend = Arc::new(ScriptedSubmitter { reject_with: Some(message.to_string()), ..Default::default() });

        let err = submit(backend, &sample_descriptor(), SubmitOptions::default(), &NullProgressSink)
            .await
            .unwrap_err();
        match err {
            LaunchError::Submission { message: m, .. } => assert_eq!(m, message),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_polls_until_terminal_and_reports_changes() {
        let backend = Arc::new(ScriptedSubmitter::default());
        backend.statuses.lock().unwrap().extend([
            JobStatus::InProgress { secondary: Some("Starting".to_string()) },
            JobStatus::InProgress { secondary: Some("Starting".to_string()) },
            JobStatus::InProgress { secondary: Some("Training".to_string()) },
            JobStatus::Failed { reason: "AlgorithmError".to_string() },
        ]);
        let sink = RecordingSink::default();
        let options = SubmitOptions { wait: true, poll_interval: Duration::from_secs(60) };

        submit(backend.clone(), &sample_descriptor(), options, &sink).await.unwrap();

        assert_eq!(*backend.describes.lock().unwrap(), 4);
        let events = sink.0.lock().unwrap();
        // submitted, two distinct in-progress states, finished
        assert_eq!(events.len(), 4);
        assert!(matches!(
            events.last(),
            Some(LaunchEvent::Finished { status: JobStatus::Failed { .. }, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_never_polls_faster_than_minimum() {
        let backend = Arc::new(ScriptedSubmitter::default());
        backend.statuses.lock().unwrap().extend([
            JobStatus::InProgress { secondary: None },
            JobStatus::InProgress { secondary: None },
            JobStatus::Completed,
        ]);
        let handle = JobHandle::attach(backend.clone(), JobName("u-frcnn-01-01-2021-00-00".to_string()));

        let start = tokio::time::Instant::now();
        let status = handle.wait(Duration::ZERO, &NullProgressSink).await.unwrap();

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(*backend.describes.lock().unwrap(), 3);
        assert!(start.elapsed() >= MIN_POLL_INTERVAL * 2);
    }

    #[tokio::test]
    async fn test_cancel_goes_through_backend() {
        let backend = Arc::new(ScriptedSubmitter::default());
        let handle = JobHandle::attach(backend.clone(), JobName("u-frcnn-01-01-2021-00-00".to_string()));
        handle.cancel().await.unwrap();
        assert_eq!(backend.stopped.lock().unwrap().as_slice(), &[JobName("u-frcnn-01-01-2021-00-00".to_string())]);
        assert!(handle.status().await.unwrap().is_terminal());
    }
}
