use crate::naming::JobName;
use crate::submitter::JobStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LaunchEvent {
    Submitted { job_name: JobName, arn: Option<String> },
    Status { job_name: JobName, status: JobStatus },
    Finished { job_name: JobName, status: JobStatus },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: LaunchEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: LaunchEvent) {
        match event {
            LaunchEvent::Submitted { job_name, arn: Some(arn) } => println!("[job:{job_name}] submitted ({arn})"),
            LaunchEvent::Submitted { job_name, arn: None } => println!("[job:{job_name}] submitted"),
            LaunchEvent::Status { job_name, status } => println!("[job:{job_name}] {status}"),
            LaunchEvent::Finished { job_name, status } => println!("[job:{job_name}] finished: {status}"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: LaunchEvent) {}
}
