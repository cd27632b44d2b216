use crate::naming::JobName;

const PROJECT_PREFIX: &str = "faster-rcnn";

/// Remote storage layout for one bucket.
///
/// Layout is `s3://<bucket>/faster-rcnn/{data/<channel>/, outputs/<date>/output/<job_name>/}`.
/// Paths are built as strings only; nothing here talks to the storage service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Layout {
    bucket: String,
}

impl S3Layout {
    /// Accepts `my-bucket`, `s3://my-bucket` or `s3://my-bucket/`.
    #[must_use]
    pub fn new(bucket: &str) -> Self {
        let bucket = bucket.trim();
        let bucket = bucket.strip_prefix("s3://").unwrap_or(bucket);
        Self { bucket: bucket.trim_matches('/').to_string() }
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[must_use]
    pub fn root(&self) -> String {
        format!("s3://{}/{PROJECT_PREFIX}", self.bucket)
    }

    /// Prefix a data channel is read from. Always ends with `/`.
    #[must_use]
    pub fn data_channel_uri(&self, channel: &str) -> String {
        format!("{}/data/{}/", self.root(), channel.trim_matches('/'))
    }

    #[must_use]
    pub fn outputs_for_date(&self, date: &str) -> String {
        format!("{}/outputs/{}", self.root(), date.trim_matches('/'))
    }

    #[must_use]
    pub fn output_path(&self, date: &str, job_name: &JobName) -> String {
        format!("{}/output/{}", self.outputs_for_date(date), job_name)
    }

    /// Where the packed training source is uploaded for a job.
    #[must_use]
    pub fn source_archive_uri(&self, date: &str, job_name: &JobName) -> String {
        source_archive_under(&self.output_path(date, job_name))
    }
}

/// `<output_path>/source/sourcedir.tar.gz`.
#[must_use]
pub fn source_archive_under(output_path: &str) -> String {
    format!("{}/source/sourcedir.tar.gz", output_path.trim_end_matches('/'))
}

/// Remote prefix under which the service writes model artifacts and logs for a job.
///
/// No existence or collision check is made; two jobs with the same name and
/// date share the prefix.
#[must_use]
pub fn build_output_location(bucket: &str, date: &str, job_name: &JobName) -> String {
    S3Layout::new(bucket).output_path(date, job_name)
}
