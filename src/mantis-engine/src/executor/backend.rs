//! Contract between job instructions and a distributed backend.

use async_trait::async_trait;
use common_error::MantisResult;

use crate::instructions::{JobDescriptor, JobStatus};

/// A backend that runs distributed jobs.
///
/// `submit` is the suspension point of job instructions: it resolves once
/// the job has finished and its output datasets are written under
/// [`JobDescriptor::output_dir`].
#[async_trait]
pub trait DistributedBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Run one job to completion.
    ///
    /// Failures that may succeed on resubmission are reported as transient
    /// backend errors.
    async fn submit(&self, job: JobDescriptor) -> MantisResult<JobStatus>;

    /// Abort a running job. Unknown ids are ignored.
    async fn cancel(&self, job_id: &str) -> MantisResult<()>;
}
