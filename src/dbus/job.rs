//! Waiting for a systemd job to finish
//!
//! systemd answers StartTransientUnit with a job path right away and reports
//! the outcome later through a JobRemoved signal. Exactly one such signal is
//! expected per job, so waiting is a single-shot future over the signal stream.

use std::fmt;
use std::time::Duration;

use futures_lite::{Stream, StreamExt};

use super::RegistrarError;

/// Terminal result string carried by JobRemoved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Done,
    Canceled,
    Timeout,
    Failed,
    Dependency,
    Skipped,
    /// Anything systemd may add later; always a failure
    Other(String),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Done)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobResult::Done => "done",
            JobResult::Canceled => "canceled",
            JobResult::Timeout => "timeout",
            JobResult::Failed => "failed",
            JobResult::Dependency => "dependency",
            JobResult::Skipped => "skipped",
            JobResult::Other(s) => s,
        }
    }
}

impl From<&str> for JobResult {
    fn from(s: &str) -> Self {
        match s {
            "done" => JobResult::Done,
            "canceled" => JobResult::Canceled,
            "timeout" => JobResult::Timeout,
            "failed" => JobResult::Failed,
            "dependency" => JobResult::Dependency,
            "skipped" => JobResult::Skipped,
            other => JobResult::Other(other.to_string()),
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of one JobRemoved signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub id: u32,
    /// Job object path, e.g. `/org/freedesktop/systemd1/job/42`
    pub job: String,
    pub unit: String,
    pub result: JobResult,
}

/// Wait for the JobRemoved belonging to `job`.
///
/// Signals for other jobs are skipped. Fails if the result is not `done`, if
/// the stream ends first, or after `timeout`.
pub async fn await_job<S>(
    jobs: S,
    unit: &str,
    job: &str,
    timeout: Duration,
) -> Result<JobOutcome, RegistrarError>
where
    S: Stream<Item = JobOutcome> + Unpin,
{
    let wait = async {
        let mut jobs = jobs;
        while let Some(outcome) = jobs.next().await {
            if outcome.job == job {
                return Some(outcome);
            }
            log::trace!("Ignoring JobRemoved for {} ({})", outcome.job, outcome.unit);
        }
        None
    };

    let outcome = match tokio::time::timeout(timeout, wait).await {
        Ok(Some(outcome)) => outcome,
        Ok(None) => {
            return Err(RegistrarError::Closed {
                unit: unit.to_string(),
                job: job.to_string(),
            })
        }
        Err(_) => {
            return Err(RegistrarError::Timeout {
                unit: unit.to_string(),
                job: job.to_string(),
                timeout,
            })
        }
    };

    if !outcome.result.is_success() {
        return Err(RegistrarError::JobFailed {
            unit: unit.to_string(),
            job_id: outcome.id,
            result: outcome.result,
        });
    }

    log::debug!("Job {} for {} finished: {}", outcome.id, unit, outcome.result);
    Ok(outcome)
}
