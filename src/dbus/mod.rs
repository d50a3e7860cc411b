//! Transient scope registration with systemd over D-Bus
//!
//! A scope is created with StartTransientUnit in "replace" mode, with the
//! caller's PIDs as initial members, accounting switched on and `Delegate=yes`
//! so the caller may manage the sub-hierarchy itself. The call only queues a
//! job; the scope's cgroup exists once the matching JobRemoved reports "done".

mod job;
mod manager;
mod registrar;

pub use job::{await_job, JobOutcome, JobResult};
pub use manager::{ManagerProxy, Properties};
pub use registrar::{Bus, RegisteredScope, ScopeProperties, ScopeRegistrar};

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RegistrarError {
    #[error("Failed to establish bus connection to systemd ({bus} bus): {source}")]
    Connection {
        bus: Bus,
        #[source]
        source: zbus::Error,
    },

    #[error("Failed to start {unit}: {source}")]
    Request {
        unit: String,
        #[source]
        source: zbus::Error,
    },

    #[error("Failed to start {unit}, job (id: {job_id}) result is: {result}")]
    JobFailed {
        unit: String,
        job_id: u32,
        result: JobResult,
    },

    #[error("Timed out after {timeout:?} waiting for job {job} of {unit}")]
    Timeout {
        unit: String,
        job: String,
        timeout: Duration,
    },

    #[error("Job notifications ended before job {job} of {unit} finished")]
    Closed { unit: String, job: String },

    #[error("Failed to stop {unit}: {source}")]
    Stop {
        unit: String,
        #[source]
        source: zbus::Error,
    },
}

impl RegistrarError {
    /// True when the bus itself could not be reached
    pub fn is_connection(&self) -> bool {
        matches!(self, RegistrarError::Connection { .. })
    }
}
