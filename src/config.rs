//! Settings for one bootstrap run

use std::path::PathBuf;
use std::time::Duration;

use crate::cgroups::{Controller, CGROUP_ROOT};
use crate::dbus::{Bus, ScopeProperties, ScopeRegistrar};
use crate::workload::{SpawnError, Workload, DEFAULT_COMMAND};

pub const DEFAULT_SLICE: &str = "workload.slice";
pub const DEFAULT_SCOPE: &str = "app.scope";
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);
/// Time between SIGTERM and SIGKILL when stopping the workload
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

const SCOPE_SUFFIX: &str = ".scope";
const SLICE_SUFFIX: &str = ".slice";

/// How to start the workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadCommand {
    Argv(Vec<String>),
    /// Shell-quoted line, split before spawning
    CommandLine(String),
}

impl WorkloadCommand {
    pub fn spawn(&self) -> Result<Workload, SpawnError> {
        match self {
            WorkloadCommand::Argv(argv) => Workload::spawn(argv.as_slice()),
            WorkloadCommand::CommandLine(line) => Workload::spawn_command_line(line),
        }
    }
}

impl Default for WorkloadCommand {
    fn default() -> Self {
        WorkloadCommand::Argv(DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Scope to register; the caller's pid is added at run time
    pub scope: ScopeProperties,
    pub bus: Bus,
    pub cgroup_root: PathBuf,
    pub controllers: Vec<Controller>,
    pub job_timeout: Duration,
    /// How long the workload runs before it is stopped
    pub duration: Duration,
    pub grace: Duration,
    pub workload: WorkloadCommand,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            scope: ScopeProperties::new(DEFAULT_SCOPE, DEFAULT_SLICE),
            bus: Bus::System,
            cgroup_root: PathBuf::from(CGROUP_ROOT),
            controllers: Controller::DEFAULT_DELEGATED.to_vec(),
            job_timeout: ScopeRegistrar::DEFAULT_JOB_TIMEOUT,
            duration: DEFAULT_DURATION,
            grace: DEFAULT_GRACE,
            workload: WorkloadCommand::default(),
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_unit_name(&self.scope.unit, SCOPE_SUFFIX) {
            return Err(ConfigError::ScopeName(self.scope.unit.clone()));
        }
        if !is_unit_name(&self.scope.slice, SLICE_SUFFIX) {
            return Err(ConfigError::SliceName(self.scope.slice.clone()));
        }

        if !self.scope.delegate {
            return Err(ConfigError::NotDelegated);
        }

        if self.controllers.is_empty() {
            return Err(ConfigError::NoControllers);
        }
        for (i, c) in self.controllers.iter().enumerate() {
            if self.controllers[..i].contains(c) {
                return Err(ConfigError::DuplicateController(*c));
            }
        }

        if self.job_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        match &self.workload {
            WorkloadCommand::Argv(argv) if argv.is_empty() => Err(ConfigError::NoWorkload),
            WorkloadCommand::CommandLine(line) if line.trim().is_empty() => {
                Err(ConfigError::NoWorkload)
            }
            _ => Ok(()),
        }
    }
}

/// `name` must be `<stem><suffix>` with a non-empty stem and no path separators
fn is_unit_name(name: &str, suffix: &str) -> bool {
    match name.strip_suffix(suffix) {
        Some(stem) => !stem.is_empty() && !name.contains('/'),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid scope name '{0}' (expected <name>.scope)")]
    ScopeName(String),

    #[error("Invalid slice name '{0}' (expected <name>.slice)")]
    SliceName(String),

    #[error("Scope must be delegated to split it into sub-cgroups")]
    NotDelegated,

    #[error("No controllers to delegate")]
    NoControllers,

    #[error("Controller '{0}' listed more than once")]
    DuplicateController(Controller),

    #[error("Job timeout must be greater than zero")]
    ZeroTimeout,

    #[error("No workload command given")]
    NoWorkload,
}
