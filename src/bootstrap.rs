//! Manager/worker split of a delegated scope
//!
//! cgroup v2 refuses to enable controllers for the children of a cgroup that
//! still has processes attached to it directly. A freshly registered scope
//! holds the caller itself, so the scope is first split into two leaves:
//!
//! ```text
//! app.scope/            (no processes, +cpu +memory +io)
//! ├── manager/          (caller)
//! └── worker/           (workload)
//! ```
//!
//! Steps run strictly in order and the first failure aborts. Nothing is rolled
//! back: a half-built hierarchy is not safe to host the workload, so callers
//! treat any error as fatal.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::cgroups::{subtree_control_line, CgroupError, CgroupFs, Controller};
use crate::config::ConfigError;
use crate::dbus::{RegisteredScope, RegistrarError};
use crate::workload::SpawnError;

/// Role of a leaf under the scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Manager,
    Worker,
}

impl Role {
    /// Directory name of the leaf
    pub fn name(self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a completed bootstrap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedHierarchy {
    pub scope: PathBuf,
    pub manager: PathBuf,
    pub worker: PathBuf,
    pub controllers: Vec<Controller>,
}

impl DelegatedHierarchy {
    pub fn leaf(&self, role: Role) -> &Path {
        match role {
            Role::Manager => &self.manager,
            Role::Worker => &self.worker,
        }
    }

    /// Re-read the hierarchy from the filesystem and check that the scope is
    /// an empty container with exactly the two leaves, each holding its pid.
    pub fn verify(
        &self,
        cgroups: &impl CgroupFs,
        manager_pid: u32,
        worker_pid: u32,
    ) -> Result<(), BootstrapError> {
        let fail = |reason: String| BootstrapError::Verification {
            scope: self.scope.clone(),
            reason,
        };

        let attached = cgroups.read_procs(&self.scope)?;
        if !attached.is_empty() {
            return Err(fail(format!("processes still attached to scope: {:?}", attached)));
        }

        let children = cgroups.subgroups(&self.scope)?;
        if children != [Role::Manager.name(), Role::Worker.name()] {
            return Err(fail(format!("unexpected sub-cgroups: {:?}", children)));
        }

        for (role, pid, other) in [
            (Role::Manager, manager_pid, worker_pid),
            (Role::Worker, worker_pid, manager_pid),
        ] {
            let procs = cgroups.read_procs(self.leaf(role))?;
            if !procs.contains(&pid) {
                return Err(fail(format!("PID {} missing from {} leaf", pid, role)));
            }
            if procs.contains(&other) {
                return Err(fail(format!("PID {} found in {} leaf", other, role)));
            }
        }

        let enabled = cgroups.read_subtree_control(&self.scope)?;
        if let Some(missing) = self.controllers.iter().find(|c| !enabled.contains(c)) {
            return Err(fail(format!("controller {} not enabled", missing)));
        }

        Ok(())
    }
}

/// Builds the manager/worker hierarchy under a registered scope
pub struct HierarchyBootstrapper<'a, F: CgroupFs> {
    cgroups: &'a F,
    controllers: Vec<Controller>,
}

impl<'a, F: CgroupFs> HierarchyBootstrapper<'a, F> {
    /// Bootstrapper delegating cpu, memory and io
    pub fn new(cgroups: &'a F) -> Self {
        Self {
            cgroups,
            controllers: Controller::DEFAULT_DELEGATED.to_vec(),
        }
    }

    pub fn with_controllers(mut self, controllers: Vec<Controller>) -> Self {
        self.controllers = controllers;
        self
    }

    /// Split `scope` into leaves and enable the delegated controllers.
    ///
    /// `manager_pid` is normally the caller's own pid and must currently sit
    /// directly in the scope; `worker_pid` is the workload. Both are moved
    /// before the controllers are enabled.
    pub fn bootstrap(
        &self,
        scope: &RegisteredScope,
        manager_pid: u32,
        worker_pid: u32,
    ) -> Result<DelegatedHierarchy, BootstrapError> {
        let scope_path = scope.cgroup_path(self.cgroups);
        log::info!("Bootstrapping delegated hierarchy in {}", scope_path.display());

        let manager = self.cgroups.create_subgroup(&scope_path, Role::Manager.name())?;
        let worker = self.cgroups.create_subgroup(&scope_path, Role::Worker.name())?;
        log::info!("Created sub-cgroups {} and {}", manager.display(), worker.display());

        self.cgroups.migrate_process(&worker, worker_pid)?;
        log::info!("Migrated workload (PID {}) to {}", worker_pid, worker.display());

        self.cgroups.migrate_process(&manager, manager_pid)?;
        log::info!("Migrated manager (PID {}) to {}", manager_pid, manager.display());

        // The scope has no direct members left
        self.cgroups.enable_controllers(&scope_path, &self.controllers)?;
        log::info!(
            "Enabled '{}' on {}",
            subtree_control_line(&self.controllers),
            scope_path.display()
        );

        Ok(DelegatedHierarchy {
            scope: scope_path,
            manager,
            worker,
            controllers: self.controllers.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Registrar(#[from] RegistrarError),

    #[error(transparent)]
    Cgroup(#[from] CgroupError),

    #[error("Hierarchy under {} is not as expected: {reason}", scope.display())]
    Verification { scope: PathBuf, reason: String },

    #[error(transparent)]
    Workload(#[from] SpawnError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Interrupted while waiting for {0} to start")]
    Interrupted(String),

    #[error("Failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

impl BootstrapError {
    /// Short name of the step that failed
    pub fn step(&self) -> &'static str {
        match self {
            BootstrapError::Registrar(RegistrarError::Connection { .. }) => "connect to systemd",
            BootstrapError::Registrar(RegistrarError::Stop { .. }) => "stop scope",
            BootstrapError::Registrar(_) => "register scope",
            BootstrapError::Cgroup(CgroupError::NotUnified(_)) => "locate cgroup hierarchy",
            BootstrapError::Cgroup(CgroupError::DirectoryCreate { .. }) => "create sub-cgroup",
            BootstrapError::Cgroup(CgroupError::Migration { .. }) => "migrate process",
            BootstrapError::Cgroup(CgroupError::ControllerEnable { .. }) => "enable controllers",
            BootstrapError::Cgroup(CgroupError::Read { .. }) => "read cgroup state",
            BootstrapError::Verification { .. } => "verify hierarchy",
            BootstrapError::Workload(_) => "launch workload",
            BootstrapError::Config(_) => "validate configuration",
            BootstrapError::Interrupted(_) => "register scope",
            BootstrapError::Signals(_) => "install signal handlers",
        }
    }
}
