//! Registration, workload start and bootstrap in one sequence
//!
//! The workload is started only once systemd has put the caller into the new
//! scope, so the child inherits that membership. Migrating it to the worker
//! leaf then stays inside the delegated subtree, which is all an unprivileged
//! (`--user`) caller may write to.

use crate::bootstrap::{BootstrapError, DelegatedHierarchy, HierarchyBootstrapper};
use crate::cgroups::CgroupFs;
use crate::config::BootstrapConfig;
use crate::dbus::{RegisteredScope, ScopeRegistrar};
use crate::workload::Workload;

/// A scope split into manager/worker with the workload running in its leaf
pub struct Delegated {
    pub scope: RegisteredScope,
    pub hierarchy: DelegatedHierarchy,
    pub workload: Workload,
}

/// Register the scope holding `manager_pid`, then start the workload and
/// build the hierarchy around both.
///
/// The only await point is the registration job. Dropping the future there
/// leaves no workload behind; a scope whose job was already queued is the
/// caller's to stop.
pub async fn launch<F: CgroupFs>(
    registrar: &ScopeRegistrar,
    cgroups: &F,
    config: &BootstrapConfig,
    manager_pid: u32,
) -> Result<Delegated, BootstrapError> {
    let scope = config.scope.clone().pid(manager_pid);
    let registered = registrar.register(&scope).await?;

    let workload = config.workload.spawn()?;
    let worker_pid = workload.pid();

    let hierarchy = HierarchyBootstrapper::new(cgroups)
        .with_controllers(config.controllers.clone())
        .bootstrap(&registered, manager_pid, worker_pid)?;
    hierarchy.verify(cgroups, manager_pid, worker_pid)?;

    Ok(Delegated {
        scope: registered,
        hierarchy,
        workload,
    })
}
