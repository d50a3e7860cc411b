//! scopedeleg - delegated cgroup v2 hierarchy bootstrap
//!
//! Runs a workload under its own resource-accounting boundary, separated from
//! the process supervising it:
//! - Registers a transient `Delegate=yes` scope with systemd over D-Bus
//! - Splits the scope into `manager` and `worker` leaves
//! - Moves the caller and the workload into their leaves
//! - Enables the delegated controllers on the now empty scope
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    scopedeleg                     │
//! ├──────────────────────────────────────────────────┤
//! │  Workload  │  Scope Registrar  │  Bootstrapper   │
//! ├──────────────────────────────────────────────────┤
//! │             Cgroup filesystem adapter             │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod bootstrap;
pub mod cgroups;
pub mod config;
pub mod dbus;
pub mod launch;
pub mod workload;

pub use bootstrap::{BootstrapError, DelegatedHierarchy, HierarchyBootstrapper, Role};
pub use cgroups::{CgroupError, CgroupFs, CgroupManager, Controller};
pub use config::{BootstrapConfig, ConfigError, WorkloadCommand};
pub use dbus::{Bus, RegisteredScope, RegistrarError, ScopeProperties, ScopeRegistrar};
pub use launch::{launch, Delegated};
pub use workload::{SpawnError, Workload};
