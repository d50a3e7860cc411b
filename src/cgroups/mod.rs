//! Cgroup v2 filesystem access
//!
//! Every operation is a single write (or read) against the unified hierarchy:
//!
//! /sys/fs/cgroup/
//! └── workload.slice/
//!     └── app.scope/                  # transient scope, Delegate=yes
//!         ├── cgroup.subtree_control  # "+cpu +memory +io"
//!         ├── manager/cgroup.procs    # supervising process
//!         └── worker/cgroup.procs     # workload
//!
//! Nothing here keeps an in-memory picture of the hierarchy. The kernel is the
//! only state store, so membership is always read back from `cgroup.procs`.

mod controller;
#[cfg(test)]
pub(crate) mod fake;
mod path;

pub use controller::{subtree_control_line, Controller, UnknownController};
pub use path::slice_path;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

const PROCS_FILE: &str = "cgroup.procs";
const SUBTREE_CONTROL_FILE: &str = "cgroup.subtree_control";
const CONTROLLERS_FILE: &str = "cgroup.controllers";

/// Low-level operations on a cgroup v2 hierarchy.
///
/// Implementations perform no retries. A failing call leaves whatever the
/// previous calls did in place; the caller decides what a partial result means.
pub trait CgroupFs {
    /// Root of the unified hierarchy this adapter writes to
    fn root(&self) -> &Path;

    /// Create `parent/name`. Fails if it already exists.
    fn create_subgroup(&self, parent: &Path, name: &str) -> Result<PathBuf, CgroupError>;

    /// Move `pid` into `cgroup` by writing it to `cgroup.procs`.
    fn migrate_process(&self, cgroup: &Path, pid: u32) -> Result<(), CgroupError>;

    /// Enable `controllers` for the children of `cgroup`.
    fn enable_controllers(&self, cgroup: &Path, controllers: &[Controller])
        -> Result<(), CgroupError>;

    /// Processes directly attached to `cgroup`
    fn read_procs(&self, cgroup: &Path) -> Result<Vec<u32>, CgroupError>;

    /// Controllers currently enabled for the children of `cgroup`
    fn read_subtree_control(&self, cgroup: &Path) -> Result<Vec<Controller>, CgroupError>;

    /// Names of the child cgroups of `cgroup`, sorted
    fn subgroups(&self, cgroup: &Path) -> Result<Vec<String>, CgroupError>;

    /// Cgroup path of a unit in a slice, e.g. `<root>/workload.slice/app.scope`
    fn unit_path(&self, slice: &str, unit: &str) -> PathBuf {
        self.root().join(slice_path(slice)).join(unit)
    }
}

/// Adapter for the kernel's cgroupfs
#[derive(Debug, Clone)]
pub struct CgroupManager {
    root: PathBuf,
}

impl CgroupManager {
    /// Adapter rooted at `/sys/fs/cgroup`. Fails unless cgroup2 is mounted there.
    pub fn new() -> Result<Self, CgroupError> {
        Self::open(CGROUP_ROOT)
    }

    /// Adapter rooted at `root`, which must be a unified hierarchy
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CgroupError> {
        let manager = Self::with_root(root);

        // Verify cgroup2 is mounted
        if !manager.root.join(CONTROLLERS_FILE).exists() {
            return Err(CgroupError::NotUnified(manager.root));
        }

        Ok(manager)
    }

    /// Adapter rooted at an arbitrary directory, without any mount check
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Controllers the parent made available to `cgroup` (`cgroup.controllers`)
    pub fn available_controllers(&self, cgroup: &Path) -> Result<Vec<Controller>, CgroupError> {
        read_controller_file(&cgroup.join(CONTROLLERS_FILE))
    }
}

impl CgroupFs for CgroupManager {
    fn root(&self) -> &Path {
        &self.root
    }

    fn create_subgroup(&self, parent: &Path, name: &str) -> Result<PathBuf, CgroupError> {
        let path = parent.join(name);

        fs::DirBuilder::new()
            .mode(0o755)
            .create(&path)
            .map_err(|source| CgroupError::DirectoryCreate {
                path: path.clone(),
                source,
            })?;

        log::debug!("Created cgroup: {}", path.display());
        Ok(path)
    }

    fn migrate_process(&self, cgroup: &Path, pid: u32) -> Result<(), CgroupError> {
        let procs_file = cgroup.join(PROCS_FILE);
        write_once(&procs_file, format!("{}\n", pid).as_bytes()).map_err(|source| {
            CgroupError::Migration {
                pid,
                path: cgroup.to_path_buf(),
                source,
            }
        })?;

        log::debug!("Moved PID {} to {}", pid, cgroup.display());
        Ok(())
    }

    fn enable_controllers(
        &self,
        cgroup: &Path,
        controllers: &[Controller],
    ) -> Result<(), CgroupError> {
        let line = subtree_control_line(controllers);
        let file = cgroup.join(SUBTREE_CONTROL_FILE);
        write_once(&file, format!("{}\n", line).as_bytes()).map_err(|source| {
            CgroupError::ControllerEnable {
                path: cgroup.to_path_buf(),
                controllers: line.clone(),
                source,
            }
        })?;

        log::debug!("Wrote '{}' to {}", line, file.display());
        Ok(())
    }

    fn read_procs(&self, cgroup: &Path) -> Result<Vec<u32>, CgroupError> {
        let procs_file = cgroup.join(PROCS_FILE);
        let content = read(&procs_file)?;

        let pids = content
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect();

        Ok(pids)
    }

    fn read_subtree_control(&self, cgroup: &Path) -> Result<Vec<Controller>, CgroupError> {
        read_controller_file(&cgroup.join(SUBTREE_CONTROL_FILE))
    }

    fn subgroups(&self, cgroup: &Path) -> Result<Vec<String>, CgroupError> {
        let entries = fs::read_dir(cgroup).map_err(|source| CgroupError::Read {
            path: cgroup.to_path_buf(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CgroupError::Read {
                path: cgroup.to_path_buf(),
                source,
            })?;
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        Ok(names)
    }
}

/// Append `data` to a control file with a single write(2).
///
/// cgroupfs parses each write on its own, so the buffer must never be split.
fn write_once(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    let written = file.write(data)?;
    if written != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write to {} ({} of {} bytes)", path.display(), written, data.len()),
        ));
    }
    Ok(())
}

fn read(path: &Path) -> Result<String, CgroupError> {
    fs::read_to_string(path).map_err(|source| CgroupError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a space separated controller list; unknown names are skipped
fn read_controller_file(path: &Path) -> Result<Vec<Controller>, CgroupError> {
    let content = read(path)?;
    Ok(content
        .split_whitespace()
        .filter_map(|name| name.trim_start_matches('+').parse().ok())
        .collect())
}

#[derive(Debug, thiserror::Error)]
pub enum CgroupError {
    #[error("cgroup v2 not mounted at {}", .0.display())]
    NotUnified(PathBuf),

    #[error("Failed to create cgroup {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to migrate PID {pid} to cgroup {}: {source}", path.display())]
    Migration {
        pid: u32,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to enable controllers '{controllers}' on {}: {source}", path.display())]
    ControllerEnable {
        path: PathBuf,
        controllers: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
