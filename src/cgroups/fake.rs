//! In-memory cgroup hierarchy for tests
//!
//! Enforces the kernel rules the bootstrap depends on: mkdir needs an existing
//! parent and a free name, a pid lives in exactly one cgroup, controllers can
//! only be enabled on a cgroup without attached processes, and a cgroup with
//! enabled subtree controllers cannot take processes.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;

use super::{CgroupError, CgroupFs, Controller, CGROUP_ROOT};

#[derive(Debug, Default)]
struct FakeGroup {
    procs: Vec<u32>,
    subtree_control: Vec<Controller>,
}

pub struct FakeCgroupFs {
    root: PathBuf,
    groups: RefCell<BTreeMap<PathBuf, FakeGroup>>,
    available: Vec<Controller>,
    /// Every successful mutating call, in order, e.g. `mkdir manager`
    log: RefCell<Vec<String>>,
}

impl FakeCgroupFs {
    pub fn new() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(PathBuf::from(CGROUP_ROOT), FakeGroup::default());
        Self {
            root: PathBuf::from(CGROUP_ROOT),
            groups: RefCell::new(groups),
            available: vec![
                Controller::Cpu,
                Controller::Memory,
                Controller::Io,
                Controller::Pids,
            ],
            log: RefCell::new(Vec::new()),
        }
    }

    /// Restrict which controllers the scope's parent offers
    pub fn with_available(mut self, available: Vec<Controller>) -> Self {
        self.available = available;
        self
    }

    /// Simulate systemd creating a scope (and its slices) holding `pids`
    pub fn register_scope(&self, slice: &str, scope: &str, pids: &[u32]) -> PathBuf {
        let path = self.unit_path(slice, scope);
        let mut groups = self.groups.borrow_mut();
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            if ancestor.starts_with(&self.root) {
                groups.entry(ancestor.to_path_buf()).or_default();
            }
        }
        for group in groups.values_mut() {
            group.procs.retain(|p| !pids.contains(p));
        }
        if let Some(group) = groups.get_mut(&path) {
            group.procs.extend_from_slice(pids);
        }
        path
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.groups.borrow().contains_key(path)
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn record(&self, call: String) {
        self.log.borrow_mut().push(call);
    }
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl CgroupFs for FakeCgroupFs {
    fn root(&self) -> &Path {
        &self.root
    }

    fn create_subgroup(&self, parent: &Path, name: &str) -> Result<PathBuf, CgroupError> {
        let path = parent.join(name);
        let mut groups = self.groups.borrow_mut();

        let failure = if !groups.contains_key(parent) {
            Some(io::Error::from(Errno::ENOENT))
        } else if groups.contains_key(&path) {
            Some(io::Error::from(Errno::EEXIST))
        } else {
            None
        };
        if let Some(source) = failure {
            return Err(CgroupError::DirectoryCreate { path, source });
        }

        groups.insert(path.clone(), FakeGroup::default());
        drop(groups);
        self.record(format!("mkdir {}", name));
        Ok(path)
    }

    fn migrate_process(&self, cgroup: &Path, pid: u32) -> Result<(), CgroupError> {
        let mut groups = self.groups.borrow_mut();

        let failure = match groups.get(cgroup) {
            None => Some(Errno::ENOENT),
            Some(g) if !g.subtree_control.is_empty() && cgroup != self.root => Some(Errno::EBUSY),
            Some(_) => None,
        };
        if let Some(errno) = failure {
            return Err(CgroupError::Migration {
                pid,
                path: cgroup.to_path_buf(),
                source: io::Error::from(errno),
            });
        }

        for group in groups.values_mut() {
            group.procs.retain(|p| *p != pid);
        }
        if let Some(group) = groups.get_mut(cgroup) {
            group.procs.push(pid);
        }
        drop(groups);
        self.record(format!("migrate {} {}", pid, name_of(cgroup)));
        Ok(())
    }

    fn enable_controllers(
        &self,
        cgroup: &Path,
        controllers: &[Controller],
    ) -> Result<(), CgroupError> {
        let mut groups = self.groups.borrow_mut();

        let failure = match groups.get(cgroup) {
            None => Some(Errno::ENOENT),
            Some(_) if controllers.iter().any(|c| !self.available.contains(c)) => {
                Some(Errno::ENOENT)
            }
            Some(g) if !g.procs.is_empty() && cgroup != self.root => Some(Errno::EBUSY),
            Some(_) => None,
        };
        if let Some(errno) = failure {
            return Err(CgroupError::ControllerEnable {
                path: cgroup.to_path_buf(),
                controllers: super::subtree_control_line(controllers),
                source: io::Error::from(errno),
            });
        }

        if let Some(group) = groups.get_mut(cgroup) {
            for c in controllers {
                if !group.subtree_control.contains(c) {
                    group.subtree_control.push(*c);
                }
            }
        }
        drop(groups);
        self.record(format!(
            "enable {} {}",
            name_of(cgroup),
            super::subtree_control_line(controllers)
        ));
        Ok(())
    }

    fn read_procs(&self, cgroup: &Path) -> Result<Vec<u32>, CgroupError> {
        self.groups
            .borrow()
            .get(cgroup)
            .map(|g| g.procs.clone())
            .ok_or_else(|| CgroupError::Read {
                path: cgroup.join("cgroup.procs"),
                source: io::Error::from(Errno::ENOENT),
            })
    }

    fn read_subtree_control(&self, cgroup: &Path) -> Result<Vec<Controller>, CgroupError> {
        self.groups
            .borrow()
            .get(cgroup)
            .map(|g| g.subtree_control.clone())
            .ok_or_else(|| CgroupError::Read {
                path: cgroup.join("cgroup.subtree_control"),
                source: io::Error::from(Errno::ENOENT),
            })
    }

    fn subgroups(&self, cgroup: &Path) -> Result<Vec<String>, CgroupError> {
        let groups = self.groups.borrow();
        if !groups.contains_key(cgroup) {
            return Err(CgroupError::Read {
                path: cgroup.to_path_buf(),
                source: io::Error::from(Errno::ENOENT),
            });
        }
        let names = groups
            .keys()
            .filter(|p| p.parent() == Some(cgroup))
            .map(|p| name_of(p))
            .collect();
        Ok(names)
    }
}
