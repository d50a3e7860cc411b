//! Cgroup v2 controller names

use std::fmt;
use std::str::FromStr;

/// A cgroup v2 resource controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Controller {
    Cpu,
    Cpuset,
    Io,
    Memory,
    Pids,
    Hugetlb,
    Rdma,
    Misc,
}

impl Controller {
    /// Default set delegated to the scope's children
    pub const DEFAULT_DELEGATED: [Controller; 3] = [Controller::Cpu, Controller::Memory, Controller::Io];

    /// Name as it appears in `cgroup.controllers`
    pub fn name(self) -> &'static str {
        match self {
            Controller::Cpu => "cpu",
            Controller::Cpuset => "cpuset",
            Controller::Io => "io",
            Controller::Memory => "memory",
            Controller::Pids => "pids",
            Controller::Hugetlb => "hugetlb",
            Controller::Rdma => "rdma",
            Controller::Misc => "misc",
        }
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown cgroup controller: {0}")]
pub struct UnknownController(pub String);

impl FromStr for Controller {
    type Err = UnknownController;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Controller::Cpu),
            "cpuset" => Ok(Controller::Cpuset),
            "io" => Ok(Controller::Io),
            "memory" => Ok(Controller::Memory),
            "pids" => Ok(Controller::Pids),
            "hugetlb" => Ok(Controller::Hugetlb),
            "rdma" => Ok(Controller::Rdma),
            "misc" => Ok(Controller::Misc),
            other => Err(UnknownController(other.to_string())),
        }
    }
}

/// Build the `cgroup.subtree_control` payload enabling `controllers`,
/// e.g. `+cpu +memory +io`
pub fn subtree_control_line(controllers: &[Controller]) -> String {
    controllers
        .iter()
        .map(|c| format!("+{}", c))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known() {
        assert_eq!("memory".parse::<Controller>(), Ok(Controller::Memory));
        assert_eq!("io".parse::<Controller>(), Ok(Controller::Io));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            "blkio".parse::<Controller>(),
            Err(UnknownController("blkio".into()))
        );
    }

    #[test]
    fn test_subtree_control_line() {
        assert_eq!(
            subtree_control_line(&Controller::DEFAULT_DELEGATED),
            "+cpu +memory +io"
        );
        assert_eq!(subtree_control_line(&[Controller::Pids]), "+pids");
        assert_eq!(subtree_control_line(&[]), "");
    }
}
