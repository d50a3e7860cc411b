//! Workload process spawning
//!
//! The workload is opaque: all the bootstrap needs is its pid right after
//! spawn and a way to stop it later.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

/// Command run when none is given
pub const DEFAULT_COMMAND: &[&str] = &["sleep", "infinity"];

/// A running child process
pub struct Workload {
    child: Child,
    pid: u32,
    program: String,
}

impl Workload {
    /// Spawn `argv[0]` with the remaining arguments
    pub fn spawn<S: AsRef<str>>(argv: &[S]) -> Result<Self, SpawnError> {
        let (program, args) = match argv.split_first() {
            Some((program, args)) => (program.as_ref().to_string(), args),
            None => return Err(SpawnError::InvalidCommand(String::new())),
        };

        let mut cmd = Command::new(&program);
        cmd.args(args.iter().map(|a| a.as_ref()))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| SpawnError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child
            .id()
            .ok_or_else(|| SpawnError::NoPid(program.clone()))?;

        log::info!("Started workload {} (PID {})", program, pid);
        Ok(Self { child, pid, program })
    }

    /// Spawn a shell-quoted command line, e.g. `stress --cpu "2"`
    pub fn spawn_command_line(line: &str) -> Result<Self, SpawnError> {
        let argv = parse_command(line)?;
        Self::spawn(argv.as_slice())
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Send SIGTERM
    pub fn terminate(&self) -> Result<(), SpawnError> {
        self.signal(Signal::SIGTERM)
    }

    /// Send an arbitrary signal
    pub fn signal(&self, signal: Signal) -> Result<(), SpawnError> {
        kill(Pid::from_raw(self.pid as i32), signal).map_err(|source| SpawnError::Signal {
            pid: self.pid,
            signal,
            source,
        })
    }

    /// SIGKILL and reap
    pub async fn kill(&mut self) -> Result<(), SpawnError> {
        self.child.kill().await.map_err(SpawnError::Wait)
    }

    /// Wait for the workload to exit on its own
    pub async fn wait(&mut self) -> Result<ExitStatus, SpawnError> {
        self.child.wait().await.map_err(SpawnError::Wait)
    }

    /// SIGTERM, then SIGKILL if still running after `grace`
    pub async fn shutdown(&mut self, grace: Duration) -> Result<ExitStatus, SpawnError> {
        if let Some(status) = self.child.try_wait().map_err(SpawnError::Wait)? {
            return Ok(status);
        }

        self.terminate()?;
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status.map_err(SpawnError::Wait),
            Err(_) => {
                log::warn!(
                    "Workload {} (PID {}) ignored SIGTERM for {:?}, killing",
                    self.program,
                    self.pid,
                    grace
                );
                self.kill().await?;
                self.wait().await
            }
        }
    }
}

/// Split a command line into argv
fn parse_command(line: &str) -> Result<Vec<String>, SpawnError> {
    let parts = shlex::split(line).ok_or_else(|| SpawnError::InvalidCommand(line.to_string()))?;

    if parts.is_empty() {
        return Err(SpawnError::InvalidCommand(line.to_string()));
    }

    Ok(parts)
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Invalid command: {0:?}")]
    InvalidCommand(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Spawned {0} but it has no PID")]
    NoPid(String),

    #[error("Failed to send {signal} to PID {pid}: {source}")]
    Signal {
        pid: u32,
        signal: Signal,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to wait for workload: {0}")]
    Wait(#[source] io::Error),
}
