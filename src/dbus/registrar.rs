//! Registering a transient, delegated scope

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use futures_lite::StreamExt;
use zbus::{zvariant::Value, Connection};

use super::job::{await_job, JobOutcome, JobResult};
use super::manager::{ManagerProxy, Properties};
use super::RegistrarError;
use crate::cgroups::CgroupFs;

/// Job mode for StartTransientUnit/StopUnit
const MODE_REPLACE: &str = "replace";

/// Which systemd instance to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bus {
    /// PID 1 on the system bus
    #[default]
    System,
    /// The per-user manager on the session bus
    User,
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bus::System => f.write_str("system"),
            Bus::User => f.write_str("user"),
        }
    }
}

/// Everything systemd needs to create the scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeProperties {
    /// Unit name, e.g. "app.scope"
    pub unit: String,
    /// Containing slice, e.g. "workload.slice"
    pub slice: String,
    pub description: Option<String>,
    /// Initial members of the scope
    pub pids: Vec<u32>,
    pub cpu_accounting: bool,
    pub io_accounting: bool,
    pub memory_accounting: bool,
    pub delegate: bool,
}

impl ScopeProperties {
    /// Delegated scope with CPU, IO and memory accounting on and no members yet
    pub fn new(unit: impl Into<String>, slice: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            slice: slice.into(),
            description: None,
            pids: Vec::new(),
            cpu_accounting: true,
            io_accounting: true,
            memory_accounting: true,
            delegate: true,
        }
    }

    pub fn pid(mut self, pid: u32) -> Self {
        self.pids.push(pid);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Unit properties in StartTransientUnit form
    pub fn to_properties(&self) -> Properties<'_> {
        let mut properties: Properties<'_> = vec![
            ("PIDs", Value::from(self.pids.clone())),
            ("Slice", Value::from(self.slice.as_str())),
        ];
        if let Some(description) = &self.description {
            properties.push(("Description", Value::from(description.as_str())));
        }
        properties.extend([
            ("CPUAccounting", Value::from(self.cpu_accounting)),
            ("IOAccounting", Value::from(self.io_accounting)),
            ("MemoryAccounting", Value::from(self.memory_accounting)),
            ("Delegate", Value::from(self.delegate)),
        ]);
        properties
    }
}

/// A scope systemd has finished creating.
///
/// One returned by [`ScopeRegistrar::register`] is proof that the scope's
/// cgroup exists, which is what makes it safe to start building leaves under
/// it. [`RegisteredScope::adopt`] carries no such proof: the caller vouches
/// that the scope is already running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredScope {
    unit: String,
    slice: String,
    job: Option<JobOutcome>,
}

impl RegisteredScope {
    /// Take over a delegated scope that was created by other tooling,
    /// e.g. `systemd-run --scope -p Delegate=yes`.
    ///
    /// Nothing is checked here. If the scope does not exist yet, the first
    /// leaf creation fails with [`CgroupError::DirectoryCreate`] and nothing
    /// is migrated.
    ///
    /// [`CgroupError::DirectoryCreate`]: crate::cgroups::CgroupError::DirectoryCreate
    pub fn adopt(unit: impl Into<String>, slice: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            slice: slice.into(),
            job: None,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn slice(&self) -> &str {
        &self.slice
    }

    /// The JobRemoved that confirmed creation; `None` for adopted scopes
    pub fn job(&self) -> Option<&JobOutcome> {
        self.job.as_ref()
    }

    /// The scope's cgroup directory under the adapter's root
    pub fn cgroup_path(&self, cgroups: &impl CgroupFs) -> PathBuf {
        cgroups.unit_path(&self.slice, &self.unit)
    }
}

/// Creates transient scopes through systemd's Manager interface
pub struct ScopeRegistrar {
    proxy: ManagerProxy<'static>,
    timeout: Duration,
}

impl ScopeRegistrar {
    pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connect to the system or user instance of systemd
    pub async fn connect(bus: Bus) -> Result<Self, RegistrarError> {
        let connection = match bus {
            Bus::System => Connection::system().await,
            Bus::User => Connection::session().await,
        }
        .map_err(|source| RegistrarError::Connection { bus, source })?;

        let registrar = Self::from_connection(&connection)
            .await
            .map_err(|source| RegistrarError::Connection { bus, source })?;

        log::debug!("Connected to systemd on the {} bus", bus);
        Ok(registrar)
    }

    /// Use an existing connection, e.g. a peer-to-peer link to a manager
    pub async fn from_connection(connection: &Connection) -> zbus::Result<Self> {
        let proxy = ManagerProxy::new(connection).await?;
        Ok(Self {
            proxy,
            timeout: Self::DEFAULT_JOB_TIMEOUT,
        })
    }

    /// How long to wait for the creation job before giving up
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create the scope and wait until systemd reports the job as done
    pub async fn register(&self, scope: &ScopeProperties) -> Result<RegisteredScope, RegistrarError> {
        let unit = scope.unit.as_str();
        let request = |source| RegistrarError::Request {
            unit: unit.to_string(),
            source,
        };

        if let Err(e) = self.proxy.subscribe().await {
            // Job signals still reach the client that queued the job
            log::warn!("Subscribe failed: {}", e);
        }

        // Listen before asking, or the JobRemoved may be gone before we look
        let signals = self.proxy.receive_job_removed().await.map_err(request)?;
        let jobs = Box::pin(signals.filter_map(|signal| match signal.args() {
            Ok(args) => Some(JobOutcome {
                id: *args.id(),
                job: args.job().to_string(),
                unit: args.unit().to_string(),
                result: JobResult::from(*args.result()),
            }),
            Err(e) => {
                log::warn!("Malformed JobRemoved signal: {}", e);
                None
            }
        }));

        let properties = scope.to_properties();
        log::info!(
            "StartTransientUnit: name={} slice={} pids={:?} delegate={}",
            unit,
            scope.slice,
            scope.pids,
            scope.delegate
        );
        let job = self
            .proxy
            .start_transient_unit(unit, MODE_REPLACE, &properties, &[])
            .await
            .map_err(request)?;

        let outcome = await_job(jobs, unit, job.as_str(), self.timeout).await?;
        log::info!("Scope {} started (job {})", unit, outcome.id);

        Ok(RegisteredScope {
            unit: unit.to_string(),
            slice: scope.slice.clone(),
            job: Some(outcome),
        })
    }

    /// Stop a unit. Queues the job and returns without waiting for it.
    pub async fn stop(&self, unit: &str) -> Result<(), RegistrarError> {
        let job = self
            .proxy
            .stop_unit(unit, MODE_REPLACE)
            .await
            .map_err(|source| RegistrarError::Stop {
                unit: unit.to_string(),
                source,
            })?;

        log::info!("Stopping {} (job {})", unit, job.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroups::CgroupManager;

    fn lookup<'a>(props: &'a Properties<'a>, key: &str) -> Option<&'a Value<'a>> {
        props.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    #[test]
    fn test_scope_properties_defaults() {
        let scope = ScopeProperties::new("app.scope", "workload.slice").pid(1234);
        assert_eq!(scope.pids, vec![1234]);
        assert!(scope.cpu_accounting && scope.io_accounting && scope.memory_accounting);
        assert!(scope.delegate);
        assert!(scope.description.is_none());
    }

    #[test]
    fn test_to_properties() {
        let scope = ScopeProperties::new("app.scope", "workload.slice").pid(1234);
        let props = scope.to_properties();

        let keys: Vec<&str> = props.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["PIDs", "Slice", "CPUAccounting", "IOAccounting", "MemoryAccounting", "Delegate"]
        );

        assert_eq!(lookup(&props, "Slice"), Some(&Value::from("workload.slice")));
        assert_eq!(lookup(&props, "Delegate"), Some(&Value::Bool(true)));
        assert_eq!(lookup(&props, "CPUAccounting"), Some(&Value::Bool(true)));

        let pids = lookup(&props, "PIDs").unwrap();
        assert_eq!(pids.value_signature().to_string(), "au");
        assert_eq!(pids, &Value::from(vec![1234u32]));
    }

    #[test]
    fn test_to_properties_with_description_and_flags_off() {
        let mut scope = ScopeProperties::new("app.scope", "workload.slice").description("Test workload");
        scope.io_accounting = false;
        scope.delegate = false;
        let props = scope.to_properties();

        assert_eq!(lookup(&props, "Description"), Some(&Value::from("Test workload")));
        assert_eq!(lookup(&props, "IOAccounting"), Some(&Value::Bool(false)));
        assert_eq!(lookup(&props, "Delegate"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_registered_scope_path() {
        let cgroups = CgroupManager::with_root("/sys/fs/cgroup");
        let scope = RegisteredScope::adopt("app.scope", "workload.slice");
        assert_eq!(
            scope.cgroup_path(&cgroups),
            PathBuf::from("/sys/fs/cgroup/workload.slice/app.scope")
        );
        assert!(scope.job().is_none());
    }

    #[test]
    fn test_bus_display() {
        assert_eq!(Bus::System.to_string(), "system");
        assert_eq!(Bus::User.to_string(), "user");
        assert_eq!(Bus::default(), Bus::System);
    }
}
