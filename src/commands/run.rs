//! Run a workload inside a freshly delegated scope

use std::process;

use tokio::signal::unix::{signal, Signal, SignalKind};

use scopedeleg::{
    launch, BootstrapConfig, BootstrapError, CgroupFs, CgroupManager, Delegated, ScopeRegistrar,
};

/// SIGTERM/SIGINT, which end the run early
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignals {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

pub async fn run(config: &BootstrapConfig) -> Result<(), BootstrapError> {
    config.validate()?;

    let mut signals = ShutdownSignals::new().map_err(BootstrapError::Signals)?;
    let cgroups = CgroupManager::open(&config.cgroup_root)?;
    match cgroups.available_controllers(cgroups.root()) {
        Ok(available) => {
            for controller in config.controllers.iter().filter(|c| !available.contains(c)) {
                log::warn!(
                    "Controller {} is not available at {}",
                    controller,
                    cgroups.root().display()
                );
            }
        }
        Err(e) => log::debug!("{}", e),
    }

    let manager_pid = process::id();
    let registrar = ScopeRegistrar::connect(config.bus)
        .await?
        .with_timeout(config.job_timeout);

    let unit = config.scope.unit.as_str();
    let Delegated { mut workload, .. } = tokio::select! {
        result = launch(&registrar, &cgroups, config, manager_pid) => result?,
        name = signals.recv() => {
            log::warn!("Received {} while waiting for {} to start", name, unit);
            // The job may still complete; do not leave an orphaned scope behind
            if let Err(e) = registrar.stop(unit).await {
                log::warn!("{}", e);
            }
            return Err(BootstrapError::Interrupted(unit.to_string()));
        }
    };
    let worker_pid = workload.pid();

    println!(
        "● {} - delegated (manager PID {}, worker PID {})",
        unit, manager_pid, worker_pid
    );

    tokio::select! {
        _ = tokio::time::sleep(config.duration) => {
            log::info!("Supervised period of {:?} elapsed", config.duration);
        }
        status = workload.wait() => {
            log::info!("Workload exited: {}", status?);
            return Ok(());
        }
        name = signals.recv() => {
            log::info!("Received {}, stopping workload", name);
        }
    }

    let status = workload.shutdown(config.grace).await?;
    log::info!("Workload {} (PID {}) stopped: {}", workload.program(), worker_pid, status);

    Ok(())
}
