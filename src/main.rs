mod commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use scopedeleg::cgroups::CGROUP_ROOT;
use scopedeleg::config::{DEFAULT_DURATION, DEFAULT_SCOPE, DEFAULT_SLICE};
use scopedeleg::{
    BootstrapConfig, BootstrapError, Bus, Controller, ScopeProperties, ScopeRegistrar,
    WorkloadCommand,
};

#[derive(Parser)]
#[command(name = "scopedeleg")]
#[command(about = "Run a workload in a delegated cgroup v2 scope")]
struct Args {
    /// Talk to the user service manager instead of the system one
    #[arg(long, global = true)]
    user: bool,

    /// Log debug output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a scope, split it into manager/worker and run the workload
    Run(RunArgs),

    /// Stop a scope unit (and everything still in it)
    Stop {
        /// Scope name (e.g., "app.scope")
        name: String,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Slice to place the scope in
    #[arg(long, default_value = DEFAULT_SLICE)]
    slice: String,

    /// Name of the transient scope
    #[arg(long, default_value = DEFAULT_SCOPE)]
    scope: String,

    /// Unit description
    #[arg(long)]
    description: Option<String>,

    /// Mount point of the unified cgroup hierarchy
    #[arg(long, default_value = CGROUP_ROOT)]
    cgroup_root: PathBuf,

    /// Controllers to enable for the manager and worker leaves
    #[arg(long, value_delimiter = ',', default_value = "cpu,memory,io")]
    controllers: Vec<Controller>,

    #[arg(long)]
    no_cpu_accounting: bool,

    #[arg(long)]
    no_io_accounting: bool,

    #[arg(long)]
    no_memory_accounting: bool,

    /// Seconds to wait for systemd to start the scope
    #[arg(long, default_value_t = ScopeRegistrar::DEFAULT_JOB_TIMEOUT.as_secs())]
    job_timeout: u64,

    /// Seconds to let the workload run
    #[arg(long, default_value_t = DEFAULT_DURATION.as_secs())]
    duration: u64,

    /// Workload as a single shell-quoted command line
    #[arg(long, conflicts_with = "command")]
    exec: Option<String>,

    /// Workload command (default: sleep infinity)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

impl RunArgs {
    fn into_config(self, bus: Bus) -> BootstrapConfig {
        let mut scope = ScopeProperties::new(self.scope, self.slice);
        scope.description = self.description;
        scope.cpu_accounting = !self.no_cpu_accounting;
        scope.io_accounting = !self.no_io_accounting;
        scope.memory_accounting = !self.no_memory_accounting;

        let workload = match (self.exec, self.command) {
            (Some(line), _) => WorkloadCommand::CommandLine(line),
            (None, argv) if !argv.is_empty() => WorkloadCommand::Argv(argv),
            _ => WorkloadCommand::default(),
        };

        BootstrapConfig {
            scope,
            bus,
            cgroup_root: self.cgroup_root,
            controllers: self.controllers,
            job_timeout: Duration::from_secs(self.job_timeout),
            duration: Duration::from_secs(self.duration),
            workload,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level)
    ).init();

    let bus = if args.user { Bus::User } else { Bus::System };

    let result = match args.command {
        Command::Run(run) => commands::run(&run.into_config(bus)).await,
        Command::Stop { name } => commands::stop(&name, bus).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Failed to {}: {}", e.step(), e);
            if let BootstrapError::Registrar(err) = &e {
                if err.is_connection() && bus == Bus::System {
                    log::error!("Use --user to register with the session manager instead");
                }
            }
            ExitCode::FAILURE
        }
    }
}
