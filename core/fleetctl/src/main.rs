//! fleetctl: diagnostic CLI for Fleet instance discovery.
//!
//! ## Subcommands
//!
//! - `status`: Discover instances and print their lifecycle status
//! - `panes`: List tmux panes and sessions as the engine sees them
//! - `correlate`: Explain which pane (if any) owns a PID
//! - `terminate`: Signal a daemon/worker through the safety gate

mod logging;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use fleet_core::{
    build_process_table, config_path, correlate, list_panes, list_sessions, load_config,
    Discovery, FleetConfig, FleetError, InstanceRecord, PsProcessSource, StorageConfig,
    TerminationGate, TerminationSignal, TmuxCli,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(about = "Inspect and manage Fleet daemon/worker instances")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover instances and print their status
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Skip both caches and run a live discovery cycle
        #[arg(long)]
        no_cache: bool,
    },

    /// List tmux panes and sessions
    Panes {
        #[arg(long)]
        json: bool,
    },

    /// Find the tmux pane that owns a process
    Correlate {
        #[arg(value_name = "PID")]
        pid: u32,

        #[arg(long)]
        json: bool,
    },

    /// Signal a Fleet process after verifying its identity
    Terminate {
        #[arg(value_name = "PID")]
        pid: u32,

        /// Working directory the process is expected to serve
        #[arg(long, value_name = "DIR")]
        work_dir: PathBuf,

        /// Send SIGKILL instead of SIGTERM
        #[arg(long)]
        force: bool,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(#[from] fleet_core::TerminateRejection),
}

fn main() {
    let cli = Cli::parse();

    let storage = match StorageConfig::from_env() {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("fleetctl: {}", e);
            std::process::exit(1);
        }
    };
    let log_dir = match storage.ensure_dirs() {
        Ok(()) => Some(storage.logs_dir()),
        Err(e) => {
            eprintln!("fleetctl: cannot prepare {}: {}", storage.root().display(), e);
            None
        }
    };
    let _logging_guard = logging::init(log_dir.as_deref());

    if let Err(e) = run(cli.command, &storage) {
        tracing::error!(error = %e, "fleetctl failed");
        eprintln!("fleetctl: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, storage: &StorageConfig) -> Result<(), CliError> {
    let config = load_config(&config_path(storage))?;

    match command {
        Commands::Status { json, no_cache } => status(&config, storage, json, no_cache),
        Commands::Panes { json } => panes(&config, json),
        Commands::Correlate { pid, json } => correlate_pid(&config, pid, json),
        Commands::Terminate {
            pid,
            work_dir,
            force,
            json,
        } => terminate(&config, storage, pid, &work_dir, force, json),
    }
}

fn status(
    config: &FleetConfig,
    storage: &StorageConfig,
    json: bool,
    no_cache: bool,
) -> Result<(), CliError> {
    let mut discovery = Discovery::from_config(config, storage);
    let records = if no_cache {
        discovery.discover_uncached()
    } else {
        discovery.discover_instances()
    };

    if json {
        return print_json(&records);
    }

    if records.is_empty() {
        println!("No instances found in {}", storage.instances_dir().display());
        return Ok(());
    }
    println!(
        "{:<13} {:<8} {:<8} {:<6} {:<6} {}",
        "STATUS", "DAEMON", "WORKER", "PORT", "PANE", "WORK DIR"
    );
    for record in &records {
        println!("{}", status_line(record));
    }
    Ok(())
}

fn status_line(record: &InstanceRecord) -> String {
    let pid = |pid: Option<u32>| pid.map_or_else(|| "-".to_string(), |p| p.to_string());
    let port = if record.snapshot.port_listening {
        record.port.to_string()
    } else {
        format!("{}!", record.port)
    };
    let pane = record
        .session_pane
        .as_ref()
        .map_or("-", |pane| pane.pane_id.as_str());

    format!(
        "{:<13} {:<8} {:<8} {:<6} {:<6} {}",
        record.status.as_str(),
        pid(record.daemon_pid),
        pid(record.worker_pid),
        port,
        pane,
        record.work_dir_key
    )
}

fn panes(config: &FleetConfig, json: bool) -> Result<(), CliError> {
    let tmux = TmuxCli::new(config.tmux_binary.clone(), config.enumeration_timeout());
    let panes = list_panes(&tmux);
    let sessions = list_sessions(&tmux);

    if json {
        #[derive(Serialize)]
        struct PanesOutput<'a> {
            sessions: &'a [fleet_core::SessionRecord],
            panes: &'a [fleet_core::PaneRecord],
        }
        return print_json(&PanesOutput {
            sessions: &sessions,
            panes: &panes,
        });
    }

    if panes.is_empty() {
        println!("No tmux panes (is a tmux server running?)");
        return Ok(());
    }
    for session in &sessions {
        println!(
            "{}{} ({} windows)",
            session.name,
            if session.attached { " [attached]" } else { "" },
            session.windows
        );
        for pane in panes.iter().filter(|p| p.session_name == session.name) {
            println!(
                "  {:<6} pid {:<8} {}",
                pane.pane_id,
                pane.root_pid,
                pane.tty.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

fn correlate_pid(config: &FleetConfig, pid: u32, json: bool) -> Result<(), CliError> {
    let ps = PsProcessSource::new(config.ps_binary.clone(), config.enumeration_timeout());
    let tmux = TmuxCli::new(config.tmux_binary.clone(), config.enumeration_timeout());
    let table = build_process_table(&ps);
    let panes = list_panes(&tmux);
    let result = correlate(pid, &table, &panes);

    if json {
        return print_json(&result);
    }
    match result {
        Some(found) => println!(
            "pid {} -> pane {} in session {} ({:?})",
            pid, found.pane.pane_id, found.pane.session_name, found.match_mode
        ),
        None => println!("pid {} has no dedicated tmux pane", pid),
    }
    Ok(())
}

fn terminate(
    config: &FleetConfig,
    storage: &StorageConfig,
    pid: u32,
    work_dir: &Path,
    force: bool,
    json: bool,
) -> Result<(), CliError> {
    let signal = if force {
        TerminationSignal::Kill
    } else {
        TerminationSignal::Term
    };
    let gate = TerminationGate::new(&config.process_family);

    match gate.terminate_with(pid, work_dir, signal) {
        Ok(done) => {
            // Cached snapshots still list the process as alive.
            Discovery::from_config(config, storage).invalidate();
            if json {
                print_json(&done)
            } else {
                println!("Sent {} to {}", done.signal.as_str(), done.pid);
                Ok(())
            }
        }
        Err(rejection) => {
            if json {
                #[derive(Serialize)]
                struct RejectionOutput {
                    pid: u32,
                    code: &'static str,
                    message: String,
                }
                print_json(&RejectionOutput {
                    pid,
                    code: rejection.code(),
                    message: rejection.to_string(),
                })?;
            }
            Err(rejection.into())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use fleet_core::{InstanceSnapshot, InstanceStatus};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn terminate_requires_work_dir() {
        assert!(Cli::try_parse_from(["fleetctl", "terminate", "123"]).is_err());
        let cli = Cli::try_parse_from([
            "fleetctl",
            "terminate",
            "123",
            "--work-dir",
            "/srv/api",
            "--force",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Terminate {
                pid: 123,
                force: true,
                ..
            }
        ));
    }

    #[test]
    fn status_line_marks_closed_port_and_missing_pids() {
        let record = InstanceRecord {
            work_dir_key: "/srv/api".to_string(),
            daemon_pid: Some(200),
            worker_pid: None,
            port: 4100,
            host: "127.0.0.1".to_string(),
            status: InstanceStatus::Zombie,
            snapshot: InstanceSnapshot::new(true, false, false, false),
            session_pane: None,
        };
        let line = status_line(&record);
        assert!(line.starts_with("zombie"));
        assert!(line.contains("4100!"));
        assert!(line.contains(" - "));
        assert!(line.ends_with("/srv/api"));
    }
}
