//! Dual-sink logging: stderr for the operator, a daily-rotated file under
//! `~/.fleet/logs/` for after-the-fact debugging.

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "FLEET_DEBUG_LOG";

fn debug_forced() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn filter() -> EnvFilter {
    if debug_forced() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Installs the global subscriber. Keep the guard alive until exit or the
/// file sink drops buffered lines.
///
/// With no usable log directory, logs go to stderr only.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_sink = log_dir.and_then(|dir| match fs_err::create_dir_all(dir) {
        Ok(()) => Some(tracing_appender::non_blocking(
            tracing_appender::rolling::daily(dir, "fleetctl.log"),
        )),
        Err(err) => {
            eprintln!("fleetctl: file logging disabled: {}", err);
            None
        }
    });

    match file_sink {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer)
                .init();
            None
        }
    }
}
