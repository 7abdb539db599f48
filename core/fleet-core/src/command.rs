//! Bounded execution of the external enumeration tools (`ps`, `tmux`).

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{FleetError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Runs `program args…` and returns its stdout, killing it after `timeout`.
///
/// Stdout and stderr are drained on helper threads so a chatty child can
/// never block on a full pipe while we poll for its exit.
pub fn run_with_timeout(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let label = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| FleetError::CommandFailed {
            command: label.clone(),
            details: err.to_string(),
        })?;

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(FleetError::CommandTimedOut {
                        command: label,
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                let _ = child.kill();
                return Err(FleetError::CommandFailed {
                    command: label,
                    details: err.to_string(),
                });
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    if !status.success() {
        return Err(FleetError::CommandFailed {
            command: label,
            details: format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn returns_stdout_of_successful_command() {
        let out = run_with_timeout("echo", &["hello"], Duration::from_secs(2)).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn missing_binary_is_command_failed() {
        let err = run_with_timeout(
            "/definitely/not/a/real/binary",
            &[],
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, FleetError::CommandFailed { .. }));
    }

    #[test]
    fn non_zero_exit_is_command_failed() {
        let err = run_with_timeout("false", &[], Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, FleetError::CommandFailed { .. }));
    }

    #[test]
    fn slow_command_is_killed_at_timeout() {
        let start = Instant::now();
        let err = run_with_timeout("sleep", &["5"], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, FleetError::CommandTimedOut { timeout_ms: 100, .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
