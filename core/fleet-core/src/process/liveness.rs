//! Liveness and reachability probes.
//!
//! Both probes answer conservatively: any error other than a clean success
//! is reported as "not alive" / "not listening".

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Signal-0 probe. Only a successful `kill(pid, 0)` counts as alive.
///
/// `EPERM` (process exists but belongs to someone else) is treated as not
/// alive: such a process can't be one of ours.
pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    #[cfg(unix)]
    {
        // SAFETY: kill(pid, 0) performs permission and existence checks only;
        // no signal is delivered.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(pid as i32, 0) };
        if rc == 0 {
            return true;
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::debug!(pid, error = %err, "Signal probe failed; treating as not alive");
        }
        false
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// TCP connect probe against `host:port` bounded by `timeout`.
///
/// Every resolved address is tried in turn under the same per-address
/// timeout; unresolvable hosts are "not listening".
pub fn is_port_listening(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(err) => {
            tracing::debug!(host, port, error = %err, "Could not resolve probe address");
            return false;
        }
    };

    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, timeout).is_ok())
}

/// Probe seam used by the discovery pipeline.
pub trait LivenessProbe: Send + Sync {
    fn pid_alive(&self, pid: u32) -> bool;
    fn port_listening(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Probes the real OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl LivenessProbe for SystemProbe {
    fn pid_alive(&self, pid: u32) -> bool {
        is_pid_alive(pid)
    }

    fn port_listening(&self, host: &str, port: u16, timeout: Duration) -> bool {
        is_port_listening(host, port, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[cfg(unix)]
    #[test]
    fn current_process_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[test]
    fn absurd_pids_are_not_alive() {
        assert!(!is_pid_alive(0));
        assert!(!is_pid_alive(99_999_999));
        assert!(!is_pid_alive(u32::MAX));
    }

    #[test]
    fn bound_listener_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_listening(
            "127.0.0.1",
            port,
            Duration::from_millis(200)
        ));
    }

    #[test]
    fn closed_port_is_not_listening() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!is_port_listening(
            "127.0.0.1",
            port,
            Duration::from_millis(50)
        ));
    }

    #[test]
    fn unresolvable_host_is_not_listening() {
        assert!(!is_port_listening(
            "no-such-host.invalid",
            80,
            Duration::from_millis(50)
        ));
    }
}
