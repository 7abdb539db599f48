//! Guarded process termination.
//!
//! A PID learned from a cache or a metadata file may have been recycled by the
//! kernel for an unrelated program. Before any signal goes out, the gate checks
//! that the process still exists, that it looks like one of ours, and that the
//! working directory the caller vouches for is real. Any failed check rejects
//! the request and no signal is sent.
//!
//! Identity matching is a case-insensitive substring test against the process
//! name and arguments. It is a heuristic: `grep fleet-worker` matches too. It
//! narrows PID reuse risk; it does not eliminate it.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationSignal {
    /// SIGTERM, lets the process shut down cleanly.
    Term,
    /// SIGKILL.
    Kill,
}

impl TerminationSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationSignal::Term => "SIGTERM",
            TerminationSignal::Kill => "SIGKILL",
        }
    }
}

/// Why the gate refused to signal a process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminateRejection {
    #[error("refusing to signal reserved pid {pid}")]
    InvalidPid { pid: u32 },

    #[error("refusing to signal our own process (pid {pid})")]
    SelfTarget { pid: u32 },

    #[error("process {pid} does not exist")]
    ProcessNotFound { pid: u32 },

    #[error("could not read the identity of process {pid}")]
    IdentityUnavailable { pid: u32 },

    #[error("process {pid} does not belong to the fleet family: {command}")]
    IdentityMismatch { pid: u32, command: String },

    #[error("invalid working directory {path:?}: {reason}")]
    WorkDirInvalid { path: String, reason: String },

    #[error("working directory {path:?} contains a parent-directory component")]
    WorkDirTraversal { path: String },

    #[error("working directory {path:?} does not exist")]
    WorkDirMissing { path: String },

    #[error("working directory {path:?} is not a directory")]
    WorkDirNotDirectory { path: String },

    #[error("failed to signal process {pid}: {details}")]
    SignalFailed { pid: u32, details: String },
}

impl TerminateRejection {
    /// Stable machine-readable code for JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            TerminateRejection::InvalidPid { .. } => "invalid_pid",
            TerminateRejection::SelfTarget { .. } => "self_target",
            TerminateRejection::ProcessNotFound { .. } => "process_not_found",
            TerminateRejection::IdentityUnavailable { .. } => "identity_unavailable",
            TerminateRejection::IdentityMismatch { .. } => "identity_mismatch",
            TerminateRejection::WorkDirInvalid { .. } => "work_dir_invalid",
            TerminateRejection::WorkDirTraversal { .. } => "work_dir_traversal",
            TerminateRejection::WorkDirMissing { .. } => "work_dir_missing",
            TerminateRejection::WorkDirNotDirectory { .. } => "work_dir_not_directory",
            TerminateRejection::SignalFailed { .. } => "signal_failed",
        }
    }
}

/// A signal that was actually delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminated {
    pub pid: u32,
    pub signal: TerminationSignal,
    pub work_dir: PathBuf,
}

/// Name and argv of a live process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub name: String,
    pub cmd: Vec<String>,
}

impl ProcessIdentity {
    pub fn display(&self) -> String {
        if self.cmd.is_empty() {
            self.name.clone()
        } else {
            self.cmd.join(" ")
        }
    }
}

/// Looks up live processes. `None` from `identity` with `exists == true`
/// means the process is there but could not be inspected.
pub trait ProcessInspector: Send + Sync {
    fn exists(&self, pid: u32) -> bool;
    fn identity(&self, pid: u32) -> Option<ProcessIdentity>;
}

/// Delivers a signal. Errors carry the OS errno.
pub trait SignalSender: Send + Sync {
    fn send(&self, pid: u32, signal: TerminationSignal) -> std::io::Result<()>;
}

/// `sysinfo` per-PID refresh with command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoInspector;

impl ProcessInspector for SysinfoInspector {
    fn exists(&self, pid: u32) -> bool {
        crate::process::is_pid_alive(pid) || self.identity(pid).is_some()
    }

    fn identity(&self, pid: u32) -> Option<ProcessIdentity> {
        use sysinfo::{Pid, ProcessRefreshKind, System, UpdateKind};

        let mut sys = System::new();
        let sysinfo_pid = Pid::from(pid as usize);
        sys.refresh_process_specifics(
            sysinfo_pid,
            ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
        );

        sys.process(sysinfo_pid).map(|process| ProcessIdentity {
            name: process.name().to_string(),
            cmd: process.cmd().to_vec(),
        })
    }
}

/// `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcSignalSender;

impl SignalSender for LibcSignalSender {
    #[cfg(unix)]
    fn send(&self, pid: u32, signal: TerminationSignal) -> std::io::Result<()> {
        let raw_pid = i32::try_from(pid)
            .map_err(|_| std::io::Error::new(ErrorKind::InvalidInput, "pid out of range"))?;
        let raw_signal = match signal {
            TerminationSignal::Term => libc::SIGTERM,
            TerminationSignal::Kill => libc::SIGKILL,
        };
        // SAFETY: kill has no memory-safety preconditions.
        let rc = unsafe { libc::kill(raw_pid, raw_signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn send(&self, _pid: u32, _signal: TerminationSignal) -> std::io::Result<()> {
        Err(std::io::Error::new(
            ErrorKind::Unsupported,
            "signals are only supported on unix",
        ))
    }
}

/// True iff the process name or any argument contains one of the family
/// names, ignoring case.
pub fn matches_process_family(identity: &ProcessIdentity, family: &[String]) -> bool {
    let name = identity.name.to_lowercase();
    let args: Vec<String> = identity.cmd.iter().map(|arg| arg.to_lowercase()).collect();

    family
        .iter()
        .map(|member| member.to_lowercase())
        .filter(|member| !member.is_empty())
        .any(|member| name.contains(&member) || args.iter().any(|arg| arg.contains(&member)))
}

/// Checks the working directory and returns its canonical form.
pub fn validate_work_dir(dir: &Path) -> Result<PathBuf, TerminateRejection> {
    let display = dir.to_string_lossy().into_owned();

    if dir.as_os_str().is_empty() {
        return Err(TerminateRejection::WorkDirInvalid {
            path: display,
            reason: "empty path".to_string(),
        });
    }
    if display.contains('\0') {
        return Err(TerminateRejection::WorkDirInvalid {
            path: display,
            reason: "contains NUL byte".to_string(),
        });
    }
    if dir.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(TerminateRejection::WorkDirTraversal { path: display });
    }
    if !dir.is_absolute() {
        return Err(TerminateRejection::WorkDirInvalid {
            path: display,
            reason: "not an absolute path".to_string(),
        });
    }

    let canonical = match fs_err::canonicalize(dir) {
        Ok(canonical) => canonical,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(TerminateRejection::WorkDirMissing { path: display });
        }
        Err(err) => {
            return Err(TerminateRejection::WorkDirInvalid {
                path: display,
                reason: err.to_string(),
            });
        }
    };
    if !canonical.is_dir() {
        return Err(TerminateRejection::WorkDirNotDirectory { path: display });
    }
    Ok(canonical)
}

/// The single path by which this crate signals processes.
pub struct TerminationGate<S = LibcSignalSender, I = SysinfoInspector> {
    family: Vec<String>,
    sender: S,
    inspector: I,
}

impl TerminationGate<LibcSignalSender, SysinfoInspector> {
    pub fn new(process_family: &[String]) -> Self {
        Self::with_parts(process_family, LibcSignalSender, SysinfoInspector)
    }
}

impl<S: SignalSender, I: ProcessInspector> TerminationGate<S, I> {
    pub fn with_parts(process_family: &[String], sender: S, inspector: I) -> Self {
        Self {
            family: process_family.to_vec(),
            sender,
            inspector,
        }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Sends SIGTERM after every check passes.
    pub fn safe_terminate(
        &self,
        pid: u32,
        expected_work_dir: &Path,
    ) -> Result<Terminated, TerminateRejection> {
        self.terminate_with(pid, expected_work_dir, TerminationSignal::Term)
    }

    pub fn terminate_with(
        &self,
        pid: u32,
        expected_work_dir: &Path,
        signal: TerminationSignal,
    ) -> Result<Terminated, TerminateRejection> {
        let work_dir = match self.validate(pid, expected_work_dir) {
            Ok(work_dir) => work_dir,
            Err(rejection) => {
                tracing::warn!(pid, reason = rejection.code(), "Termination rejected: {}", rejection);
                return Err(rejection);
            }
        };

        if let Err(err) = self.sender.send(pid, signal) {
            let rejection = if err.raw_os_error() == Some(libc::ESRCH) {
                TerminateRejection::ProcessNotFound { pid }
            } else {
                TerminateRejection::SignalFailed {
                    pid,
                    details: err.to_string(),
                }
            };
            tracing::warn!(pid, reason = rejection.code(), "Signal not delivered: {}", rejection);
            return Err(rejection);
        }

        tracing::info!(
            pid,
            signal = signal.as_str(),
            work_dir = %work_dir.display(),
            "Signal delivered"
        );
        Ok(Terminated {
            pid,
            signal,
            work_dir,
        })
    }

    /// Runs every check without signalling. Returns the canonical work dir.
    pub fn validate(&self, pid: u32, expected_work_dir: &Path) -> Result<PathBuf, TerminateRejection> {
        if pid <= 1 || i32::try_from(pid).is_err() {
            return Err(TerminateRejection::InvalidPid { pid });
        }
        if pid == std::process::id() {
            return Err(TerminateRejection::SelfTarget { pid });
        }
        if !self.inspector.exists(pid) {
            return Err(TerminateRejection::ProcessNotFound { pid });
        }

        let identity = self
            .inspector
            .identity(pid)
            .ok_or(TerminateRejection::IdentityUnavailable { pid })?;
        if !matches_process_family(&identity, &self.family) {
            return Err(TerminateRejection::IdentityMismatch {
                pid,
                command: identity.display(),
            });
        }

        validate_work_dir(expected_work_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct SpySender {
        sent: Mutex<Vec<(u32, TerminationSignal)>>,
        errno: Option<i32>,
    }

    impl SignalSender for SpySender {
        fn send(&self, pid: u32, signal: TerminationSignal) -> std::io::Result<()> {
            if let Some(errno) = self.errno {
                return Err(std::io::Error::from_raw_os_error(errno));
            }
            self.sent.lock().unwrap().push((pid, signal));
            Ok(())
        }
    }

    impl SpySender {
        fn sent(&self) -> Vec<(u32, TerminationSignal)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct FakeInspector {
        live: HashMap<u32, Option<ProcessIdentity>>,
    }

    impl FakeInspector {
        fn with(mut self, pid: u32, name: &str, cmd: &[&str]) -> Self {
            self.live.insert(
                pid,
                Some(ProcessIdentity {
                    name: name.to_string(),
                    cmd: cmd.iter().map(|s| s.to_string()).collect(),
                }),
            );
            self
        }

        fn opaque(mut self, pid: u32) -> Self {
            self.live.insert(pid, None);
            self
        }
    }

    impl ProcessInspector for FakeInspector {
        fn exists(&self, pid: u32) -> bool {
            self.live.contains_key(&pid)
        }
        fn identity(&self, pid: u32) -> Option<ProcessIdentity> {
            self.live.get(&pid).cloned().flatten()
        }
    }

    fn family() -> Vec<String> {
        vec!["fleet-daemon".to_string(), "fleet-worker".to_string()]
    }

    fn gate(inspector: FakeInspector) -> TerminationGate<SpySender, FakeInspector> {
        TerminationGate::with_parts(&family(), SpySender::default(), inspector)
    }

    #[test]
    fn genuine_member_is_signalled() {
        let dir = tempdir().unwrap();
        let gate = gate(FakeInspector::default().with(
            4242,
            "node",
            &["node", "/opt/fleet/bin/Fleet-Worker", "--port", "4096"],
        ));

        let done = gate.safe_terminate(4242, dir.path()).unwrap();
        assert_eq!(done.signal, TerminationSignal::Term);
        assert_eq!(done.work_dir, dir.path().canonicalize().unwrap());
        assert_eq!(gate.sender().sent(), vec![(4242, TerminationSignal::Term)]);
    }

    #[test]
    fn kill_signal_is_opt_in() {
        let dir = tempdir().unwrap();
        let gate = gate(FakeInspector::default().with(77, "fleet-daemon", &[]));
        gate.terminate_with(77, dir.path(), TerminationSignal::Kill)
            .unwrap();
        assert_eq!(gate.sender().sent(), vec![(77, TerminationSignal::Kill)]);
    }

    #[test]
    fn recycled_pid_running_something_else_is_rejected() {
        let dir = tempdir().unwrap();
        let gate = gate(FakeInspector::default().with(4242, "postgres", &["postgres", "-D", "/var/db"]));

        let err = gate.safe_terminate(4242, dir.path()).unwrap_err();
        assert!(matches!(err, TerminateRejection::IdentityMismatch { pid: 4242, .. }));
        assert!(gate.sender().sent().is_empty());
    }

    #[test]
    fn reserved_and_own_pids_are_rejected() {
        let dir = tempdir().unwrap();
        let own = std::process::id();
        let gate = gate(FakeInspector::default().with(own, "fleet-daemon", &[]));

        assert_eq!(
            gate.safe_terminate(0, dir.path()),
            Err(TerminateRejection::InvalidPid { pid: 0 })
        );
        assert_eq!(
            gate.safe_terminate(1, dir.path()),
            Err(TerminateRejection::InvalidPid { pid: 1 })
        );
        assert_eq!(
            gate.safe_terminate(own, dir.path()),
            Err(TerminateRejection::SelfTarget { pid: own })
        );
        assert!(gate.sender().sent().is_empty());
    }

    #[test]
    fn vanished_and_opaque_processes_are_rejected() {
        let dir = tempdir().unwrap();
        let gate = gate(FakeInspector::default().opaque(500));

        assert_eq!(
            gate.safe_terminate(499, dir.path()),
            Err(TerminateRejection::ProcessNotFound { pid: 499 })
        );
        assert_eq!(
            gate.safe_terminate(500, dir.path()),
            Err(TerminateRejection::IdentityUnavailable { pid: 500 })
        );
        assert!(gate.sender().sent().is_empty());
    }

    #[test]
    fn bad_work_dirs_are_rejected_before_signalling() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();
        let gate = gate(FakeInspector::default().with(900, "fleet-worker", &[]));

        let cases: Vec<(PathBuf, &str)> = vec![
            (PathBuf::new(), "work_dir_invalid"),
            (PathBuf::from("relative/dir"), "work_dir_invalid"),
            (dir.path().join("..").join("etc"), "work_dir_traversal"),
            (dir.path().join("missing"), "work_dir_missing"),
            (file, "work_dir_not_directory"),
        ];
        for (path, code) in cases {
            let err = gate.safe_terminate(900, &path).unwrap_err();
            assert_eq!(err.code(), code, "path {:?}", path);
        }
        assert!(gate.sender().sent().is_empty());
    }

    #[test]
    fn process_exiting_before_signal_reports_not_found() {
        let dir = tempdir().unwrap();
        let gate = TerminationGate::with_parts(
            &family(),
            SpySender {
                errno: Some(libc::ESRCH),
                ..Default::default()
            },
            FakeInspector::default().with(321, "fleet-worker", &[]),
        );
        assert_eq!(
            gate.safe_terminate(321, dir.path()),
            Err(TerminateRejection::ProcessNotFound { pid: 321 })
        );

        let denied = TerminationGate::with_parts(
            &family(),
            SpySender {
                errno: Some(libc::EPERM),
                ..Default::default()
            },
            FakeInspector::default().with(321, "fleet-worker", &[]),
        );
        assert_eq!(
            denied.safe_terminate(321, dir.path()).unwrap_err().code(),
            "signal_failed"
        );
    }

    #[test]
    fn family_match_is_a_substring_heuristic() {
        let grep = ProcessIdentity {
            name: "grep".to_string(),
            cmd: vec!["grep".to_string(), "fleet-worker".to_string()],
        };
        // Known false positive: anything mentioning a family name matches.
        assert!(matches_process_family(&grep, &family()));

        let unrelated = ProcessIdentity {
            name: "fleet".to_string(),
            cmd: vec!["fleet".to_string()],
        };
        assert!(!matches_process_family(&unrelated, &family()));
        assert!(!matches_process_family(&grep, &[]));
        assert!(!matches_process_family(&grep, &[String::new()]));
    }

    #[test]
    fn system_inspector_sees_current_process() {
        let own = std::process::id();
        assert!(SysinfoInspector.exists(own));
        assert!(SysinfoInspector.identity(own).is_some());
    }
}
