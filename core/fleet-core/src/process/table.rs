//! Point-in-time process table built from one bulk `ps` query.
//!
//! Per-PID queries do not scale to a full correlation pass, so the table is
//! always produced by a single enumeration and then treated as immutable.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::run_with_timeout;
use crate::error::Result;

/// TTY column values meaning "no controlling terminal".
const NO_TTY_SENTINELS: &[&str] = &["?", "??", "-"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    /// 0 for root processes.
    pub parent_pid: u32,
    pub tty: Option<String>,
    pub command: String,
}

/// Immutable `pid -> ProcessRecord` map.
///
/// Parent links may point outside the table (broken lineage); consumers stop
/// there instead of treating it as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessTable {
    records: HashMap<u32, ProcessRecord>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.records.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }
}

impl FromIterator<ProcessRecord> for ProcessTable {
    fn from_iter<I: IntoIterator<Item = ProcessRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().map(|r| (r.pid, r)).collect(),
        }
    }
}

/// Anything that can enumerate the processes visible to the current user.
pub trait ProcessSource: Send + Sync {
    fn snapshot(&self) -> Result<ProcessTable>;
}

/// Production source: `ps -A -o pid=,ppid=,tty=,command=`.
#[derive(Debug, Clone)]
pub struct PsProcessSource {
    binary: String,
    timeout: Duration,
}

impl PsProcessSource {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

impl ProcessSource for PsProcessSource {
    fn snapshot(&self) -> Result<ProcessTable> {
        let output = run_with_timeout(
            &self.binary,
            &["-A", "-o", "pid=,ppid=,tty=,command="],
            self.timeout,
        )?;
        Ok(parse_ps_output(&output))
    }
}

/// Builds the process table, degrading to an empty table on any failure.
///
/// An empty table tells callers to fall back to direct signal probes.
pub fn build_process_table(source: &dyn ProcessSource) -> ProcessTable {
    match source.snapshot() {
        Ok(table) => {
            tracing::debug!(processes = table.len(), "Process table built");
            table
        }
        Err(err) => {
            tracing::warn!(error = %err, "Process enumeration failed; using empty table");
            ProcessTable::new()
        }
    }
}

/// Parses `ps -o pid=,ppid=,tty=,command=` output. Malformed lines are dropped.
pub fn parse_ps_output(output: &str) -> ProcessTable {
    output.lines().filter_map(parse_ps_line).collect()
}

fn parse_ps_line(line: &str) -> Option<ProcessRecord> {
    let (pid, rest) = next_field(line)?;
    let (ppid, rest) = next_field(rest)?;
    let (tty, rest) = next_field(rest)?;

    let pid: u32 = pid.parse().ok().filter(|pid| *pid > 0)?;
    let parent_pid: u32 = ppid.parse().ok()?;

    Some(ProcessRecord {
        pid,
        parent_pid,
        tty: normalize_tty(Some(tty)).map(str::to_string),
        command: rest.trim().to_string(),
    })
}

/// Splits off the first whitespace-delimited field; the remainder keeps its
/// interior spacing so commands with arguments survive intact.
fn next_field(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(end) => Some((&input[..end], &input[end..])),
        None => Some((input, "")),
    }
}

/// Strips the `/dev/` prefix and rejects "no controlling terminal" sentinels.
///
/// `"/dev/pts/3"` and `"pts/3"` normalize to the same value.
pub fn normalize_tty(tty: Option<&str>) -> Option<&str> {
    let tty = tty?.trim();
    let tty = tty.strip_prefix("/dev/").unwrap_or(tty);
    if tty.is_empty() || NO_TTY_SENTINELS.contains(&tty) {
        None
    } else {
        Some(tty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleetError;

    #[test]
    fn parses_records_and_keeps_command_arguments() {
        let raw = "\
    1     0 ?        /sbin/init splash\n\
  812     1 pts/3    -zsh\n\
  901   812 pts/3    fleet-worker --dir /home/me/proj  --verbose\n";

        let table = parse_ps_output(raw);
        assert_eq!(table.len(), 3);

        let init = table.get(1).unwrap();
        assert_eq!(init.parent_pid, 0);
        assert!(init.tty.is_none());

        let worker = table.get(901).unwrap();
        assert_eq!(worker.parent_pid, 812);
        assert_eq!(worker.tty.as_deref(), Some("pts/3"));
        assert_eq!(
            worker.command,
            "fleet-worker --dir /home/me/proj  --verbose"
        );
    }

    #[test]
    fn drops_only_malformed_lines() {
        let raw = "\
  abc     1 ?   bogus\n\
\n\
  77\n\
  0       1 ?   zero-pid\n\
  42     1 ttys004   vim notes.md\n";

        let table = parse_ps_output(raw);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(42).unwrap().tty.as_deref(), Some("ttys004"));
    }

    #[test]
    fn record_without_command_is_kept() {
        let table = parse_ps_output("  55  1 ??\n");
        let record = table.get(55).unwrap();
        assert!(record.tty.is_none());
        assert_eq!(record.command, "");
    }

    #[test]
    fn normalize_tty_strips_device_prefix_and_sentinels() {
        assert_eq!(normalize_tty(Some("/dev/pts/3")), Some("pts/3"));
        assert_eq!(normalize_tty(Some("pts/3")), Some("pts/3"));
        assert_eq!(normalize_tty(Some("/dev/ttys003")), Some("ttys003"));
        assert_eq!(normalize_tty(Some("?")), None);
        assert_eq!(normalize_tty(Some("??")), None);
        assert_eq!(normalize_tty(Some("")), None);
        assert_eq!(normalize_tty(None), None);
    }

    struct FailingSource;

    impl ProcessSource for FailingSource {
        fn snapshot(&self) -> Result<ProcessTable> {
            Err(FleetError::CommandFailed {
                command: "ps".to_string(),
                details: "permission denied".to_string(),
            })
        }
    }

    #[test]
    fn build_process_table_degrades_to_empty() {
        assert!(build_process_table(&FailingSource).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn ps_source_sees_current_process() {
        let source = PsProcessSource::new("ps", Duration::from_secs(5));
        let table = build_process_table(&source);
        if table.is_empty() {
            // No usable `ps` in this environment.
            return;
        }
        assert!(table.contains(std::process::id()));
    }
}
