//! tmux session and pane enumeration.
//!
//! Each listing is one bulk `tmux` query under a strict timeout. Callers go
//! through [`list_panes`] / [`list_sessions`], which fail closed: when tmux is
//! missing, has no server, or hangs, the answer is "no panes". A missing pane
//! only ever downgrades an instance to "no dedicated session", so the empty
//! list is always a safe under-approximation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::run_with_timeout;
use crate::error::Result;

const PANE_FORMAT: &str = "#{pane_id}\t#{session_name}\t#{session_attached}\t#{pane_pid}\t#{pane_tty}\t#{pane_title}";
const SESSION_FORMAT: &str =
    "#{session_name}\t#{session_attached}\t#{session_windows}\t#{session_created}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneRecord {
    /// tmux pane id, e.g. `%3`.
    pub pane_id: String,
    pub session_name: String,
    pub session_attached: bool,
    /// PID of the process tmux spawned in the pane (usually a shell).
    pub root_pid: u32,
    pub tty: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: String,
    pub attached: bool,
    pub windows: u32,
    pub created_at: Option<DateTime<Utc>>,
}

pub trait TmuxAdapter: Send + Sync {
    fn panes(&self) -> Result<Vec<PaneRecord>>;
    fn sessions(&self) -> Result<Vec<SessionRecord>>;
}

/// Talks to the tmux CLI.
#[derive(Debug, Clone)]
pub struct TmuxCli {
    binary: String,
    timeout: Duration,
}

impl TmuxCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

impl Default for TmuxCli {
    fn default() -> Self {
        Self::new("tmux", Duration::from_secs(2))
    }
}

impl TmuxAdapter for TmuxCli {
    fn panes(&self) -> Result<Vec<PaneRecord>> {
        let output = run_with_timeout(
            &self.binary,
            &["list-panes", "-a", "-F", PANE_FORMAT],
            self.timeout,
        )?;
        Ok(parse_panes(&output))
    }

    fn sessions(&self) -> Result<Vec<SessionRecord>> {
        let output = run_with_timeout(
            &self.binary,
            &["list-sessions", "-F", SESSION_FORMAT],
            self.timeout,
        )?;
        Ok(parse_sessions(&output))
    }
}

/// Lists every pane across all sessions; empty on any failure.
pub fn list_panes(adapter: &dyn TmuxAdapter) -> Vec<PaneRecord> {
    adapter.panes().unwrap_or_else(|err| {
        tracing::debug!(error = %err, "tmux pane enumeration unavailable");
        Vec::new()
    })
}

/// Lists tmux sessions; empty on any failure.
pub fn list_sessions(adapter: &dyn TmuxAdapter) -> Vec<SessionRecord> {
    adapter.sessions().unwrap_or_else(|err| {
        tracing::debug!(error = %err, "tmux session enumeration unavailable");
        Vec::new()
    })
}

fn parse_panes(output: &str) -> Vec<PaneRecord> {
    let mut panes = output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(6, '\t');
            let pane_id = parts.next()?.trim();
            let session_name = parts.next()?.trim();
            let attached = parts.next()?.trim();
            let root_pid: u32 = parts.next()?.trim().parse().ok()?;
            if pane_id.is_empty() || session_name.is_empty() || root_pid == 0 {
                return None;
            }
            let tty = parts
                .next()
                .map(str::trim)
                .filter(|value| !value.is_empty());
            let title = parts
                .next()
                .map(str::trim)
                .filter(|value| !value.is_empty());
            Some(PaneRecord {
                pane_id: pane_id.to_string(),
                session_name: session_name.to_string(),
                session_attached: parse_attached(attached),
                root_pid,
                tty: tty.map(str::to_string),
                title: title.map(str::to_string),
            })
        })
        .collect::<Vec<_>>();
    panes.sort_by(|left, right| left.pane_id.cmp(&right.pane_id));
    panes
}

fn parse_sessions(output: &str) -> Vec<SessionRecord> {
    let mut sessions = output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let attached = parts.next().map(parse_attached).unwrap_or(false);
            let windows = parts
                .next()
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(0);
            let created_at = parts
                .next()
                .and_then(|value| value.trim().parse::<i64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0));
            Some(SessionRecord {
                name: name.to_string(),
                attached,
                windows,
                created_at,
            })
        })
        .collect::<Vec<_>>();
    sessions.sort_by(|left, right| left.name.cmp(&right.name));
    sessions
}

/// `session_attached` is a client count in tmux ≥ 2.x and a flag in older builds.
fn parse_attached(value: &str) -> bool {
    value.trim().parse::<u32>().map(|n| n > 0).unwrap_or(false)
}
