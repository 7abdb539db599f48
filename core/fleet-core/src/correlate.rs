//! PID-to-pane correlation.
//!
//! tmux records the PID it spawned in each pane (normally a shell), while the
//! process we care about is usually a descendant several forks deep. Three
//! strategies run in strict priority order and the first hit wins:
//!
//! 1. **Exact**: a pane whose root PID is the probe PID.
//! 2. **Direct TTY**: the probe's controlling terminal is a pane's TTY.
//!    Catches re-parented descendants still attached to the pane.
//! 3. **Ancestor walk**: follow parent links; at each ancestor try an exact
//!    root-PID match, then a TTY match.
//!
//! The walk keeps a visited set, so corrupt lineage (`A → B → A`) terminates.
//! It stops at PID 1 or at the first parent missing from the table.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::process::{normalize_tty, ProcessTable};
use crate::tmux::PaneRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    ExactPid,
    AncestorPid,
    TtyMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub pane: PaneRecord,
    pub match_mode: MatchMode,
}

impl CorrelationResult {
    fn new(pane: &PaneRecord, match_mode: MatchMode) -> Self {
        Self {
            pane: pane.clone(),
            match_mode,
        }
    }
}

/// Finds the pane that owns `probe_pid`, if any.
///
/// `None` means "no dedicated session"; callers must not retry.
pub fn correlate(
    probe_pid: u32,
    table: &ProcessTable,
    panes: &[PaneRecord],
) -> Option<CorrelationResult> {
    if panes.is_empty() {
        return None;
    }

    if let Some(pane) = pane_by_root_pid(panes, probe_pid) {
        return Some(CorrelationResult::new(pane, MatchMode::ExactPid));
    }

    let probe = table.get(probe_pid)?;

    if let Some(pane) = pane_by_tty(panes, probe.tty.as_deref()) {
        return Some(CorrelationResult::new(pane, MatchMode::TtyMatch));
    }

    let mut visited = HashSet::from([probe_pid]);
    let mut current = probe.parent_pid;

    while current > 1 && visited.insert(current) {
        if let Some(pane) = pane_by_root_pid(panes, current) {
            return Some(CorrelationResult::new(pane, MatchMode::AncestorPid));
        }

        let Some(ancestor) = table.get(current) else {
            break;
        };

        if let Some(pane) = pane_by_tty(panes, ancestor.tty.as_deref()) {
            return Some(CorrelationResult::new(pane, MatchMode::TtyMatch));
        }

        current = ancestor.parent_pid;
    }

    None
}

fn pane_by_root_pid(panes: &[PaneRecord], pid: u32) -> Option<&PaneRecord> {
    panes.iter().find(|pane| pane.root_pid == pid)
}

fn pane_by_tty<'a>(panes: &'a [PaneRecord], tty: Option<&str>) -> Option<&'a PaneRecord> {
    let tty = normalize_tty(tty)?;
    panes
        .iter()
        .find(|pane| normalize_tty(pane.tty.as_deref()) == Some(tty))
}
