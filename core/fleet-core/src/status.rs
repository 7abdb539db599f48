//! Lifecycle status classification.
//!
//! [`resolve`] is a pure function over the four observed booleans. The match is
//! exhaustive with no catch-all arm, so adding a signal without classifying
//! it is a compile error rather than a silent fallback.
//!
//! | daemon | worker | session | status |
//! |--------|--------|---------|--------|
//! | alive  | alive  | yes     | active |
//! | alive  | alive  | no      | orphaned |
//! | alive  | dead   | any     | zombie |
//! | dead   | alive  | any     | disconnected |
//! | dead   | dead   | any     | dead |
//!
//! Port reachability does not change the status: a live daemon whose port is
//! not yet listening is starting up, see [`InstanceSnapshot::in_startup_grace`].

use serde::{Deserialize, Serialize};

/// Everything the resolver needs, observed at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub daemon_alive: bool,
    pub worker_alive: bool,
    pub port_listening: bool,
    pub has_dedicated_session: bool,
}

impl InstanceSnapshot {
    pub fn new(
        daemon_alive: bool,
        worker_alive: bool,
        port_listening: bool,
        has_dedicated_session: bool,
    ) -> Self {
        Self {
            daemon_alive,
            worker_alive,
            port_listening,
            has_dedicated_session,
        }
    }

    /// Daemon is up but its port isn't accepting yet.
    pub fn in_startup_grace(&self) -> bool {
        self.daemon_alive && !self.port_listening
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Daemon and worker alive, worker owns a dedicated tmux pane.
    Active,
    /// Daemon and worker alive, but no pane owns the worker.
    Orphaned,
    /// Daemon alive, worker gone.
    Zombie,
    /// Worker alive, daemon gone.
    Disconnected,
    Dead,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 5] = [
        InstanceStatus::Active,
        InstanceStatus::Orphaned,
        InstanceStatus::Zombie,
        InstanceStatus::Disconnected,
        InstanceStatus::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Active => "active",
            InstanceStatus::Orphaned => "orphaned",
            InstanceStatus::Zombie => "zombie",
            InstanceStatus::Disconnected => "disconnected",
            InstanceStatus::Dead => "dead",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn resolve(snapshot: InstanceSnapshot) -> InstanceStatus {
    match (
        snapshot.daemon_alive,
        snapshot.worker_alive,
        snapshot.has_dedicated_session,
    ) {
        (true, true, true) => InstanceStatus::Active,
        (true, true, false) => InstanceStatus::Orphaned,
        (true, false, _) => InstanceStatus::Zombie,
        (false, true, _) => InstanceStatus::Disconnected,
        (false, false, _) => InstanceStatus::Dead,
    }
}
