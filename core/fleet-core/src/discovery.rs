//! Instance discovery: the full observation pipeline behind both cache tiers.
//!
//! ```text
//! descriptors ─┐
//! ps table ────┼─→ liveness ─┐
//! tmux panes ──┴─→ correlate ┼─→ InstanceSnapshot ─→ resolve ─→ InstanceRecord
//! port probes (concurrent) ──┘
//! ```
//!
//! A cycle runs to completion before returning; every external step is
//! bounded by its own timeout and degrades to an empty/false answer.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{FileCache, MemoryCache};
use crate::config::FleetConfig;
use crate::correlate::correlate;
use crate::instances::{InstanceDescriptor, InstanceSource, MetadataDirSource};
use crate::process::{
    build_process_table, LivenessProbe, ProcessSource, ProcessTable, PsProcessSource, SystemProbe,
};
use crate::status::{resolve, InstanceSnapshot, InstanceStatus};
use crate::storage::StorageConfig;
use crate::tmux::{list_panes, PaneRecord, TmuxAdapter, TmuxCli};

/// One observed instance. Lives for one discovery cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub work_dir_key: String,
    pub daemon_pid: Option<u32>,
    pub worker_pid: Option<u32>,
    pub port: u16,
    pub host: String,
    pub status: InstanceStatus,
    pub snapshot: InstanceSnapshot,
    pub session_pane: Option<PaneRecord>,
}

struct Pipeline {
    instances: Box<dyn InstanceSource>,
    processes: Box<dyn ProcessSource>,
    tmux: Box<dyn TmuxAdapter>,
    probe: Box<dyn LivenessProbe>,
    port_timeout: Duration,
}

impl Pipeline {
    fn run(&self, descriptors: &[InstanceDescriptor]) -> Vec<InstanceRecord> {
        if descriptors.is_empty() {
            return Vec::new();
        }

        let table = build_process_table(self.processes.as_ref());
        let panes = list_panes(self.tmux.as_ref());
        let ports = self.probe_ports(descriptors);

        let mut records: Vec<InstanceRecord> = descriptors
            .iter()
            .zip(ports)
            .map(|(descriptor, port_listening)| {
                self.observe(descriptor, &table, &panes, port_listening)
            })
            .collect();
        records.sort_by(|a, b| a.work_dir_key.cmp(&b.work_dir_key));

        tracing::debug!(
            instances = records.len(),
            processes = table.len(),
            panes = panes.len(),
            "Discovery cycle complete"
        );
        records
    }

    /// One connect attempt per instance, all in flight at once, so the cycle
    /// costs roughly one probe timeout instead of N.
    fn probe_ports(&self, descriptors: &[InstanceDescriptor]) -> Vec<bool> {
        let probe = self.probe.as_ref();
        let timeout = self.port_timeout;

        thread::scope(|scope| {
            let handles: Vec<_> = descriptors
                .iter()
                .map(|descriptor| {
                    scope.spawn(move || {
                        probe.port_listening(&descriptor.host, descriptor.port, timeout)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(false))
                .collect()
        })
    }

    fn observe(
        &self,
        descriptor: &InstanceDescriptor,
        table: &ProcessTable,
        panes: &[PaneRecord],
        port_listening: bool,
    ) -> InstanceRecord {
        let daemon_alive = self.pid_alive(descriptor.daemon_pid, table);
        let worker_alive = self.pid_alive(descriptor.worker_pid, table);

        let correlation = descriptor
            .worker_pid
            .filter(|_| worker_alive)
            .and_then(|pid| correlate(pid, table, panes));

        if let Some(result) = &correlation {
            tracing::trace!(
                work_dir = %descriptor.work_dir_key,
                pane = %result.pane.pane_id,
                mode = ?result.match_mode,
                "Worker correlated to tmux pane"
            );
        }

        let snapshot = InstanceSnapshot::new(
            daemon_alive,
            worker_alive,
            port_listening,
            correlation.is_some(),
        );

        InstanceRecord {
            work_dir_key: descriptor.work_dir_key.clone(),
            daemon_pid: descriptor.daemon_pid,
            worker_pid: descriptor.worker_pid,
            port: descriptor.port,
            host: descriptor.host.clone(),
            status: resolve(snapshot),
            snapshot,
            session_pane: correlation.map(|result| result.pane),
        }
    }

    /// Table membership when we have a table, otherwise a direct signal probe.
    fn pid_alive(&self, pid: Option<u32>, table: &ProcessTable) -> bool {
        let Some(pid) = pid else {
            return false;
        };
        if table.is_empty() {
            self.probe.pid_alive(pid)
        } else {
            table.contains(pid)
        }
    }
}

/// Owns the pipeline and both cache tiers. Construct once per process.
pub struct Discovery {
    pipeline: Pipeline,
    memory: MemoryCache<Vec<InstanceRecord>>,
    file: Option<FileCache>,
}

impl Discovery {
    /// Wires the pipeline to injected sources with default TTLs and no file tier.
    pub fn new(
        instances: Box<dyn InstanceSource>,
        processes: Box<dyn ProcessSource>,
        tmux: Box<dyn TmuxAdapter>,
        probe: Box<dyn LivenessProbe>,
    ) -> Self {
        let defaults = FleetConfig::default();
        Self {
            pipeline: Pipeline {
                instances,
                processes,
                tmux,
                probe,
                port_timeout: defaults.port_probe_timeout(),
            },
            memory: MemoryCache::new(defaults.memory_cache_ttl()),
            file: None,
        }
    }

    /// Production wiring: metadata directory, `ps`, tmux CLI, real probes.
    pub fn from_config(config: &FleetConfig, storage: &StorageConfig) -> Self {
        let discovery = Self::new(
            Box::new(MetadataDirSource::new(storage.instances_dir())),
            Box::new(PsProcessSource::new(
                config.ps_binary.clone(),
                config.enumeration_timeout(),
            )),
            Box::new(TmuxCli::new(
                config.tmux_binary.clone(),
                config.enumeration_timeout(),
            )),
            Box::new(SystemProbe),
        )
        .with_memory_ttl(config.memory_cache_ttl())
        .with_port_timeout(config.port_probe_timeout());

        if config.file_cache_enabled {
            discovery.with_file_cache(FileCache::new(
                storage.discovery_cache_file(),
                config.file_cache_ttl(),
            ))
        } else {
            discovery
        }
    }

    pub fn with_memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory = MemoryCache::new(ttl);
        self
    }

    pub fn with_file_cache(mut self, cache: FileCache) -> Self {
        self.file = Some(cache);
        self
    }

    pub fn with_port_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline.port_timeout = timeout;
        self
    }

    /// Current status of every known instance, sorted by working directory.
    ///
    /// Served from the memory tier, then the file tier, then a live cycle.
    pub fn discover_instances(&mut self) -> Vec<InstanceRecord> {
        let Self {
            pipeline,
            memory,
            file,
        } = self;

        memory.get_or_compute(|| {
            let descriptors = pipeline.instances.descriptors();
            match file {
                Some(file) => {
                    file.get_or_compute(&cache_key(&descriptors), || pipeline.run(&descriptors))
                }
                None => pipeline.run(&descriptors),
            }
        })
    }

    /// Runs a live cycle, bypassing and refreshing both tiers.
    pub fn refresh(&mut self) -> Vec<InstanceRecord> {
        self.invalidate();
        self.discover_instances()
    }

    /// Runs a live cycle without reading or writing either tier.
    pub fn discover_uncached(&self) -> Vec<InstanceRecord> {
        let descriptors = self.pipeline.instances.descriptors();
        self.pipeline.run(&descriptors)
    }

    /// Drops both tiers, e.g. after terminating a process.
    pub fn invalidate(&mut self) {
        self.memory.invalidate();
        if let Some(file) = &self.file {
            file.clear();
        }
    }
}

/// Identifies the descriptor set a file-tier payload was computed for.
fn cache_key(descriptors: &[InstanceDescriptor]) -> String {
    let mut parts: Vec<String> = descriptors
        .iter()
        .map(|d| {
            format!(
                "{}|{}|{}|{}|{}",
                d.work_dir_key,
                d.daemon_pid.map(|p| p.to_string()).unwrap_or_default(),
                d.worker_pid.map(|p| p.to_string()).unwrap_or_default(),
                d.host,
                d.port
            )
        })
        .collect();
    parts.sort();
    parts.join(";")
}
