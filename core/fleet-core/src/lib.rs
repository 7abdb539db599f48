//! # fleet-core
//!
//! Discovery engine for Fleet: figures out which daemon/worker instances are
//! running, whether they are reachable, and which tmux pane hosts each worker.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. One discovery cycle runs to completion;
//!   only the port probes fan out, on scoped threads.
//! - **Fail closed**: A missing tmux server, a failed `ps`, or a corrupt cache
//!   yields empty/false observations, never an error to the caller.
//! - **Bulk over per-PID**: One process table and one pane listing per cycle.
//! - **Guarded signals**: Only [`TerminationGate`] sends signals, and only after
//!   re-verifying the target.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fleet_core::{load_config, config_path, Discovery, StorageConfig};
//!
//! let storage = StorageConfig::from_env()?;
//! let config = load_config(&config_path(&storage))?;
//! let mut discovery = Discovery::from_config(&config, &storage);
//! for instance in discovery.discover_instances() {
//!     println!("{} {}", instance.work_dir_key, instance.status);
//! }
//! ```

pub mod cache;
mod command;
pub mod config;
pub mod correlate;
pub mod discovery;
pub mod error;
pub mod instances;
pub mod process;
pub mod status;
pub mod storage;
pub mod terminate;
pub mod tmux;

pub use cache::{FileCache, MemoryCache};
pub use config::{config_path, load_config, FleetConfig};
pub use correlate::{correlate, CorrelationResult, MatchMode};
pub use discovery::{Discovery, InstanceRecord};
pub use error::{FleetError, Result};
pub use instances::{InstanceDescriptor, InstanceSource, MetadataDirSource};
pub use process::{
    build_process_table, LivenessProbe, ProcessRecord, ProcessSource, ProcessTable,
    PsProcessSource, SystemProbe,
};
pub use status::{resolve, InstanceSnapshot, InstanceStatus};
pub use storage::StorageConfig;
pub use terminate::{
    TerminateRejection, Terminated, TerminationGate, TerminationSignal,
};
pub use tmux::{list_panes, list_sessions, PaneRecord, SessionRecord, TmuxAdapter, TmuxCli};
