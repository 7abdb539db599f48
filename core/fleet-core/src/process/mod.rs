//! OS process observation: the bulk process table and the liveness probes.

mod liveness;
mod table;

pub use liveness::{is_pid_alive, is_port_listening, LivenessProbe, SystemProbe};
pub use table::{
    build_process_table, normalize_tty, parse_ps_output, ProcessRecord, ProcessSource,
    ProcessTable, PsProcessSource,
};
