//! A processor simulation library
//!
//! This is used for simulating schedulers from the [`scheduler`] crate over
//! a set of file-processing jobs, one discrete tick at a time.

mod clock;
mod log;
mod workload;

pub use clock::{SimulationClock, TickStatus};
pub use log::{format_logs, format_table, segments, Log, Segment, Summary};
pub use workload::{estimate_burst, workload_from_files, BYTES_PER_TICK, FALLBACK_BURST};
