//! The selection policies.
//!
//! Every policy implements [`Scheduler::select`](crate::Scheduler::select)
//! over the same ready queue; only the ordering rule differs.

mod fcfs;
pub use fcfs::Fcfs;

mod sjf;
pub use sjf::Sjf;

mod srtf;
pub use srtf::Srtf;

mod round_robin;
pub use round_robin::RoundRobin;

mod hrrn;
pub use hrrn::Hrrn;

mod priority;
pub use priority::PriorityNp;
