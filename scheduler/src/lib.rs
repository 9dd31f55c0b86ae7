//! A scheduler library.
//!
//! This library provides the process model and the selection policies
//! used by the tick-driven simulation in the `processor` crate.
//!

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use thiserror::Error;

mod scheduler;

pub use crate::scheduler::{Pid, ProcessEntity, ProcessState, Scheduler, Ticks};

mod schedulers;

pub use schedulers::{Fcfs, Hrrn, PriorityNp, RoundRobin, Sjf, Srtf};

/// Quantum used for round robin when none is given.
pub const DEFAULT_QUANTUM: NonZeroU64 = match NonZeroU64::new(2) {
    Some(quantum) => quantum,
    None => unreachable!(),
};

/// Returns a first come, first served scheduler.
pub fn fcfs() -> impl Scheduler {
    Fcfs
}

/// Returns a non-preemptive shortest job first scheduler.
pub fn sjf() -> impl Scheduler {
    Sjf
}

/// Returns a shortest remaining time first scheduler.
pub fn srtf() -> impl Scheduler {
    Srtf
}

/// Returns a structure that implements the `Scheduler` trait with a round robin scheduler policy
///
/// * `quantum` - the number of ticks that a process can run before it is sent
///               back to the tail of the ready queue.
pub fn round_robin(quantum: NonZeroU64) -> impl Scheduler {
    RoundRobin::new(quantum)
}

/// Returns a highest response ratio next scheduler.
pub fn hrrn() -> impl Scheduler {
    Hrrn
}

/// Returns a non-preemptive priority scheduler (lower value runs first).
pub fn priority() -> impl Scheduler {
    PriorityNp
}

/// Errors produced while choosing a policy from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParsePolicyError {
    #[error("unknown scheduling policy '{0}' (expected one of fcfs, sjf, srtf, rr, hrrn, priority)")]
    UnknownPolicy(String),

    #[error("round robin quantum must be a positive integer")]
    ZeroQuantum,
}

/// The policy a simulation runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Fcfs,
    Sjf,
    Srtf,
    RoundRobin { quantum: NonZeroU64 },
    Hrrn,
    PriorityNp,
}

impl Policy {
    /// Parses a policy name, using `quantum` when the name selects round robin.
    pub fn parse(name: &str, quantum: u64) -> Result<Policy, ParsePolicyError> {
        let policy = match name.to_ascii_lowercase().as_str() {
            "fcfs" => Policy::Fcfs,
            "sjf" => Policy::Sjf,
            "srtf" => Policy::Srtf,
            "rr" | "round-robin" | "round_robin" => Policy::RoundRobin {
                quantum: NonZeroU64::new(quantum).ok_or(ParsePolicyError::ZeroQuantum)?,
            },
            "hrrn" => Policy::Hrrn,
            "priority" | "priority_np" | "priority-np" => Policy::PriorityNp,
            _ => return Err(ParsePolicyError::UnknownPolicy(name.to_string())),
        };
        Ok(policy)
    }

    /// Builds the scheduler for this policy.
    pub fn build(self) -> Box<dyn Scheduler> {
        match self {
            Policy::Fcfs => Box::new(fcfs()),
            Policy::Sjf => Box::new(sjf()),
            Policy::Srtf => Box::new(srtf()),
            Policy::RoundRobin { quantum } => Box::new(round_robin(quantum)),
            Policy::Hrrn => Box::new(hrrn()),
            Policy::PriorityNp => Box::new(priority()),
        }
    }

    pub fn all(quantum: NonZeroU64) -> [Policy; 6] {
        [
            Policy::Fcfs,
            Policy::Sjf,
            Policy::Srtf,
            Policy::RoundRobin { quantum },
            Policy::Hrrn,
            Policy::PriorityNp,
        ]
    }
}

impl FromStr for Policy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Policy::parse(s, DEFAULT_QUANTUM.get())
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Fcfs => write!(f, "FCFS"),
            Policy::Sjf => write!(f, "SJF"),
            Policy::Srtf => write!(f, "SRTF"),
            Policy::RoundRobin { quantum } => write!(f, "RR(quantum={quantum})"),
            Policy::Hrrn => write!(f, "HRRN"),
            Policy::PriorityNp => write!(f, "Priority_NP"),
        }
    }
}
