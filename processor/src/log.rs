use std::collections::HashMap;
use std::fmt::{self, Display, Write};

use scheduler::{Pid, ProcessEntity, Ticks};

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub time: Ticks,

    /// The process that executed on each slot during this tick.
    pub slots: Vec<Option<Pid>>,

    /// Processes that entered the ready queue.
    pub arrived: Vec<Pid>,

    /// Processes completed at the start of this tick.
    pub completed: Vec<Pid>,

    /// Processes placed on a slot.
    pub dispatched: Vec<Pid>,

    /// Processes sent back to the ready queue after using their quantum.
    pub preempted: Vec<Pid>,
}

impl Log {
    pub(crate) fn new(time: Ticks, slots: usize) -> Log {
        Log {
            time,
            slots: vec![None; slots],
            arrived: Vec::new(),
            completed: Vec::new(),
            dispatched: Vec::new(),
            preempted: Vec::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl Display for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T={}:", self.time)?;
        for (slot, pid) in self.slots.iter().enumerate() {
            match pid {
                Some(pid) => write!(f, " [T{slot}:P{pid}]")?,
                None => write!(f, " [T{slot}:Idle]")?,
            }
        }
        Ok(())
    }
}

/// A contiguous run of one process on one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub pid: Pid,
    pub slot: usize,
    pub start: Ticks,
    pub length: Ticks,
}

/// Splits the logs into run segments, ordered by start time then slot.
///
/// A new segment starts every time a process is dispatched.
pub fn segments(logs: &[Log]) -> Vec<Segment> {
    let mut open: HashMap<Pid, Segment> = HashMap::new();
    let mut closed = Vec::new();

    for log in logs {
        for pid in &log.dispatched {
            if let Some(segment) = open.remove(pid) {
                closed.push(segment);
            }
        }

        let mut seen = Vec::new();
        for (slot, pid) in log.slots.iter().enumerate() {
            let Some(pid) = pid else { continue };
            seen.push(*pid);
            open.entry(*pid)
                .or_insert(Segment {
                    pid: *pid,
                    slot,
                    start: log.time,
                    length: 0,
                })
                .length += 1;
        }

        let stopped: Vec<Pid> = open.keys().filter(|pid| !seen.contains(pid)).copied().collect();
        for pid in stopped {
            if let Some(segment) = open.remove(&pid) {
                closed.push(segment);
            }
        }
    }

    closed.extend(open.into_values());
    closed.sort_by_key(|segment| (segment.start, segment.slot));
    closed
}

/// Averages over the completed processes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub completed: usize,
    pub average_turnaround: f64,
    pub average_waiting: f64,
    /// Total ticks the simulation ran for.
    pub ticks: Ticks,
}

impl Summary {
    pub fn from_completed(completed: &[ProcessEntity], ticks: Ticks) -> Option<Summary> {
        if completed.is_empty() {
            return None;
        }
        let count = completed.len() as f64;
        let turnaround: Ticks = completed.iter().map(|p| p.turnaround_time).sum();
        let waiting: Ticks = completed.iter().map(|p| p.waiting_time).sum();
        Some(Summary {
            completed: completed.len(),
            average_turnaround: turnaround as f64 / count,
            average_waiting: waiting as f64 / count,
            ticks,
        })
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processes in {} ticks, average turnaround {:.2}, average waiting {:.2}",
            self.completed, self.ticks, self.average_turnaround, self.average_waiting
        )
    }
}

/// Format the [`SimulationClock`](crate::SimulationClock)'s logs as a
/// text Gantt chart, one line per tick.
///
/// ## Example
///
/// ```rust
/// use processor::{format_logs, SimulationClock};
/// use scheduler::{Pid, Policy, ProcessEntity};
/// use std::num::NonZeroUsize;
///
/// let clock = SimulationClock::run(
///     Policy::Fcfs.build(),
///     NonZeroUsize::new(1).unwrap(),
///     vec![ProcessEntity::new(Pid::new(1), "a.txt", 0, 2)],
/// );
///
/// assert_eq!(format_logs(clock.logs()), "T=0: [T0:P1]\nT=1: [T0:P1]\nT=2: [T0:Idle]\n");
/// ```
pub fn format_logs(logs: &[Log]) -> String {
    let mut s = String::new();
    for log in logs {
        let _ = writeln!(s, "{log}");
    }
    s
}

/// Format the per-process table (one row per process, sorted by PID).
pub fn format_table(processes: &[ProcessEntity]) -> String {
    let mut rows: Vec<&ProcessEntity> = processes.iter().collect();
    rows.sort_by_key(|p| p.pid);

    let mut s = String::from("PID\tSTATE\t\tARRIVAL\tBURST\tSTART\tEND\tTURN\tWAIT\tFILE\n");
    for p in rows {
        let start = p.start_time.map_or_else(|| "-".to_string(), |t| t.to_string());
        let end = p.completion_time.map_or_else(|| "-".to_string(), |t| t.to_string());
        let _ = writeln!(
            s,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            p.pid,
            p.state,
            p.arrival_time,
            p.burst_time,
            start,
            end,
            p.turnaround_time,
            p.waiting_time,
            p.filename
        );
    }
    s
}
