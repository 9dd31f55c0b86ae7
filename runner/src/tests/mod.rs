use std::num::NonZeroUsize;

use processor::{format_logs, SimulationClock};
use scheduler::{Pid, Policy, ProcessEntity, Ticks};

use crate::simulation::SimulationConfig;

mod time_sliced;

/// Compares the Gantt trace of `clock` against `expected`.
fn run(folder: &str, name: &str, clock: &SimulationClock, expected: &str) {
    let output = format_logs(clock.logs());

    println!("\n{folder}::{name} ({})", clock.scheduler_name());
    println!("left = Correct Output\nright = Your Output\n");
    use pretty_assertions::assert_eq;
    assert_eq!(expected, output);
}

fn process(pid: usize, arrival: Ticks, burst: Ticks) -> ProcessEntity {
    ProcessEntity::new(Pid::new(pid), format!("p{pid}.txt"), arrival, burst)
}

fn simulate(policy: Policy, slots: usize, processes: Vec<ProcessEntity>) -> SimulationClock {
    let slots = NonZeroUsize::new(slots).unwrap();
    SimulationConfig::new(policy, slots).run(processes)
}

/// PIDs in the order they were placed on a slot, re-dispatches included.
fn dispatch_order(clock: &SimulationClock) -> Vec<usize> {
    clock
        .logs()
        .iter()
        .flat_map(|log| log.dispatched.iter().map(|pid| pid.get()))
        .collect()
}

/// `(start, completion, turnaround, waiting)` of a completed process.
fn metrics(clock: &SimulationClock, pid: usize) -> (Option<Ticks>, Option<Ticks>, Ticks, Ticks) {
    let p = clock
        .completed()
        .iter()
        .find(|p| p.pid == pid)
        .unwrap_or_else(|| panic!("P{pid} did not complete"));
    (p.start_time, p.completion_time, p.turnaround_time, p.waiting_time)
}
