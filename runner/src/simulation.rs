use std::fmt::Write;
use std::num::NonZeroUsize;
use std::path::Path;

use processor::{format_logs, format_table, workload_from_files, Log, SimulationClock, Summary};
use scheduler::{Pid, Policy, ProcessEntity};

/// Which policy a simulation uses and how many slots it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationConfig {
    pub policy: Policy,
    pub slots: NonZeroUsize,
}

impl SimulationConfig {
    pub fn new(policy: Policy, slots: NonZeroUsize) -> Self {
        SimulationConfig { policy, slots }
    }

    pub fn run(&self, processes: Vec<ProcessEntity>) -> SimulationClock {
        SimulationClock::run(self.policy.build(), self.slots, processes)
    }
}

/// One clock shared by every batch a client receives.
///
/// Each batch arrives at the current simulated time, PIDs keep counting,
/// and only the ticks and processes of that batch are reported.
pub struct BatchSimulation {
    clock: SimulationClock,
    next_pid: Pid,
}

impl BatchSimulation {
    pub fn new(config: &SimulationConfig) -> Self {
        BatchSimulation {
            clock: SimulationClock::new(config.policy.build(), config.slots),
            next_pid: Pid::first(),
        }
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Simulates `files` and returns the report for this batch.
    pub fn run_batch<P: AsRef<Path>>(&mut self, files: &[P]) -> String {
        let logs_from = self.clock.logs().len();
        let completed_from = self.clock.completed().len();

        let processes = workload_from_files(files, self.clock.now(), self.next_pid);
        self.next_pid = self.next_pid + processes.len();
        self.clock.admit(processes);
        self.clock.run_to_completion();

        render_parts(
            &self.clock,
            &self.clock.logs()[logs_from..],
            &self.clock.completed()[completed_from..],
        )
    }
}

/// The trace, the per-process table and the averages of a finished run.
pub fn render(clock: &SimulationClock) -> String {
    render_parts(clock, clock.logs(), clock.completed())
}

fn render_parts(clock: &SimulationClock, logs: &[Log], completed: &[ProcessEntity]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Policy: {}, slots: {}", clock.scheduler_name(), clock.slots());
    out.push_str(&format_logs(logs));
    out.push('\n');
    out.push_str(&format_table(completed));
    match Summary::from_completed(completed, clock.now()) {
        Some(summary) => {
            let _ = writeln!(out, "{summary}");
        }
        None => out.push_str("No processes.\n"),
    }
    out
}
