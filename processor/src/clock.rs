use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;

use scheduler::{Pid, ProcessEntity, Scheduler, Ticks};
use tracing::{debug, trace};

use crate::log::{Log, Summary};

/// Whether the simulation still has work after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Continue,
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct Seat {
    slot: usize,
    /// Ticks run since the last dispatch, used for the round robin quantum.
    used: u64,
}

/// Discrete-time driver for one simulation.
///
/// Every tick:
/// 1. pending processes whose arrival time has come move to the ready queue,
/// 2. running processes without remaining work are completed,
/// 3. idle slots are filled with whatever the scheduler selects,
/// 4. every running process executes one tick (round robin processes that
///    used up their quantum go back to the tail of the ready queue),
/// 5. the clock advances.
///
/// The loop is the same for every policy; the policy only decides the
/// order of step 3.
pub struct SimulationClock {
    scheduler: Box<dyn Scheduler>,
    slots: NonZeroUsize,
    now: Ticks,
    pending: Vec<ProcessEntity>,
    ready: VecDeque<ProcessEntity>,
    running: Vec<ProcessEntity>,
    seats: HashMap<Pid, Seat>,
    completed: Vec<ProcessEntity>,
    logs: Vec<Log>,
}

impl SimulationClock {
    /// * `scheduler` - the policy deciding which ready process runs next.
    /// * `slots` - the number of simulated execution threads.
    pub fn new(scheduler: Box<dyn Scheduler>, slots: NonZeroUsize) -> Self {
        SimulationClock {
            scheduler,
            slots,
            now: 0,
            pending: Vec::new(),
            ready: VecDeque::new(),
            running: Vec::new(),
            seats: HashMap::new(),
            completed: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// Runs `processes` to completion and returns the finished clock.
    pub fn run(scheduler: Box<dyn Scheduler>, slots: NonZeroUsize, processes: Vec<ProcessEntity>) -> Self {
        let mut clock = SimulationClock::new(scheduler, slots);
        clock.admit(processes);
        clock.run_to_completion();
        clock
    }

    /// Adds processes to the pending set. They enter the ready queue once
    /// the clock reaches their arrival time.
    pub fn admit(&mut self, processes: impl IntoIterator<Item = ProcessEntity>) {
        self.pending.extend(processes);
    }

    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn scheduler_name(&self) -> String {
        self.scheduler.name()
    }

    pub fn slots(&self) -> NonZeroUsize {
        self.slots
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && self.ready.is_empty() && self.running.is_empty()
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    pub fn completed(&self) -> &[ProcessEntity] {
        &self.completed
    }

    pub fn ready(&self) -> &VecDeque<ProcessEntity> {
        &self.ready
    }

    pub fn running(&self) -> &[ProcessEntity] {
        &self.running
    }

    pub fn summary(&self) -> Option<Summary> {
        Summary::from_completed(&self.completed, self.now)
    }

    pub fn run_to_completion(&mut self) {
        while self.tick() == TickStatus::Continue {}
        debug!(
            scheduler = %self.scheduler.name(),
            ticks = self.now,
            completed = self.completed.len(),
            "Simulation finished"
        );
    }

    /// Executes one tick.
    pub fn tick(&mut self) -> TickStatus {
        if self.is_finished() {
            return TickStatus::Finished;
        }

        let now = self.now;
        let mut log = Log::new(now, self.slots.get());

        self.admit_arrivals(now, &mut log);
        self.retire_finished(now, &mut log);
        self.fill_slots(now, &mut log);
        self.execute(&mut log);

        trace!(tick = now, "{}", log);
        self.logs.push(log);
        self.now += 1;

        if self.is_finished() {
            TickStatus::Finished
        } else {
            TickStatus::Continue
        }
    }

    fn admit_arrivals(&mut self, now: Ticks, log: &mut Log) {
        let (arrived, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.arrival_time <= now);
        self.pending = waiting;
        for mut process in arrived {
            process.make_ready();
            log.arrived.push(process.pid);
            self.ready.push_back(process);
        }
    }

    fn retire_finished(&mut self, now: Ticks, log: &mut Log) {
        let mut still_running = Vec::with_capacity(self.running.len());
        for mut process in self.running.drain(..) {
            if process.is_finished() {
                self.seats.remove(&process.pid);
                process.complete(now);
                log.completed.push(process.pid);
                self.completed.push(process);
            } else {
                still_running.push(process);
            }
        }
        self.running = still_running;
    }

    fn fill_slots(&mut self, now: Ticks, log: &mut Log) {
        let mut free_slots = self.slots.get() - self.running.len();
        while free_slots > 0 && !self.ready.is_empty() {
            let Some(mut process) =
                self.scheduler
                    .select(&mut self.ready, now, &self.running, free_slots)
            else {
                break;
            };
            process.dispatch(now);
            let slot = self.lowest_free_slot();
            self.seats.insert(process.pid, Seat { slot, used: 0 });
            log.dispatched.push(process.pid);
            self.running.push(process);
            free_slots -= 1;
        }
    }

    fn execute(&mut self, log: &mut Log) {
        let quantum = self.scheduler.quantum();
        let mut still_running = Vec::with_capacity(self.running.len());
        for mut process in self.running.drain(..) {
            process.advance_tick();
            let Some(seat) = self.seats.get_mut(&process.pid) else {
                still_running.push(process);
                continue;
            };
            log.slots[seat.slot] = Some(process.pid);
            seat.used += 1;

            let expired = quantum.is_some_and(|q| seat.used >= q.get());
            if expired && !process.is_finished() {
                self.seats.remove(&process.pid);
                process.make_ready();
                log.preempted.push(process.pid);
                self.ready.push_back(process);
            } else {
                still_running.push(process);
            }
        }
        self.running = still_running;
    }

    fn lowest_free_slot(&self) -> usize {
        (0..self.slots.get())
            .find(|slot| self.seats.values().all(|seat| seat.slot != *slot))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler::{Policy, ProcessState};
    use std::num::NonZeroU64;

    fn process(pid: usize, arrival: Ticks, burst: Ticks) -> ProcessEntity {
        ProcessEntity::new(Pid::new(pid), format!("f{pid}.txt"), arrival, burst)
    }

    fn one_slot() -> NonZeroUsize {
        NonZeroUsize::new(1).unwrap()
    }

    #[test]
    fn empty_clock_is_finished() {
        let mut clock = SimulationClock::new(Policy::Fcfs.build(), one_slot());
        assert_eq!(clock.tick(), TickStatus::Finished);
        assert!(clock.logs().is_empty());
        assert!(clock.summary().is_none());
    }

    #[test]
    fn single_process_runs_for_its_burst() {
        let clock = SimulationClock::run(Policy::Fcfs.build(), one_slot(), vec![process(1, 0, 3)]);

        let done = &clock.completed()[0];
        assert_eq!(done.state, ProcessState::Terminated);
        assert_eq!(done.start_time, Some(0));
        assert_eq!(done.completion_time, Some(3));
        assert_eq!(done.turnaround_time, 3);
        assert_eq!(done.waiting_time, 0);
        // Ticks 0..=2 run, tick 3 retires it.
        assert_eq!(clock.logs().len(), 4);
        assert_eq!(clock.logs()[3].slots, vec![None]);
    }

    #[test]
    fn idle_ticks_until_first_arrival() {
        let clock = SimulationClock::run(Policy::Fcfs.build(), one_slot(), vec![process(1, 2, 1)]);
        let done = &clock.completed()[0];
        assert_eq!(done.start_time, Some(2));
        assert_eq!(done.completion_time, Some(3));
        assert_eq!(clock.logs()[0].slots, vec![None]);
    }

    #[test]
    fn slots_run_in_parallel() {
        let slots = NonZeroUsize::new(2).unwrap();
        let clock = SimulationClock::run(
            Policy::Fcfs.build(),
            slots,
            vec![process(1, 0, 2), process(2, 0, 2), process(3, 0, 1)],
        );

        assert_eq!(clock.logs()[0].slots, vec![Some(Pid::new(1)), Some(Pid::new(2))]);
        let third = clock.completed().iter().find(|p| p.pid == 3).unwrap();
        assert_eq!(third.start_time, Some(2));
        assert_eq!(third.completion_time, Some(3));
        assert_eq!(third.waiting_time, 2);
    }

    #[test]
    fn quantum_expiry_requeues_at_tail() {
        let rr = Policy::RoundRobin { quantum: NonZeroU64::new(1).unwrap() };
        let clock = SimulationClock::run(rr.build(), one_slot(), vec![process(1, 0, 2), process(2, 0, 2)]);

        let order: Vec<_> = clock.logs().iter().filter_map(|log| log.slots[0]).collect();
        assert_eq!(order, vec![Pid::new(1), Pid::new(2), Pid::new(1), Pid::new(2)]);
        assert_eq!(clock.logs()[0].preempted, vec![Pid::new(1)]);
    }

    #[test]
    fn process_finishing_on_quantum_boundary_is_not_requeued() {
        let rr = Policy::RoundRobin { quantum: NonZeroU64::new(2).unwrap() };
        let clock = SimulationClock::run(rr.build(), one_slot(), vec![process(1, 0, 2)]);
        assert!(clock.logs().iter().all(|log| log.preempted.is_empty()));
        assert_eq!(clock.completed()[0].completion_time, Some(2));
    }

    #[test]
    fn late_admission_joins_running_simulation() {
        let mut clock = SimulationClock::new(Policy::Fcfs.build(), one_slot());
        clock.admit([process(1, 0, 2)]);
        assert_eq!(clock.tick(), TickStatus::Continue);
        clock.admit([process(2, clock.now(), 1)]);
        clock.run_to_completion();

        let second = clock.completed().iter().find(|p| p.pid == 2).unwrap();
        assert_eq!(second.arrival_time, 1);
        assert_eq!(second.start_time, Some(2));
        assert_eq!(second.completion_time, Some(3));
    }
}
