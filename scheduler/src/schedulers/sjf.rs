use std::collections::VecDeque;

use crate::scheduler::take_first_min;
use crate::{ProcessEntity, Scheduler, Ticks};

/// Shortest job first, non-preemptive.
///
/// Compares the total burst time, breaking ties by arrival.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sjf;

impl Scheduler for Sjf {
    fn select(
        &mut self,
        ready: &mut VecDeque<ProcessEntity>,
        _now: Ticks,
        _running: &[ProcessEntity],
        _free_slots: usize,
    ) -> Option<ProcessEntity> {
        take_first_min(ready, |p| (p.burst_time, p.arrival_time))
    }

    fn name(&self) -> String {
        String::from("SJF")
    }
}
