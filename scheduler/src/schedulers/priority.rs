use std::collections::VecDeque;

use crate::scheduler::take_first_min;
use crate::{ProcessEntity, Scheduler, Ticks};

/// Non-preemptive priority scheduling, lower value wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityNp;

impl Scheduler for PriorityNp {
    fn select(
        &mut self,
        ready: &mut VecDeque<ProcessEntity>,
        _now: Ticks,
        _running: &[ProcessEntity],
        _free_slots: usize,
    ) -> Option<ProcessEntity> {
        take_first_min(ready, |p| (p.priority, p.arrival_time))
    }

    fn name(&self) -> String {
        String::from("Priority_NP")
    }
}
