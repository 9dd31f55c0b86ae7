use std::collections::VecDeque;

use crate::scheduler::take_first_min;
use crate::{ProcessEntity, Scheduler, Ticks};

/// Shortest remaining time first.
///
/// Only the selection rule lives here. Whether a running process gets
/// preempted is up to the driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct Srtf;

impl Scheduler for Srtf {
    fn select(
        &mut self,
        ready: &mut VecDeque<ProcessEntity>,
        _now: Ticks,
        _running: &[ProcessEntity],
        _free_slots: usize,
    ) -> Option<ProcessEntity> {
        take_first_min(ready, |p| (p.remaining_burst_time, p.arrival_time))
    }

    fn name(&self) -> String {
        String::from("SRTF")
    }
}
