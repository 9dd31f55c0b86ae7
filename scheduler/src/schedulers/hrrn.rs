use std::cmp::Reverse;
use std::collections::VecDeque;

use crate::scheduler::take_first_min;
use crate::{ProcessEntity, Scheduler, Ticks};

/// Highest response ratio next.
///
/// `ratio = (waited + burst) / burst` where `waited = now - arrival`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hrrn;

pub(crate) fn response_ratio(process: &ProcessEntity, now: Ticks) -> f64 {
    if process.burst_time == 0 {
        return f64::INFINITY;
    }
    let waited = now.saturating_sub(process.arrival_time) as f64;
    let burst = process.burst_time as f64;
    (waited + burst) / burst
}

impl Scheduler for Hrrn {
    fn select(
        &mut self,
        ready: &mut VecDeque<ProcessEntity>,
        now: Ticks,
        _running: &[ProcessEntity],
        _free_slots: usize,
    ) -> Option<ProcessEntity> {
        for process in ready.iter_mut() {
            process.response_ratio = response_ratio(process, now);
        }
        take_first_min(ready, |p| Reverse(p.response_ratio))
    }

    fn name(&self) -> String {
        String::from("HRRN")
    }
}
