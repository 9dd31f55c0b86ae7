use std::collections::VecDeque;

use crate::scheduler::take_first_min;
use crate::{ProcessEntity, Scheduler, Ticks};

/// First come, first served.
///
/// Picks the earliest arrival; ties keep the order in which processes
/// entered the ready queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fcfs;

impl Scheduler for Fcfs {
    fn select(
        &mut self,
        ready: &mut VecDeque<ProcessEntity>,
        _now: Ticks,
        _running: &[ProcessEntity],
        _free_slots: usize,
    ) -> Option<ProcessEntity> {
        take_first_min(ready, |p| p.arrival_time)
    }

    fn name(&self) -> String {
        String::from("FCFS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulers::test_util::{drain, ready};

    #[test]
    fn earliest_arrival_first() {
        let mut queue = ready(&[(0, 5), (2, 3), (1, 4)]);
        assert_eq!(drain(&mut Fcfs, &mut queue, 2), vec![1, 3, 2]);
    }

    #[test]
    fn ties_keep_enqueue_order() {
        let mut queue = ready(&[(1, 5), (0, 3), (1, 4), (0, 9)]);
        assert_eq!(drain(&mut Fcfs, &mut queue, 1), vec![2, 4, 1, 3]);
    }
}
