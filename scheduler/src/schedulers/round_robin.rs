use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroU64;

use crate::{ProcessEntity, Scheduler, Ticks};

/// Round robin over the ready queue.
///
/// `select` is a plain FIFO pop. The driver is responsible for counting
/// the ticks each process has run since its last dispatch and for putting
/// it back at the tail once `quantum` ticks were used.
#[derive(Debug, Clone, Copy)]
pub struct RoundRobin {
    quantum: NonZeroU64,
}

impl RoundRobin {
    pub fn new(quantum: NonZeroU64) -> Self {
        RoundRobin { quantum }
    }
}

impl Scheduler for RoundRobin {
    fn select(
        &mut self,
        ready: &mut VecDeque<ProcessEntity>,
        _now: Ticks,
        _running: &[ProcessEntity],
        _free_slots: usize,
    ) -> Option<ProcessEntity> {
        ready.pop_front()
    }

    fn quantum(&self) -> Option<NonZeroU64> {
        Some(self.quantum)
    }

    fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RoundRobin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RR(quantum={})", self.quantum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulers::test_util::{drain, ready};

    #[test]
    fn strict_fifo() {
        let mut rr = RoundRobin::new(NonZeroU64::new(2).unwrap());
        let mut queue = ready(&[(5, 1), (0, 9), (3, 2)]);
        assert_eq!(drain(&mut rr, &mut queue, 5), vec![1, 2, 3]);
    }

    #[test]
    fn reports_quantum() {
        let rr = RoundRobin::new(NonZeroU64::new(3).unwrap());
        assert_eq!(rr.quantum().map(NonZeroU64::get), Some(3));
        assert_eq!(rr.name(), "RR(quantum=3)");
    }
}
