use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::num::{NonZeroU64, NonZeroUsize};
use std::ops::Add;

/// One discrete unit of simulated time.
pub type Ticks = u64;

/// The PID of a process
///
/// The PID cannot be 0, PIDs start from 1.
#[derive(PartialEq, Eq, Copy, Clone, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Pid(NonZeroUsize);

impl Pid {
    /// # Panics
    ///
    /// Panics if `pid` is 0.
    pub fn new(pid: usize) -> Pid {
        match NonZeroUsize::new(pid) {
            Some(pid) => Pid(pid),
            None => panic!("PID 0 is reserved"),
        }
    }

    pub fn first() -> Pid {
        Pid(NonZeroUsize::MIN)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl PartialEq<usize> for Pid {
    fn eq(&self, other: &usize) -> bool {
        self.0.get() == *other
    }
}

impl Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<usize> for Pid {
    type Output = Pid;

    fn add(self, rhs: usize) -> Self::Output {
        Pid(self.0.saturating_add(rhs))
    }
}

/// The state of a process.
///
/// Transitions only go `New -> Ready -> Running -> Terminated`, with
/// `Running -> Ready` allowed when a quantum expires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessState {
    /// Created but its arrival time has not been reached yet.
    New,

    /// The process is ready to be scheduled.
    Ready,

    /// The process is currently occupying an execution slot.
    Running,

    /// The process finished and its metrics are final.
    Terminated,
}

impl Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::New => write!(f, "NEW"),
            ProcessState::Ready => write!(f, "READY"),
            ProcessState::Running => write!(f, "RUNNING"),
            ProcessState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// A schedulable unit of work: one file waiting for simulated CPU time.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessEntity {
    pub pid: Pid,
    pub filename: String,
    pub arrival_time: Ticks,
    /// Total execution ticks the process needs.
    pub burst_time: Ticks,
    pub remaining_burst_time: Ticks,
    /// Lower value means higher priority.
    pub priority: i32,
    /// `None` until the process is dispatched for the first time.
    pub start_time: Option<Ticks>,
    pub completion_time: Option<Ticks>,
    pub waiting_time: Ticks,
    pub turnaround_time: Ticks,
    /// Only meaningful for HRRN, refreshed on every selection.
    pub response_ratio: f64,
    pub state: ProcessState,
}

impl ProcessEntity {
    pub fn new(pid: Pid, filename: impl Into<String>, arrival_time: Ticks, burst_time: Ticks) -> Self {
        ProcessEntity {
            pid,
            filename: filename.into(),
            arrival_time,
            burst_time,
            remaining_burst_time: burst_time,
            priority: 0,
            start_time: None,
            completion_time: None,
            waiting_time: 0,
            turnaround_time: 0,
            response_ratio: 0.0,
            state: ProcessState::New,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn make_ready(&mut self) {
        debug_assert!(matches!(self.state, ProcessState::New | ProcessState::Running));
        self.state = ProcessState::Ready;
    }

    /// Moves the process onto an execution slot at `now`.
    ///
    /// `start_time` is only recorded on the first dispatch.
    pub fn dispatch(&mut self, now: Ticks) {
        debug_assert_eq!(self.state, ProcessState::Ready);
        self.state = ProcessState::Running;
        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
    }

    /// Executes one tick. Has no effect unless the process is running.
    pub fn advance_tick(&mut self) {
        if self.state == ProcessState::Running {
            self.remaining_burst_time = self.remaining_burst_time.saturating_sub(1);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_burst_time == 0
    }

    /// Finalizes the metrics. Must be called at most once.
    pub fn complete(&mut self, at: Ticks) {
        debug_assert_ne!(self.state, ProcessState::Terminated);
        self.state = ProcessState::Terminated;
        self.completion_time = Some(at);
        self.turnaround_time = at.saturating_sub(self.arrival_time);
        // Waiting is measured against the original burst, not time spent running.
        self.waiting_time = self.turnaround_time.saturating_sub(self.burst_time);
    }
}

impl Display for ProcessEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PID: {}, File: {}, Arrival: {}, Burst: {}, Remaining: {}, State: {}",
            self.pid,
            self.filename,
            self.arrival_time,
            self.burst_time,
            self.remaining_burst_time,
            self.state
        )
    }
}

/// The trait that any scheduling policy has to implement.
pub trait Scheduler: Send {
    /// Picks the next process to run and removes it from `ready`.
    ///
    /// Returns [`None`] if and only if `ready` is empty. The driver calls
    /// this repeatedly while `free_slots > 0` and `ready` is not empty.
    ///
    /// * `now` - the current simulation tick.
    /// * `running` - the processes currently occupying slots.
    /// * `free_slots` - how many slots are still idle.
    fn select(
        &mut self,
        ready: &mut VecDeque<ProcessEntity>,
        now: Ticks,
        running: &[ProcessEntity],
        free_slots: usize,
    ) -> Option<ProcessEntity>;

    /// The time quantum after which a running process is sent back to the
    /// tail of the ready queue. Only round robin has one.
    fn quantum(&self) -> Option<NonZeroU64> {
        None
    }

    /// Short display name of the policy.
    fn name(&self) -> String;
}

/// Removes and returns the first entry of `ready` with the smallest key.
///
/// Ties keep the ready queue order, so this behaves like a stable sort
/// followed by popping the head.
pub(crate) fn take_first_min<K, F>(ready: &mut VecDeque<ProcessEntity>, key: F) -> Option<ProcessEntity>
where
    K: PartialOrd,
    F: Fn(&ProcessEntity) -> K,
{
    let mut best: Option<(usize, K)> = None;
    for (index, process) in ready.iter().enumerate() {
        let candidate = key(process);
        let better = match &best {
            Some((_, current)) => candidate < *current,
            None => true,
        };
        if better {
            best = Some((index, candidate));
        }
    }
    best.and_then(|(index, _)| ready.remove(index))
}
