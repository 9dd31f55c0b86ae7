use core::module_path;
use std::num::NonZeroU64;

use function_name::named;
use processor::segments;
use scheduler::Policy;

use super::{dispatch_order, metrics, process, run, simulate};

fn rr(quantum: u64) -> Policy {
    Policy::RoundRobin {
        quantum: NonZeroU64::new(quantum).unwrap(),
    }
}

#[test]
#[named]
pub fn single_process_is_split_into_quanta() {
    let clock = simulate(rr(2), 1, vec![process(1, 0, 5)]);

    run(
        module_path!().split("::").last().unwrap(),
        function_name!(),
        &clock,
        "T=0: [T0:P1]
T=1: [T0:P1]
T=2: [T0:P1]
T=3: [T0:P1]
T=4: [T0:P1]
T=5: [T0:Idle]
",
    );
    let lengths: Vec<_> = segments(clock.logs()).iter().map(|s| s.length).collect();
    assert_eq!(lengths, vec![2, 2, 1]);
    assert_eq!(metrics(&clock, 1), (Some(0), Some(5), 5, 0));
}

#[test]
#[named]
pub fn expired_processes_go_to_the_tail() {
    let clock = simulate(
        rr(2),
        1,
        vec![process(1, 0, 3), process(2, 0, 3), process(3, 1, 2)],
    );

    run(
        module_path!().split("::").last().unwrap(),
        function_name!(),
        &clock,
        "T=0: [T0:P1]
T=1: [T0:P1]
T=2: [T0:P2]
T=3: [T0:P2]
T=4: [T0:P3]
T=5: [T0:P3]
T=6: [T0:P1]
T=7: [T0:P2]
T=8: [T0:Idle]
",
    );
    assert_eq!(dispatch_order(&clock), vec![1, 2, 3, 1, 2]);
    // P3 used its whole quantum but had nothing left, so it was not requeued.
    let preempted: Vec<_> = clock
        .logs()
        .iter()
        .flat_map(|log| log.preempted.iter().map(|pid| pid.get()))
        .collect();
    assert_eq!(preempted, vec![1, 2]);
    assert_eq!(metrics(&clock, 1), (Some(0), Some(7), 7, 4));
    assert_eq!(metrics(&clock, 2), (Some(2), Some(8), 8, 5));
    assert_eq!(metrics(&clock, 3), (Some(4), Some(6), 5, 3));
}
