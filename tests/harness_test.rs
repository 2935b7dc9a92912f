//! End-to-end runs: generate, fork, execute and join.
//!
//! These execute generated machine code, so they only run on x86-64 Linux.

#![cfg(all(target_arch = "x86_64", target_os = "linux"))]

use litmusgen::core::config::{GeneratorConfig, RunConfig, Variant, CODE_BYTES_PER_TASK};
use litmusgen::core::{CodeBuffer, RegionSet};
use litmusgen::litmus::{spawn_task, Generator, Harness, TaskOutcome, EPILOGUE_LEN, PROLOGUE_LEN};

#[test]
fn empty_stream_returns_zero() {
    let config = RunConfig { seed: 0, insn_count: 0, task_count: 1, ..RunConfig::default() };
    let report = Harness::new(config).unwrap().run().unwrap();
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].outcome, TaskOutcome::Exited(0));
}

#[test]
fn empty_stream_is_only_the_frame() {
    let regions = RegionSet::acquire(1).unwrap();
    let task = regions.task(0).unwrap();
    // SAFETY: regions outlives the slice and no other reference to it exists.
    let mut code = CodeBuffer::new(unsafe { task.code.as_mut_slice() });
    let built = Generator::seeded(0, GeneratorConfig::default())
        .build(&mut code, task.data.addr(), 0)
        .unwrap();
    assert_eq!(built, 0);
    assert_eq!(code.len(), PROLOGUE_LEN + EPILOGUE_LEN);
}

#[test]
fn four_tasks_all_join() {
    let config = RunConfig { seed: 1234, insn_count: 1000, task_count: 4, ..RunConfig::default() };
    let report = Harness::new(config).unwrap().run().unwrap();

    assert_eq!(report.tasks.len(), 4);
    for (index, task) in report.tasks.iter().enumerate() {
        assert_eq!(task.index, index);
        assert_eq!(task.outcome, TaskOutcome::Exited(0), "task {index}");
    }
    let mut pids: Vec<i32> = report.tasks.iter().map(|t| t.pid).collect();
    pids.sort_unstable();
    pids.dedup();
    assert_eq!(pids.len(), 4);
    assert!(report.all_passed());
}

#[test]
fn baseline_variant_runs() {
    let config = RunConfig {
        seed: 9,
        insn_count: 500,
        task_count: 2,
        generator: GeneratorConfig { variant: Variant::Baseline, ..GeneratorConfig::default() },
    };
    assert!(Harness::new(config).unwrap().run().unwrap().all_passed());
}

#[test]
fn oversized_request_still_runs() {
    // Far more instructions than fit; generation stops at the capacity limit.
    let config = RunConfig {
        seed: 3,
        insn_count: CODE_BYTES_PER_TASK,
        task_count: 2,
        ..RunConfig::default()
    };
    assert!(Harness::new(config).unwrap().run().unwrap().all_passed());
}

#[test]
fn tasks_leave_their_neighbours_data_alone() {
    let config = RunConfig { seed: 77, insn_count: 2000, task_count: 3, ..RunConfig::default() };
    let regions = RegionSet::acquire(3).unwrap();

    // Task 1 is never run; its data must stay zero while tasks 0 and 2 run.
    let handles: Vec<_> = [0usize, 2]
        .iter()
        .map(|&index| spawn_task(&regions.task(index).unwrap(), &config).unwrap())
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().outcome.passed());
    }

    let idle = regions.task(1).unwrap();
    // SAFETY: all children have exited; nothing else references this sub-region.
    let data = unsafe { idle.data.as_mut_slice() };
    assert!(data.iter().all(|&b| b == 0));

    let active = regions.task(0).unwrap();
    // SAFETY: as above.
    let written = unsafe { active.data.as_mut_slice() };
    assert!(written.iter().any(|&b| b != 0));
}
