//! Litmus test generation and concurrent execution.
//!
//! - [`generator`]: builds a randomized test function into a task's code sub-region
//! - [`harness`]: forks one process per task, runs the generated code, joins them

pub mod generator;
pub mod harness;

pub use generator::{
    emit_epilogue, emit_prologue, Generator, DATA_BASE_REG, EPILOGUE_LEN, PROLOGUE_LEN,
};
pub use harness::{
    run_task, spawn_task, Harness, RunReport, SpawnedTask, TaskOutcome, TaskPhase, TaskReport,
    TestFn,
};
