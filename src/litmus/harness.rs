// This module runs generated test functions concurrently. The coordinating process maps
// the code, data and communication regions once, then forks one OS process per task so
// every task is independently scheduled while still seeing the same shared physical pages.
// Each child generates its own stream into its own code sub-region (no two tasks ever write
// the same code bytes), calls the start of that sub-region as a no-argument function
// returning an int, and exits with the returned status. The parent spawns every task before
// waiting on any, then joins them in index order and turns each wait status into a typed
// TaskOutcome. There is no timeout: a task that never returns blocks its join. Spawn
// failure is fatal to the run; already spawned tasks are still reaped before the error is
// returned.

//! Multi-process execution harness.

use std::fmt;
use std::io;

use crate::core::config::{RunConfig, COMM_BYTES_PER_TASK};
use crate::core::error::{abort_on_encode_error, HarnessError, HarnessResult};
use crate::core::region::{RegionSet, TaskRegions};
use crate::core::CodeBuffer;
use crate::litmus::generator::Generator;
use crate::x64::disasm;

/// Signature of a generated test function.
pub type TestFn = unsafe extern "C" fn() -> i32;

/// Lifecycle of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Spawned,
    Generating,
    Executing,
    Joined,
}

/// How a task process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Exited normally with this status.
    Exited(i32),
    /// Killed by this signal.
    Signaled(i32),
}

impl TaskOutcome {
    fn from_wait_status(status: libc::c_int) -> Self {
        if libc::WIFEXITED(status) {
            TaskOutcome::Exited(libc::WEXITSTATUS(status))
        } else {
            TaskOutcome::Signaled(libc::WTERMSIG(status))
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, TaskOutcome::Exited(0))
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Exited(0) => f.write_str("pass"),
            TaskOutcome::Exited(code) => write!(f, "fail (status {code})"),
            TaskOutcome::Signaled(sig) => write!(f, "fail (signal {sig})"),
        }
    }
}

/// Result of joining one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub index: usize,
    pub pid: i32,
    pub outcome: TaskOutcome,
}

/// A running task process.
#[derive(Debug)]
pub struct SpawnedTask {
    index: usize,
    pid: libc::pid_t,
}

impl SpawnedTask {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Block until the task exits.
    pub fn join(self) -> HarnessResult<TaskReport> {
        let mut status: libc::c_int = 0;
        loop {
            // SAFETY: pid is a child of this process that has not been reaped yet.
            let rc = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if rc == self.pid {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(HarnessError::Join { index: self.index, pid: self.pid, source: err });
            }
        }

        let outcome = TaskOutcome::from_wait_status(status);
        log::debug!("task {}: {:?} ({outcome})", self.index, TaskPhase::Joined);
        Ok(TaskReport { index: self.index, pid: self.pid, outcome })
    }
}

/// Generate and execute one task's test function in the calling process.
///
/// Returns the generated function's status. Encoder contract violations terminate the
/// process.
pub fn run_task(task: &TaskRegions, config: &RunConfig) -> i32 {
    let index = task.index;
    log::debug!("task {index}: {:?}", TaskPhase::Generating);

    // SAFETY: the region set outlives this call and only this task touches its code
    // sub-region.
    let code_bytes = unsafe { task.code.as_mut_slice() };
    let mut code = CodeBuffer::new(code_bytes);
    let mut generator = Generator::seeded(config.task_seed(index), config.generator);
    let built = match generator.build(&mut code, task.data.addr(), config.insn_count) {
        Ok(built) => built,
        Err(err) => abort_on_encode_error(err),
    };

    if log::log_enabled!(log::Level::Trace) {
        for line in disasm::listing(code.as_slice(), task.code.addr()) {
            log::trace!("task {index}: {line}");
        }
    }

    log::debug!("task {index}: {:?}", TaskPhase::Executing);
    // SAFETY: the sub-region is mapped executable and now holds a complete function that
    // preserves callee-saved registers, only touches this task's data sub-region, and
    // returns.
    let status = unsafe {
        let entry: TestFn = std::mem::transmute(task.code.as_ptr());
        entry()
    };

    log::info!("task {index}: {built} instructions generated and executed, status {status}");
    status
}

/// Fork a process that runs [`run_task`] and exits with its status.
pub fn spawn_task(task: &TaskRegions, config: &RunConfig) -> HarnessResult<SpawnedTask> {
    // SAFETY: the child only generates code into memory it owns, runs it, and leaves
    // through `_exit` without returning into the caller.
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(HarnessError::Spawn { index: task.index, source: io::Error::last_os_error() }),
        0 => {
            let status = run_task(task, config);
            // SAFETY: terminates the child without running the parent's destructors.
            unsafe { libc::_exit(status) }
        }
        pid => {
            log::debug!("task {}: {:?} as pid {pid}", task.index, TaskPhase::Spawned);
            Ok(SpawnedTask { index: task.index, pid })
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.tasks.iter().all(|t| t.outcome.passed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| !t.outcome.passed())
    }
}

/// Join every task in index order.
///
/// A failed join does not stop the remaining tasks from being reaped; the first failure
/// is returned once all of them have been waited for.
fn join_all(spawned: Vec<SpawnedTask>) -> HarnessResult<Vec<TaskReport>> {
    let mut tasks = Vec::with_capacity(spawned.len());
    let mut first_err = None;
    for handle in spawned {
        match handle.join() {
            Ok(report) => tasks.push(report),
            Err(err) if first_err.is_none() => first_err = Some(err),
            Err(err) => log::warn!("{err}"),
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(tasks),
    }
}

/// Coordinates region setup, task spawning and joining.
pub struct Harness {
    config: RunConfig,
}

impl Harness {
    pub fn new(config: RunConfig) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run(&self) -> HarnessResult<RunReport> {
        let config = &self.config;
        let regions = RegionSet::acquire_with(
            config.task_count,
            config.generator.code_capacity,
            config.generator.data_size,
            COMM_BYTES_PER_TASK,
        )?;

        let task_regions = (0..config.task_count)
            .map(|index| regions.task(index))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| HarnessError::Config("task count exceeds mapped regions".into()))?;

        let mut spawned = Vec::with_capacity(config.task_count);
        for task in &task_regions {
            match spawn_task(task, config) {
                Ok(handle) => spawned.push(handle),
                Err(err) => {
                    if let Err(join_err) = join_all(spawned) {
                        log::warn!("{join_err}");
                    }
                    return Err(err);
                }
            }
        }

        let tasks = join_all(spawned)?;

        if let Err(err) = regions.release() {
            log::warn!("{err}");
        }

        Ok(RunReport { tasks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_status_decoding() {
        // Linux encodes a normal exit as status << 8 and a signal death in the low bits.
        assert_eq!(TaskOutcome::from_wait_status(0), TaskOutcome::Exited(0));
        assert_eq!(TaskOutcome::from_wait_status(3 << 8), TaskOutcome::Exited(3));
        assert_eq!(TaskOutcome::from_wait_status(libc::SIGSEGV), TaskOutcome::Signaled(11));
        assert!(TaskOutcome::Exited(0).passed());
        assert!(!TaskOutcome::Signaled(11).passed());
    }

    #[test]
    fn report_lists_failures() {
        let report = RunReport {
            tasks: vec![
                TaskReport { index: 0, pid: 10, outcome: TaskOutcome::Exited(0) },
                TaskReport { index: 1, pid: 11, outcome: TaskOutcome::Exited(1) },
            ],
        };
        assert!(!report.all_passed());
        assert_eq!(report.failed().map(|t| t.index).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn failed_join_still_reaps_later_tasks() {
        // SAFETY: the child exits immediately without touching shared state.
        let child = unsafe { libc::fork() };
        assert!(child >= 0);
        if child == 0 {
            // SAFETY: `_exit` never returns.
            unsafe { libc::_exit(0) };
        }

        // pid 1 is never a child of the test process, so its join fails with ECHILD.
        let spawned = vec![SpawnedTask { index: 0, pid: 1 }, SpawnedTask { index: 1, pid: child }];
        let err = join_all(spawned).unwrap_err();
        assert!(matches!(err, HarnessError::Join { index: 0, pid: 1, .. }), "{err}");

        let mut status = 0;
        // SAFETY: plain waitpid on a pid this process forked.
        let rc = unsafe { libc::waitpid(child, &mut status, libc::WNOHANG) };
        assert_eq!(rc, -1, "task 1 was left unreaped");
        assert_eq!(io::Error::last_os_error().raw_os_error(), Some(libc::ECHILD));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = RunConfig { task_count: 0, ..RunConfig::default() };
        assert!(matches!(Harness::new(config), Err(HarnessError::Config(_))));
    }
}
