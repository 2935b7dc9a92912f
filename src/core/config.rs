//! Run configuration and fixed layout constants.

use crate::core::error::{HarnessError, HarnessResult};

/// Page size the logical region sizes are expressed in.
pub const PAGE_SIZE: usize = 4096;

/// Code bytes available to each task.
pub const CODE_BYTES_PER_TASK: usize = 3 * PAGE_SIZE;

/// Data bytes each task's generated code loads from and stores to.
pub const DATA_BYTES_PER_TASK: usize = 10 * PAGE_SIZE;

/// Communication bytes reserved per task.
pub const COMM_BYTES_PER_TASK: usize = PAGE_SIZE;

/// Room kept free at the end of a code sub-region: the largest single instruction
/// plus the epilogue.
pub const SAFETY_MARGIN: usize = 32;

/// Stack frame reserved by the prologue's ENTER.
pub const FRAME_SIZE: u16 = 2048;

/// Largest 8-bit displacement the generator draws.
pub const MAX_DISP8: i8 = 127;

/// Widest memory access any generated instruction performs.
pub const MAX_ACCESS_BYTES: usize = 8;

pub const DEFAULT_INSN_COUNT: usize = 25;
pub const DEFAULT_TASK_COUNT: usize = 1;

/// Upper bound on concurrent tasks; each one is a forked process.
pub const MAX_TASK_COUNT: usize = 4096;

/// Which instruction families the generator may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Register/immediate moves, loads and stores.
    Baseline,
    /// Baseline plus XCHG, XADD (optionally locked) and the three fences.
    #[default]
    Extended,
}

/// Generator parameters for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub variant: Variant,
    /// Bytes available in the task's code sub-region.
    pub code_capacity: usize,
    /// Bytes in the task's private data sub-region.
    pub data_size: usize,
    pub safety_margin: usize,
    pub frame_size: u16,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            code_capacity: CODE_BYTES_PER_TASK,
            data_size: DATA_BYTES_PER_TASK,
            safety_margin: SAFETY_MARGIN,
            frame_size: FRAME_SIZE,
        }
    }
}

impl GeneratorConfig {
    /// Soft end of the instruction body.
    pub fn body_limit(&self) -> usize {
        self.code_capacity.saturating_sub(self.safety_margin)
    }

    /// Largest 32-bit displacement that keeps the widest access inside the data region.
    pub fn max_disp32(&self) -> i32 {
        let max = self.data_size.saturating_sub(MAX_ACCESS_BYTES);
        i32::try_from(max).unwrap_or(i32::MAX)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.data_size < MAX_DISP8 as usize + 1 + MAX_ACCESS_BYTES {
            return Err(HarnessError::Config(format!(
                "data region of {} bytes cannot hold an 8-bit displacement access",
                self.data_size
            )));
        }
        // The last body instruction may end right at the soft limit.
        if self.safety_margin < crate::x64::MAX_INSN_LEN + crate::litmus::EPILOGUE_LEN {
            return Err(HarnessError::Config(format!(
                "safety margin of {} bytes is smaller than one instruction plus the epilogue",
                self.safety_margin
            )));
        }
        if self.code_capacity < self.safety_margin + crate::litmus::PROLOGUE_LEN {
            return Err(HarnessError::Config(format!(
                "code capacity of {} bytes cannot hold the prologue and safety margin",
                self.code_capacity
            )));
        }
        Ok(())
    }
}

/// Everything a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub seed: u64,
    /// Instructions requested per task.
    pub insn_count: usize,
    pub task_count: usize,
    pub generator: GeneratorConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            insn_count: DEFAULT_INSN_COUNT,
            task_count: DEFAULT_TASK_COUNT,
            generator: GeneratorConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> HarnessResult<()> {
        if self.task_count == 0 {
            return Err(HarnessError::Config("task count must be at least 1".into()));
        }
        if self.task_count > MAX_TASK_COUNT {
            return Err(HarnessError::Config(format!(
                "task count {} exceeds the limit of {MAX_TASK_COUNT}",
                self.task_count
            )));
        }
        self.generator.validate()
    }

    /// Seed for a task's generator.
    pub fn task_seed(&self, index: usize) -> u64 {
        self.seed.wrapping_add(index as u64)
    }
}
