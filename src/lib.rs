//! litmusgen - randomized x86-64 memory-ordering litmus tests.
//!
//! litmusgen encodes short sequences of loads, stores, exchanges and fences directly
//! into executable memory and runs them concurrently across forked processes that
//! share mapped regions, so the processor's ordering behavior can be observed.
//!
//! # Primary Usage
//!
//! ```no_run
//! use litmusgen::core::RunConfig;
//! use litmusgen::litmus::Harness;
//!
//! let config = RunConfig { seed: 1, insn_count: 1000, task_count: 4, ..RunConfig::default() };
//! let report = Harness::new(config)?.run()?;
//! assert!(report.all_passed());
//! # Ok::<(), litmusgen::core::HarnessError>(())
//! ```
//!
//! # Architecture
//!
//! - [`x64`] - operand model, bit-exact encoder, disassembly listings
//! - [`core`] - configuration, errors, bounded code buffer, shared regions
//! - [`litmus`] - random generator and multi-process harness

pub mod core;
pub mod litmus;
pub mod x64;

pub use crate::core::{
    CodeBuffer, EncodeError, GeneratorConfig, HarnessError, RegionError, RegionSet, RunConfig,
    Variant,
};
pub use crate::litmus::{Generator, Harness, RunReport, TaskOutcome};
pub use crate::x64::{Displacement, Family, Insn, Lock, MemOperand, OperandSize, Reg};
