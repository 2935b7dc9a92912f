// This module gathers the infrastructure shared by the generator and the harness: typed
// configuration with the fixed layout constants, the thiserror-based error types and the
// single abort policy for encoder contract violations, the bounded code buffer the
// generator writes through, and the shared memory region manager that partitions code,
// data and communication memory per task.

//! Core litmusgen infrastructure.
//!
//! - [`config`]: layout constants, [`GeneratorConfig`] and [`RunConfig`]
//! - [`error`]: error enums and result aliases
//! - [`code_buffer`]: cursor over a code sub-region with bounds checks
//! - [`region`]: shared read/write/execute mappings split per task

pub mod code_buffer;
pub mod config;
pub mod error;
pub mod region;

pub use code_buffer::CodeBuffer;
pub use config::{GeneratorConfig, RunConfig, Variant};
pub use error::{
    abort_on_encode_error, EncodeError, EncodeResult, HarnessError, HarnessResult, RegionError,
    RegionResult,
};
pub use region::{RegionKind, RegionSet, SubRegion, TaskRegions};
