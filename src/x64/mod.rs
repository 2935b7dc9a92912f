//! x86-64 architecture-specific components.
//!
//! - [`operand`]: register, size, displacement and lock values
//! - [`encoder`]: bit-exact byte emission per instruction family
//! - [`insn`]: abstract instructions the generator picks and encodes
//! - [`disasm`]: iced-x86 listings for trace output

pub mod disasm;
pub mod encoder;
pub mod insn;
pub mod operand;

pub use encoder::{CodeSink, InsnBytes, MAX_INSN_LEN};
pub use insn::{Family, Insn};
pub use operand::{Displacement, Lock, MemOperand, OperandSize, Reg};
