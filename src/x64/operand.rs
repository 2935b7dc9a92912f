//! Operand model consumed by the encoder.
//!
//! Registers are plain 3-bit indices into the eight architectural registers of the
//! current REX context. Which set an index names (RAX..RDI or R8..R15) is decided by
//! an explicit extension flag at the call sites that support it (push/pop).

use std::fmt;

use crate::core::error::{EncodeError, EncodeResult};
use crate::x64::Family;

/// ModR/M `mod` field values, already shifted into bits 7:6.
pub const MOD_DISP0: u8 = 0x00;
pub const MOD_DISP8: u8 = 0x40;
pub const MOD_DISP32: u8 = 0x80;
pub const MOD_REG: u8 = 0xC0;

/// Shift of the ModR/M `reg` field.
pub const REG_SHIFT: u8 = 3;

/// A 3-bit register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(u8);

impl Reg {
    pub const RAX: Reg = Reg(0);
    pub const RCX: Reg = Reg(1);
    pub const RDX: Reg = Reg(2);
    pub const RBX: Reg = Reg(3);
    pub const RSP: Reg = Reg(4);
    pub const RBP: Reg = Reg(5);
    pub const RSI: Reg = Reg(6);
    pub const RDI: Reg = Reg(7);

    // Same indices, only meaningful with a REX.B extension.
    pub const R8: Reg = Reg(0);
    pub const R9: Reg = Reg(1);
    pub const R10: Reg = Reg(2);
    pub const R11: Reg = Reg(3);
    pub const R12: Reg = Reg(4);
    pub const R13: Reg = Reg(5);
    pub const R14: Reg = Reg(6);
    pub const R15: Reg = Reg(7);

    /// All eight indices in encoding order.
    pub const ALL: [Reg; 8] = [
        Reg(0), Reg(1), Reg(2), Reg(3), Reg(4), Reg(5), Reg(6), Reg(7),
    ];

    /// Create a register from an index, `None` if it does not fit in 3 bits.
    pub const fn new(index: u8) -> Option<Self> {
        if index < 8 {
            Some(Reg(index))
        } else {
            None
        }
    }

    /// The 3-bit encoding.
    pub const fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 8] = ["rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi"];
        f.write_str(NAMES[self.0 as usize])
    }
}

/// Operand width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandSize {
    Byte = 1,
    Word = 2,
    Dword = 4,
    Qword = 8,
}

impl OperandSize {
    pub const ALL: [OperandSize; 4] = [
        OperandSize::Byte,
        OperandSize::Word,
        OperandSize::Dword,
        OperandSize::Qword,
    ];

    /// Validate a raw byte count for the given instruction family.
    pub fn for_family(family: Family, size: u8) -> EncodeResult<Self> {
        match size {
            1 => Ok(OperandSize::Byte),
            2 => Ok(OperandSize::Word),
            4 => Ok(OperandSize::Dword),
            8 => Ok(OperandSize::Qword),
            _ => Err(EncodeError::UnsupportedSize { family, size }),
        }
    }

    pub const fn bytes(self) -> usize {
        self as usize
    }
}

/// A base-register displacement.
///
/// The variant selects the ModR/M `mod` field and how many displacement bytes follow
/// the ModR/M byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Displacement {
    None,
    Disp8(i8),
    Disp32(i32),
}

impl Displacement {
    /// ModR/M `mod` bits for this displacement kind.
    pub const fn mod_bits(self) -> u8 {
        match self {
            Displacement::None => MOD_DISP0,
            Displacement::Disp8(_) => MOD_DISP8,
            Displacement::Disp32(_) => MOD_DISP32,
        }
    }

    /// Number of trailing displacement bytes.
    pub const fn len(self) -> usize {
        match self {
            Displacement::None => 0,
            Displacement::Disp8(_) => 1,
            Displacement::Disp32(_) => 4,
        }
    }

    pub const fn is_empty(self) -> bool {
        matches!(self, Displacement::None)
    }

    /// Offset added to the base register.
    pub const fn offset(self) -> i64 {
        match self {
            Displacement::None => 0,
            Displacement::Disp8(d) => d as i64,
            Displacement::Disp32(d) => d as i64,
        }
    }
}

/// Memory operand `[base + disp]`.
///
/// `base` goes straight into the ModR/M `r/m` field, so RSP (SIB escape) and RBP with
/// no displacement (RIP-relative) do not name the register here. The generator only
/// ever addresses through RDI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemOperand {
    pub base: Reg,
    pub disp: Displacement,
}

impl MemOperand {
    pub const fn new(base: Reg, disp: Displacement) -> Self {
        Self { base, disp }
    }
}

impl fmt::Display for MemOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.disp {
            Displacement::None => write!(f, "[{}]", self.base),
            d => write!(f, "[{}+{:#x}]", self.base, d.offset()),
        }
    }
}

/// Whether a read-modify-write instruction carries the LOCK prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lock {
    #[default]
    No,
    Yes,
}

impl From<bool> for Lock {
    fn from(locked: bool) -> Self {
        if locked {
            Lock::Yes
        } else {
            Lock::No
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_index_bounds() {
        assert_eq!(Reg::new(7), Some(Reg::RDI));
        assert_eq!(Reg::new(8), None);
        assert_eq!(Reg::R12.index(), 4);
    }

    #[test]
    fn raw_sizes() {
        assert_eq!(OperandSize::for_family(Family::Xadd, 8), Ok(OperandSize::Qword));
        assert_eq!(
            OperandSize::for_family(Family::Xadd, 16),
            Err(EncodeError::UnsupportedSize { family: Family::Xadd, size: 16 })
        );
    }

    #[test]
    fn displacement_fields() {
        assert_eq!(Displacement::None.mod_bits(), 0x00);
        assert_eq!(Displacement::Disp8(-1).mod_bits(), 0x40);
        assert_eq!(Displacement::Disp32(0).mod_bits(), 0x80);
        assert_eq!(Displacement::Disp8(-1).offset(), -1);
        assert_eq!(Displacement::Disp32(4096).len(), 4);
    }
}
