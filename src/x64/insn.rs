//! Abstract instruction descriptions.
//!
//! An [`Insn`] is what the generator picks; [`Insn::encode`] dispatches it to the
//! matching encoder family.

use std::fmt;

use crate::core::error::EncodeResult;
use crate::x64::encoder::{self, CodeSink};
use crate::x64::operand::{Lock, MemOperand, OperandSize, Reg};

/// Instruction families the encoder knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    MovRegReg,
    MovImmReg,
    MovRegMem,
    MovMemReg,
    Xadd,
    Xchg,
    Mfence,
    Lfence,
    Sfence,
}

impl Family {
    /// Families available to the baseline generator.
    pub const BASELINE: &'static [Family] = &[
        Family::MovRegReg,
        Family::MovImmReg,
        Family::MovRegMem,
        Family::MovMemReg,
    ];

    /// Families available to the extended generator.
    pub const EXTENDED: &'static [Family] = &[
        Family::MovRegReg,
        Family::MovImmReg,
        Family::MovRegMem,
        Family::MovMemReg,
        Family::Xadd,
        Family::Xchg,
        Family::Mfence,
        Family::Lfence,
        Family::Sfence,
    ];
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::MovRegReg => "register to register move",
            Family::MovImmReg => "immediate to register move",
            Family::MovRegMem => "register to memory move",
            Family::MovMemReg => "memory to register move",
            Family::Xadd => "xadd",
            Family::Xchg => "xchg",
            Family::Mfence => "mfence",
            Family::Lfence => "lfence",
            Family::Sfence => "sfence",
        };
        f.write_str(name)
    }
}

/// One generated instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insn {
    MovRegReg { size: OperandSize, src: Reg, dest: Reg },
    MovImmReg { size: OperandSize, imm: i64, dest: Reg },
    MovRegMem { size: OperandSize, src: Reg, mem: MemOperand },
    MovMemReg { size: OperandSize, mem: MemOperand, dest: Reg },
    Xadd { size: OperandSize, src: Reg, mem: MemOperand, lock: Lock },
    Xchg { size: OperandSize, src: Reg, mem: MemOperand, lock: Lock },
    Mfence,
    Lfence,
    Sfence,
}

impl Insn {
    pub fn family(&self) -> Family {
        match self {
            Insn::MovRegReg { .. } => Family::MovRegReg,
            Insn::MovImmReg { .. } => Family::MovImmReg,
            Insn::MovRegMem { .. } => Family::MovRegMem,
            Insn::MovMemReg { .. } => Family::MovMemReg,
            Insn::Xadd { .. } => Family::Xadd,
            Insn::Xchg { .. } => Family::Xchg,
            Insn::Mfence => Family::Mfence,
            Insn::Lfence => Family::Lfence,
            Insn::Sfence => Family::Sfence,
        }
    }

    /// Memory operand and access width, if the instruction touches memory.
    pub fn memory_access(&self) -> Option<(MemOperand, OperandSize)> {
        match *self {
            Insn::MovRegMem { size, mem, .. }
            | Insn::MovMemReg { size, mem, .. }
            | Insn::Xadd { size, mem, .. }
            | Insn::Xchg { size, mem, .. } => Some((mem, size)),
            _ => None,
        }
    }

    /// Append the machine bytes for this instruction, returning the new position.
    pub fn encode<S: CodeSink>(&self, sink: &mut S) -> EncodeResult<usize> {
        match *self {
            Insn::MovRegReg { size, src, dest } => encoder::mov_reg_reg(sink, size, src, dest),
            Insn::MovImmReg { size, imm, dest } => encoder::mov_imm_reg(sink, size, imm, dest),
            Insn::MovRegMem { size, src, mem } => encoder::mov_reg_mem(sink, size, src, mem),
            Insn::MovMemReg { size, mem, dest } => encoder::mov_mem_reg(sink, size, mem, dest),
            Insn::Xadd { size, src, mem, lock } => encoder::xadd(sink, size, src, mem, lock),
            Insn::Xchg { size, src, mem, lock } => encoder::xchg(sink, size, src, mem, lock),
            Insn::Mfence => encoder::mfence(sink),
            Insn::Lfence => encoder::lfence(sink),
            Insn::Sfence => encoder::sfence(sink),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lock = |l: Lock| if l == Lock::Yes { "lock " } else { "" };
        match *self {
            Insn::MovRegReg { size, src, dest } => {
                write!(f, "mov{} {dest}, {src}", size.bytes() * 8)
            }
            Insn::MovImmReg { size, imm, dest } => {
                write!(f, "mov{} {dest}, {imm:#x}", size.bytes() * 8)
            }
            Insn::MovRegMem { size, src, mem } => {
                write!(f, "mov{} {mem}, {src}", size.bytes() * 8)
            }
            Insn::MovMemReg { size, mem, dest } => {
                write!(f, "mov{} {dest}, {mem}", size.bytes() * 8)
            }
            Insn::Xadd { size, src, mem, lock: l } => {
                write!(f, "{}xadd{} {mem}, {src}", lock(l), size.bytes() * 8)
            }
            Insn::Xchg { size, src, mem, lock: l } => {
                write!(f, "{}xchg{} {mem}, {src}", lock(l), size.bytes() * 8)
            }
            Insn::Mfence => f.write_str("mfence"),
            Insn::Lfence => f.write_str("lfence"),
            Insn::Sfence => f.write_str("sfence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::operand::Displacement;

    #[test]
    fn encode_dispatches_to_family() {
        let insn = Insn::Xadd {
            size: OperandSize::Qword,
            src: Reg::RAX,
            mem: MemOperand::new(Reg::RDI, Displacement::Disp8(64)),
            lock: Lock::Yes,
        };
        let mut code = Vec::new();
        assert_eq!(insn.encode(&mut code).unwrap(), 6);
        assert_eq!(&code[..4], &[0xF0, 0x48, 0x0F, 0xC1]);
        assert_eq!(insn.family(), Family::Xadd);
        assert_eq!(insn.to_string(), "lock xadd64 [rdi+0x40], rax");
    }

    #[test]
    fn fences_have_no_memory_operand() {
        assert!(Insn::Mfence.memory_access().is_none());
        assert!(Family::EXTENDED.len() > Family::BASELINE.len());
    }
}
