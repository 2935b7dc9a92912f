// This module is the bit-exact x86-64 byte emitter behind litmusgen. Each public function
// encodes one instruction family (register/immediate/memory MOV forms, XADD and XCHG with an
// optional LOCK prefix, the three fences, and the ENTER/PUSH/POP/LEAVE/RET frame primitives)
// and appends it to a CodeSink, returning the sink position after the append. The functions
// are stateless: everything they need arrives as arguments, and the only way they fail is
// when the sink refuses an append. The 16-bit operand size always emits the 0x66 override
// before the opcode and the 64-bit size always emits REX.W; no form used here needs both.
// InsnBytes is a fixed 16-byte scratch sink used to measure an instruction before it is
// committed to a bounded code buffer.

//! Hand-written x86-64 instruction encoder.
//!
//! ```text
//! | prefixes | opcode | ModR/M | displacement | immediate |
//!
//!  7  6  5   3  2   0
//! | mod | reg | r/m |
//! ```

use crate::core::error::{EncodeError, EncodeResult};
use crate::x64::operand::{Displacement, Lock, MemOperand, OperandSize, Reg, MOD_REG, REG_SHIFT};

pub const PREFIX_OPSIZE: u8 = 0x66;
pub const PREFIX_LOCK: u8 = 0xF0;
pub const REX: u8 = 0x40;
pub const REX_W: u8 = 0x08;
pub const REX_B: u8 = 0x01;

/// Longest instruction any family here can produce (REX.W MOV r64, imm64).
pub const MAX_INSN_LEN: usize = 10;

/// Destination for encoded bytes.
pub trait CodeSink {
    /// Number of bytes written so far.
    fn position(&self) -> usize;

    /// Append `bytes`, or fail without writing anything.
    fn emit(&mut self, bytes: &[u8]) -> EncodeResult<()>;

    fn emit_u8(&mut self, byte: u8) -> EncodeResult<()> {
        self.emit(&[byte])
    }
}

impl CodeSink for Vec<u8> {
    fn position(&self) -> usize {
        self.len()
    }

    fn emit(&mut self, bytes: &[u8]) -> EncodeResult<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Stack scratch space for a single instruction.
#[derive(Debug, Clone, Copy)]
pub struct InsnBytes {
    bytes: [u8; 16],
    len: usize,
}

impl InsnBytes {
    pub const fn new() -> Self {
        Self { bytes: [0; 16], len: 0 }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for InsnBytes {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeSink for InsnBytes {
    fn position(&self) -> usize {
        self.len
    }

    fn emit(&mut self, bytes: &[u8]) -> EncodeResult<()> {
        let remaining = self.bytes.len() - self.len;
        if bytes.len() > remaining {
            return Err(EncodeError::BufferFull { needed: bytes.len(), remaining });
        }
        self.bytes[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

#[inline]
fn modrm(mod_bits: u8, reg: Reg, rm: Reg) -> u8 {
    mod_bits | (reg.index() << REG_SHIFT) | rm.index()
}

/// 0x66 for 16-bit operands, REX.W for 64-bit ones.
fn emit_size_prefix<S: CodeSink>(sink: &mut S, size: OperandSize) -> EncodeResult<()> {
    match size {
        OperandSize::Word => sink.emit_u8(PREFIX_OPSIZE),
        OperandSize::Qword => sink.emit_u8(REX | REX_W),
        OperandSize::Byte | OperandSize::Dword => Ok(()),
    }
}

fn emit_lock<S: CodeSink>(sink: &mut S, lock: Lock) -> EncodeResult<()> {
    match lock {
        Lock::Yes => sink.emit_u8(PREFIX_LOCK),
        Lock::No => Ok(()),
    }
}

fn emit_disp<S: CodeSink>(sink: &mut S, disp: Displacement) -> EncodeResult<()> {
    match disp {
        Displacement::None => Ok(()),
        Displacement::Disp8(d) => sink.emit_u8(d as u8),
        Displacement::Disp32(d) => sink.emit(&d.to_le_bytes()),
    }
}

/// Picks the 8-bit opcode or the 16/32/64-bit one.
#[inline]
fn opcode(size: OperandSize, byte_op: u8, wide_op: u8) -> u8 {
    if size == OperandSize::Byte {
        byte_op
    } else {
        wide_op
    }
}

/// `mov dest, src` (8A /r, 8B /r).
pub fn mov_reg_reg<S: CodeSink>(
    sink: &mut S,
    size: OperandSize,
    src: Reg,
    dest: Reg,
) -> EncodeResult<usize> {
    emit_size_prefix(sink, size)?;
    sink.emit(&[opcode(size, 0x8A, 0x8B), modrm(MOD_REG, dest, src)])?;
    Ok(sink.position())
}

/// `mov dest, imm`.
///
/// The 8/16/32-bit forms use C6/C7 /0 with a register ModR/M. The 64-bit form is
/// REX.W B8+r with a full 8-byte immediate. Narrow forms truncate `imm`.
pub fn mov_imm_reg<S: CodeSink>(
    sink: &mut S,
    size: OperandSize,
    imm: i64,
    dest: Reg,
) -> EncodeResult<usize> {
    match size {
        OperandSize::Byte => {
            sink.emit(&[0xC6, MOD_REG | dest.index(), imm as u8])?;
        }
        OperandSize::Word => {
            sink.emit(&[PREFIX_OPSIZE, 0xC7, MOD_REG | dest.index()])?;
            sink.emit(&(imm as u16).to_le_bytes())?;
        }
        OperandSize::Dword => {
            sink.emit(&[0xC7, MOD_REG | dest.index()])?;
            sink.emit(&(imm as u32).to_le_bytes())?;
        }
        OperandSize::Qword => {
            sink.emit(&[REX | REX_W, 0xB8 + dest.index()])?;
            sink.emit(&imm.to_le_bytes())?;
        }
    }
    Ok(sink.position())
}

/// `mov [mem], src` (88 /r, 89 /r).
pub fn mov_reg_mem<S: CodeSink>(
    sink: &mut S,
    size: OperandSize,
    src: Reg,
    mem: MemOperand,
) -> EncodeResult<usize> {
    emit_size_prefix(sink, size)?;
    sink.emit(&[opcode(size, 0x88, 0x89), modrm(mem.disp.mod_bits(), src, mem.base)])?;
    emit_disp(sink, mem.disp)?;
    Ok(sink.position())
}

/// `mov dest, [mem]` (8A /r, 8B /r).
pub fn mov_mem_reg<S: CodeSink>(
    sink: &mut S,
    size: OperandSize,
    mem: MemOperand,
    dest: Reg,
) -> EncodeResult<usize> {
    emit_size_prefix(sink, size)?;
    sink.emit(&[opcode(size, 0x8A, 0x8B), modrm(mem.disp.mod_bits(), dest, mem.base)])?;
    emit_disp(sink, mem.disp)?;
    Ok(sink.position())
}

/// `[lock] xadd [mem], src` (0F C0 /r, 0F C1 /r).
pub fn xadd<S: CodeSink>(
    sink: &mut S,
    size: OperandSize,
    src: Reg,
    mem: MemOperand,
    lock: Lock,
) -> EncodeResult<usize> {
    emit_lock(sink, lock)?;
    emit_size_prefix(sink, size)?;
    sink.emit(&[0x0F, opcode(size, 0xC0, 0xC1), modrm(mem.disp.mod_bits(), src, mem.base)])?;
    emit_disp(sink, mem.disp)?;
    Ok(sink.position())
}

/// `[lock] xchg [mem], src` (86 /r, 87 /r).
///
/// XCHG with a memory operand is locked by the processor regardless; the explicit
/// prefix is still emitted when requested.
pub fn xchg<S: CodeSink>(
    sink: &mut S,
    size: OperandSize,
    src: Reg,
    mem: MemOperand,
    lock: Lock,
) -> EncodeResult<usize> {
    emit_lock(sink, lock)?;
    emit_size_prefix(sink, size)?;
    sink.emit(&[opcode(size, 0x86, 0x87), modrm(mem.disp.mod_bits(), src, mem.base)])?;
    emit_disp(sink, mem.disp)?;
    Ok(sink.position())
}

pub fn mfence<S: CodeSink>(sink: &mut S) -> EncodeResult<usize> {
    sink.emit(&[0x0F, 0xAE, 0xF0])?;
    Ok(sink.position())
}

pub fn lfence<S: CodeSink>(sink: &mut S) -> EncodeResult<usize> {
    sink.emit(&[0x0F, 0xAE, 0xE8])?;
    Ok(sink.position())
}

pub fn sfence<S: CodeSink>(sink: &mut S) -> EncodeResult<usize> {
    sink.emit(&[0x0F, 0xAE, 0xF8])?;
    Ok(sink.position())
}

/// `enter frame_size, 0`.
pub fn enter<S: CodeSink>(sink: &mut S, frame_size: u16) -> EncodeResult<usize> {
    let [lo, hi] = frame_size.to_le_bytes();
    sink.emit(&[0xC8, lo, hi, 0x00])?;
    Ok(sink.position())
}

/// `push reg`, with REX.B selecting R8..R15 when `extended` is set.
pub fn push_reg<S: CodeSink>(sink: &mut S, reg: Reg, extended: bool) -> EncodeResult<usize> {
    if extended {
        sink.emit_u8(REX | REX_B)?;
    }
    sink.emit_u8(0x50 + reg.index())?;
    Ok(sink.position())
}

/// `pop reg`, with REX.B selecting R8..R15 when `extended` is set.
pub fn pop_reg<S: CodeSink>(sink: &mut S, reg: Reg, extended: bool) -> EncodeResult<usize> {
    if extended {
        sink.emit_u8(REX | REX_B)?;
    }
    sink.emit_u8(0x58 + reg.index())?;
    Ok(sink.position())
}

pub fn leave<S: CodeSink>(sink: &mut S) -> EncodeResult<usize> {
    sink.emit_u8(0xC9)?;
    Ok(sink.position())
}

pub fn ret<S: CodeSink>(sink: &mut S) -> EncodeResult<usize> {
    sink.emit_u8(0xC3)?;
    Ok(sink.position())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(disp: Displacement) -> MemOperand {
        MemOperand::new(Reg::RDI, disp)
    }

    #[test]
    fn reg_reg_forms() {
        let mut code = Vec::new();
        mov_reg_reg(&mut code, OperandSize::Byte, Reg::RCX, Reg::RAX).unwrap();
        assert_eq!(code, [0x8A, 0xC1]);

        code.clear();
        mov_reg_reg(&mut code, OperandSize::Word, Reg::RCX, Reg::RAX).unwrap();
        assert_eq!(code, [0x66, 0x8B, 0xC1]);

        code.clear();
        mov_reg_reg(&mut code, OperandSize::Dword, Reg::RBX, Reg::RDX).unwrap();
        assert_eq!(code, [0x8B, 0xD3]);

        code.clear();
        let end = mov_reg_reg(&mut code, OperandSize::Qword, Reg::RSI, Reg::RBP).unwrap();
        assert_eq!(code, [0x48, 0x8B, 0xEE]);
        assert_eq!(end, 3);
    }

    #[test]
    fn imm_reg_forms() {
        let mut code = Vec::new();
        mov_imm_reg(&mut code, OperandSize::Byte, 0x1234, Reg::RDX).unwrap();
        assert_eq!(code, [0xC6, 0xC2, 0x34]);

        code.clear();
        mov_imm_reg(&mut code, OperandSize::Word, 0x1234, Reg::RDX).unwrap();
        assert_eq!(code, [0x66, 0xC7, 0xC2, 0x34, 0x12]);

        code.clear();
        mov_imm_reg(&mut code, OperandSize::Dword, -1, Reg::RAX).unwrap();
        assert_eq!(code, [0xC7, 0xC0, 0xFF, 0xFF, 0xFF, 0xFF]);

        code.clear();
        mov_imm_reg(&mut code, OperandSize::Qword, 0x0102_0304_0506_0708, Reg::RDI).unwrap();
        assert_eq!(
            code,
            [0x48, 0xBF, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]
        );
        assert_eq!(code.len(), MAX_INSN_LEN);
    }

    #[test]
    fn store_and_load_displacements() {
        let mut code = Vec::new();
        mov_reg_mem(&mut code, OperandSize::Dword, Reg::RAX, mem(Displacement::None)).unwrap();
        assert_eq!(code, [0x89, 0x07]);

        code.clear();
        mov_reg_mem(&mut code, OperandSize::Byte, Reg::RCX, mem(Displacement::Disp8(0x10)))
            .unwrap();
        assert_eq!(code, [0x88, 0x4F, 0x10]);

        code.clear();
        mov_mem_reg(&mut code, OperandSize::Qword, mem(Displacement::Disp32(0x1234)), Reg::RBX)
            .unwrap();
        assert_eq!(code, [0x48, 0x8B, 0x9F, 0x34, 0x12, 0x00, 0x00]);

        code.clear();
        mov_mem_reg(&mut code, OperandSize::Word, mem(Displacement::Disp8(-2)), Reg::RSI).unwrap();
        assert_eq!(code, [0x66, 0x8B, 0x77, 0xFE]);
    }

    #[test]
    fn locked_xadd_qword_disp8() {
        let mut code = Vec::new();
        xadd(&mut code, OperandSize::Qword, Reg::RAX, mem(Displacement::Disp8(64)), Lock::Yes)
            .unwrap();
        assert_eq!(code, [0xF0, 0x48, 0x0F, 0xC1, 0x47, 0x40]);
    }

    #[test]
    fn xadd_and_xchg_sizes() {
        let mut code = Vec::new();
        xadd(&mut code, OperandSize::Byte, Reg::RDX, mem(Displacement::None), Lock::No).unwrap();
        assert_eq!(code, [0x0F, 0xC0, 0x17]);

        code.clear();
        xadd(&mut code, OperandSize::Word, Reg::RDX, mem(Displacement::None), Lock::Yes).unwrap();
        assert_eq!(code, [0xF0, 0x66, 0x0F, 0xC1, 0x17]);

        code.clear();
        xchg(&mut code, OperandSize::Byte, Reg::RBX, mem(Displacement::Disp8(1)), Lock::No)
            .unwrap();
        assert_eq!(code, [0x86, 0x5F, 0x01]);

        code.clear();
        xchg(&mut code, OperandSize::Qword, Reg::RCX, mem(Displacement::Disp32(256)), Lock::Yes)
            .unwrap();
        assert_eq!(code, [0xF0, 0x48, 0x87, 0x8F, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn fences() {
        let mut code = Vec::new();
        mfence(&mut code).unwrap();
        lfence(&mut code).unwrap();
        sfence(&mut code).unwrap();
        assert_eq!(code, [0x0F, 0xAE, 0xF0, 0x0F, 0xAE, 0xE8, 0x0F, 0xAE, 0xF8]);
    }

    #[test]
    fn frame_primitives() {
        let mut code = Vec::new();
        enter(&mut code, 2048).unwrap();
        push_reg(&mut code, Reg::RBX, false).unwrap();
        push_reg(&mut code, Reg::R12, true).unwrap();
        pop_reg(&mut code, Reg::R12, true).unwrap();
        pop_reg(&mut code, Reg::RBX, false).unwrap();
        leave(&mut code).unwrap();
        ret(&mut code).unwrap();
        assert_eq!(
            code,
            [0xC8, 0x00, 0x08, 0x00, 0x53, 0x41, 0x54, 0x41, 0x5C, 0x5B, 0xC9, 0xC3]
        );
    }

    #[test]
    fn scratch_rejects_overflow_without_writing() {
        let mut scratch = InsnBytes::new();
        scratch.emit(&[0x90; 15]).unwrap();
        let err = scratch.emit(&[0x90, 0x90]).unwrap_err();
        assert_eq!(err, EncodeError::BufferFull { needed: 2, remaining: 1 });
        assert_eq!(scratch.len(), 15);
    }
}
