// This module builds one task's randomized test function. A generated stream always has
// the same frame: ENTER with a fixed frame size, pushes of the callee-saved registers
// (RBX, RBP, R12-R15), then a 64-bit immediate move that loads the task's private data
// base into RDI. The body is a run of randomly chosen instructions: operand size, source,
// destination, displacement kind and family are drawn uniformly, with destinations never
// RSP or RDI and displacements kept non-negative and small enough that the widest access
// stays inside the data sub-region. Each instruction is encoded into stack scratch first
// and only committed if it keeps the cursor below the code capacity minus the safety
// margin, so a partial instruction is never written or counted. The epilogue zeroes EAX
// as the return status, pops the saved registers in reverse, and ends with LEAVE; RET.

//! Random test-case generation.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::config::{GeneratorConfig, Variant, MAX_DISP8};
use crate::core::error::EncodeResult;
use crate::core::CodeBuffer;
use crate::x64::encoder::{self, CodeSink, InsnBytes};
use crate::x64::{Displacement, Family, Insn, Lock, MemOperand, OperandSize, Reg};

/// Register that holds the data sub-region base for the whole body.
pub const DATA_BASE_REG: Reg = Reg::RDI;

/// Registers saved by the prologue, with their REX.B extension flag.
const SAVED_REGS: [(Reg, bool); 6] = [
    (Reg::RBX, false),
    (Reg::RBP, false),
    (Reg::R12, true),
    (Reg::R13, true),
    (Reg::R14, true),
    (Reg::R15, true),
];

/// Registers a generated instruction may write: everything but RSP and RDI.
const WRITABLE_REGS: [Reg; 6] = [Reg::RAX, Reg::RCX, Reg::RDX, Reg::RBX, Reg::RBP, Reg::RSI];

/// ENTER + six pushes + MOV RDI, imm64.
pub const PROLOGUE_LEN: usize = 4 + 2 + 4 * 2 + 10;

/// MOV EAX, 0 + six pops + LEAVE + RET.
pub const EPILOGUE_LEN: usize = 6 + 2 + 4 * 2 + 1 + 1;

/// Frame setup, register saves and the data base load.
pub fn emit_prologue<S: CodeSink>(
    sink: &mut S,
    frame_size: u16,
    data_base: u64,
) -> EncodeResult<usize> {
    encoder::enter(sink, frame_size)?;
    for (reg, extended) in SAVED_REGS {
        encoder::push_reg(sink, reg, extended)?;
    }
    encoder::mov_imm_reg(sink, OperandSize::Qword, data_base as i64, DATA_BASE_REG)
}

/// Return status, register restores and frame teardown.
pub fn emit_epilogue<S: CodeSink>(sink: &mut S) -> EncodeResult<usize> {
    encoder::mov_imm_reg(sink, OperandSize::Dword, 0, Reg::RAX)?;
    for (reg, extended) in SAVED_REGS.iter().rev() {
        encoder::pop_reg(sink, *reg, *extended)?;
    }
    encoder::leave(sink)?;
    encoder::ret(sink)
}

/// Randomized instruction stream builder.
pub struct Generator<R> {
    rng: R,
    config: GeneratorConfig,
}

impl Generator<ChaCha8Rng> {
    /// Generator with a reproducible ChaCha8 stream.
    pub fn seeded(seed: u64, config: GeneratorConfig) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed), config)
    }
}

impl<R: Rng> Generator<R> {
    pub fn new(rng: R, config: GeneratorConfig) -> Self {
        Self { rng, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn families(&self) -> &'static [Family] {
        match self.config.variant {
            Variant::Baseline => Family::BASELINE,
            Variant::Extended => Family::EXTENDED,
        }
    }

    fn random_disp(&mut self) -> Displacement {
        match self.rng.gen_range(0..3) {
            0 => Displacement::None,
            // A negative disp8 would sign-extend below the data base.
            1 => Displacement::Disp8(self.rng.gen_range(0..=MAX_DISP8)),
            _ => Displacement::Disp32(self.rng.gen_range(0..=self.config.max_disp32())),
        }
    }

    /// Draw one instruction.
    pub fn random_insn(&mut self) -> EncodeResult<Insn> {
        let raw_size = 1u8 << self.rng.gen_range(0..=3u32);
        let src = Reg::ALL[self.rng.gen_range(0..Reg::ALL.len())];
        let dest = WRITABLE_REGS[self.rng.gen_range(0..WRITABLE_REGS.len())];
        let families = self.families();
        let family = families[self.rng.gen_range(0..families.len())];

        let insn = match family {
            Family::MovRegReg => Insn::MovRegReg {
                size: OperandSize::for_family(family, raw_size)?,
                src,
                dest,
            },
            Family::MovImmReg => Insn::MovImmReg {
                size: OperandSize::for_family(family, raw_size)?,
                imm: self.rng.gen(),
                dest,
            },
            Family::MovRegMem => Insn::MovRegMem {
                size: OperandSize::for_family(family, raw_size)?,
                src,
                mem: MemOperand::new(DATA_BASE_REG, self.random_disp()),
            },
            Family::MovMemReg => Insn::MovMemReg {
                size: OperandSize::for_family(family, raw_size)?,
                mem: MemOperand::new(DATA_BASE_REG, self.random_disp()),
                dest,
            },
            // Both write their register operand, so it comes from the writable set.
            Family::Xadd => Insn::Xadd {
                size: OperandSize::for_family(family, raw_size)?,
                src: dest,
                mem: MemOperand::new(DATA_BASE_REG, self.random_disp()),
                lock: Lock::from(self.rng.gen_bool(0.5)),
            },
            Family::Xchg => Insn::Xchg {
                size: OperandSize::for_family(family, raw_size)?,
                src: dest,
                mem: MemOperand::new(DATA_BASE_REG, self.random_disp()),
                lock: Lock::from(self.rng.gen_bool(0.5)),
            },
            Family::Mfence => Insn::Mfence,
            Family::Lfence => Insn::Lfence,
            Family::Sfence => Insn::Sfence,
        };
        Ok(insn)
    }

    /// Build a complete test function into `code`.
    ///
    /// Returns how many body instructions were produced: `count`, or fewer if the
    /// next instruction would have crossed the capacity limit.
    pub fn build(
        &mut self,
        code: &mut CodeBuffer<'_>,
        data_base: u64,
        count: usize,
    ) -> EncodeResult<usize> {
        let limit = code
            .capacity()
            .min(self.config.code_capacity)
            .saturating_sub(self.config.safety_margin);

        emit_prologue(code, self.config.frame_size, data_base)?;

        let mut scratch = InsnBytes::new();
        let mut built = 0;
        while built < count {
            let insn = self.random_insn()?;
            scratch.clear();
            insn.encode(&mut scratch)?;
            if code.len() + scratch.len() >= limit {
                log::warn!(
                    "instruction buffer full after {built} of {count} instructions ({} bytes)",
                    code.len()
                );
                break;
            }
            code.emit(scratch.as_slice())?;
            log::trace!("{insn}");
            built += 1;
        }

        emit_epilogue(code)?;
        log::debug!("built {built} instructions, {} code bytes", code.len());
        Ok(built)
    }
}
