//! Tier-3 compiler entry point (§4.5): lowers a [`RegFunc`] straight to
//! native ARM64 code, one basic unit of work per `RegInstr`.
//!
//! This is a baseline compiler, not an optimizing one: every vreg round
//! trips through its frame slot around each instruction, with no cross-
//! instruction register retention at all. Integer arithmetic, control flow,
//! calls (direct and indirect, through the trampolines), globals, and both
//! the integer and floating-point load/store families are lowered (floats
//! move as raw bit patterns, same as the interpreter); `F32`/`F64`
//! arithmetic, tail calls, table ops and `v128` ops are not — a function
//! using one of those still fails to compile and the engine keeps running
//! it in the Tier 2 interpreter. See `DESIGN.md` for the exact boundary and
//! the reasoning behind it.

use alloc::vec::Vec;
use core::ffi::c_void;

use zwasm_core::TrapCode;
use zwasm_ir::{Op, RegFunc};

use crate::abi::{JitFn, Trampolines};
use crate::buffer::{BufferError, ExecutableBuffer};
use crate::encode::{self, Cond};

/// `x19`: opaque `Vm*` passed in at entry, live for the whole function.
const REG_VM: u8 = 19;
/// `x20`: opaque `Instance*` passed in at entry.
const REG_INSTANCE: u8 = 20;
/// `x21`: base of this frame's register slots (`regs` argument).
const REG_FRAME: u8 = 21;
/// `x22`: cached linear memory base pointer, reloaded after any call that
/// could have grown memory (a `Call`/`CallIndirect` trampoline return
/// invalidates it, since the callee may have executed `memory.grow`).
const REG_MEM_BASE: u8 = 22;

/// Integer scratch registers codegen uses internally; never holds a vreg
/// across more than the one instruction currently being emitted.
const T0: u8 = 9;
const T1: u8 = 10;
const T2: u8 = 11;

#[derive(Debug)]
pub enum CompileError {
    /// `op` is not (yet) lowered to native code; the caller should keep
    /// running the function in Tier 2.
    Unsupported(Op),
    /// The RegIR stream was corrupted (should be unreachable in practice:
    /// the translator only ever emits well-formed `RegFunc`s).
    InvalidOpcode,
    FrameTooLarge,
    Buffer(BufferError),
}

impl core::fmt::Display for CompileError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CompileError::Unsupported(op) => write!(f, "opcode {op} has no Tier 3 lowering"),
            CompileError::InvalidOpcode => write!(f, "malformed RegIR opcode"),
            CompileError::FrameTooLarge => write!(f, "register frame exceeds the addressable immediate range"),
            CompileError::Buffer(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CompileError {}

pub struct JitCode {
    buffer: ExecutableBuffer,
    entry: JitFn,
}

impl JitCode {
    /// # Safety
    ///
    /// `regs` must point at a register frame sized to the `RegFunc` this
    /// code was compiled from (`frame_size()` `u64` slots); `vm` and
    /// `instance` must be the same pointers the engine would otherwise
    /// pass to interpreted execution of the same function.
    pub unsafe fn call(&self, regs: *mut u64, vm: *mut c_void, instance: *mut c_void) -> u64 {
        (self.entry)(regs, vm, instance)
    }

    #[must_use]
    pub fn code_size(&self) -> usize {
        self.buffer.len()
    }
}

enum Fixup {
    Unconditional,
    Conditional(Cond),
}

/// Compiles `func`, calling back into the interpreter through
/// `trampolines` for anything not lowered inline.
pub fn compile(func: &RegFunc, trampolines: &Trampolines) -> Result<JitCode, CompileError> {
    if func.reg_count() as usize >= 4096 {
        return Err(CompileError::FrameTooLarge);
    }

    let mut out = Vec::with_capacity(func.len() * 4 + 16);
    emit_prologue(&mut out, trampolines);

    let mut pc_offsets = alloc::vec![0u32; func.len() + 1];
    let mut fixups: Vec<(usize, u32, Fixup)> = Vec::new();

    for (pc, instr) in func.code().iter().enumerate() {
        pc_offsets[pc] = out.len() as u32;
        let op = instr.op().map_err(|_| CompileError::InvalidOpcode)?;
        if op == Op::Nop {
            // The arity data word trailing a Call/CallIndirect (§3); it
            // carries no executable content of its own.
            continue;
        }
        emit_instr(pc, op, instr, func, trampolines, &mut out, &mut fixups)?;
    }
    pc_offsets[func.len()] = out.len() as u32;

    for (word_idx, target_pc, kind) in fixups {
        let delta = pc_offsets[target_pc as usize] as i32 - word_idx as i32;
        out[word_idx] = match kind {
            Fixup::Unconditional => encode::b(delta),
            Fixup::Conditional(cond) => encode::b_cond(delta, cond),
        };
    }

    let bytes: Vec<u8> = out.iter().flat_map(|w| w.to_le_bytes()).collect();
    let buffer = ExecutableBuffer::new(&bytes).map_err(CompileError::Buffer)?;
    // SAFETY: the buffer was just made read/execute and holds exactly the
    // words we encoded, entered at offset 0 with the `JitFn` ABI.
    let entry: JitFn = unsafe { core::mem::transmute::<*const u8, JitFn>(buffer.as_ptr()) };
    Ok(JitCode { buffer, entry })
}

fn emit_prologue(out: &mut Vec<u32>, trampolines: &Trampolines) {
    // x0=regs, x1=vm, x2=instance on entry (AAPCS64).
    out.push(encode::mov_reg(REG_FRAME, 0));
    out.push(encode::mov_reg(REG_VM, 1));
    out.push(encode::mov_reg(REG_INSTANCE, 2));

    // x0 = instance, x1 = memory index 0, call memory_base, cache in x22.
    out.push(encode::mov_reg(0, REG_INSTANCE));
    out.push(encode::movz(1, 0, 0));
    encode::load_imm64_fixed(T0, trampolines.memory_base as usize as u64, out);
    out.push(encode::blr(T0));
    out.push(encode::mov_reg(REG_MEM_BASE, 0));
}

fn slot(reg: u8) -> u16 {
    u16::from(reg)
}

fn ldr_slot(rt: u8, reg: u8, out: &mut Vec<u32>) {
    out.push(encode::ldr64_imm(rt, REG_FRAME, slot(reg)));
}

fn str_slot(rt: u8, reg: u8, out: &mut Vec<u32>) {
    out.push(encode::str64_imm(rt, REG_FRAME, slot(reg)));
}

/// Emits an unconditional trap return: `x0 = trap as u8; ret`.
fn emit_trap(out: &mut Vec<u32>, trap: TrapCode) {
    out.push(encode::movz(0, u16::from(u8::from(trap)), 0));
    out.push(encode::ret());
}

/// Branches around a 2-word [`emit_trap`] when `cond` holds; traps
/// otherwise. The branch target is always 3 words ahead of itself, so this
/// needs no entry in the function-wide fixup table.
fn emit_trap_unless(out: &mut Vec<u32>, cond: Cond, trap: TrapCode) {
    out.push(encode::b_cond(3, cond));
    emit_trap(out, trap);
}

/// Bounds-checks a memory access of `width` bytes at `reg[addr_reg] +
/// offset` against memory 0's current size (fetched fresh via the
/// trampoline rather than cached, since a prior call in this same function
/// may have grown it) and leaves the checked effective address in `T0`.
///
/// Traps `OutOfBoundsMemoryAccess` both on a `u64` overflow while forming
/// the address (mirrors the interpreter's `checked_add`) and when the
/// access would run past the committed region.
fn emit_bounds_check(out: &mut Vec<u32>, trampolines: &Trampolines, addr_reg: u8, offset: u64, width: u32) {
    out.push(encode::mov_reg(0, REG_INSTANCE));
    out.push(encode::movz(1, 0, 0));
    encode::load_imm64_fixed(T1, trampolines.memory_size as usize as u64, out);
    out.push(encode::blr(T1));
    out.push(encode::mov_reg(T2, 0));

    ldr_slot(T0, addr_reg, out);
    encode::load_imm64_fixed(T1, offset, out);
    out.push(encode::adds_reg(T0, T0, T1));
    // `Cond::LtU` is carry-clear (CC), the same encoding `adds` uses to
    // signal "no unsigned overflow"; reused here for that meaning rather
    // than as an unsigned `<` test.
    emit_trap_unless(out, Cond::LtU, TrapCode::OutOfBoundsMemoryAccess);

    encode::load_imm32_fixed(T1, width, out);
    out.push(encode::adds_reg(T1, T0, T1));
    emit_trap_unless(out, Cond::LtU, TrapCode::OutOfBoundsMemoryAccess);
    out.push(encode::cmp(T1, T2));
    emit_trap_unless(out, Cond::LeU, TrapCode::OutOfBoundsMemoryAccess);
}

/// Follows a `call`/`call_indirect` trampoline invocation: `x0` holds a
/// trap ordinal on return, which is already in the right register to
/// become this function's own `JitFn` return value, so a nonzero ordinal
/// is propagated by returning immediately. On success the memory-base
/// cache is refreshed, since the callee may have grown memory.
fn emit_call_return_sequence(out: &mut Vec<u32>, trampolines: &Trampolines) {
    out.push(encode::cmp(0, encode::XZR));
    out.push(encode::b_cond(2, Cond::Eq));
    out.push(encode::ret());

    out.push(encode::mov_reg(0, REG_INSTANCE));
    out.push(encode::movz(1, 0, 0));
    encode::load_imm64_fixed(T0, trampolines.memory_base as usize as u64, out);
    out.push(encode::blr(T0));
    out.push(encode::mov_reg(REG_MEM_BASE, 0));
}

fn emit_instr(
    pc: usize,
    op: Op,
    instr: &zwasm_ir::RegInstr,
    func: &RegFunc,
    trampolines: &Trampolines,
    out: &mut Vec<u32>,
    fixups: &mut Vec<(usize, u32, Fixup)>,
) -> Result<(), CompileError> {
    let rd = instr.rd();
    let rs1 = instr.rs1();
    let rs2 = instr.rs2();

    macro_rules! binop {
        ($encode:expr) => {{
            ldr_slot(T0, rs1, out);
            ldr_slot(T1, rs2, out);
            out.push($encode(T0, T0, T1));
            str_slot(T0, rd, out);
        }};
    }

    macro_rules! cmp_op {
        ($cond:expr) => {{
            ldr_slot(T0, rs1, out);
            ldr_slot(T1, rs2, out);
            out.push(encode::cmp(T0, T1));
            out.push(encode::cset(T0, $cond));
            str_slot(T0, rd, out);
        }};
    }

    match op {
        Op::I32Const => {
            encode::load_imm32_fixed(T0, instr.operand(), out);
            str_slot(T0, rd, out);
        }
        Op::I64Const => {
            let value = func.pool64_at(instr.pool_index());
            encode::load_imm64_fixed(T0, value, out);
            str_slot(T0, rd, out);
        }
        Op::Copy => {
            ldr_slot(T0, rs1, out);
            str_slot(T0, rd, out);
        }
        Op::Drop => {}
        Op::Select => {
            let true_reg = (instr.operand() & 0xFF) as u8;
            let false_reg = ((instr.operand() >> 8) & 0xFF) as u8;
            ldr_slot(T0, rs1, out); // condition
            ldr_slot(T1, true_reg, out);
            ldr_slot(T2, false_reg, out);
            out.push(encode::cmp(T0, encode::XZR));
            out.push(encode::csel(T0, T1, T2, Cond::Ne));
            str_slot(T0, rd, out);
        }

        Op::I32Add | Op::I64Add => binop!(encode::add_reg),
        Op::I32Sub | Op::I64Sub => binop!(encode::sub_reg),
        Op::I32Mul | Op::I64Mul => binop!(encode::mul),
        Op::I32DivS | Op::I32DivU | Op::I32RemS | Op::I32RemU => {
            ldr_slot(T0, rs1, out); // lhs
            ldr_slot(T1, rs2, out); // rhs
            out.push(encode::cmp(T1, encode::XZR));
            emit_trap_unless(out, Cond::Ne, TrapCode::DivisionByZero);

            if op == Op::I32DivS {
                // `i32::MIN / -1` overflows; Wasm traps rather than wrapping.
                encode::load_imm32_fixed(T2, i32::MIN as u32, out);
                out.push(encode::cmp(T0, T2));
                let skip_min = out.len();
                out.push(0);
                encode::load_imm32_fixed(T2, u32::MAX, out);
                out.push(encode::cmp(T1, T2));
                let skip_neg1 = out.len();
                out.push(0);
                emit_trap(out, TrapCode::IntegerOverflow);
                let after = out.len() as i32;
                out[skip_min] = encode::b_cond(after - skip_min as i32, Cond::Ne);
                out[skip_neg1] = encode::b_cond(after - skip_neg1 as i32, Cond::Ne);
            }

            match op {
                Op::I32DivS => {
                    out.push(encode::sdiv(T2, T0, T1));
                    str_slot(T2, rd, out);
                }
                Op::I32DivU => {
                    out.push(encode::udiv(T2, T0, T1));
                    str_slot(T2, rd, out);
                }
                // `sdiv`/`msub`'s own wraparound already yields 0 for the
                // `MIN / -1` remainder, matching Wasm's `rem_s` semantics
                // with no extra check needed.
                Op::I32RemS => {
                    out.push(encode::sdiv(T2, T0, T1));
                    out.push(encode::msub(T2, T2, T1, T0));
                    str_slot(T2, rd, out);
                }
                Op::I32RemU => {
                    out.push(encode::udiv(T2, T0, T1));
                    out.push(encode::msub(T2, T2, T1, T0));
                    str_slot(T2, rd, out);
                }
                _ => unreachable!(),
            }
        }
        Op::I64DivS | Op::I64DivU | Op::I64RemS | Op::I64RemU => {
            ldr_slot(T0, rs1, out);
            ldr_slot(T1, rs2, out);
            out.push(encode::cmp(T1, encode::XZR));
            emit_trap_unless(out, Cond::Ne, TrapCode::DivisionByZero);

            if op == Op::I64DivS {
                encode::load_imm64_fixed(T2, i64::MIN as u64, out);
                out.push(encode::cmp(T0, T2));
                let skip_min = out.len();
                out.push(0);
                encode::load_imm64_fixed(T2, u64::MAX, out);
                out.push(encode::cmp(T1, T2));
                let skip_neg1 = out.len();
                out.push(0);
                emit_trap(out, TrapCode::IntegerOverflow);
                let after = out.len() as i32;
                out[skip_min] = encode::b_cond(after - skip_min as i32, Cond::Ne);
                out[skip_neg1] = encode::b_cond(after - skip_neg1 as i32, Cond::Ne);
            }

            match op {
                Op::I64DivS => {
                    out.push(encode::sdiv(T2, T0, T1));
                    str_slot(T2, rd, out);
                }
                Op::I64DivU => {
                    out.push(encode::udiv(T2, T0, T1));
                    str_slot(T2, rd, out);
                }
                Op::I64RemS => {
                    out.push(encode::sdiv(T2, T0, T1));
                    out.push(encode::msub(T2, T2, T1, T0));
                    str_slot(T2, rd, out);
                }
                Op::I64RemU => {
                    out.push(encode::udiv(T2, T0, T1));
                    out.push(encode::msub(T2, T2, T1, T0));
                    str_slot(T2, rd, out);
                }
                _ => unreachable!(),
            }
        }
        Op::I32And | Op::I64And => binop!(encode::and_reg),
        Op::I32Or | Op::I64Or => binop!(encode::orr_reg),
        Op::I32Xor | Op::I64Xor => binop!(encode::eor_reg),
        Op::I32Shl | Op::I64Shl => binop!(encode::lslv),
        Op::I32ShrS | Op::I64ShrS => binop!(encode::asrv),
        Op::I32ShrU | Op::I64ShrU => binop!(encode::lsrv),
        Op::I32Rotr | Op::I64Rotr => binop!(encode::rorv),

        Op::I32Eqz | Op::I64Eqz => {
            ldr_slot(T0, rs1, out);
            out.push(encode::cmp(T0, encode::XZR));
            out.push(encode::cset(T0, Cond::Eq));
            str_slot(T0, rd, out);
        }
        Op::I32Eq | Op::I64Eq => cmp_op!(Cond::Eq),
        Op::I32Ne | Op::I64Ne => cmp_op!(Cond::Ne),
        Op::I32LtS | Op::I64LtS => cmp_op!(Cond::LtS),
        Op::I32LtU | Op::I64LtU => cmp_op!(Cond::LtU),
        Op::I32GtS | Op::I64GtS => cmp_op!(Cond::GtS),
        Op::I32GtU | Op::I64GtU => cmp_op!(Cond::GtU),
        Op::I32LeS | Op::I64LeS => cmp_op!(Cond::LeS),
        Op::I32LeU | Op::I64LeU => cmp_op!(Cond::LeU),
        Op::I32GeS | Op::I64GeS => cmp_op!(Cond::GeS),
        Op::I32GeU | Op::I64GeU => cmp_op!(Cond::GeU),

        Op::AddImmI32 | Op::AddImmI32Rev => {
            ldr_slot(T0, rs1, out);
            encode::load_imm32_fixed(T1, instr.operand(), out);
            out.push(encode::add_reg(T0, T0, T1));
            str_slot(T0, rd, out);
        }
        Op::SubImmI32 => {
            ldr_slot(T0, rs1, out);
            encode::load_imm32_fixed(T1, instr.operand(), out);
            out.push(encode::sub_reg(T0, T0, T1));
            str_slot(T0, rd, out);
        }
        Op::LtSImmI32 | Op::LtUImmI32 | Op::EqImmI32 => {
            ldr_slot(T0, rs1, out);
            encode::load_imm32_fixed(T1, instr.operand(), out);
            out.push(encode::cmp(T0, T1));
            let cond = match op {
                Op::LtSImmI32 => Cond::LtS,
                Op::LtUImmI32 => Cond::LtU,
                _ => Cond::Eq,
            };
            out.push(encode::cset(T0, cond));
            str_slot(T0, rd, out);
        }
        Op::AddLocalsI32 => {
            ldr_slot(T0, rs1, out);
            ldr_slot(T1, rs2, out);
            out.push(encode::add_reg(T0, T0, T1));
            str_slot(T0, rd, out);
        }
        Op::LtSLocalsI32 => cmp_op!(Cond::LtS),

        Op::Br => {
            let word_idx = out.len();
            out.push(0);
            fixups.push((word_idx, instr.target_pc(), Fixup::Unconditional));
        }
        Op::BrIfTrue => {
            ldr_slot(T0, rs1, out);
            out.push(encode::cmp(T0, encode::XZR));
            let word_idx = out.len();
            out.push(0);
            fixups.push((word_idx, instr.target_pc(), Fixup::Conditional(Cond::Ne)));
        }
        Op::BrIfFalse => {
            ldr_slot(T0, rs1, out);
            out.push(encode::cmp(T0, encode::XZR));
            let word_idx = out.len();
            out.push(0);
            fixups.push((word_idx, instr.target_pc(), Fixup::Conditional(Cond::Eq)));
        }
        Op::Return => {
            if rd == 1 {
                ldr_slot(T0, rs1, out);
                str_slot(T0, 0, out);
            }
            out.push(encode::movz(0, 0, 0));
            out.push(encode::ret());
        }
        Op::Unreachable => {
            out.push(encode::movz(0, u16::from(u8::from(TrapCode::Unreachable)), 0));
            out.push(encode::ret());
        }
        Op::Trap => {
            out.push(encode::movz(0, u16::from(rs1), 0));
            out.push(encode::ret());
        }

        Op::Call => {
            let [arg_count, result_count, ..] = func
                .code()
                .get(pc + 1)
                .expect("Call must be followed by an arity data word")
                .as_data_word();
            let first_arg = rs1;
            let first_result = rd;
            let func_idx = instr.operand();

            out.push(encode::mov_reg(0, REG_VM));
            out.push(encode::mov_reg(1, REG_INSTANCE));
            encode::load_imm32_fixed(2, func_idx, out);
            encode::load_imm32_fixed(T0, u32::from(first_arg) * 8, out);
            out.push(encode::add_reg(3, REG_FRAME, T0));
            encode::load_imm32_fixed(4, u32::from(arg_count), out);
            encode::load_imm32_fixed(T0, u32::from(first_result) * 8, out);
            out.push(encode::add_reg(5, REG_FRAME, T0));
            encode::load_imm32_fixed(6, u32::from(result_count), out);
            encode::load_imm64_fixed(T0, trampolines.call as usize as u64, out);
            out.push(encode::blr(T0));
            emit_call_return_sequence(out, trampolines);
        }
        Op::CallIndirect => {
            let [arg_count, result_count, ..] = func
                .code()
                .get(pc + 1)
                .expect("CallIndirect must be followed by an arity data word")
                .as_data_word();
            let packed = func.pool64_at(instr.pool_index());
            let elem_reg = rs1;
            let first_arg = elem_reg
                .checked_sub(arg_count)
                .expect("callee index vreg follows its argument block");
            let first_result = rd;

            out.push(encode::mov_reg(0, REG_VM));
            out.push(encode::mov_reg(1, REG_INSTANCE));
            encode::load_imm64_fixed(2, packed, out);
            ldr_slot(3, elem_reg, out);
            encode::load_imm32_fixed(T0, u32::from(first_arg) * 8, out);
            out.push(encode::add_reg(4, REG_FRAME, T0));
            encode::load_imm32_fixed(5, u32::from(arg_count), out);
            encode::load_imm32_fixed(T0, u32::from(first_result) * 8, out);
            out.push(encode::add_reg(6, REG_FRAME, T0));
            encode::load_imm32_fixed(7, u32::from(result_count), out);
            encode::load_imm64_fixed(T0, trampolines.call_indirect as usize as u64, out);
            out.push(encode::blr(T0));
            emit_call_return_sequence(out, trampolines);
        }

        Op::GlobalGet => {
            out.push(encode::mov_reg(0, REG_INSTANCE));
            encode::load_imm32_fixed(1, instr.operand(), out);
            encode::load_imm64_fixed(T0, trampolines.global_get as usize as u64, out);
            out.push(encode::blr(T0));
            str_slot(0, rd, out);
        }
        Op::GlobalSet => {
            ldr_slot(T1, rs1, out);
            out.push(encode::mov_reg(0, REG_INSTANCE));
            encode::load_imm32_fixed(1, instr.operand(), out);
            out.push(encode::mov_reg(2, T1));
            encode::load_imm64_fixed(T0, trampolines.global_set as usize as u64, out);
            out.push(encode::blr(T0));
        }

        Op::I32Load | Op::F32Load => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 4);
            out.push(encode::ldr32_reg(T0, REG_MEM_BASE, T0));
            str_slot(T0, rd, out);
        }
        Op::I64Load | Op::F64Load => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 8);
            out.push(encode::ldr64_reg(T0, REG_MEM_BASE, T0));
            str_slot(T0, rd, out);
        }
        Op::I32Load8U | Op::I64Load8U => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 1);
            out.push(encode::ldrb_reg(T0, REG_MEM_BASE, T0));
            str_slot(T0, rd, out);
        }
        Op::I32Load8S => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 1);
            out.push(encode::ldrb_reg(T0, REG_MEM_BASE, T0));
            out.push(encode::sxtb(T0, T0));
            str_slot(T0, rd, out);
        }
        Op::I64Load8S => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 1);
            out.push(encode::ldrb_reg(T0, REG_MEM_BASE, T0));
            out.push(encode::sxtb(T0, T0));
            out.push(encode::sxtw(T0, T0));
            str_slot(T0, rd, out);
        }
        Op::I32Load16U | Op::I64Load16U => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 2);
            out.push(encode::ldrh_reg(T0, REG_MEM_BASE, T0));
            str_slot(T0, rd, out);
        }
        Op::I32Load16S => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 2);
            out.push(encode::ldrh_reg(T0, REG_MEM_BASE, T0));
            out.push(encode::sxth(T0, T0));
            str_slot(T0, rd, out);
        }
        Op::I64Load16S => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 2);
            out.push(encode::ldrh_reg(T0, REG_MEM_BASE, T0));
            out.push(encode::sxth(T0, T0));
            out.push(encode::sxtw(T0, T0));
            str_slot(T0, rd, out);
        }
        Op::I64Load32U => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 4);
            out.push(encode::ldr32_reg(T0, REG_MEM_BASE, T0));
            str_slot(T0, rd, out);
        }
        Op::I64Load32S => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rs1, offset, 4);
            out.push(encode::ldr32_reg(T0, REG_MEM_BASE, T0));
            out.push(encode::sxtw(T0, T0));
            str_slot(T0, rd, out);
        }

        Op::I32Store | Op::F32Store => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rd, offset, 4);
            ldr_slot(T1, rs1, out);
            out.push(encode::str32_reg(T1, REG_MEM_BASE, T0));
        }
        Op::I64Store | Op::F64Store => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rd, offset, 8);
            ldr_slot(T1, rs1, out);
            out.push(encode::str64_reg(T1, REG_MEM_BASE, T0));
        }
        Op::I32Store8 | Op::I64Store8 => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rd, offset, 1);
            ldr_slot(T1, rs1, out);
            out.push(encode::strb_reg(T1, REG_MEM_BASE, T0));
        }
        Op::I32Store16 | Op::I64Store16 => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rd, offset, 2);
            ldr_slot(T1, rs1, out);
            out.push(encode::strh_reg(T1, REG_MEM_BASE, T0));
        }
        Op::I64Store32 => {
            let offset = func.pool64_at(instr.pool_index());
            emit_bounds_check(out, trampolines, rd, offset, 4);
            ldr_slot(T1, rs1, out);
            out.push(encode::str32_reg(T1, REG_MEM_BASE, T0));
        }

        other => return Err(CompileError::Unsupported(other)),
    }
    Ok(())
}
