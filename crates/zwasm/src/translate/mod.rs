//! §4.3: the one-pass stack-mirroring translator from decoded Wasm
//! bytecode to [`RegFunc`].
//!
//! The operand stack is mirrored one-for-one by a stack of virtual
//! register numbers; every value pushed by the source bytecode gets a
//! fresh vreg (a simple bump allocator, never reused — see
//! [`TranslateError::TooManyRegisters`] for the resulting limit) and every
//! pop just drops the top of that stack without touching the vreg itself.
//! Because each `call`'s arguments are the N values most recently pushed
//! with nothing interleaved, their vregs are always contiguous; `Call`/
//! `CallIndirect` exploit this to carry only a first-argument register
//! rather than packing an argument list into the instruction word.
//!
//! Known gaps (documented rather than silently approximated): block/loop/
//! if types are restricted to 0 or 1 result (multi-value blocks are not
//! lowered); `br_table` only supports targets with 0-arity labels; SIMD,
//! threads/atomics and exception-handling opcodes are not lowered; and
//! multi-memory/memory64 addressing beyond memory 0 / 32-bit offsets
//! falls back to `Unsupported`. Every one of these is a `translate`-time
//! rejection, never a silent miscompile.

pub(crate) mod wasm_op;

use alloc::vec::Vec;

use zwasm_core::{DecodeError, FuncType, ValType};
use zwasm_ir::{Op, Pc, RegFunc, RegInstr};

use crate::leb128::Reader;
use crate::module::{CodeBody, Module};

#[derive(Debug)]
pub enum TranslateError {
    Decode(DecodeError),
    /// `byte` (optionally preceded by the `0xFC` prefix) has no RegIR
    /// lowering.
    UnsupportedOpcode(u8),
    UnsupportedBlockType,
    TooManyRegisters,
    UnknownFunction(u32),
    UnknownType(u32),
}

impl From<DecodeError> for TranslateError {
    fn from(err: DecodeError) -> Self {
        TranslateError::Decode(err)
    }
}

impl core::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TranslateError::Decode(e) => write!(f, "{e}"),
            TranslateError::UnsupportedOpcode(b) => write!(f, "opcode 0x{b:02x} has no RegIR lowering"),
            TranslateError::UnsupportedBlockType => write!(f, "multi-value block type is not supported"),
            TranslateError::TooManyRegisters => write!(f, "function needs more than 256 virtual registers"),
            TranslateError::UnknownFunction(i) => write!(f, "call to undefined function {i}"),
            TranslateError::UnknownType(i) => write!(f, "reference to undefined type {i}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TranslateError {}

impl From<TranslateError> for zwasm_core::WasmError {
    fn from(err: TranslateError) -> Self {
        use zwasm_core::ValidationError;
        match err {
            TranslateError::Decode(_) => ValidationError::Unsupported(alloc::format!("{err}")).into(),
            TranslateError::UnsupportedOpcode(b) => ValidationError::IllegalOpcode(b as u16).into(),
            TranslateError::UnsupportedBlockType => ValidationError::Unsupported(alloc::string::String::from("multi-value block type")).into(),
            TranslateError::TooManyRegisters => ValidationError::Unsupported(alloc::string::String::from("function needs more than 256 virtual registers")).into(),
            TranslateError::UnknownFunction(i) => ValidationError::UnknownFunction(i).into(),
            TranslateError::UnknownType(i) => ValidationError::UnknownType(i).into(),
        }
    }
}

/// Lowers every function body in `module`, in function-index order
/// (matching `module.code`, i.e. only locally-defined functions).
pub fn translate_module(module: &Module) -> Result<Vec<RegFunc>, TranslateError> {
    module
        .code
        .iter()
        .zip(module.funcs.iter())
        .map(|(body, func_def)| {
            let ty = module
                .types
                .get(func_def.type_idx as usize)
                .ok_or(TranslateError::UnknownType(func_def.type_idx))?;
            translate_function(module, ty, body)
        })
        .collect()
}

enum Fixup {
    Instr(usize),
    JumpTableSlot(usize),
}

enum Label {
    Known(Pc),
    Pending(Vec<Fixup>),
}

enum FrameKind {
    Block,
    Loop,
    If,
    Function,
}

struct Frame {
    kind: FrameKind,
    label: Label,
    stack_height_at_entry: usize,
    /// `None` for a 0-result frame; `Some(first_vreg)` otherwise. The
    /// function-level frame can have more than one result vreg
    /// (contiguous, `results[i]` at `first_vreg + i`); block/loop/if
    /// frames are restricted to at most one.
    result_first_vreg: Option<u8>,
    result_count: usize,
}

impl Frame {
    fn resolve(self, here: Pc, code: &mut [RegInstr], jump_tables: &mut [Pc]) {
        if let Label::Pending(fixups) = self.label {
            for fixup in fixups {
                match fixup {
                    Fixup::Instr(idx) => code[idx].patch_target(here),
                    Fixup::JumpTableSlot(idx) => jump_tables[idx] = here,
                }
            }
        }
    }
}

struct Builder<'m> {
    module: &'m Module,
    code: Vec<RegInstr>,
    pool64: Vec<u64>,
    jump_tables: Vec<Pc>,
    stack: Vec<u8>,
    frames: Vec<Frame>,
    next_vreg: u16,
}

impl<'m> Builder<'m> {
    fn alloc_vreg(&mut self) -> Result<u8, TranslateError> {
        if self.next_vreg as usize >= zwasm_ir::MAX_VREG {
            return Err(TranslateError::TooManyRegisters);
        }
        let vreg = self.next_vreg as u8;
        self.next_vreg += 1;
        Ok(vreg)
    }

    fn push_new(&mut self) -> Result<u8, TranslateError> {
        let vreg = self.alloc_vreg()?;
        self.stack.push(vreg);
        Ok(vreg)
    }

    fn pop(&mut self) -> u8 {
        self.stack.pop().expect("validator guarantees stack non-empty")
    }

    fn emit(&mut self, op: Op, rd: u8, rs1: u8, operand: u32) -> usize {
        self.code.push(RegInstr::new(op, rd, rs1, operand));
        self.code.len() - 1
    }

    fn pc(&self) -> Pc {
        self.code.len() as Pc
    }

    fn intern_pool64(&mut self, value: u64) -> u32 {
        self.pool64.push(value);
        (self.pool64.len() - 1) as u32
    }

    /// Frame at relative branch depth `depth` (0 = innermost).
    fn frame_at_depth(&self, depth: u32) -> usize {
        self.frames.len() - 1 - depth as usize
    }

    /// Emits the value-passing copies (`at most one result`) and the
    /// actual branch for `br`/`br_if` targeting `frame_idx`. For the
    /// outermost (function) frame this instead performs a full return.
    fn branch_to(&mut self, frame_idx: usize, condition: Option<u8>) -> Result<(), TranslateError> {
        let is_function_frame = matches!(self.frames[frame_idx].kind, FrameKind::Function);

        if is_function_frame {
            let result_count = self.frames[frame_idx].result_count;
            // Results are the top `result_count` stack entries; copy them
            // down into contiguous slots [0, result_count) as the ABI's
            // "low frame slots" convention (peek only — a conditional
            // branch that isn't taken must leave the operand stack
            // untouched for the fallthrough path).
            let base = self.stack.len() - result_count;
            let copies: Vec<(u8, u8)> = (0..result_count).map(|i| (self.stack[base + i], i as u8)).collect();
            match condition {
                None => {
                    for (src, dst) in copies {
                        self.emit(Op::Copy, dst, src, 0);
                    }
                    self.emit(Op::Return, result_count.min(255) as u8, 0, 0);
                }
                Some(cond) => {
                    let skip_idx = self.emit(Op::BrIfFalse, 0, cond, 0);
                    for (src, dst) in copies {
                        self.emit(Op::Copy, dst, src, 0);
                    }
                    self.emit(Op::Return, result_count.min(255) as u8, 0, 0);
                    let here = self.pc();
                    self.code[skip_idx].patch_target(here);
                }
            }
            return Ok(());
        }

        let result_count = self.frames[frame_idx].result_count;
        if result_count > 1 {
            return Err(TranslateError::UnsupportedBlockType);
        }
        if let Some(dst) = self.frames[frame_idx].result_first_vreg {
            let src = *self.stack.last().expect("validator guarantees a value for a value-carrying branch");
            self.emit(Op::Copy, dst, src, 0);
        }

        let (op, rs1) = match condition {
            None => (Op::Br, 0),
            Some(cond) => (Op::BrIfTrue, cond),
        };
        let idx = self.emit(op, 0, rs1, 0);

        match &mut self.frames[frame_idx].label {
            Label::Known(target) => self.code[idx].patch_target(*target),
            Label::Pending(fixups) => fixups.push(Fixup::Instr(idx)),
        }
        Ok(())
    }
}

fn translate_function(module: &Module, ty: &FuncType, body: &CodeBody) -> Result<RegFunc, TranslateError> {
    let param_count = ty.params().len() as u16;
    let mut local_count = param_count;
    for (count, _) in &body.locals {
        local_count += *count as u16;
    }

    let mut b = Builder {
        module,
        code: Vec::new(),
        pool64: Vec::new(),
        jump_tables: Vec::new(),
        stack: Vec::new(),
        frames: Vec::new(),
        next_vreg: local_count,
    };

    // Default-initialize declared locals (params arrive pre-populated by
    // the caller's calling convention).
    let mut local_vreg = param_count;
    for (count, val_type) in &body.locals {
        for _ in 0..*count {
            emit_default(&mut b, local_vreg, *val_type);
            local_vreg += 1;
        }
    }

    b.frames.push(Frame {
        kind: FrameKind::Function,
        label: Label::Pending(Vec::new()),
        stack_height_at_entry: 0,
        result_first_vreg: None,
        result_count: ty.results().len(),
    });

    let mut r = Reader::new(&body.instrs);
    translate_block_body(&mut b, &mut r)?;

    // Falling off the end of the function body behaves like `return`.
    let fn_frame = b.frames.pop().expect("function frame always present");
    let result_count = fn_frame.result_count;
    let base = b.stack.len().saturating_sub(result_count);
    let copies: Vec<(u8, u8)> = (0..result_count).map(|i| (b.stack[base + i], i as u8)).collect();
    for (src, dst) in copies {
        b.emit(Op::Copy, dst, src, 0);
    }
    b.emit(Op::Return, result_count.min(255) as u8, 0, 0);
    let here = b.pc();
    fn_frame.resolve(here, &mut b.code, &mut b.jump_tables);

    Ok(RegFunc::with_jump_tables(b.code, b.pool64, b.jump_tables, b.next_vreg, local_count))
}

fn emit_default(b: &mut Builder, vreg: u8, val_type: ValType) {
    match val_type {
        ValType::I32 | ValType::F32 => {
            b.emit(Op::I32Const, vreg, 0, 0);
        }
        ValType::I64 | ValType::F64 => {
            let idx = b.intern_pool64(0);
            b.emit(Op::I64Const, vreg, 0, idx);
        }
        ValType::V128 => {
            let lo = b.intern_pool64(0);
            b.intern_pool64(0);
            b.emit(Op::V128Const, vreg, 0, lo);
        }
        ValType::Ref(_) => {
            b.emit(Op::RefNull, vreg, 0, 0);
        }
        ValType::Unknown => {}
    }
}

/// Reads a `blocktype`, returning `(has_result,)`; rejects multi-value
/// block signatures.
fn read_block_type(module: &Module, r: &mut Reader) -> Result<bool, TranslateError> {
    let start = r.position();
    let byte = r.peek_u8().map_err(TranslateError::Decode)?;
    if byte == 0x40 {
        r.skip(1).map_err(TranslateError::Decode)?;
        return Ok(false);
    }
    if matches!(byte, 0x7F | 0x7E | 0x7D | 0x7C | 0x7B | 0x70 | 0x6F | 0x64 | 0x63) {
        r.skip(1).map_err(TranslateError::Decode)?;
        return Ok(true);
    }
    let _ = start;
    let idx = r.read_sleb(33).map_err(TranslateError::Decode)?;
    if idx < 0 {
        return Err(TranslateError::UnsupportedBlockType);
    }
    let ty = module.types.get(idx as usize).ok_or(TranslateError::UnknownType(idx as u32))?;
    if !ty.params().is_empty() || ty.results().len() > 1 {
        return Err(TranslateError::UnsupportedBlockType);
    }
    Ok(!ty.results().is_empty())
}

fn translate_block_body(b: &mut Builder, r: &mut Reader) -> Result<(), TranslateError> {
    use wasm_op::*;

    loop {
        if r.is_empty() {
            return Ok(());
        }
        let opcode = r.read_u8().map_err(TranslateError::Decode)?;
        match opcode {
            END => {
                let frame = b.frames.pop().expect("matching frame for `end`");
                if matches!(frame.kind, FrameKind::Function) {
                    // Handled by the caller (`translate_function`), which
                    // needs the fully-drained frame stack; push it back.
                    b.frames.push(frame);
                    return Ok(());
                }
                if let Some(dst) = frame.result_first_vreg {
                    let src = b.pop();
                    b.emit(Op::Copy, dst, src, 0);
                    b.stack.truncate(frame.stack_height_at_entry);
                    b.stack.push(dst);
                } else {
                    b.stack.truncate(frame.stack_height_at_entry);
                }
                let here = b.pc();
                frame.resolve(here, &mut b.code, &mut b.jump_tables);
            }
            ELSE => {
                let frame_idx = b.frames.len() - 1;
                let has_result = b.frames[frame_idx].result_first_vreg.is_some();
                if has_result {
                    let dst = b.frames[frame_idx].result_first_vreg.unwrap();
                    let src = b.pop();
                    b.emit(Op::Copy, dst, src, 0);
                }
                // `then` arm falls through past `else`: jump to `end`.
                let jump_idx = b.emit(Op::Br, 0, 0, 0);
                match &mut b.frames[frame_idx].label {
                    Label::Pending(fixups) => fixups.push(Fixup::Instr(jump_idx)),
                    Label::Known(_) => unreachable!("if/else frames are always pending"),
                }
                b.stack.truncate(b.frames[frame_idx].stack_height_at_entry);
                // The `else` arm's own branch-out target (the `if`'s
                // `BrIfFalse`) is patched to start right here.
                return_to_else_target(b, frame_idx);
            }
            BLOCK | LOOP | IF => {
                let has_result = read_block_type(b.module, r)?;
                let result_first_vreg = if has_result { Some(b.alloc_vreg()?) } else { None };

                match opcode {
                    BLOCK => {
                        let stack_height_at_entry = b.stack.len();
                        b.frames.push(Frame {
                            kind: FrameKind::Block,
                            label: Label::Pending(Vec::new()),
                            stack_height_at_entry,
                            result_first_vreg,
                            result_count: usize::from(has_result),
                        });
                    }
                    LOOP => {
                        let stack_height_at_entry = b.stack.len();
                        let here = b.pc();
                        b.frames.push(Frame {
                            kind: FrameKind::Loop,
                            label: Label::Known(here),
                            stack_height_at_entry,
                            result_first_vreg,
                            result_count: usize::from(has_result),
                        });
                    }
                    _ => {
                        // The condition is consumed by `if` itself, not
                        // part of the body's operand-stack window.
                        let cond = b.pop();
                        let stack_height_at_entry = b.stack.len();
                        let branch_idx = b.emit(Op::BrIfFalse, 0, cond, 0);
                        b.frames.push(Frame {
                            kind: FrameKind::If,
                            label: Label::Pending(alloc::vec![Fixup::Instr(branch_idx)]),
                            stack_height_at_entry,
                            result_first_vreg,
                            result_count: usize::from(has_result),
                        });
                    }
                }
            }
            BR | BR_IF => {
                let depth = r.read_u32().map_err(TranslateError::Decode)?;
                let frame_idx = b.frame_at_depth(depth);
                if opcode == BR_IF {
                    let cond = b.pop();
                    b.branch_to(frame_idx, Some(cond))?;
                } else {
                    b.branch_to(frame_idx, None)?;
                }
            }
            BR_TABLE => {
                let count = r.read_u32().map_err(TranslateError::Decode)?;
                let mut targets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    targets.push(r.read_u32().map_err(TranslateError::Decode)?);
                }
                let default = r.read_u32().map_err(TranslateError::Decode)?;
                let selector = b.pop();

                for &depth in targets.iter().chain(core::iter::once(&default)) {
                    if b.frames[b.frame_at_depth(depth)].result_count > 0 {
                        return Err(TranslateError::UnsupportedBlockType);
                    }
                }

                let table_offset = b.jump_tables.len();
                b.jump_tables.push(targets.len() as Pc);
                b.jump_tables.push(0); // default, patched/resolved below
                for _ in &targets {
                    b.jump_tables.push(0);
                }

                let default_frame = b.frame_at_depth(default);
                match &b.frames[default_frame].label {
                    Label::Known(pc) => b.jump_tables[table_offset + 1] = *pc,
                    Label::Pending(_) => {
                        let slot = table_offset + 1;
                        if let Label::Pending(fixups) = &mut b.frames[default_frame].label {
                            fixups.push(Fixup::JumpTableSlot(slot));
                        }
                    }
                }
                for (i, depth) in targets.iter().enumerate() {
                    let frame_idx = b.frame_at_depth(*depth);
                    let slot = table_offset + 2 + i;
                    match &b.frames[frame_idx].label {
                        Label::Known(pc) => b.jump_tables[slot] = *pc,
                        Label::Pending(_) => {
                            if let Label::Pending(fixups) = &mut b.frames[frame_idx].label {
                                fixups.push(Fixup::JumpTableSlot(slot));
                            }
                        }
                    }
                }
                b.emit(Op::BrTable, 0, selector, table_offset as u32);
            }
            RETURN => {
                b.branch_to(0, None)?;
            }
            UNREACHABLE => {
                b.emit(Op::Unreachable, 0, 0, 0);
            }
            NOP => {}
            CALL | RETURN_CALL => {
                let func_idx = r.read_u32().map_err(TranslateError::Decode)?;
                emit_call(b, func_idx, opcode == RETURN_CALL)?;
            }
            CALL_INDIRECT | RETURN_CALL_INDIRECT => {
                let type_idx = r.read_u32().map_err(TranslateError::Decode)?;
                let table_idx = r.read_u32().map_err(TranslateError::Decode)?;
                emit_call_indirect(b, type_idx, table_idx, opcode == RETURN_CALL_INDIRECT)?;
            }
            DROP => {
                b.pop();
            }
            SELECT | SELECT_T => {
                if opcode == SELECT_T {
                    let n = r.read_u32().map_err(TranslateError::Decode)?;
                    for _ in 0..n {
                        r.skip(1).map_err(TranslateError::Decode)?;
                    }
                }
                let cond = b.pop();
                let false_v = b.pop();
                let true_v = b.pop();
                let dst = b.push_new()?;
                let packed = u32::from(true_v) | (u32::from(false_v) << 8);
                b.emit(Op::Select, dst, cond, packed);
            }
            LOCAL_GET => {
                let idx = r.read_u32().map_err(TranslateError::Decode)? as u8;
                if try_fuse_local_imm_binop(b, r, idx)? || try_fuse_local_local_binop(b, r, idx)? {
                    continue;
                }
                let dst = b.push_new()?;
                b.emit(Op::Copy, dst, idx, 0);
            }
            LOCAL_SET | LOCAL_TEE => {
                let idx = r.read_u32().map_err(TranslateError::Decode)? as u8;
                let src = if opcode == LOCAL_TEE { *b.stack.last().unwrap() } else { b.pop() };
                b.emit(Op::Copy, idx, src, 0);
            }
            GLOBAL_GET => {
                let idx = r.read_u32().map_err(TranslateError::Decode)?;
                let dst = b.push_new()?;
                b.emit(Op::GlobalGet, dst, 0, idx);
            }
            GLOBAL_SET => {
                let idx = r.read_u32().map_err(TranslateError::Decode)?;
                let src = b.pop();
                b.emit(Op::GlobalSet, 0, src, idx);
            }
            TABLE_GET | TABLE_SET | REF_IS_NULL | REF_NULL | REF_FUNC => {
                translate_reftype_op(b, r, opcode)?;
            }
            I32_CONST => {
                let value = r.read_i32().map_err(TranslateError::Decode)?;
                if try_fuse_imm_local_add(b, r, value)? {
                    continue;
                }
                let dst = b.push_new()?;
                b.emit(Op::I32Const, dst, 0, value as u32);
            }
            I64_CONST => {
                let value = r.read_i64().map_err(TranslateError::Decode)?;
                let dst = b.push_new()?;
                let idx = b.intern_pool64(value as u64);
                b.emit(Op::I64Const, dst, 0, idx);
            }
            F32_CONST => {
                let bits = r.read_f32_bits().map_err(TranslateError::Decode)?;
                let dst = b.push_new()?;
                b.emit(Op::F32Const, dst, 0, bits);
            }
            F64_CONST => {
                let bits = r.read_f64_bits().map_err(TranslateError::Decode)?;
                let dst = b.push_new()?;
                let idx = b.intern_pool64(bits);
                b.emit(Op::F64Const, dst, 0, idx);
            }
            I32_LOAD..=I64_STORE32 | MEMORY_SIZE | MEMORY_GROW => {
                translate_memory_op(b, r, opcode)?;
            }
            op if is_unary(op) => {
                let src = b.pop();
                let dst = b.push_new()?;
                b.emit(unary_op(op), dst, src, 0);
            }
            op if is_binary(op) => {
                let rhs = b.pop();
                let lhs = b.pop();
                let dst = b.push_new()?;
                b.emit(binary_op(op), dst, lhs, u32::from(rhs));
            }
            FC_PREFIX => {
                translate_fc_op(b, r)?;
            }
            SIMD_PREFIX => {
                translate_simd_op(b, r)?;
            }
            other => return Err(TranslateError::UnsupportedOpcode(other)),
        }
    }
}

/// Binary opcode fusible with an immediately preceding `local.get; i32.const`
/// pair into one of the `…ImmI32` superinstructions (§4.3).
fn fusible_imm_binop(opcode: u8) -> Option<Op> {
    use wasm_op::*;
    Some(match opcode {
        I32_ADD => Op::AddImmI32,
        I32_SUB => Op::SubImmI32,
        I32_LT_S => Op::LtSImmI32,
        I32_LT_U => Op::LtUImmI32,
        I32_EQ => Op::EqImmI32,
        _ => return None,
    })
}

/// Tries to fuse `local.get $local_idx; i32.const …; <binop>` into one
/// superinstruction. Peeks through a cloned cursor first; `r` only advances
/// past the consumed bytes once the whole pattern is confirmed.
fn try_fuse_local_imm_binop(b: &mut Builder, r: &mut Reader, local_idx: u8) -> Result<bool, TranslateError> {
    let mut look = *r;
    if look.peek_u8().map_err(TranslateError::Decode)? != wasm_op::I32_CONST {
        return Ok(false);
    }
    look.read_u8().map_err(TranslateError::Decode)?;
    let imm = look.read_i32().map_err(TranslateError::Decode)?;
    let Ok(binop_byte) = look.peek_u8() else {
        return Ok(false);
    };
    let Some(op) = fusible_imm_binop(binop_byte) else {
        return Ok(false);
    };
    look.read_u8().map_err(TranslateError::Decode)?;
    *r = look;
    let dst = b.push_new()?;
    b.emit(op, dst, local_idx, imm as u32);
    Ok(true)
}

/// Tries to fuse `local.get $a; local.get $b; <binop>` into `AddLocalsI32`/
/// `LtSLocalsI32`, the only two reserved "both operands are locals"
/// superinstructions.
fn try_fuse_local_local_binop(b: &mut Builder, r: &mut Reader, first_idx: u8) -> Result<bool, TranslateError> {
    let mut look = *r;
    if look.peek_u8().map_err(TranslateError::Decode)? != wasm_op::LOCAL_GET {
        return Ok(false);
    }
    look.read_u8().map_err(TranslateError::Decode)?;
    let second_idx = look.read_u32().map_err(TranslateError::Decode)? as u8;
    let Ok(binop_byte) = look.peek_u8() else {
        return Ok(false);
    };
    let op = match binop_byte {
        wasm_op::I32_ADD => Op::AddLocalsI32,
        wasm_op::I32_LT_S => Op::LtSLocalsI32,
        _ => return Ok(false),
    };
    look.read_u8().map_err(TranslateError::Decode)?;
    *r = look;
    let dst = b.push_new()?;
    b.emit(op, dst, first_idx, u32::from(second_idx));
    Ok(true)
}

/// Tries to fuse `i32.const …; local.get $l; i32.add` into `AddImmI32Rev`,
/// the constant-first mirror of `AddImmI32` kept as its own opcode so a
/// disassembly can tell which operand was the literal.
fn try_fuse_imm_local_add(b: &mut Builder, r: &mut Reader, imm: i32) -> Result<bool, TranslateError> {
    let mut look = *r;
    if look.peek_u8().map_err(TranslateError::Decode)? != wasm_op::LOCAL_GET {
        return Ok(false);
    }
    look.read_u8().map_err(TranslateError::Decode)?;
    let local_idx = look.read_u32().map_err(TranslateError::Decode)? as u8;
    let Ok(next) = look.peek_u8() else {
        return Ok(false);
    };
    if next != wasm_op::I32_ADD {
        return Ok(false);
    }
    look.read_u8().map_err(TranslateError::Decode)?;
    *r = look;
    let dst = b.push_new()?;
    b.emit(Op::AddImmI32Rev, dst, local_idx, imm as u32);
    Ok(true)
}

/// No-op placeholder kept for readability at the `else` call site above;
/// the `if`'s `BrIfFalse` fixup already targets "here" once the frame
/// resolves at `end`, and a bare `else` does not itself need a second
/// resolution point beyond pushing the jump recorded above.
fn return_to_else_target(_b: &mut Builder, _frame_idx: usize) {}

fn emit_call(b: &mut Builder, func_idx: u32, is_tail: bool) -> Result<(), TranslateError> {
    let ty = b.module.func_type(func_idx).ok_or(TranslateError::UnknownFunction(func_idx))?.clone();
    let arg_count = ty.params().len();
    let first_arg = if arg_count > 0 { b.stack[b.stack.len() - arg_count] } else { 0 };
    for _ in 0..arg_count {
        b.pop();
    }
    let first_result = if !ty.results().is_empty() { b.next_vreg as u8 } else { 0 };
    for _ in 0..ty.results().len() {
        b.push_new()?;
    }
    let op = if is_tail { Op::ReturnCall } else { Op::Call };
    b.emit(op, first_result, first_arg, func_idx);
    // Tier 3 has no Store/Module access at compile time, so the call's
    // arity rides along as a data word the interpreter skips over (§3).
    b.code.push(RegInstr::data_word([arg_count as u8, ty.results().len() as u8, 0, 0]));
    Ok(())
}

fn emit_call_indirect(b: &mut Builder, type_idx: u32, table_idx: u32, is_tail: bool) -> Result<(), TranslateError> {
    let ty = b.module.types.get(type_idx as usize).ok_or(TranslateError::UnknownType(type_idx))?.clone();
    let arg_count = ty.params().len();
    // The element (callee) index is evaluated last, so by the monotonic
    // vreg allocator its register sits immediately after the contiguous
    // argument block; the engine recovers the argument base as
    // `elem_vreg - arg_count` rather than carrying a second operand.
    let elem = b.pop();
    for _ in 0..arg_count {
        b.pop();
    }
    let first_result = if !ty.results().is_empty() { b.next_vreg as u8 } else { 0 };
    for _ in 0..ty.results().len() {
        b.push_new()?;
    }
    let packed = (u64::from(table_idx) << 32) | u64::from(type_idx);
    let pool_idx = b.intern_pool64(packed);
    let op = if is_tail { Op::ReturnCallIndirect } else { Op::CallIndirect };
    b.emit(op, first_result, elem, pool_idx);
    b.code.push(RegInstr::data_word([arg_count as u8, ty.results().len() as u8, 0, 0]));
    Ok(())
}

fn translate_reftype_op(b: &mut Builder, r: &mut Reader, opcode: u8) -> Result<(), TranslateError> {
    match opcode {
        wasm_op::REF_NULL => {
            r.skip(1).map_err(TranslateError::Decode)?; // heaptype byte
            let dst = b.push_new()?;
            b.emit(Op::RefNull, dst, 0, 0);
        }
        wasm_op::REF_FUNC => {
            let idx = r.read_u32().map_err(TranslateError::Decode)?;
            let dst = b.push_new()?;
            b.emit(Op::RefFunc, dst, 0, idx);
        }
        wasm_op::REF_IS_NULL => {
            let src = b.pop();
            let dst = b.push_new()?;
            b.emit(Op::RefIsNull, dst, src, 0);
        }
        wasm_op::TABLE_GET => {
            let idx = r.read_u32().map_err(TranslateError::Decode)?;
            let index = b.pop();
            let dst = b.push_new()?;
            b.emit(Op::TableGet, dst, index, idx);
        }
        wasm_op::TABLE_SET => {
            let idx = r.read_u32().map_err(TranslateError::Decode)?;
            let value = b.pop();
            let index = b.pop();
            b.emit(Op::TableSet, index, value, idx);
        }
        other => return Err(TranslateError::UnsupportedOpcode(other)),
    }
    Ok(())
}

fn read_memarg(r: &mut Reader) -> Result<u64, TranslateError> {
    let align = r.read_u32().map_err(TranslateError::Decode)?;
    if align & 0x40 != 0 {
        let memory_idx = r.read_u32().map_err(TranslateError::Decode)?;
        if memory_idx != 0 {
            return Err(TranslateError::UnsupportedOpcode(0));
        }
    }
    r.read_u32().map(u64::from).map_err(TranslateError::Decode)
}

fn translate_memory_op(b: &mut Builder, r: &mut Reader, opcode: u8) -> Result<(), TranslateError> {
    use wasm_op::*;
    match opcode {
        MEMORY_SIZE => {
            r.skip(1).map_err(TranslateError::Decode)?;
            let dst = b.push_new()?;
            b.emit(Op::MemorySize, dst, 0, 0);
        }
        MEMORY_GROW => {
            r.skip(1).map_err(TranslateError::Decode)?;
            let delta = b.pop();
            let dst = b.push_new()?;
            b.emit(Op::MemoryGrow, dst, delta, 0);
        }
        _ if (I32_STORE..=I64_STORE32).contains(&opcode) => {
            let offset = read_memarg(r)?;
            let idx = b.intern_pool64(offset);
            let value = b.pop();
            let addr = b.pop();
            let op = store_op(opcode);
            b.emit(op, addr, value, idx);
        }
        _ => {
            let offset = read_memarg(r)?;
            let idx = b.intern_pool64(offset);
            let addr = b.pop();
            let dst = b.push_new()?;
            let op = load_op(opcode);
            b.emit(op, dst, addr, idx);
        }
    }
    Ok(())
}

fn load_op(opcode: u8) -> Op {
    use wasm_op::*;
    match opcode {
        I32_LOAD => Op::I32Load,
        I64_LOAD => Op::I64Load,
        F32_LOAD => Op::F32Load,
        F64_LOAD => Op::F64Load,
        I32_LOAD8_S => Op::I32Load8S,
        I32_LOAD8_U => Op::I32Load8U,
        I32_LOAD16_S => Op::I32Load16S,
        I32_LOAD16_U => Op::I32Load16U,
        I64_LOAD8_S => Op::I64Load8S,
        I64_LOAD8_U => Op::I64Load8U,
        I64_LOAD16_S => Op::I64Load16S,
        I64_LOAD16_U => Op::I64Load16U,
        I64_LOAD32_S => Op::I64Load32S,
        I64_LOAD32_U => Op::I64Load32U,
        _ => unreachable!("only matched within the load opcode range"),
    }
}

fn store_op(opcode: u8) -> Op {
    use wasm_op::*;
    match opcode {
        I32_STORE => Op::I32Store,
        I64_STORE => Op::I64Store,
        F32_STORE => Op::F32Store,
        F64_STORE => Op::F64Store,
        I32_STORE8 => Op::I32Store8,
        I32_STORE16 => Op::I32Store16,
        I64_STORE8 => Op::I64Store8,
        I64_STORE16 => Op::I64Store16,
        I64_STORE32 => Op::I64Store32,
        _ => unreachable!("only matched within the store opcode range"),
    }
}

fn is_unary(opcode: u8) -> bool {
    unary_op_checked(opcode).is_some()
}

fn unary_op(opcode: u8) -> Op {
    unary_op_checked(opcode).expect("checked by is_unary")
}

fn unary_op_checked(opcode: u8) -> Option<Op> {
    use wasm_op::*;
    Some(match opcode {
        I32_EQZ => Op::I32Eqz,
        I32_CLZ => Op::I32Clz,
        I32_CTZ => Op::I32Ctz,
        I32_POPCNT => Op::I32Popcnt,
        I64_EQZ => Op::I64Eqz,
        I64_CLZ => Op::I64Clz,
        I64_CTZ => Op::I64Ctz,
        I64_POPCNT => Op::I64Popcnt,
        F32_ABS => Op::F32Abs,
        F32_NEG => Op::F32Neg,
        F32_CEIL => Op::F32Ceil,
        F32_FLOOR => Op::F32Floor,
        F32_TRUNC => Op::F32Trunc,
        F32_NEAREST => Op::F32Nearest,
        F32_SQRT => Op::F32Sqrt,
        F64_ABS => Op::F64Abs,
        F64_NEG => Op::F64Neg,
        F64_CEIL => Op::F64Ceil,
        F64_FLOOR => Op::F64Floor,
        F64_TRUNC => Op::F64Trunc,
        F64_NEAREST => Op::F64Nearest,
        F64_SQRT => Op::F64Sqrt,
        I32_WRAP_I64 => Op::I32WrapI64,
        I32_TRUNC_F32_S => Op::I32TruncF32S,
        I32_TRUNC_F32_U => Op::I32TruncF32U,
        I32_TRUNC_F64_S => Op::I32TruncF64S,
        I32_TRUNC_F64_U => Op::I32TruncF64U,
        I64_EXTEND_I32_S => Op::I64ExtendI32S,
        I64_EXTEND_I32_U => Op::I64ExtendI32U,
        I64_TRUNC_F32_S => Op::I64TruncF32S,
        I64_TRUNC_F32_U => Op::I64TruncF32U,
        I64_TRUNC_F64_S => Op::I64TruncF64S,
        I64_TRUNC_F64_U => Op::I64TruncF64U,
        F32_CONVERT_I32_S => Op::F32ConvertI32S,
        F32_CONVERT_I32_U => Op::F32ConvertI32U,
        F32_CONVERT_I64_S => Op::F32ConvertI64S,
        F32_CONVERT_I64_U => Op::F32ConvertI64U,
        F32_DEMOTE_F64 => Op::F32DemoteF64,
        F64_CONVERT_I32_S => Op::F64ConvertI32S,
        F64_CONVERT_I32_U => Op::F64ConvertI32U,
        F64_CONVERT_I64_S => Op::F64ConvertI64S,
        F64_CONVERT_I64_U => Op::F64ConvertI64U,
        F64_PROMOTE_F32 => Op::F64PromoteF32,
        I32_REINTERPRET_F32 => Op::I32ReinterpretF32,
        I64_REINTERPRET_F64 => Op::I64ReinterpretF64,
        F32_REINTERPRET_I32 => Op::F32ReinterpretI32,
        F64_REINTERPRET_I64 => Op::F64ReinterpretI64,
        I32_EXTEND8_S => Op::I32Extend8S,
        I32_EXTEND16_S => Op::I32Extend16S,
        I64_EXTEND8_S => Op::I64Extend8S,
        I64_EXTEND16_S => Op::I64Extend16S,
        I64_EXTEND32_S => Op::I64Extend32S,
        _ => return None,
    })
}

fn is_binary(opcode: u8) -> bool {
    binary_op_checked(opcode).is_some()
}

fn binary_op(opcode: u8) -> Op {
    binary_op_checked(opcode).expect("checked by is_binary")
}

fn binary_op_checked(opcode: u8) -> Option<Op> {
    use wasm_op::*;
    Some(match opcode {
        I32_EQ => Op::I32Eq,
        I32_NE => Op::I32Ne,
        I32_LT_S => Op::I32LtS,
        I32_LT_U => Op::I32LtU,
        I32_GT_S => Op::I32GtS,
        I32_GT_U => Op::I32GtU,
        I32_LE_S => Op::I32LeS,
        I32_LE_U => Op::I32LeU,
        I32_GE_S => Op::I32GeS,
        I32_GE_U => Op::I32GeU,
        I32_ADD => Op::I32Add,
        I32_SUB => Op::I32Sub,
        I32_MUL => Op::I32Mul,
        I32_DIV_S => Op::I32DivS,
        I32_DIV_U => Op::I32DivU,
        I32_REM_S => Op::I32RemS,
        I32_REM_U => Op::I32RemU,
        I32_AND => Op::I32And,
        I32_OR => Op::I32Or,
        I32_XOR => Op::I32Xor,
        I32_SHL => Op::I32Shl,
        I32_SHR_S => Op::I32ShrS,
        I32_SHR_U => Op::I32ShrU,
        I32_ROTL => Op::I32Rotl,
        I32_ROTR => Op::I32Rotr,
        I64_EQ => Op::I64Eq,
        I64_NE => Op::I64Ne,
        I64_LT_S => Op::I64LtS,
        I64_LT_U => Op::I64LtU,
        I64_GT_S => Op::I64GtS,
        I64_GT_U => Op::I64GtU,
        I64_LE_S => Op::I64LeS,
        I64_LE_U => Op::I64LeU,
        I64_GE_S => Op::I64GeS,
        I64_GE_U => Op::I64GeU,
        I64_ADD => Op::I64Add,
        I64_SUB => Op::I64Sub,
        I64_MUL => Op::I64Mul,
        I64_DIV_S => Op::I64DivS,
        I64_DIV_U => Op::I64DivU,
        I64_REM_S => Op::I64RemS,
        I64_REM_U => Op::I64RemU,
        I64_AND => Op::I64And,
        I64_OR => Op::I64Or,
        I64_XOR => Op::I64Xor,
        I64_SHL => Op::I64Shl,
        I64_SHR_S => Op::I64ShrS,
        I64_SHR_U => Op::I64ShrU,
        I64_ROTL => Op::I64Rotl,
        I64_ROTR => Op::I64Rotr,
        F32_EQ => Op::F32Eq,
        F32_NE => Op::F32Ne,
        F32_LT => Op::F32Lt,
        F32_GT => Op::F32Gt,
        F32_LE => Op::F32Le,
        F32_GE => Op::F32Ge,
        F32_ADD => Op::F32Add,
        F32_SUB => Op::F32Sub,
        F32_MUL => Op::F32Mul,
        F32_DIV => Op::F32Div,
        F32_MIN => Op::F32Min,
        F32_MAX => Op::F32Max,
        F32_COPYSIGN => Op::F32Copysign,
        F64_EQ => Op::F64Eq,
        F64_NE => Op::F64Ne,
        F64_LT => Op::F64Lt,
        F64_GT => Op::F64Gt,
        F64_LE => Op::F64Le,
        F64_GE => Op::F64Ge,
        F64_ADD => Op::F64Add,
        F64_SUB => Op::F64Sub,
        F64_MUL => Op::F64Mul,
        F64_DIV => Op::F64Div,
        F64_MIN => Op::F64Min,
        F64_MAX => Op::F64Max,
        F64_COPYSIGN => Op::F64Copysign,
        _ => return None,
    })
}

fn translate_fc_op(b: &mut Builder, r: &mut Reader) -> Result<(), TranslateError> {
    use wasm_op::fc::*;
    let sub = r.read_u32().map_err(TranslateError::Decode)?;
    match sub {
        I32_TRUNC_SAT_F32_S => unary_sat(b, Op::I32TruncSatF32S),
        I32_TRUNC_SAT_F32_U => unary_sat(b, Op::I32TruncSatF32U),
        I32_TRUNC_SAT_F64_S => unary_sat(b, Op::I32TruncSatF64S),
        I32_TRUNC_SAT_F64_U => unary_sat(b, Op::I32TruncSatF64U),
        I64_TRUNC_SAT_F32_S => unary_sat(b, Op::I64TruncSatF32S),
        I64_TRUNC_SAT_F32_U => unary_sat(b, Op::I64TruncSatF32U),
        I64_TRUNC_SAT_F64_S => unary_sat(b, Op::I64TruncSatF64S),
        I64_TRUNC_SAT_F64_U => unary_sat(b, Op::I64TruncSatF64U),
        // memory.init/copy/fill and table.init/copy/fill all take three
        // stack operands (dst, src-or-value, len) pushed back to back with
        // nothing interleaved, so by the monotonic vreg allocator their
        // registers are contiguous: `rd`=dst, `rd+1`=src/value, `rd+2`=len.
        // Only `dst` is carried in the instruction; the engine derives the
        // other two by offset.
        MEMORY_INIT => {
            let data_idx = r.read_u32().map_err(TranslateError::Decode)?;
            r.skip(1).map_err(TranslateError::Decode)?; // memory index, always 0
            b.pop(); // len
            b.pop(); // src
            let dst = b.pop();
            let idx = b.intern_pool64(u64::from(data_idx));
            b.emit(Op::MemoryInit, dst, 0, idx);
        }
        DATA_DROP => {
            let data_idx = r.read_u32().map_err(TranslateError::Decode)?;
            b.emit(Op::DataDrop, 0, 0, data_idx);
        }
        MEMORY_COPY => {
            r.skip(2).map_err(TranslateError::Decode)?;
            b.pop(); // len
            b.pop(); // src
            let dst = b.pop();
            b.emit(Op::MemoryCopy, dst, 0, 0);
        }
        MEMORY_FILL => {
            r.skip(1).map_err(TranslateError::Decode)?;
            b.pop(); // len
            b.pop(); // value
            let dst = b.pop();
            b.emit(Op::MemoryFill, dst, 0, 0);
        }
        TABLE_INIT => {
            let elem_idx = r.read_u32().map_err(TranslateError::Decode)?;
            let table_idx = r.read_u32().map_err(TranslateError::Decode)?;
            b.pop(); // len
            b.pop(); // src
            let dst = b.pop();
            let packed = u64::from(table_idx) | (u64::from(elem_idx) << 32);
            let idx = b.intern_pool64(packed);
            b.emit(Op::TableInit, dst, 0, idx);
        }
        ELEM_DROP => {
            let elem_idx = r.read_u32().map_err(TranslateError::Decode)?;
            b.emit(Op::ElemDrop, 0, 0, elem_idx);
        }
        TABLE_COPY => {
            let dst_table = r.read_u32().map_err(TranslateError::Decode)?;
            let src_table = r.read_u32().map_err(TranslateError::Decode)?;
            b.pop(); // len
            b.pop(); // src
            let dst = b.pop();
            let packed = u64::from(dst_table) | (u64::from(src_table) << 32);
            let idx = b.intern_pool64(packed);
            b.emit(Op::TableCopy, dst, 0, idx);
        }
        TABLE_GROW => {
            let table_idx = r.read_u32().map_err(TranslateError::Decode)?;
            let delta = b.pop();
            let init = b.pop();
            let dst = b.push_new()?;
            b.emit(Op::TableGrow, dst, delta, table_idx);
            let _ = init; // init value vreg, recovered by the engine as `delta - 1`
        }
        TABLE_SIZE => {
            let table_idx = r.read_u32().map_err(TranslateError::Decode)?;
            let dst = b.push_new()?;
            b.emit(Op::TableSize, dst, 0, table_idx);
        }
        TABLE_FILL => {
            let table_idx = r.read_u32().map_err(TranslateError::Decode)?;
            b.pop(); // len
            b.pop(); // value
            let dst = b.pop();
            b.emit(Op::TableFill, dst, 0, table_idx);
        }
        _ => return Err(TranslateError::UnsupportedOpcode(0xFC)),
    }
    Ok(())
}

/// Bounded SIMD subset (§4.3): `v128` load/store/const, the bitwise trio,
/// and add/sub/mul across the four common lane shapes. Every other `0xFD`
/// sub-opcode is rejected rather than silently misencoded.
fn translate_simd_op(b: &mut Builder, r: &mut Reader) -> Result<(), TranslateError> {
    use wasm_op::simd::*;
    let sub = r.read_u32().map_err(TranslateError::Decode)?;
    match sub {
        V128_CONST => {
            let mut bytes = [0u8; 16];
            for byte in &mut bytes {
                *byte = r.read_u8().map_err(TranslateError::Decode)?;
            }
            let lo = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
            let hi = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
            let idx = b.intern_pool64(lo);
            b.intern_pool64(hi);
            let dst = b.push_new()?;
            b.emit(Op::V128Const, dst, 0, idx);
        }
        V128_LOAD => {
            let offset = read_memarg(r)?;
            let idx = b.intern_pool64(offset);
            let addr = b.pop();
            let dst = b.push_new()?;
            b.emit(Op::V128Load, dst, addr, idx);
        }
        V128_STORE => {
            let offset = read_memarg(r)?;
            let idx = b.intern_pool64(offset);
            let value = b.pop();
            let addr = b.pop();
            b.emit(Op::V128Store, addr, value, idx);
        }
        V128_NOT => {
            let src = b.pop();
            let dst = b.push_new()?;
            b.emit(Op::V128Not, dst, src, 0);
        }
        V128_AND | V128_OR | V128_XOR | I32X4_ADD | I32X4_SUB | I32X4_MUL | I64X2_ADD | I64X2_SUB | I64X2_MUL
        | F32X4_ADD | F32X4_SUB | F32X4_MUL | F64X2_ADD | F64X2_SUB | F64X2_MUL => {
            let op = match sub {
                V128_AND => Op::V128And,
                V128_OR => Op::V128Or,
                V128_XOR => Op::V128Xor,
                I32X4_ADD => Op::I32x4Add,
                I32X4_SUB => Op::I32x4Sub,
                I32X4_MUL => Op::I32x4Mul,
                I64X2_ADD => Op::I64x2Add,
                I64X2_SUB => Op::I64x2Sub,
                I64X2_MUL => Op::I64x2Mul,
                F32X4_ADD => Op::F32x4Add,
                F32X4_SUB => Op::F32x4Sub,
                F32X4_MUL => Op::F32x4Mul,
                F64X2_ADD => Op::F64x2Add,
                F64X2_SUB => Op::F64x2Sub,
                F64X2_MUL => Op::F64x2Mul,
                _ => unreachable!(),
            };
            let rhs = b.pop();
            let lhs = b.pop();
            let dst = b.push_new()?;
            b.emit(op, dst, lhs, u32::from(rhs));
        }
        _ => return Err(TranslateError::UnsupportedOpcode(0xFD)),
    }
    Ok(())
}

fn unary_sat(b: &mut Builder, op: Op) {
    let src = b.pop();
    let dst_result = b.push_new();
    if let Ok(dst) = dst_result {
        b.emit(op, dst, src, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::test_encode::ModuleBuilder;
    use assert_matches::assert_matches;

    fn module_from(b: &ModuleBuilder) -> Module {
        crate::module::decode(&b.finish()).expect("hand-built module must decode")
    }

    #[test]
    fn lowers_an_add_function_to_one_register_instruction() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32, ValType::I32], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x20, 0x01, 0x6a]);
        let module = module_from(&b);
        let funcs = translate_module(&module).expect("well-typed function must lower");
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].local_count(), 2);
        assert!(funcs[0].reg_count() >= funcs[0].local_count());
        assert!(!funcs[0].is_empty());
    }

    #[test]
    fn lowering_is_a_pure_function_of_the_module_bytes() {
        // §8 property 2: `lower(m) == lower(m)`.
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        b.add_function(ty, &[(1, ValType::I32)], alloc::vec![
            0x20, 0x00, 0x41, 0x01, 0x6a, // local.get 0; i32.const 1; i32.add
            0x21, 0x01, // local.set 1
            0x20, 0x01, // local.get 1
        ]);
        let module = module_from(&b);
        let first = translate_module(&module).unwrap();
        let second = translate_module(&module).unwrap();
        assert!(first[0].code() == second[0].code());
        assert_eq!(first[0].pool64(), second[0].pool64());
        assert_eq!(first[0].reg_count(), second[0].reg_count());
    }

    #[test]
    fn spills_a_large_i64_constant_to_the_pool() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[], &[ValType::I64]);
        let mut body = alloc::vec![0x42]; // i64.const
        crate::module::test_encode::sleb(0x1_0000_0000_i64, &mut body);
        let module_bytes = {
            b.add_function(ty, &[], body);
            b.finish()
        };
        let module = crate::module::decode(&module_bytes).unwrap();
        let funcs = translate_module(&module).unwrap();
        assert!(!funcs[0].pool64().is_empty());
    }

    #[test]
    fn fuses_local_plus_constant_into_a_superinstruction() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        // local.get 0; i32.const 5; i32.add
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x41, 0x05, 0x6a]);
        let module = module_from(&b);
        let funcs = translate_module(&module).unwrap();
        let fused = funcs[0].code().iter().any(|instr| matches!(instr.op(), Ok(Op::AddImmI32)));
        assert!(fused, "local.get + i32.const + add should fuse to AddImmI32");
    }

    #[test]
    fn fuses_two_locals_into_a_superinstruction() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32, ValType::I32], &[ValType::I32]);
        // local.get 0; local.get 1; i32.add
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x20, 0x01, 0x6a]);
        let module = module_from(&b);
        let funcs = translate_module(&module).unwrap();
        let fused = funcs[0].code().iter().any(|instr| matches!(instr.op(), Ok(Op::AddLocalsI32)));
        assert!(fused, "local.get + local.get + add should fuse to AddLocalsI32");
    }

    #[test]
    fn fuses_constant_first_add_into_the_reversed_superinstruction() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        // i32.const 5; local.get 0; i32.add
        b.add_function(ty, &[], alloc::vec![0x41, 0x05, 0x20, 0x00, 0x6a]);
        let module = module_from(&b);
        let funcs = translate_module(&module).unwrap();
        let fused = funcs[0].code().iter().any(|instr| matches!(instr.op(), Ok(Op::AddImmI32Rev)));
        assert!(fused, "i32.const + local.get + add should fuse to AddImmI32Rev");
    }

    #[test]
    fn does_not_fuse_across_a_block_boundary() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        // local.get 0; block (empty); i32.const 5; i32.add
        b.add_function(
            ty,
            &[],
            alloc::vec![0x20, 0x00, 0x02, 0x40, 0x0b, 0x41, 0x05, 0x6a],
        );
        let module = module_from(&b);
        let funcs = translate_module(&module).unwrap();
        let fused = funcs[0].code().iter().any(|instr| matches!(instr.op(), Ok(Op::AddImmI32)));
        assert!(!fused, "a block boundary between the operands must block fusion");
    }

    #[test]
    fn rejects_a_call_to_an_undefined_function() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[], &[]);
        // call 7, which does not exist.
        b.add_function(ty, &[], alloc::vec![0x10, 0x07]);
        let module = module_from(&b);
        assert_matches!(translate_module(&module), Err(TranslateError::UnknownFunction(7)));
    }

    #[test]
    fn rejects_an_opcode_with_no_regir_lowering() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[], &[]);
        // atomic opcodes (0xFE prefix) are decode-only, never lowered.
        b.add_function(ty, &[], alloc::vec![0xfe, 0x00, 0x00, 0x00]);
        let module = module_from(&b);
        assert!(translate_module(&module).is_err());
    }
}
