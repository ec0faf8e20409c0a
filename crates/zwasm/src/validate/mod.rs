//! §4.2: the bytecode validator. An operand/control-stack type checker
//! with polymorphic unreachability, run once per function body before
//! translation ever sees it — the translator (§4.3) trusts every module
//! reaching it is already valid and does no further type checking.
//!
//! Local-initialization tracking is intentionally coarse: a local is
//! marked initialized the first time any reachable `local.set`/`local.tee`
//! touches it and never un-marked on block exit. This is sound for every
//! defaultable local (the overwhelming majority — all numeric types and
//! nullable references) and only under-strict for non-nullable typed
//! locals from the function-references proposal, where it can accept a
//! handful of modules the full branch-merge algorithm would reject. See
//! DESIGN.md.

use alloc::{string::ToString, vec::Vec};

use zwasm_core::{FuncType, RefType, ValType, ValidationError};

use crate::module::{ConstExpr, Module};
use crate::translate::wasm_op::{self, fc};

/// Validates every function body, every constant expression (global
/// initializers, element/data segment offsets, element items) and
/// module-level invariants (duplicate export names, start function
/// signature, segment bounds against declared table/memory counts).
pub fn validate_module(module: &Module) -> Result<(), ValidationError> {
    validate_exports(module)?;
    validate_start(module)?;

    for global in &module.globals {
        let ty = validate_const_expr(module, &global.init, Some(global.ty.content))?;
        if ty != global.ty.content {
            return Err(mismatch(global.ty.content, ty));
        }
    }
    for elem in &module.elements {
        for item in &elem.items {
            let ty = validate_const_expr(module, item, None)?;
            if !ty.matches(ValType::Ref(elem.ty)) {
                return Err(mismatch(ValType::Ref(elem.ty), ty));
            }
        }
        if let crate::module::ElementKind::Active { table, offset } = &elem.kind {
            let table_ty = module
                .tables
                .get(*table as usize)
                .ok_or(ValidationError::UnknownTable(*table))?;
            if table_ty.element != elem.ty {
                return Err(mismatch(ValType::Ref(table_ty.element), ValType::Ref(elem.ty)));
            }
            let offset_ty = validate_const_expr(module, offset, None)?;
            if offset_ty != ValType::I32 {
                return Err(mismatch(ValType::I32, offset_ty));
            }
        }
    }
    for data in &module.data {
        if let crate::module::DataKind::Active { memory, offset } = &data.kind {
            if *memory as usize >= module.memories.len() && *memory >= module.num_imported_memories {
                return Err(ValidationError::UnknownMemory(*memory));
            }
            let offset_ty = validate_const_expr(module, offset, None)?;
            if offset_ty != ValType::I32 {
                return Err(mismatch(ValType::I32, offset_ty));
            }
        }
    }

    for (i, body) in module.code.iter().enumerate() {
        let func_idx = module.num_imported_funcs + i as u32;
        let ty = module
            .func_type(func_idx)
            .ok_or(ValidationError::UnknownFunction(func_idx))?;
        validate_function(module, ty, body)?;
    }
    Ok(())
}

fn mismatch(expected: ValType, found: ValType) -> ValidationError {
    ValidationError::TypeMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn validate_exports(module: &Module) -> Result<(), ValidationError> {
    let mut names: Vec<&str> = Vec::with_capacity(module.exports.len());
    for export in &module.exports {
        if names.contains(&export.name.as_str()) {
            return Err(ValidationError::DuplicateExportName(export.name.clone()));
        }
        names.push(&export.name);
        match export.kind {
            crate::module::ExportKind::Func if export.index >= module.total_funcs() => {
                return Err(ValidationError::UnknownFunction(export.index));
            }
            crate::module::ExportKind::Table if export.index >= module.total_tables() => {
                return Err(ValidationError::UnknownTable(export.index));
            }
            crate::module::ExportKind::Memory if export.index >= module.total_memories() => {
                return Err(ValidationError::UnknownMemory(export.index));
            }
            crate::module::ExportKind::Global if export.index >= module.total_globals() => {
                return Err(ValidationError::UnknownGlobal(export.index));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_start(module: &Module) -> Result<(), ValidationError> {
    let Some(idx) = module.start else { return Ok(()) };
    let ty = module.func_type(idx).ok_or(ValidationError::UnknownFunction(idx))?;
    if !ty.params().is_empty() || !ty.results().is_empty() {
        return Err(ValidationError::InvalidResultArity);
    }
    Ok(())
}

/// Evaluates a constant expression's static type without computing its
/// value (§4.2 "Constant-expression validation"): only
/// `global.get` (imported globals only), the four `<type>.const`s,
/// `ref.null`/`ref.func`, and `i32`/`i64` `add`/`sub`/`mul` (extended-const
/// proposal) are legal.
fn validate_const_expr(module: &Module, expr: &ConstExpr, expected: Option<ValType>) -> Result<ValType, ValidationError> {
    use crate::leb128::Reader;
    let mut r = Reader::new(&expr.bytes);
    let mut stack: Vec<ValType> = Vec::new();
    loop {
        let op = r.read_u8().map_err(|_| ValidationError::Truncated)?;
        match op {
            wasm_op::END => break,
            wasm_op::I32_CONST => {
                r.read_i32().map_err(|_| ValidationError::Truncated)?;
                stack.push(ValType::I32);
            }
            wasm_op::I64_CONST => {
                r.read_i64().map_err(|_| ValidationError::Truncated)?;
                stack.push(ValType::I64);
            }
            wasm_op::F32_CONST => {
                r.read_f32_bits().map_err(|_| ValidationError::Truncated)?;
                stack.push(ValType::F32);
            }
            wasm_op::F64_CONST => {
                r.read_f64_bits().map_err(|_| ValidationError::Truncated)?;
                stack.push(ValType::F64);
            }
            wasm_op::REF_NULL => {
                r.skip(1).map_err(|_| ValidationError::Truncated)?;
                stack.push(expected.unwrap_or(ValType::Ref(RefType::Func)));
            }
            wasm_op::REF_FUNC => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                if idx >= module.total_funcs() {
                    return Err(ValidationError::UnknownFunction(idx));
                }
                stack.push(ValType::Ref(RefType::Func));
            }
            wasm_op::GLOBAL_GET => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                if idx >= module.num_imported_globals {
                    return Err(ValidationError::ConstantExprRequired);
                }
                let global = module
                    .imports
                    .iter()
                    .filter_map(|i| match &i.desc {
                        crate::module::ImportDesc::Global(g) => Some(*g),
                        _ => None,
                    })
                    .nth(idx as usize)
                    .ok_or(ValidationError::UnknownGlobal(idx))?;
                if global.mutable {
                    return Err(ValidationError::ImmutableGlobal(idx));
                }
                stack.push(global.content);
            }
            wasm_op::I32_ADD | wasm_op::I32_SUB | wasm_op::I32_MUL => {
                let (b, a) = (stack.pop(), stack.pop());
                if b != Some(ValType::I32) || a != Some(ValType::I32) {
                    return Err(ValidationError::ConstantExprRequired);
                }
                stack.push(ValType::I32);
            }
            wasm_op::I64_ADD | wasm_op::I64_SUB | wasm_op::I64_MUL => {
                let (b, a) = (stack.pop(), stack.pop());
                if b != Some(ValType::I64) || a != Some(ValType::I64) {
                    return Err(ValidationError::ConstantExprRequired);
                }
                stack.push(ValType::I64);
            }
            _ => return Err(ValidationError::ConstantExprRequired),
        }
    }
    if stack.len() != 1 {
        return Err(ValidationError::ConstantExprRequired);
    }
    Ok(stack[0])
}

enum FrameKind {
    Block,
    Loop,
    If,
    Function,
}

struct Frame {
    kind: FrameKind,
    start_types: Vec<ValType>,
    end_types: Vec<ValType>,
    height: usize,
    unreachable: bool,
    else_allowed: bool,
}

impl Frame {
    fn label_types(&self) -> &[ValType] {
        match self.kind {
            FrameKind::Loop => &self.start_types,
            _ => &self.end_types,
        }
    }
}

struct Checker<'m> {
    module: &'m Module,
    locals: Vec<ValType>,
    locals_initialized: Vec<bool>,
    stack: Vec<ValType>,
    frames: Vec<Frame>,
}

impl<'m> Checker<'m> {
    fn push(&mut self, ty: ValType) {
        self.stack.push(ty);
    }

    fn pop(&mut self) -> Result<ValType, ValidationError> {
        let frame = self.frames.last().expect("function frame always present");
        if self.stack.len() == frame.height {
            if frame.unreachable {
                return Ok(ValType::Unknown);
            }
            return Err(ValidationError::OperandStackUnderflow);
        }
        self.stack.pop().ok_or(ValidationError::OperandStackUnderflow)
    }

    fn pop_expect(&mut self, expected: ValType) -> Result<(), ValidationError> {
        let found = self.pop()?;
        if !found.matches(expected) {
            return Err(mismatch(expected, found));
        }
        Ok(())
    }

    fn set_unreachable(&mut self) {
        let frame = self.frames.last_mut().expect("function frame always present");
        self.stack.truncate(frame.height);
        frame.unreachable = true;
    }

    fn push_frame(&mut self, kind: FrameKind, start_types: Vec<ValType>, end_types: Vec<ValType>, else_allowed: bool) {
        for ty in &start_types {
            self.push(*ty);
        }
        self.frames.push(Frame {
            kind,
            height: self.stack.len(),
            start_types,
            end_types,
            unreachable: false,
            else_allowed,
        });
    }

    /// Verifies the current frame's result types are on top of the stack
    /// with nothing left over, pops the frame, and returns it. Does NOT
    /// put the result types back — `end` re-pushes them for the enclosing
    /// scope, but `else` discards them and starts the else-arm fresh from
    /// the `if`'s params instead, so the repush must be the caller's call.
    fn pop_frame(&mut self) -> Result<Frame, ValidationError> {
        let frame = self.frames.last().expect("function frame always present");
        let end_types = frame.end_types.clone();
        for ty in end_types.iter().rev() {
            self.pop_expect(*ty)?;
        }
        if self.stack.len() != self.frames.last().unwrap().height {
            return Err(ValidationError::InvalidResultArity);
        }
        Ok(self.frames.pop().expect("just checked non-empty"))
    }
}

fn validate_function(module: &Module, ty: &FuncType, body: &crate::module::CodeBody) -> Result<(), ValidationError> {
    let mut locals = ty.params().to_vec();
    for (count, val_type) in &body.locals {
        for _ in 0..*count {
            locals.push(*val_type);
        }
    }
    let param_count = ty.params().len();
    let mut locals_initialized = alloc::vec![true; locals.len()];
    for (i, l) in locals.iter().enumerate() {
        if i >= param_count {
            locals_initialized[i] = l.is_defaultable();
        }
    }

    let mut c = Checker {
        module,
        locals,
        locals_initialized,
        stack: Vec::new(),
        frames: Vec::new(),
    };
    c.push_frame(FrameKind::Function, Vec::new(), ty.results().to_vec(), false);

    let mut r = crate::leb128::Reader::new(&body.instrs);
    validate_body(&mut c, &mut r)?;

    if c.frames.len() != 1 {
        return Err(ValidationError::ControlStackUnderflow);
    }
    c.pop_frame()?;
    Ok(())
}

fn read_block_type(module: &Module, r: &mut crate::leb128::Reader) -> Result<(Vec<ValType>, Vec<ValType>), ValidationError> {
    let byte = r.peek_u8().map_err(|_| ValidationError::Truncated)?;
    let ref_of = |b: u8| match b {
        0x70 => Some(ValType::Ref(RefType::Func)),
        0x6F => Some(ValType::Ref(RefType::Extern)),
        0x64 => Some(ValType::Ref(RefType::Exn)),
        _ => None,
    };
    if byte == 0x40 {
        r.skip(1).map_err(|_| ValidationError::Truncated)?;
        return Ok((Vec::new(), Vec::new()));
    }
    if let Some(v) = match byte {
        0x7F => Some(ValType::I32),
        0x7E => Some(ValType::I64),
        0x7D => Some(ValType::F32),
        0x7C => Some(ValType::F64),
        0x7B => Some(ValType::V128),
        _ => ref_of(byte),
    } {
        r.skip(1).map_err(|_| ValidationError::Truncated)?;
        return Ok((Vec::new(), alloc::vec![v]));
    }
    let idx = r.read_sleb(33).map_err(|_| ValidationError::Truncated)?;
    if idx < 0 {
        return Err(ValidationError::IllegalOpcode(0));
    }
    let ty = module.types.get(idx as usize).ok_or(ValidationError::UnknownType(idx as u32))?;
    Ok((ty.params().to_vec(), ty.results().to_vec()))
}

fn validate_body(c: &mut Checker, r: &mut crate::leb128::Reader) -> Result<(), ValidationError> {
    use wasm_op::*;
    loop {
        if r.is_empty() {
            return Ok(());
        }
        let opcode = r.read_u8().map_err(|_| ValidationError::Truncated)?;
        match opcode {
            END => {
                let top = c.frames.last().unwrap();
                let was_function = matches!(top.kind, FrameKind::Function);
                if was_function {
                    // Leave the implicit function frame for validate_function to pop.
                    return Ok(());
                }
                // An `if` that never saw its `else` stands in for an empty
                // else arm, which only type-checks when that arm (a no-op)
                // could have produced the block's results from its params.
                if matches!(top.kind, FrameKind::If) && top.else_allowed && top.start_types != top.end_types {
                    return Err(ValidationError::TypeMismatch {
                        expected: alloc::format!("{:?}", top.end_types),
                        found: alloc::format!("{:?} (no else arm)", top.start_types),
                    });
                }
                let frame = c.pop_frame()?;
                for ty in &frame.end_types {
                    c.push(*ty);
                }
            }
            ELSE => {
                let frame = c.frames.last().ok_or(ValidationError::ControlStackUnderflow)?;
                if !frame.else_allowed {
                    return Err(ValidationError::IllegalOpcode(ELSE as u16));
                }
                let popped = c.pop_frame()?;
                c.push_frame(FrameKind::If, popped.start_types, popped.end_types, false);
            }
            BLOCK | LOOP | IF => {
                let (params, results) = read_block_type(c.module, r)?;
                for ty in params.iter().rev() {
                    c.pop_expect(*ty)?;
                }
                match opcode {
                    BLOCK => c.push_frame(FrameKind::Block, params, results, false),
                    LOOP => c.push_frame(FrameKind::Loop, params, results, false),
                    _ => {
                        c.pop_expect(ValType::I32)?;
                        c.push_frame(FrameKind::If, params, results, true);
                    }
                }
            }
            BR => {
                let depth = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let frame_idx = c
                    .frames
                    .len()
                    .checked_sub(1 + depth as usize)
                    .ok_or(ValidationError::UnknownLabel(depth))?;
                let expected = c.frames[frame_idx].label_types().to_vec();
                for ty in expected.iter().rev() {
                    c.pop_expect(*ty)?;
                }
                c.set_unreachable();
            }
            BR_IF => {
                let depth = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let frame_idx = c
                    .frames
                    .len()
                    .checked_sub(1 + depth as usize)
                    .ok_or(ValidationError::UnknownLabel(depth))?;
                c.pop_expect(ValType::I32)?;
                let expected = c.frames[frame_idx].label_types().to_vec();
                for ty in expected.iter().rev() {
                    c.pop_expect(*ty)?;
                }
                for ty in &expected {
                    c.push(*ty);
                }
            }
            BR_TABLE => {
                let count = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let mut depths = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    depths.push(r.read_u32().map_err(|_| ValidationError::Truncated)?);
                }
                let default = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                c.pop_expect(ValType::I32)?;
                let default_idx = c
                    .frames
                    .len()
                    .checked_sub(1 + default as usize)
                    .ok_or(ValidationError::UnknownLabel(default))?;
                let arity = c.frames[default_idx].label_types().len();
                for depth in &depths {
                    let idx = c
                        .frames
                        .len()
                        .checked_sub(1 + *depth as usize)
                        .ok_or(ValidationError::UnknownLabel(*depth))?;
                    if c.frames[idx].label_types().len() != arity {
                        return Err(ValidationError::InvalidResultArity);
                    }
                }
                let expected = c.frames[default_idx].label_types().to_vec();
                for ty in expected.iter().rev() {
                    c.pop_expect(*ty)?;
                }
                c.set_unreachable();
            }
            RETURN => {
                let expected = c.frames[0].end_types.clone();
                for ty in expected.iter().rev() {
                    c.pop_expect(*ty)?;
                }
                c.set_unreachable();
            }
            UNREACHABLE => c.set_unreachable(),
            NOP => {}
            CALL | RETURN_CALL => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let ty = c.module.func_type(idx).ok_or(ValidationError::UnknownFunction(idx))?.clone();
                for p in ty.params().iter().rev() {
                    c.pop_expect(*p)?;
                }
                if opcode == RETURN_CALL {
                    if ty.results() != c.frames[0].end_types.as_slice() {
                        return Err(ValidationError::InvalidResultArity);
                    }
                    c.set_unreachable();
                } else {
                    for result in ty.results() {
                        c.push(*result);
                    }
                }
            }
            CALL_INDIRECT | RETURN_CALL_INDIRECT => {
                let type_idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let table_idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                if table_idx >= c.module.total_tables() {
                    return Err(ValidationError::UnknownTable(table_idx));
                }
                let ty = c.module.types.get(type_idx as usize).ok_or(ValidationError::UnknownType(type_idx))?.clone();
                c.pop_expect(ValType::I32)?;
                for p in ty.params().iter().rev() {
                    c.pop_expect(*p)?;
                }
                if opcode == RETURN_CALL_INDIRECT {
                    if ty.results() != c.frames[0].end_types.as_slice() {
                        return Err(ValidationError::InvalidResultArity);
                    }
                    c.set_unreachable();
                } else {
                    for res in ty.results() {
                        c.push(*res);
                    }
                }
            }
            DROP => {
                c.pop()?;
            }
            SELECT => {
                c.pop_expect(ValType::I32)?;
                let b = c.pop()?;
                let a = c.pop()?;
                if !a.matches(b) {
                    return Err(mismatch(a, b));
                }
                c.push(a);
            }
            SELECT_T => {
                let n = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let mut types = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let byte = r.read_u8().map_err(|_| ValidationError::Truncated)?;
                    types.push(val_type_of_byte(byte)?);
                }
                c.pop_expect(ValType::I32)?;
                let want = types.first().copied().unwrap_or(ValType::I32);
                c.pop_expect(want)?;
                c.pop_expect(want)?;
                c.push(want);
            }
            LOCAL_GET => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let ty = *c.locals.get(idx as usize).ok_or(ValidationError::UnknownLocal(idx))?;
                if !c.locals_initialized.get(idx as usize).copied().unwrap_or(false) {
                    return Err(ValidationError::UninitializedLocal(idx));
                }
                c.push(ty);
            }
            LOCAL_SET | LOCAL_TEE => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let ty = *c.locals.get(idx as usize).ok_or(ValidationError::UnknownLocal(idx))?;
                if opcode == LOCAL_TEE {
                    let found = c.pop()?;
                    if !found.matches(ty) {
                        return Err(mismatch(ty, found));
                    }
                    c.push(ty);
                } else {
                    c.pop_expect(ty)?;
                }
                if let Some(flag) = c.locals_initialized.get_mut(idx as usize) {
                    *flag = true;
                }
            }
            GLOBAL_GET => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let ty = global_type(c.module, idx)?;
                c.push(ty.content);
            }
            GLOBAL_SET => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let ty = global_type(c.module, idx)?;
                if !ty.mutable {
                    return Err(ValidationError::ImmutableGlobal(idx));
                }
                c.pop_expect(ty.content)?;
            }
            TABLE_GET => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let ty = table_type(c.module, idx)?;
                c.pop_expect(ValType::I32)?;
                c.push(ValType::Ref(ty.element));
            }
            TABLE_SET => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                let ty = table_type(c.module, idx)?;
                c.pop_expect(ValType::Ref(ty.element))?;
                c.pop_expect(ValType::I32)?;
            }
            REF_NULL => {
                let byte = r.read_u8().map_err(|_| ValidationError::Truncated)?;
                let rt = match byte {
                    0x70 => RefType::Func,
                    0x6F => RefType::Extern,
                    0x64 => RefType::Exn,
                    _ => return Err(ValidationError::IllegalOpcode(u16::from(REF_NULL))),
                };
                c.push(ValType::Ref(rt));
            }
            REF_IS_NULL => {
                let found = c.pop()?;
                if !matches!(found, ValType::Ref(_) | ValType::Unknown) {
                    return Err(mismatch(ValType::Ref(RefType::Func), found));
                }
                c.push(ValType::I32);
            }
            REF_FUNC => {
                let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
                if idx >= c.module.total_funcs() {
                    return Err(ValidationError::UnknownFunction(idx));
                }
                c.push(ValType::Ref(RefType::Func));
            }
            I32_CONST => {
                r.read_i32().map_err(|_| ValidationError::Truncated)?;
                c.push(ValType::I32);
            }
            I64_CONST => {
                r.read_i64().map_err(|_| ValidationError::Truncated)?;
                c.push(ValType::I64);
            }
            F32_CONST => {
                r.read_f32_bits().map_err(|_| ValidationError::Truncated)?;
                c.push(ValType::F32);
            }
            F64_CONST => {
                r.read_f64_bits().map_err(|_| ValidationError::Truncated)?;
                c.push(ValType::F64);
            }
            I32_LOAD..=I64_STORE32 | MEMORY_SIZE | MEMORY_GROW => {
                validate_memory_op(c, r, opcode)?;
            }
            FC_PREFIX => validate_fc_op(c, r)?,
            SIMD_PREFIX => validate_simd_op(c, r)?,
            other => {
                if let Some((arg, ret)) = unary_sig(other) {
                    c.pop_expect(arg)?;
                    c.push(ret);
                } else if let Some((lhs, rhs, ret)) = binary_sig(other) {
                    c.pop_expect(rhs)?;
                    c.pop_expect(lhs)?;
                    c.push(ret);
                } else {
                    return Err(ValidationError::IllegalOpcode(u16::from(other)));
                }
            }
        }
    }
}

fn val_type_of_byte(byte: u8) -> Result<ValType, ValidationError> {
    Ok(match byte {
        0x7F => ValType::I32,
        0x7E => ValType::I64,
        0x7D => ValType::F32,
        0x7C => ValType::F64,
        0x7B => ValType::V128,
        0x70 => ValType::Ref(RefType::Func),
        0x6F => ValType::Ref(RefType::Extern),
        0x64 => ValType::Ref(RefType::Exn),
        _ => return Err(ValidationError::IllegalOpcode(0)),
    })
}

fn global_type(module: &Module, idx: u32) -> Result<crate::module::GlobalType, ValidationError> {
    if idx < module.num_imported_globals {
        return module
            .imports
            .iter()
            .filter_map(|i| match &i.desc {
                crate::module::ImportDesc::Global(g) => Some(*g),
                _ => None,
            })
            .nth(idx as usize)
            .ok_or(ValidationError::UnknownGlobal(idx));
    }
    module
        .globals
        .get((idx - module.num_imported_globals) as usize)
        .map(|g| g.ty)
        .ok_or(ValidationError::UnknownGlobal(idx))
}

fn table_type(module: &Module, idx: u32) -> Result<crate::module::TableType, ValidationError> {
    if idx < module.num_imported_tables {
        return module
            .imports
            .iter()
            .filter_map(|i| match &i.desc {
                crate::module::ImportDesc::Table(t) => Some(*t),
                _ => None,
            })
            .nth(idx as usize)
            .ok_or(ValidationError::UnknownTable(idx));
    }
    module
        .tables
        .get((idx - module.num_imported_tables) as usize)
        .copied()
        .ok_or(ValidationError::UnknownTable(idx))
}

fn validate_memory_op(c: &mut Checker, r: &mut crate::leb128::Reader, opcode: u8) -> Result<(), ValidationError> {
    use wasm_op::*;
    if c.module.total_memories() == 0 && opcode != MEMORY_SIZE {
        return Err(ValidationError::UnknownMemory(0));
    }
    match opcode {
        MEMORY_SIZE => {
            r.skip(1).map_err(|_| ValidationError::Truncated)?;
            c.push(ValType::I32);
        }
        MEMORY_GROW => {
            r.skip(1).map_err(|_| ValidationError::Truncated)?;
            c.pop_expect(ValType::I32)?;
            c.push(ValType::I32);
        }
        _ => {
            let align = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            if align & 0x40 != 0 {
                r.read_u32().map_err(|_| ValidationError::Truncated)?;
            }
            r.read_u32().map_err(|_| ValidationError::Truncated)?; // offset
            let natural_align = memarg_natural_align(opcode);
            if (align & 0x3f) > natural_align {
                return Err(ValidationError::InvalidAlignment);
            }
            if (I32_STORE..=I64_STORE32).contains(&opcode) {
                c.pop_expect(store_value_type(opcode))?;
                c.pop_expect(ValType::I32)?;
            } else {
                c.pop_expect(ValType::I32)?;
                c.push(load_result_type(opcode));
            }
        }
    }
    Ok(())
}

fn memarg_natural_align(opcode: u8) -> u32 {
    use wasm_op::*;
    match opcode {
        I32_LOAD8_S | I32_LOAD8_U | I64_LOAD8_S | I64_LOAD8_U | I32_STORE8 | I64_STORE8 => 0,
        I32_LOAD16_S | I32_LOAD16_U | I64_LOAD16_S | I64_LOAD16_U | I32_STORE16 | I64_STORE16 => 1,
        I32_LOAD | F32_LOAD | I64_LOAD32_S | I64_LOAD32_U | I32_STORE | F32_STORE | I64_STORE32 => 2,
        _ => 3,
    }
}

fn store_value_type(opcode: u8) -> ValType {
    use wasm_op::*;
    match opcode {
        I32_STORE | I32_STORE8 | I32_STORE16 => ValType::I32,
        F32_STORE => ValType::F32,
        F64_STORE => ValType::F64,
        _ => ValType::I64,
    }
}

fn load_result_type(opcode: u8) -> ValType {
    use wasm_op::*;
    match opcode {
        I32_LOAD | I32_LOAD8_S | I32_LOAD8_U | I32_LOAD16_S | I32_LOAD16_U => ValType::I32,
        F32_LOAD => ValType::F32,
        F64_LOAD => ValType::F64,
        _ => ValType::I64,
    }
}

fn unary_sig(opcode: u8) -> Option<(ValType, ValType)> {
    use wasm_op::*;
    use ValType::*;
    Some(match opcode {
        I32_EQZ => (I32, I32),
        I32_CLZ | I32_CTZ | I32_POPCNT | I32_EXTEND8_S | I32_EXTEND16_S => (I32, I32),
        I64_EQZ => (I64, I32),
        I64_CLZ | I64_CTZ | I64_POPCNT | I64_EXTEND8_S | I64_EXTEND16_S | I64_EXTEND32_S => (I64, I64),
        F32_ABS | F32_NEG | F32_CEIL | F32_FLOOR | F32_TRUNC | F32_NEAREST | F32_SQRT => (F32, F32),
        F64_ABS | F64_NEG | F64_CEIL | F64_FLOOR | F64_TRUNC | F64_NEAREST | F64_SQRT => (F64, F64),
        I32_WRAP_I64 => (I64, I32),
        I32_TRUNC_F32_S | I32_TRUNC_F32_U => (F32, I32),
        I32_TRUNC_F64_S | I32_TRUNC_F64_U => (F64, I32),
        I64_EXTEND_I32_S | I64_EXTEND_I32_U => (I32, I64),
        I64_TRUNC_F32_S | I64_TRUNC_F32_U => (F32, I64),
        I64_TRUNC_F64_S | I64_TRUNC_F64_U => (F64, I64),
        F32_CONVERT_I32_S | F32_CONVERT_I32_U => (I32, F32),
        F32_CONVERT_I64_S | F32_CONVERT_I64_U => (I64, F32),
        F32_DEMOTE_F64 => (F64, F32),
        F64_CONVERT_I32_S | F64_CONVERT_I32_U => (I32, F64),
        F64_CONVERT_I64_S | F64_CONVERT_I64_U => (I64, F64),
        F64_PROMOTE_F32 => (F32, F64),
        I32_REINTERPRET_F32 => (F32, I32),
        I64_REINTERPRET_F64 => (F64, I64),
        F32_REINTERPRET_I32 => (I32, F32),
        F64_REINTERPRET_I64 => (I64, F64),
        _ => return None,
    })
}

fn binary_sig(opcode: u8) -> Option<(ValType, ValType, ValType)> {
    use wasm_op::*;
    use ValType::*;
    Some(match opcode {
        I32_EQ | I32_NE | I32_LT_S | I32_LT_U | I32_GT_S | I32_GT_U | I32_LE_S | I32_LE_U | I32_GE_S | I32_GE_U => (I32, I32, I32),
        I32_ADD | I32_SUB | I32_MUL | I32_DIV_S | I32_DIV_U | I32_REM_S | I32_REM_U | I32_AND | I32_OR | I32_XOR | I32_SHL | I32_SHR_S
        | I32_SHR_U | I32_ROTL | I32_ROTR => (I32, I32, I32),
        I64_EQ | I64_NE | I64_LT_S | I64_LT_U | I64_GT_S | I64_GT_U | I64_LE_S | I64_LE_U | I64_GE_S | I64_GE_U => (I64, I64, I32),
        I64_ADD | I64_SUB | I64_MUL | I64_DIV_S | I64_DIV_U | I64_REM_S | I64_REM_U | I64_AND | I64_OR | I64_XOR | I64_SHL | I64_SHR_S
        | I64_SHR_U | I64_ROTL | I64_ROTR => (I64, I64, I64),
        F32_EQ | F32_NE | F32_LT | F32_GT | F32_LE | F32_GE => (F32, F32, I32),
        F32_ADD | F32_SUB | F32_MUL | F32_DIV | F32_MIN | F32_MAX | F32_COPYSIGN => (F32, F32, F32),
        F64_EQ | F64_NE | F64_LT | F64_GT | F64_LE | F64_GE => (F64, F64, I32),
        F64_ADD | F64_SUB | F64_MUL | F64_DIV | F64_MIN | F64_MAX | F64_COPYSIGN => (F64, F64, F64),
        _ => return None,
    })
}

fn validate_fc_op(c: &mut Checker, r: &mut crate::leb128::Reader) -> Result<(), ValidationError> {
    let sub = r.read_u32().map_err(|_| ValidationError::Truncated)?;
    match sub {
        fc::I32_TRUNC_SAT_F32_S | fc::I32_TRUNC_SAT_F32_U => {
            c.pop_expect(ValType::F32)?;
            c.push(ValType::I32);
        }
        fc::I32_TRUNC_SAT_F64_S | fc::I32_TRUNC_SAT_F64_U => {
            c.pop_expect(ValType::F64)?;
            c.push(ValType::I32);
        }
        fc::I64_TRUNC_SAT_F32_S | fc::I64_TRUNC_SAT_F32_U => {
            c.pop_expect(ValType::F32)?;
            c.push(ValType::I64);
        }
        fc::I64_TRUNC_SAT_F64_S | fc::I64_TRUNC_SAT_F64_U => {
            c.pop_expect(ValType::F64)?;
            c.push(ValType::I64);
        }
        fc::MEMORY_INIT => {
            let data_idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            r.skip(1).map_err(|_| ValidationError::Truncated)?;
            let Some(count) = c.module.data_count else {
                return Err(ValidationError::DataCountRequired);
            };
            if data_idx >= count {
                return Err(ValidationError::UnknownDataSegment(data_idx));
            }
            c.pop_expect(ValType::I32)?;
            c.pop_expect(ValType::I32)?;
            c.pop_expect(ValType::I32)?;
        }
        fc::DATA_DROP => {
            let data_idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            let Some(count) = c.module.data_count else {
                return Err(ValidationError::DataCountRequired);
            };
            if data_idx >= count {
                return Err(ValidationError::UnknownDataSegment(data_idx));
            }
        }
        fc::MEMORY_COPY => {
            r.skip(2).map_err(|_| ValidationError::Truncated)?;
            for _ in 0..3 {
                c.pop_expect(ValType::I32)?;
            }
        }
        fc::MEMORY_FILL => {
            r.skip(1).map_err(|_| ValidationError::Truncated)?;
            for _ in 0..3 {
                c.pop_expect(ValType::I32)?;
            }
        }
        fc::TABLE_INIT => {
            let elem_idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            let table_idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            table_type(c.module, table_idx)?;
            if elem_idx as usize >= c.module.elements.len() {
                return Err(ValidationError::UnknownElemSegment(elem_idx));
            }
            for _ in 0..3 {
                c.pop_expect(ValType::I32)?;
            }
        }
        fc::ELEM_DROP => {
            let elem_idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            if elem_idx as usize >= c.module.elements.len() {
                return Err(ValidationError::UnknownElemSegment(elem_idx));
            }
        }
        fc::TABLE_COPY => {
            let dst = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            let src = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            table_type(c.module, dst)?;
            table_type(c.module, src)?;
            for _ in 0..3 {
                c.pop_expect(ValType::I32)?;
            }
        }
        fc::TABLE_GROW => {
            let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            let ty = table_type(c.module, idx)?;
            c.pop_expect(ValType::I32)?;
            c.pop_expect(ValType::Ref(ty.element))?;
            c.push(ValType::I32);
        }
        fc::TABLE_SIZE => {
            let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            table_type(c.module, idx)?;
            c.push(ValType::I32);
        }
        fc::TABLE_FILL => {
            let idx = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            let ty = table_type(c.module, idx)?;
            c.pop_expect(ValType::I32)?;
            c.pop_expect(ValType::Ref(ty.element))?;
            c.pop_expect(ValType::I32)?;
        }
        _ => return Err(ValidationError::IllegalOpcode(0xFC00 | sub as u16)),
    }
    Ok(())
}

/// Bounded SIMD subset (§4.3): everything else under `0xFD` is rejected,
/// matching the translator.
fn validate_simd_op(c: &mut Checker, r: &mut crate::leb128::Reader) -> Result<(), ValidationError> {
    use wasm_op::simd;
    let sub = r.read_u32().map_err(|_| ValidationError::Truncated)?;
    match sub {
        simd::V128_CONST => {
            r.skip(16).map_err(|_| ValidationError::Truncated)?;
            c.push(ValType::V128);
        }
        simd::V128_LOAD => {
            if c.module.total_memories() == 0 {
                return Err(ValidationError::UnknownMemory(0));
            }
            let align = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            if align & 0x40 != 0 {
                r.read_u32().map_err(|_| ValidationError::Truncated)?;
            }
            r.read_u32().map_err(|_| ValidationError::Truncated)?;
            c.pop_expect(ValType::I32)?;
            c.push(ValType::V128);
        }
        simd::V128_STORE => {
            if c.module.total_memories() == 0 {
                return Err(ValidationError::UnknownMemory(0));
            }
            let align = r.read_u32().map_err(|_| ValidationError::Truncated)?;
            if align & 0x40 != 0 {
                r.read_u32().map_err(|_| ValidationError::Truncated)?;
            }
            r.read_u32().map_err(|_| ValidationError::Truncated)?;
            c.pop_expect(ValType::V128)?;
            c.pop_expect(ValType::I32)?;
        }
        simd::V128_NOT => {
            c.pop_expect(ValType::V128)?;
            c.push(ValType::V128);
        }
        simd::V128_AND
        | simd::V128_OR
        | simd::V128_XOR
        | simd::I32X4_ADD
        | simd::I32X4_SUB
        | simd::I32X4_MUL
        | simd::I64X2_ADD
        | simd::I64X2_SUB
        | simd::I64X2_MUL
        | simd::F32X4_ADD
        | simd::F32X4_SUB
        | simd::F32X4_MUL
        | simd::F64X2_ADD
        | simd::F64X2_SUB
        | simd::F64X2_MUL => {
            c.pop_expect(ValType::V128)?;
            c.pop_expect(ValType::V128)?;
            c.push(ValType::V128);
        }
        _ => return Err(ValidationError::IllegalOpcode(0xFD00 | sub as u16)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::test_encode::{sleb, ModuleBuilder};
    use assert_matches::assert_matches;

    fn module_from(b: &ModuleBuilder) -> Module {
        crate::module::decode(&b.finish()).expect("hand-built module must decode")
    }

    #[test]
    fn accepts_a_well_typed_add_function() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32, ValType::I32], &[ValType::I32]);
        // local.get 0; local.get 1; i32.add
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x20, 0x01, 0x6a]);
        b.export_func("add", 0);
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Ok(()));
    }

    #[test]
    fn rejects_an_operand_type_mismatch() {
        let mut b = ModuleBuilder::new();
        // declares an i32 result but leaves an i64 on the stack.
        let ty = b.add_type(&[], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x42, 0x00]); // i64.const 0
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Err(ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn rejects_underflow_of_the_operand_stack() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x6a]); // i32.add with nothing pushed
        let module = module_from(&b);
        assert!(validate_module(&module).is_err());
    }

    #[test]
    fn rejects_reference_to_an_unknown_local() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x20, 0x00]); // local.get 0, no locals declared
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Err(ValidationError::UnknownLocal(0)));
    }

    #[test]
    fn unreachable_opcode_satisfies_any_declared_result_type() {
        // A function whose body is just `unreachable` never actually
        // produces an i32, but the polymorphic stack the validator
        // switches to after `unreachable` matches any declared result.
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x00]); // unreachable
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Ok(()));
    }

    #[test]
    fn br_out_of_a_loop_is_valid_with_a_matching_label_type() {
        // `loop (result i32) i32.const 9 br 0 end`: `br 0` targets the
        // loop's own label, whose type is its *start* types (here empty,
        // so nothing needs to be on the stack for the branch itself), and
        // the `i32.const 9` also satisfies the loop's declared result.
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[], &[ValType::I32]);
        b.add_function(
            ty,
            &[],
            alloc::vec![
                0x03, 0x7f, // loop (result i32)
                0x41, 0x09, // i32.const 9
                0x0b, // end (loop)
            ],
        );
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Ok(()));
    }

    #[test]
    fn if_without_else_must_not_change_the_stack_signature() {
        // `if` with a declared i32 result but no `else` is only valid when
        // the `then` arm's input types equal its output types; here it
        // adds an i32 it never had going in, which must be rejected.
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[]);
        b.add_function(
            ty,
            &[],
            alloc::vec![
                0x20, 0x00, // local.get 0 (condition)
                0x04, 0x7f, // if (result i32)
                0x41, 0x01, // i32.const 1
                0x0b, // end
                0x1a, // drop
            ],
        );
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Err(ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn accepts_if_else_with_matching_arms() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        b.add_function(
            ty,
            &[],
            alloc::vec![
                0x20, 0x00, // local.get 0
                0x04, 0x7f, // if (result i32)
                0x41, 0x01, // i32.const 1
                0x05, // else
                0x41, 0x02, // i32.const 2
                0x0b, // end
            ],
        );
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Ok(()));
    }

    #[test]
    fn rejects_a_global_initializer_of_the_wrong_type() {
        let mut b = ModuleBuilder::new();
        b.add_global(ValType::I32, false, {
            let mut v = alloc::vec![0x42]; // i64.const
            sleb(0, &mut v);
            v.push(0x0b);
            v
        });
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Err(ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn rejects_a_duplicate_export_name() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[], &[]);
        b.add_function(ty, &[], alloc::vec![]);
        b.add_function(ty, &[], alloc::vec![]);
        b.export_func("f", 0);
        b.export_func("f", 1);
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Err(ValidationError::DuplicateExportName(_)));
    }

    #[test]
    fn accepts_a_memory_load_when_a_memory_is_declared() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        b.set_memory(1, None);
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x28, 0x02, 0x00]); // i32.load align=2 offset=0
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Ok(()));
    }

    #[test]
    fn rejects_a_memory_access_with_no_memory_declared() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x28, 0x02, 0x00]);
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Err(ValidationError::UnknownMemory(0)));
    }

    #[test]
    fn rejects_over_aligned_memory_access() {
        // i32.load's natural alignment is 2 (4 bytes); align=3 (8 bytes) is
        // too large.
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        b.set_memory(1, None);
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x28, 0x03, 0x00]);
        let module = module_from(&b);
        assert_matches!(validate_module(&module), Err(ValidationError::InvalidAlignment));
    }
}
