//! The Wasm binary section decoder (§4.1).
//!
//! Checks the magic/version, walks sections (rejecting duplicates of
//! non-custom sections), and records each function body's raw bytes
//! without parsing them — validation (§4.2) and lowering (§4.3) each walk
//! the body once, separately.

use super::types::*;
use crate::leb128::Reader;
use alloc::{string::ToString, vec::Vec};
use zwasm_core::{DecodeError, RefType, ValType};

const MAGIC: [u8; 4] = *b"\0asm";
const VERSION: [u8; 4] = [1, 0, 0, 0];

mod section_id {
    pub const CUSTOM: u8 = 0;
    pub const TYPE: u8 = 1;
    pub const IMPORT: u8 = 2;
    pub const FUNCTION: u8 = 3;
    pub const TABLE: u8 = 4;
    pub const MEMORY: u8 = 5;
    pub const GLOBAL: u8 = 6;
    pub const EXPORT: u8 = 7;
    pub const START: u8 = 8;
    pub const ELEMENT: u8 = 9;
    pub const CODE: u8 = 10;
    pub const DATA: u8 = 11;
    pub const DATA_COUNT: u8 = 12;
}

/// Decodes a complete Wasm binary into a [`Module`].
///
/// # Errors
///
/// Returns [`DecodeError`] for any structural problem: bad magic/version,
/// truncated input, malformed LEB128, duplicate non-custom sections, or a
/// function/code length mismatch. Does not type-check function bodies;
/// see `crate::validate`.
pub fn decode(bytes: &[u8]) -> Result<Module, DecodeError> {
    let mut r = Reader::new(bytes);
    let magic = r.read_bytes(4)?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = r.read_bytes(4)?;
    if version != VERSION {
        return Err(DecodeError::BadVersion);
    }

    let mut module = Module::default();
    let mut seen_sections: Vec<u8> = Vec::new();
    let mut code_bodies: Vec<CodeBody> = Vec::new();

    while !r.is_empty() {
        let id = r.read_u8()?;
        let size = r.read_u32()? as usize;
        let section_bytes = r.read_bytes(size)?;
        let mut sr = Reader::new(section_bytes);

        if id != section_id::CUSTOM {
            if seen_sections.contains(&id) {
                return Err(DecodeError::DuplicateSection(id));
            }
            seen_sections.push(id);
        }

        match id {
            section_id::CUSTOM => { /* preserved by name in a full implementation; ignored semantically */ }
            section_id::TYPE => decode_type_section(&mut sr, &mut module)?,
            section_id::IMPORT => decode_import_section(&mut sr, &mut module)?,
            section_id::FUNCTION => decode_function_section(&mut sr, &mut module)?,
            section_id::TABLE => decode_table_section(&mut sr, &mut module)?,
            section_id::MEMORY => decode_memory_section(&mut sr, &mut module)?,
            section_id::GLOBAL => decode_global_section(&mut sr, &mut module)?,
            section_id::EXPORT => decode_export_section(&mut sr, &mut module)?,
            section_id::START => module.start = Some(sr.read_u32()?),
            section_id::ELEMENT => decode_element_section(&mut sr, &mut module)?,
            section_id::CODE => decode_code_section(&mut sr, &mut code_bodies)?,
            section_id::DATA => decode_data_section(&mut sr, &mut module)?,
            section_id::DATA_COUNT => module.data_count = Some(sr.read_u32()?),
            other => return Err(DecodeError::InvalidSectionId(other)),
        }
    }

    if module.funcs.len() != code_bodies.len() {
        return Err(DecodeError::LengthMismatch {
            expected: module.funcs.len() as u32,
            actual: code_bodies.len() as u32,
        });
    }
    module.code = code_bodies;

    Ok(module)
}

fn decode_val_type(r: &mut Reader<'_>) -> Result<ValType, DecodeError> {
    match r.read_u8()? {
        0x7f => Ok(ValType::I32),
        0x7e => Ok(ValType::I64),
        0x7d => Ok(ValType::F32),
        0x7c => Ok(ValType::F64),
        0x7b => Ok(ValType::V128),
        0x70 => Ok(ValType::Ref(RefType::Func)),
        0x6f => Ok(ValType::Ref(RefType::Extern)),
        0x69 => Ok(ValType::Ref(RefType::Exn)),
        other => Err(DecodeError::InvalidForm(other)),
    }
}

fn decode_limits(r: &mut Reader<'_>, is_memory: bool) -> Result<(Limits, bool), DecodeError> {
    let flags = r.read_u8()?;
    let has_max = flags & 0x01 != 0;
    let is_64 = is_memory && (flags & 0x04 != 0);
    let read_len = |r: &mut Reader<'_>| -> Result<u64, DecodeError> {
        if is_64 {
            r.read_u64()
        } else {
            Ok(u64::from(r.read_u32()?))
        }
    };
    let min = read_len(r)?;
    let max = if has_max { Some(read_len(r)?) } else { None };
    Ok((Limits { min, max }, is_64))
}

fn decode_table_type(r: &mut Reader<'_>) -> Result<TableType, DecodeError> {
    let element = match decode_val_type(r)? {
        ValType::Ref(rt) => rt,
        _ => return Err(DecodeError::InvalidForm(0)),
    };
    let (limits, _) = decode_limits(r, false)?;
    Ok(TableType { element, limits })
}

fn decode_memory_type(r: &mut Reader<'_>) -> Result<MemoryType, DecodeError> {
    let (limits, is_64) = decode_limits(r, true)?;
    Ok(MemoryType {
        limits,
        is_64,
        page_size: 65536,
    })
}

fn decode_global_type(r: &mut Reader<'_>) -> Result<GlobalType, DecodeError> {
    let content = decode_val_type(r)?;
    let mutable = r.read_u8()? == 0x01;
    Ok(GlobalType { content, mutable })
}

/// Scans a constant expression up to (and including) its `end` (0x0b)
/// opcode and retains the verbatim byte range for deferred evaluation at
/// instantiation time (§3 Global "initializer expression byte-slice",
/// §4.2 "Constant-expression validation"). The opcode stream itself is
/// interpreted later, by `crate::validate` and `crate::instance`.
fn decode_const_expr(r: &mut Reader<'_>) -> Result<ConstExpr, DecodeError> {
    let start = r.position();
    let mut depth: u32 = 0;
    loop {
        let op = r.read_u8()?;
        match op {
            0x02 | 0x03 | 0x04 => depth += 1, // block/loop/if nest
            0x0b => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            0x41 => { r.read_i32()?; }
            0x42 => { r.read_i64()?; }
            0x43 => { r.read_f32_bits()?; }
            0x44 => { r.read_f64_bits()?; }
            0xd0 => { r.read_u8()?; } // ref.null: heaptype byte
            0xd2 => { r.read_u32()?; } // ref.func
            0x23 => { r.read_u32()?; } // global.get
            0x6a | 0x6b | 0x6c | 0x7c | 0x7d | 0x7e => { /* extended-const i32/i64 add/sub/mul: no immediate */ }
            other => return Err(DecodeError::InvalidForm(other)),
        }
    }
    let end = r.position();
    Ok(ConstExpr {
        bytes: r.full_bytes()[start..end].to_vec(),
    })
}

fn decode_type_section(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        let form = r.read_u8()?;
        if form != 0x60 {
            return Err(DecodeError::InvalidForm(form));
        }
        let num_params = r.read_u32()?;
        let mut params = Vec::with_capacity(num_params as usize);
        for _ in 0..num_params {
            params.push(decode_val_type(r)?);
        }
        let num_results = r.read_u32()?;
        let mut results = Vec::with_capacity(num_results as usize);
        for _ in 0..num_results {
            results.push(decode_val_type(r)?);
        }
        module.types.push(zwasm_core::FuncType::new(params, results));
    }
    Ok(())
}

fn decode_import_section(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        let module_name = r.read_name()?.to_string();
        let field_name = r.read_name()?.to_string();
        let kind = r.read_u8()?;
        let desc = match kind {
            0x00 => {
                module.num_imported_funcs += 1;
                ImportDesc::Func(r.read_u32()?)
            }
            0x01 => {
                module.num_imported_tables += 1;
                ImportDesc::Table(decode_table_type(r)?)
            }
            0x02 => {
                module.num_imported_memories += 1;
                ImportDesc::Memory(decode_memory_type(r)?)
            }
            0x03 => {
                module.num_imported_globals += 1;
                ImportDesc::Global(decode_global_type(r)?)
            }
            other => return Err(DecodeError::InvalidForm(other)),
        };
        module.imports.push(Import {
            module: module_name,
            name: field_name,
            desc,
        });
    }
    Ok(())
}

fn decode_function_section(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        module.funcs.push(FuncDef {
            type_idx: r.read_u32()?,
        });
    }
    Ok(())
}

fn decode_table_section(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        module.tables.push(decode_table_type(r)?);
    }
    Ok(())
}

fn decode_memory_section(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        module.memories.push(decode_memory_type(r)?);
    }
    Ok(())
}

fn decode_global_section(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        let ty = decode_global_type(r)?;
        let init = decode_const_expr(r)?;
        module.globals.push(GlobalDef { ty, init });
    }
    Ok(())
}

fn decode_export_section(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        let name = r.read_name()?.to_string();
        let kind = match r.read_u8()? {
            0x00 => ExportKind::Func,
            0x01 => ExportKind::Table,
            0x02 => ExportKind::Memory,
            0x03 => ExportKind::Global,
            other => return Err(DecodeError::InvalidForm(other)),
        };
        let index = r.read_u32()?;
        module.exports.push(Export { name, kind, index });
    }
    Ok(())
}

fn decode_element_section(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        let flags = r.read_u32()?;
        let (kind, ty) = match flags {
            0 => {
                let offset = decode_const_expr(r)?;
                (ElementKind::Active { table: 0, offset }, RefType::Func)
            }
            1 => {
                r.read_u8()?; // elemkind, only funcref supported
                (ElementKind::Passive, RefType::Func)
            }
            2 => {
                let table = r.read_u32()?;
                let offset = decode_const_expr(r)?;
                r.read_u8()?;
                (ElementKind::Active { table, offset }, RefType::Func)
            }
            3 => {
                r.read_u8()?;
                (ElementKind::Declared, RefType::Func)
            }
            4 => {
                let offset = decode_const_expr(r)?;
                (ElementKind::Active { table: 0, offset }, RefType::Func)
            }
            5 | 7 => {
                let ty = decode_val_type(r).ok().and_then(|v| match v {
                    ValType::Ref(rt) => Some(rt),
                    _ => None,
                }).unwrap_or(RefType::Func);
                (ElementKind::Passive, ty)
            }
            6 => {
                let table = r.read_u32()?;
                let offset = decode_const_expr(r)?;
                let ty = decode_val_type(r).ok().and_then(|v| match v {
                    ValType::Ref(rt) => Some(rt),
                    _ => None,
                }).unwrap_or(RefType::Func);
                (ElementKind::Active { table, offset }, ty)
            }
            other => return Err(DecodeError::InvalidForm(other as u8)),
        };
        let uses_exprs = matches!(flags, 4 | 5 | 6 | 7);
        let num_items = r.read_u32()?;
        let mut items = Vec::with_capacity(num_items as usize);
        for _ in 0..num_items {
            if uses_exprs {
                items.push(decode_const_expr(r)?);
            } else {
                let idx = r.read_u32()?;
                items.push(ConstExpr {
                    bytes: idx.to_le_bytes().to_vec(),
                });
            }
        }
        module.elements.push(ElementSegment { ty, kind, items });
    }
    Ok(())
}

fn decode_code_section(r: &mut Reader<'_>, code_bodies: &mut Vec<CodeBody>) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        let body_size = r.read_u32()? as usize;
        let body_bytes = r.read_bytes(body_size)?;
        let mut br = Reader::new(body_bytes);
        let num_local_groups = br.read_u32()?;
        let mut locals = Vec::with_capacity(num_local_groups as usize);
        for _ in 0..num_local_groups {
            let n = br.read_u32()?;
            let ty = decode_val_type(&mut br)?;
            locals.push((n, ty));
        }
        let instrs_start = br.position();
        let instrs = body_bytes[instrs_start..].to_vec();
        code_bodies.push(CodeBody { locals, instrs });
    }
    Ok(())
}

fn decode_data_section(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    let count = r.read_u32()?;
    for _ in 0..count {
        let flags = r.read_u32()?;
        let kind = match flags {
            0 => {
                let offset = decode_const_expr(r)?;
                DataKind::Active { memory: 0, offset }
            }
            1 => DataKind::Passive,
            2 => {
                let memory = r.read_u32()?;
                let offset = decode_const_expr(r)?;
                DataKind::Active { memory, offset }
            }
            other => return Err(DecodeError::InvalidForm(other as u8)),
        };
        let len = r.read_u32()? as usize;
        let bytes = r.read_bytes(len)?.to_vec();
        module.data.push(DataSegment { kind, bytes });
    }
    Ok(())
}
