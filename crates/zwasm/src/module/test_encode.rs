//! A tiny Wasm-binary assembler used only by this crate's own tests.
//!
//! No WAT front end is in scope (§1 "Out of scope"), so the validator,
//! translator, interpreter and instantiation tests that live alongside
//! their modules build raw binaries directly. Hand-counting LEB128
//! lengths at every call site would make those tests unreadable, so this
//! builder takes care of section framing and leaves call sites with just
//! the opcode bytes of each function body.

use alloc::vec;
use alloc::vec::Vec;

use zwasm_core::{RefType, ValType};

pub(crate) fn uleb(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

pub(crate) fn sleb(mut value: i64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn valtype_byte(ty: ValType) -> u8 {
    match ty {
        ValType::I32 => 0x7f,
        ValType::I64 => 0x7e,
        ValType::F32 => 0x7d,
        ValType::F64 => 0x7c,
        ValType::V128 => 0x7b,
        ValType::Ref(RefType::Func) => 0x70,
        ValType::Ref(RefType::Extern) => 0x6f,
        ValType::Ref(RefType::Exn) => 0x69,
        ValType::Ref(RefType::Typed { .. }) => 0x70,
        ValType::Unknown => unreachable!("the polymorphic marker never appears in a binary"),
    }
}

fn section(id: u8, body: Vec<u8>, out: &mut Vec<u8>) {
    out.push(id);
    uleb(body.len() as u64, out);
    out.extend(body);
}

/// `i32.const v` followed by the `end` opcode, ready to use as a global or
/// element/data offset initializer.
pub(crate) fn const_i32_expr(v: i32) -> Vec<u8> {
    let mut b = vec![0x41];
    sleb(i64::from(v), &mut b);
    b.push(0x0b);
    b
}

#[derive(Default)]
pub(crate) struct ModuleBuilder {
    types: Vec<(Vec<ValType>, Vec<ValType>)>,
    func_type_idxs: Vec<u32>,
    bodies: Vec<(Vec<(u32, ValType)>, Vec<u8>)>,
    memory: Option<(u32, Option<u32>)>,
    globals: Vec<(ValType, bool, Vec<u8>)>,
    exports: Vec<(Vec<u8>, u8, u32)>,
    start: Option<u32>,
}

impl ModuleBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_type(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        self.types.push((params.to_vec(), results.to_vec()));
        (self.types.len() - 1) as u32
    }

    /// `body` is just the instruction bytes; the terminating `end` is
    /// appended automatically.
    pub(crate) fn add_function(&mut self, type_idx: u32, locals: &[(u32, ValType)], body: Vec<u8>) -> u32 {
        self.func_type_idxs.push(type_idx);
        self.bodies.push((locals.to_vec(), body));
        (self.func_type_idxs.len() - 1) as u32
    }

    pub(crate) fn set_memory(&mut self, min: u32, max: Option<u32>) -> &mut Self {
        self.memory = Some((min, max));
        self
    }

    pub(crate) fn add_global(&mut self, ty: ValType, mutable: bool, init: Vec<u8>) -> u32 {
        self.globals.push((ty, mutable, init));
        (self.globals.len() - 1) as u32
    }

    pub(crate) fn export_func(&mut self, name: &str, idx: u32) -> &mut Self {
        self.exports.push((name.as_bytes().to_vec(), 0x00, idx));
        self
    }

    pub(crate) fn export_memory(&mut self, name: &str, idx: u32) -> &mut Self {
        self.exports.push((name.as_bytes().to_vec(), 0x02, idx));
        self
    }

    pub(crate) fn export_global(&mut self, name: &str, idx: u32) -> &mut Self {
        self.exports.push((name.as_bytes().to_vec(), 0x03, idx));
        self
    }

    pub(crate) fn set_start(&mut self, idx: u32) -> &mut Self {
        self.start = Some(idx);
        self
    }

    pub(crate) fn finish(&self) -> Vec<u8> {
        let mut out = vec![0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

        if !self.types.is_empty() {
            let mut body = Vec::new();
            uleb(self.types.len() as u64, &mut body);
            for (params, results) in &self.types {
                body.push(0x60);
                uleb(params.len() as u64, &mut body);
                body.extend(params.iter().map(|t| valtype_byte(*t)));
                uleb(results.len() as u64, &mut body);
                body.extend(results.iter().map(|t| valtype_byte(*t)));
            }
            section(0x01, body, &mut out);
        }

        if !self.func_type_idxs.is_empty() {
            let mut body = Vec::new();
            uleb(self.func_type_idxs.len() as u64, &mut body);
            for idx in &self.func_type_idxs {
                uleb(u64::from(*idx), &mut body);
            }
            section(0x03, body, &mut out);
        }

        if let Some((min, max)) = self.memory {
            let mut body = Vec::new();
            uleb(1, &mut body);
            match max {
                Some(max) => {
                    body.push(0x01);
                    uleb(u64::from(min), &mut body);
                    uleb(u64::from(max), &mut body);
                }
                None => {
                    body.push(0x00);
                    uleb(u64::from(min), &mut body);
                }
            }
            section(0x05, body, &mut out);
        }

        if !self.globals.is_empty() {
            let mut body = Vec::new();
            uleb(self.globals.len() as u64, &mut body);
            for (ty, mutable, init) in &self.globals {
                body.push(valtype_byte(*ty));
                body.push(u8::from(*mutable));
                body.extend(init);
            }
            section(0x06, body, &mut out);
        }

        if !self.exports.is_empty() {
            let mut body = Vec::new();
            uleb(self.exports.len() as u64, &mut body);
            for (name, kind, idx) in &self.exports {
                uleb(name.len() as u64, &mut body);
                body.extend(name);
                body.push(*kind);
                uleb(u64::from(*idx), &mut body);
            }
            section(0x07, body, &mut out);
        }

        if let Some(start) = self.start {
            let mut body = Vec::new();
            uleb(u64::from(start), &mut body);
            section(0x08, body, &mut out);
        }

        if !self.bodies.is_empty() {
            let mut body = Vec::new();
            uleb(self.bodies.len() as u64, &mut body);
            for (locals, instrs) in &self.bodies {
                let mut fbody = Vec::new();
                uleb(locals.len() as u64, &mut fbody);
                for (n, ty) in locals {
                    uleb(u64::from(*n), &mut fbody);
                    fbody.push(valtype_byte(*ty));
                }
                fbody.extend(instrs);
                fbody.push(0x0b);
                uleb(fbody.len() as u64, &mut body);
                body.extend(fbody);
            }
            section(0x0a, body, &mut out);
        }

        out
    }
}
