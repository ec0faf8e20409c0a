//! `Display` newtype wrappers used by every subcommand's human-readable
//! output. Kept separate from the value/arg parsing in `values.rs` so the
//! two directions (render vs. parse) don't end up tangled in one file.

use core::fmt::{self, Display};

use zwasm::{ExportKind, Module};
use zwasm_core::{FuncType, ValType};

pub struct DisplayValType(pub ValType);

impl Display for DisplayValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct DisplayFuncType<'a> {
    pub name: &'a str,
    pub ty: &'a FuncType,
}

impl Display for DisplayFuncType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, p) in self.ty.params().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ")")?;
        match self.ty.results() {
            [] => {}
            [one] => write!(f, " -> {one}")?,
            many => {
                write!(f, " -> (")?;
                for (i, r) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{r}")?;
                }
                write!(f, ")")?;
            }
        }
        Ok(())
    }
}

/// Listing of a module's exported functions, printed alongside a
/// `--invoke`/no-entry-point failure so the user sees what is actually
/// callable (mirrors `wasmi_cli`'s `DisplayExportedFuncs`).
pub struct DisplayExportedFuncs<'a> {
    module: &'a Module,
}

impl<'a> DisplayExportedFuncs<'a> {
    #[must_use]
    pub fn new(module: &'a Module) -> Self {
        Self { module }
    }
}

impl Display for DisplayExportedFuncs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let funcs: Vec<_> = self
            .module
            .exports
            .iter()
            .filter(|e| e.kind == ExportKind::Func)
            .filter_map(|e| self.module.func_type(e.index).map(|ty| (e.name.as_str(), ty)))
            .collect();
        if funcs.is_empty() {
            return write!(f, "the module exports no functions");
        }
        writeln!(f, "the module exports the following functions:")?;
        for (i, (name, ty)) in funcs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}", DisplayFuncType { name, ty })?;
        }
        Ok(())
    }
}

/// Renders one result register as text, given the type it's supposed to
/// hold. V128 results print as 32 lowercase hex digits (the bit pattern,
/// not the pool index — the slab index is an implementation detail the
/// embedder never sees).
pub fn format_result(ty: ValType, raw: u64, v128: Option<u128>) -> String {
    match ty {
        ValType::I32 => format!("{}", raw as u32 as i32),
        ValType::I64 => format!("{}", raw as i64),
        ValType::F32 => format!("{}", f32::from_bits(raw as u32)),
        ValType::F64 => format!("{}", f64::from_bits(raw)),
        ValType::V128 => match v128 {
            Some(bits) => format!("0x{bits:032x}"),
            None => String::from("<v128>"),
        },
        ValType::Ref(_) => {
            if raw == u64::from(u32::MAX) {
                String::from("null")
            } else {
                format!("ref({raw})")
            }
        }
        ValType::Unknown => String::from("<unknown>"),
    }
}
