use alloc::{string::String, vec::Vec};
use zwasm_core::{FuncType, RefType, ValType};

/// `(module, name, kind)` import descriptor (§4.1).
#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone)]
pub enum ImportDesc {
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u64,
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub limits: Limits,
    pub is_64: bool,
    /// Custom page size in bytes, defaulting to 65536 (custom-page-sizes
    /// proposal, decode-only beyond validation of power-of-two ≤ 64KiB).
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub element: RefType,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub content: ValType,
    pub mutable: bool,
}

/// A raw constant-expression byte slice, deferred for evaluation at
/// instantiation time (§3 Global, §4.2 "Constant-expression validation").
#[derive(Debug, Clone)]
pub struct ConstExpr {
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct GlobalDef {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

#[derive(Debug, Clone)]
pub enum ElementKind {
    /// Placed into `table` at `offset` during instantiation.
    Active { table: u32, offset: ConstExpr },
    Passive,
    Declared,
}

#[derive(Debug, Clone)]
pub struct ElementSegment {
    pub ty: RefType,
    pub kind: ElementKind,
    pub items: Vec<ConstExpr>,
}

#[derive(Debug, Clone)]
pub enum DataKind {
    Active { memory: u32, offset: ConstExpr },
    Passive,
}

#[derive(Debug, Clone)]
pub struct DataSegment {
    pub kind: DataKind,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Func,
    Table,
    Memory,
    Global,
}

#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// Raw, unparsed instruction bytes plus declared locals for one function
/// body (§3 "Code body"). Neither the decoder nor anyone but the validator
/// and translator parses the instruction stream itself.
#[derive(Debug, Clone)]
pub struct CodeBody {
    pub locals: Vec<(u32, ValType)>,
    pub instrs: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub type_idx: u32,
}

/// An immutable, fully-decoded Wasm module (§3). Produced once by
/// [`crate::module::decode`] and shared (read-only) by every [`Instance`]
/// created from it.
///
/// [`Instance`]: crate::instance::Instance
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub funcs: Vec<FuncDef>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<GlobalDef>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub code: Vec<CodeBody>,
    pub data_count: Option<u32>,

    pub num_imported_funcs: u32,
    pub num_imported_tables: u32,
    pub num_imported_memories: u32,
    pub num_imported_globals: u32,
}

impl Module {
    /// Signature of function `idx` across both imported and defined
    /// functions (§3 invariant: "function `i` has signature
    /// `types[functions[i].type_idx]`").
    #[must_use]
    pub fn func_type(&self, idx: u32) -> Option<&FuncType> {
        let type_idx = if idx < self.num_imported_funcs {
            self.imports.iter().filter_map(|i| match &i.desc {
                ImportDesc::Func(t) => Some(*t),
                _ => None,
            }).nth(idx as usize)?
        } else {
            self.funcs.get((idx - self.num_imported_funcs) as usize)?.type_idx
        };
        self.types.get(type_idx as usize)
    }

    #[must_use]
    pub fn total_funcs(&self) -> u32 {
        self.num_imported_funcs + self.funcs.len() as u32
    }

    #[must_use]
    pub fn total_tables(&self) -> u32 {
        self.num_imported_tables + self.tables.len() as u32
    }

    #[must_use]
    pub fn total_memories(&self) -> u32 {
        self.num_imported_memories + self.memories.len() as u32
    }

    #[must_use]
    pub fn total_globals(&self) -> u32 {
        self.num_imported_globals + self.globals.len() as u32
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self { min: 0, max: None }
    }
}
