//! §3 `Instance` and instantiation: import linking, constant-expression
//! evaluation, memory/table/global allocation, data/element placement and
//! the start-function call. Everything a running program needs to reach a
//! Store object goes through an `Instance`'s index tables — never a module-
//! relative index directly.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use zwasm_core::InstantiationError;
use zwasm_ir::RegFunc;

use crate::func::{FuncRecord, WasmFunc};
use crate::global::GlobalInstance;
use crate::leb128::Reader;
use crate::memory::LinearMemory;
use crate::module::{ConstExpr, DataKind, ElementKind, ExportKind, ImportDesc, Module};
use crate::store::{FuncIdx, GlobalIdx, InstanceIdx, MemoryIdx, Store, TableIdx};
use crate::table::{RefValue, Table};
use crate::translate::wasm_op;

/// A single resolved import or export value: a handle into some `Store`'s
/// arenas, never the entity itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extern {
    Func(FuncIdx),
    Table(TableIdx),
    Memory(MemoryIdx),
    Global(GlobalIdx),
}

/// The caller's resolution of every import a module declares, supplied in
/// the module's import-section order. Building one is the linker's job;
/// `instantiate` only consumes it.
#[derive(Debug, Default, Clone)]
pub struct Imports {
    values: Vec<Extern>,
}

impl Imports {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, value: Extern) -> Self {
        self.values.push(value);
        self
    }

    pub fn push(&mut self, value: Extern) {
        self.values.push(value);
    }
}

/// A live, linked Wasm module instance. Holds only `Store` indices, so it
/// can be dropped and its `Store` slots reused without disturbing anything
/// another instance still shares (an imported memory, say).
pub struct Instance {
    module: Arc<Module>,
    funcs: Vec<FuncIdx>,
    tables: Vec<TableIdx>,
    memories: Vec<MemoryIdx>,
    globals: Vec<GlobalIdx>,
    exports: BTreeMap<String, Extern>,
    /// Every element segment's items, resolved to store-level `RefValue`s
    /// once at instantiation time (§4.1 "Elements") — `table.init` reads
    /// these directly instead of re-evaluating `ref.func`/`ref.null`
    /// constant expressions on every call.
    elements: Vec<Vec<RefValue>>,
    elem_dropped: Vec<bool>,
    data_dropped: Vec<bool>,
}

impl Instance {
    /// A placeholder with no resources, allocated up front so its
    /// `InstanceIdx` is known before the entities that need to point back
    /// at it (every locally-defined `WasmFunc`) are built. Overwritten in
    /// place by [`instantiate`] once everything is ready.
    fn uninitialized(module: Arc<Module>) -> Self {
        Self {
            module,
            funcs: Vec::new(),
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            exports: BTreeMap::new(),
            elements: Vec::new(),
            elem_dropped: Vec::new(),
            data_dropped: Vec::new(),
        }
    }

    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    #[must_use]
    pub fn func(&self, module_idx: u32) -> Option<FuncIdx> {
        self.funcs.get(module_idx as usize).copied()
    }

    #[must_use]
    pub fn table(&self, module_idx: u32) -> Option<TableIdx> {
        self.tables.get(module_idx as usize).copied()
    }

    #[must_use]
    pub fn memory(&self, module_idx: u32) -> Option<MemoryIdx> {
        self.memories.get(module_idx as usize).copied()
    }

    #[must_use]
    pub fn global(&self, module_idx: u32) -> Option<GlobalIdx> {
        self.globals.get(module_idx as usize).copied()
    }

    #[must_use]
    pub fn export(&self, name: &str) -> Option<Extern> {
        self.exports.get(name).copied()
    }

    pub fn exports(&self) -> impl Iterator<Item = (&str, Extern)> {
        self.exports.iter().map(|(name, ext)| (name.as_str(), *ext))
    }

    /// A resolved element segment's items, for `table.init` (§4.1).
    #[must_use]
    pub fn element_segment(&self, idx: u32) -> Option<&[RefValue]> {
        self.elements.get(idx as usize).map(Vec::as_slice)
    }

    #[must_use]
    pub fn is_elem_dropped(&self, idx: u32) -> bool {
        self.elem_dropped.get(idx as usize).copied().unwrap_or(true)
    }

    pub fn drop_elem(&mut self, idx: u32) {
        if let Some(slot) = self.elem_dropped.get_mut(idx as usize) {
            *slot = true;
        }
    }

    #[must_use]
    pub fn is_data_dropped(&self, idx: u32) -> bool {
        self.data_dropped.get(idx as usize).copied().unwrap_or(true)
    }

    pub fn drop_data(&mut self, idx: u32) {
        if let Some(slot) = self.data_dropped.get_mut(idx as usize) {
            *slot = true;
        }
    }
}

/// Links `module` against `imports`, allocates its own memories/tables/
/// globals/functions into `store`, applies active element and data
/// segments, runs the start function if any, and registers the resulting
/// `Instance`.
///
/// `code` holds one pre-translated [`RegFunc`] per module-defined function
/// (not imports), in the module's function-index order — the output of
/// running the translator once over `module.code`.
///
/// # Errors
///
/// Returns [`InstantiationError`] if an import is missing, mismatched, a
/// declared resource exceeds a `Store`-wide limit, a constant expression
/// cannot be evaluated, or a data/element segment does not fit its target.
pub fn instantiate(
    store: &mut Store,
    module: Arc<Module>,
    code: &[Arc<RegFunc>],
    imports: &Imports,
) -> Result<InstanceIdx, InstantiationError> {
    if imports.values.len() != module.imports.len() {
        return Err(InstantiationError::ImportNotFound { module: String::new(), name: String::new() });
    }

    let instance_idx = store.alloc_instance(Instance::uninitialized(module.clone()));

    let mut funcs = Vec::with_capacity(module.total_funcs() as usize);
    let mut tables = Vec::with_capacity(module.total_tables() as usize);
    let mut memories = Vec::with_capacity(module.total_memories() as usize);
    let mut globals = Vec::with_capacity(module.total_globals() as usize);

    for (import, resolved) in module.imports.iter().zip(imports.values.iter()) {
        link_one(store, &module, import, *resolved, &mut funcs, &mut tables, &mut memories, &mut globals)?;
    }

    let max_memory_pages = store.config().max_memory_pages;
    let guard_pages = store.config().guard_pages;
    for ty in &module.tables {
        tables.push(store.alloc_table(Table::new(*ty)));
    }
    for ty in &module.memories {
        let memory = LinearMemory::new(ty, max_memory_pages, guard_pages)
            .map_err(|_| InstantiationError::TooManyMemories)?;
        memories.push(store.alloc_memory(memory));
    }

    // Globals are evaluated and allocated in declaration order; a global's
    // initializer may only reference globals already visible, and the
    // decoder/validator only accept imported globals there, so every
    // `global.get` this loop can observe already resolved above.
    for def in &module.globals {
        let value = eval_const_expr(store, &def.init, &globals)?;
        globals.push(store.alloc_global(GlobalInstance::new(def.ty, value)));
    }

    for (def, func_code) in module.funcs.iter().zip(code.iter()) {
        let ty = module.types.get(def.type_idx as usize).cloned().unwrap_or_default();
        let wasm_func = WasmFunc::new(ty, func_code.clone(), instance_idx);
        funcs.push(store.alloc_func(FuncRecord::Wasm(wasm_func)));
    }

    let mut exports = BTreeMap::new();
    for export in &module.exports {
        let missing = || InstantiationError::ImportNotFound { module: String::new(), name: export.name.clone() };
        let ext = match export.kind {
            ExportKind::Func => Extern::Func(*funcs.get(export.index as usize).ok_or_else(missing)?),
            ExportKind::Table => Extern::Table(*tables.get(export.index as usize).ok_or_else(missing)?),
            ExportKind::Memory => Extern::Memory(*memories.get(export.index as usize).ok_or_else(missing)?),
            ExportKind::Global => Extern::Global(*globals.get(export.index as usize).ok_or_else(missing)?),
        };
        exports.insert(export.name.clone(), ext);
    }

    let instance = Instance {
        module: module.clone(),
        elements: alloc::vec![Vec::new(); module.elements.len()],
        elem_dropped: alloc::vec![false; module.elements.len()],
        data_dropped: alloc::vec![false; module.data.len()],
        funcs,
        tables,
        memories,
        globals,
        exports,
    };
    *store.instance_mut(instance_idx).expect("just allocated") = instance;

    apply_elements(store, instance_idx)?;
    apply_data(store, instance_idx)?;

    if let Some(start) = module.start {
        let instance = store.instance(instance_idx).expect("just allocated");
        let func_idx = instance.func(start).ok_or(InstantiationError::ConstExprEvalFailed)?;
        run_start(store, instance_idx, func_idx)?;
    }

    Ok(instance_idx)
}

fn link_one(
    store: &Store,
    module: &Module,
    import: &crate::module::Import,
    resolved: Extern,
    funcs: &mut Vec<FuncIdx>,
    tables: &mut Vec<TableIdx>,
    memories: &mut Vec<MemoryIdx>,
    globals: &mut Vec<GlobalIdx>,
) -> Result<(), InstantiationError> {
    let mismatch = || InstantiationError::LinkMismatch {
        module: import.module.clone(),
        name: import.name.clone(),
    };
    match (&import.desc, resolved) {
        (ImportDesc::Func(type_idx), Extern::Func(idx)) => {
            let expected = module.types.get(*type_idx as usize).ok_or_else(mismatch)?;
            let actual = store.func(idx).ok_or_else(mismatch)?.ty();
            if actual != expected {
                return Err(mismatch());
            }
            funcs.push(idx);
        }
        (ImportDesc::Table(expected), Extern::Table(idx)) => {
            let actual = store.table(idx).ok_or_else(mismatch)?.ty();
            if actual.element != expected.element || !limits_subsume(actual.limits, expected.limits) {
                return Err(mismatch());
            }
            tables.push(idx);
        }
        (ImportDesc::Memory(expected), Extern::Memory(idx)) => {
            let actual = store.memory(idx).ok_or_else(mismatch)?;
            let actual_limits = crate::module::Limits { min: actual.pages(), max: None };
            if actual.page_size() != expected.page_size || !limits_subsume(actual_limits, expected.limits) {
                return Err(mismatch());
            }
            memories.push(idx);
        }
        (ImportDesc::Global(expected), Extern::Global(idx)) => {
            let actual = store.global(idx).ok_or_else(mismatch)?.ty();
            if actual.content != expected.content || actual.mutable != expected.mutable {
                return Err(mismatch());
            }
            globals.push(idx);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Whether a table/memory offered by the embedder (`actual`) satisfies a
/// module's declared import limits (`expected`): `actual.min` must meet the
/// floor and, if the import declares a ceiling, `actual` must declare one no
/// higher.
fn limits_subsume(actual: crate::module::Limits, expected: crate::module::Limits) -> bool {
    if actual.min < expected.min {
        return false;
    }
    match (actual.max, expected.max) {
        (_, None) => true,
        (Some(a), Some(e)) => a <= e,
        (None, Some(_)) => false,
    }
}

fn apply_elements(store: &mut Store, instance_idx: InstanceIdx) -> Result<(), InstantiationError> {
    let module = store.instance(instance_idx).expect("just allocated").module.clone();
    for (seg_idx, seg) in module.elements.iter().enumerate() {
        let globals = store.instance(instance_idx).expect("just allocated").globals.clone();
        let funcs = store.instance(instance_idx).expect("just allocated").funcs.clone();
        let items: Vec<RefValue> = seg
            .items
            .iter()
            .map(|expr| eval_ref_const_expr(store, &globals, &funcs, expr))
            .collect::<Result<_, _>>()?;
        store.instance_mut(instance_idx).expect("just allocated").elements[seg_idx] = items.clone();
        if let ElementKind::Active { table, offset } = &seg.kind {
            let offset = eval_const_expr(store, offset, &globals)? as u32;
            let table_idx = store
                .instance(instance_idx)
                .expect("just allocated")
                .table(*table)
                .ok_or(InstantiationError::ElementInitOob)?;
            let table_mut = store.table_mut(table_idx).ok_or(InstantiationError::ElementInitOob)?;
            for (i, value) in items.iter().enumerate() {
                table_mut.set(offset + i as u32, *value).map_err(|_| InstantiationError::ElementInitOob)?;
            }
            // Active segments are inert to `table.init` as soon as they're
            // applied (the Wasm spec treats them as implicitly dropped).
            store.instance_mut(instance_idx).expect("just allocated").drop_elem(seg_idx as u32);
        }
    }
    Ok(())
}

fn apply_data(store: &mut Store, instance_idx: InstanceIdx) -> Result<(), InstantiationError> {
    let module = store.instance(instance_idx).expect("just allocated").module.clone();
    for (seg_idx, seg) in module.data.iter().enumerate() {
        if let DataKind::Active { memory, offset } = &seg.kind {
            let globals = store.instance(instance_idx).expect("just allocated").globals.clone();
            let offset = eval_const_expr(store, offset, &globals)?;
            let memory_idx = store
                .instance(instance_idx)
                .expect("just allocated")
                .memory(*memory)
                .ok_or(InstantiationError::MemoryInitOob)?;
            let memory_mut = store.memory_mut(memory_idx).ok_or(InstantiationError::MemoryInitOob)?;
            memory_mut.write(offset, &seg.bytes).map_err(|_| InstantiationError::MemoryInitOob)?;
            store.instance_mut(instance_idx).expect("just allocated").drop_data(seg_idx as u32);
        }
    }
    Ok(())
}

/// Calls the start function with no arguments, discarding its (empty)
/// result. A trapping start function aborts instantiation entirely (§4.1).
fn run_start(store: &mut Store, instance_idx: InstanceIdx, func_idx: FuncIdx) -> Result<(), InstantiationError> {
    crate::engine::invoke(store, instance_idx, func_idx, &[], &mut [])
        .map_err(InstantiationError::StartTrapped)
}

/// Evaluates a constant expression to its raw 64-bit value: numeric types
/// zero/sign-extended or bit-reinterpreted into the low bits, the way the
/// RegIR register file represents every value (§3).
fn eval_const_expr(
    store: &Store,
    expr: &ConstExpr,
    globals: &[GlobalIdx],
) -> Result<u64, InstantiationError> {
    let mut r = Reader::new(&expr.bytes);
    let mut stack: Vec<u64> = Vec::new();
    loop {
        let opcode = r.read_u8().map_err(|_| InstantiationError::ConstExprEvalFailed)?;
        match opcode {
            wasm_op::END => break,
            wasm_op::I32_CONST => {
                let v = r.read_i32().map_err(|_| InstantiationError::ConstExprEvalFailed)?;
                stack.push(v as u32 as u64);
            }
            wasm_op::I64_CONST => {
                let v = r.read_i64().map_err(|_| InstantiationError::ConstExprEvalFailed)?;
                stack.push(v as u64);
            }
            wasm_op::F32_CONST => {
                let v = r.read_f32_bits().map_err(|_| InstantiationError::ConstExprEvalFailed)?;
                stack.push(u64::from(v));
            }
            wasm_op::F64_CONST => {
                let v = r.read_f64_bits().map_err(|_| InstantiationError::ConstExprEvalFailed)?;
                stack.push(v);
            }
            wasm_op::REF_NULL => {
                r.skip(1).map_err(|_| InstantiationError::ConstExprEvalFailed)?;
                stack.push(u64::from(u32::MAX));
            }
            wasm_op::REF_FUNC => {
                let idx = r.read_u32().map_err(|_| InstantiationError::ConstExprEvalFailed)?;
                stack.push(u64::from(idx));
            }
            wasm_op::GLOBAL_GET => {
                let idx = r.read_u32().map_err(|_| InstantiationError::ConstExprEvalFailed)?;
                let global_idx = *globals.get(idx as usize).ok_or(InstantiationError::ConstExprEvalFailed)?;
                let value = store.global(global_idx).ok_or(InstantiationError::ConstExprEvalFailed)?.get();
                stack.push(value);
            }
            wasm_op::I32_ADD | wasm_op::I32_SUB | wasm_op::I32_MUL => {
                let b = stack.pop().ok_or(InstantiationError::ConstExprEvalFailed)? as u32;
                let a = stack.pop().ok_or(InstantiationError::ConstExprEvalFailed)? as u32;
                let result = match opcode {
                    wasm_op::I32_ADD => a.wrapping_add(b),
                    wasm_op::I32_SUB => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                };
                stack.push(u64::from(result));
            }
            wasm_op::I64_ADD | wasm_op::I64_SUB | wasm_op::I64_MUL => {
                let b = stack.pop().ok_or(InstantiationError::ConstExprEvalFailed)?;
                let a = stack.pop().ok_or(InstantiationError::ConstExprEvalFailed)?;
                let result = match opcode {
                    wasm_op::I64_ADD => a.wrapping_add(b),
                    wasm_op::I64_SUB => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                };
                stack.push(result);
            }
            _ => return Err(InstantiationError::ConstExprEvalFailed),
        }
    }
    if stack.len() != 1 {
        return Err(InstantiationError::ConstExprEvalFailed);
    }
    Ok(stack[0])
}

/// Evaluates an element-segment item — always a `ref.null`/`ref.func`
/// constant expression per the Wasm grammar — to a [`RefValue`].
fn eval_ref_const_expr(
    store: &Store,
    globals: &[GlobalIdx],
    funcs: &[FuncIdx],
    expr: &ConstExpr,
) -> Result<RefValue, InstantiationError> {
    let mut peek = Reader::new(&expr.bytes);
    if peek.read_u8().ok() == Some(wasm_op::REF_NULL) {
        return Ok(RefValue::Null);
    }
    let raw = eval_const_expr(store, expr, globals)?;
    let func_idx = funcs.get(raw as usize).copied().ok_or(InstantiationError::ElementInitOob)?;
    Ok(RefValue::Func(func_idx.into_u32()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled_module::CompiledModule;
    use crate::config::Config;
    use crate::module::test_encode::{const_i32_expr, ModuleBuilder};
    use zwasm_core::ValType;

    fn compile_and_instantiate(b: &ModuleBuilder) -> (Store, InstanceIdx) {
        let compiled = CompiledModule::new(&b.finish()).unwrap();
        let mut store = Store::new(Config::new().with_jit_enabled(false));
        let instance = compiled.instantiate(&mut store, &Imports::new()).unwrap();
        (store, instance)
    }

    #[test]
    fn exported_function_resolves_to_a_func_extern_and_unknown_names_are_none() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x41, 0x2a]); // i32.const 42
        b.export_func("answer", 0);
        let (store, instance) = compile_and_instantiate(&b);
        let instance = store.instance(instance).unwrap();
        assert!(matches!(instance.export("answer"), Some(Extern::Func(_))));
        assert_eq!(instance.export("missing"), None);
    }

    #[test]
    fn global_initializer_is_evaluated_and_readable_through_the_export() {
        let mut b = ModuleBuilder::new();
        b.add_global(ValType::I32, false, const_i32_expr(7));
        b.export_global("g", 0);
        let (store, instance) = compile_and_instantiate(&b);
        let instance = store.instance(instance).unwrap();
        let Extern::Global(idx) = instance.export("g").unwrap() else { panic!("export is not a global") };
        assert_eq!(store.global(idx).unwrap().get() as u32, 7);
    }

    #[test]
    fn global_initializer_can_reference_an_earlier_global() {
        let mut b = ModuleBuilder::new();
        b.add_global(ValType::I32, false, const_i32_expr(10));
        let mut init = alloc::vec![0x23, 0x00]; // global.get 0
        init.extend([0x41, 0x05, 0x6a, 0x0b]); // i32.const 5; i32.add; end
        b.add_global(ValType::I32, false, init);
        b.export_global("sum", 1);
        let (store, instance) = compile_and_instantiate(&b);
        let instance = store.instance(instance).unwrap();
        let Extern::Global(idx) = instance.export("sum").unwrap() else { panic!("export is not a global") };
        assert_eq!(store.global(idx).unwrap().get() as u32, 15);
    }

    #[test]
    fn memory_export_resolves_to_the_allocated_memory() {
        let mut b = ModuleBuilder::new();
        b.set_memory(1, Some(4));
        b.export_memory("mem", 0);
        let (store, instance) = compile_and_instantiate(&b);
        let instance = store.instance(instance).unwrap();
        let Extern::Memory(idx) = instance.export("mem").unwrap() else { panic!("export is not memory") };
        assert_eq!(store.memory(idx).unwrap().pages(), 1);
    }

    #[test]
    fn start_function_runs_during_instantiation() {
        // The start function writes 42 into memory at offset 0 before
        // instantiation returns; if it never ran the byte would stay zero.
        let mut b = ModuleBuilder::new();
        b.set_memory(1, None);
        let ty = b.add_type(&[], &[]);
        b.add_function(
            ty,
            &[],
            alloc::vec![
                0x41, 0x00, // i32.const 0
                0x41, 0x2a, // i32.const 42
                0x3a, 0x00, 0x00, // i32.store8 0 0
            ],
        );
        b.set_start(0);
        b.export_memory("mem", 0);
        let (mut store, instance) = compile_and_instantiate(&b);
        let mem_idx = match store.instance(instance).unwrap().export("mem").unwrap() {
            Extern::Memory(idx) => idx,
            _ => unreachable!(),
        };
        let mut byte = [0u8; 1];
        store.memory_mut(mem_idx).unwrap().read(0, &mut byte).unwrap();
        assert_eq!(byte[0], 42);
    }

    #[test]
    fn instantiation_fails_when_import_count_does_not_match() {
        let b = ModuleBuilder::new();
        let compiled = CompiledModule::new(&b.finish()).unwrap();
        let mut store = Store::new(Config::new().with_jit_enabled(false));
        // The module declares zero imports; supplying one must be rejected
        // rather than silently ignored.
        let imports = Imports::new().with(Extern::Func(FuncIdx::new(0)));
        let err = compiled.instantiate(&mut store, &imports).unwrap_err();
        assert_matches::assert_matches!(err, InstantiationError::ImportNotFound { .. });
    }

    #[test]
    fn limits_subsume_accepts_an_import_with_a_tighter_or_equal_ceiling() {
        let expected = crate::module::Limits { min: 1, max: Some(10) };
        assert!(limits_subsume(crate::module::Limits { min: 2, max: Some(5) }, expected));
        assert!(limits_subsume(crate::module::Limits { min: 1, max: Some(10) }, expected));
        assert!(!limits_subsume(crate::module::Limits { min: 1, max: Some(20) }, expected));
        assert!(!limits_subsume(crate::module::Limits { min: 0, max: Some(10) }, expected));
        assert!(limits_subsume(crate::module::Limits { min: 1, max: None }, crate::module::Limits { min: 1, max: None }));
    }
}
