//! §4.6 host-call trampoline: the bridge compiled (Tier 3) code uses to
//! call back into the engine for anything it does not inline — ordinary
//! and indirect calls, and memory/table growth.
//!
//! Compiled code only ever holds two opaque pointers (`vm`, `instance`);
//! both point at the same [`Ctx`] value for the duration of one top-level
//! [`crate::engine::invoke`]/[`crate::engine::call_function`] call, which is
//! what lets every trampoline recover a `&mut Store`/`&mut Vm` pair without
//! the `zwasm-jit` crate ever naming either type.

use core::ffi::c_void;
use core::slice;

use zwasm_core::TrapCode;
use zwasm_jit::Trampolines;

use crate::engine::{call_function, reg_to_ref, Vm};
use crate::store::{FuncIdx, InstanceIdx, Store};
use crate::table::RefValue;

/// What a trampoline call actually receives as `vm`/`instance`: both raw
/// pointers compiled code carries point at the same `Ctx`.
pub struct Ctx {
    store: *mut Store,
    vm: *mut Vm,
    instance: InstanceIdx,
}

impl Ctx {
    pub fn new(store: &mut Store, vm: &mut Vm, instance: InstanceIdx) -> Self {
        Self { store: store as *mut Store, vm: vm as *mut Vm, instance }
    }

    /// # Safety
    ///
    /// `ptr` must be a pointer produced by [`Ctx::new`] and still alive.
    unsafe fn from_raw<'a>(ptr: *mut c_void) -> &'a mut Ctx {
        &mut *ptr.cast::<Ctx>()
    }
}

fn trap_ordinal(trap: zwasm_core::Trap) -> u64 {
    u64::from(trap.trap_code().map_or(TrapCode::Unreachable.ordinal(), |c| c.ordinal()))
}

#[must_use]
pub fn trampolines() -> Trampolines {
    Trampolines {
        call: trampoline_call,
        call_indirect: trampoline_call_indirect,
        memory_grow: trampoline_memory_grow,
        table_grow: trampoline_table_grow,
        memory_base: trampoline_memory_base,
        memory_size: trampoline_memory_size,
        global_get: trampoline_global_get,
        global_set: trampoline_global_set,
    }
}

unsafe extern "C" fn trampoline_call(
    vm: *mut c_void,
    instance: *mut c_void,
    func_idx: u32,
    args: *const u64,
    args_len: u32,
    results: *mut u64,
    results_len: u32,
) -> u64 {
    // SAFETY: `vm`/`instance` are the same `Ctx` pointer the engine handed
    // to the JIT call this trampoline was invoked from; `args`/`results`
    // point at live slices of the lengths given, per `JitCode::call`'s
    // safety contract.
    unsafe {
        let ctx = Ctx::from_raw(instance);
        debug_assert_eq!(vm, instance, "both trampoline pointers must alias the same Ctx");
        let store = &mut *ctx.store;
        let vmref = &mut *ctx.vm;
        let args = slice::from_raw_parts(args, args_len as usize);
        let results = slice::from_raw_parts_mut(results, results_len as usize);

        let resolved = store.instance(ctx.instance).and_then(|inst| inst.func(func_idx));
        let Some(func) = resolved else {
            return u64::from(TrapCode::UndefinedElement.ordinal());
        };
        match call_function(store, vmref, func, args, results, ctx.instance) {
            Ok(()) => 0,
            Err(trap) => trap_ordinal(trap),
        }
    }
}

unsafe extern "C" fn trampoline_call_indirect(
    vm: *mut c_void,
    instance: *mut c_void,
    table_type_packed: u64,
    elem_idx: u32,
    args: *const u64,
    args_len: u32,
    results: *mut u64,
    results_len: u32,
) -> u64 {
    // SAFETY: see `trampoline_call`.
    unsafe {
        let table_idx = (table_type_packed >> 32) as u32;
        let type_idx = (table_type_packed & 0xffff_ffff) as u32;
        let ctx = Ctx::from_raw(instance);
        debug_assert_eq!(vm, instance, "both trampoline pointers must alias the same Ctx");
        let store = &mut *ctx.store;
        let vmref = &mut *ctx.vm;
        let args = slice::from_raw_parts(args, args_len as usize);
        let results = slice::from_raw_parts_mut(results, results_len as usize);

        let Some(inst) = store.instance(ctx.instance) else {
            return u64::from(TrapCode::UndefinedElement.ordinal());
        };
        let Some(table_id) = inst.table(table_idx) else {
            return u64::from(TrapCode::UndefinedElement.ordinal());
        };
        let Some(expected_ty) = inst.module().types.get(type_idx as usize).cloned() else {
            return u64::from(TrapCode::MismatchedSignatures.ordinal());
        };
        let Some(table) = store.table(table_id) else {
            return u64::from(TrapCode::UndefinedElement.ordinal());
        };
        let entry = match table.get(elem_idx) {
            Ok(entry) => entry,
            Err(code) => return u64::from(code.ordinal()),
        };
        let func: FuncIdx = match entry {
            RefValue::Func(raw) => FuncIdx::new(raw),
            _ => return u64::from(TrapCode::UndefinedElement.ordinal()),
        };
        let Some(actual_ty) = store.func(func).map(|r| r.ty().clone()) else {
            return u64::from(TrapCode::UndefinedElement.ordinal());
        };
        if actual_ty != expected_ty {
            return u64::from(TrapCode::MismatchedSignatures.ordinal());
        }
        match call_function(store, vmref, func, args, results, ctx.instance) {
            Ok(()) => 0,
            Err(trap) => trap_ordinal(trap),
        }
    }
}

unsafe extern "C" fn trampoline_memory_grow(instance: *mut c_void, memory_idx: u32, delta: u64) -> u64 {
    // SAFETY: see `trampoline_call`.
    unsafe {
        let ctx = Ctx::from_raw(instance);
        let store = &mut *ctx.store;
        let max = store.config().max_memory_pages;
        let Some(mem) = store.instance(ctx.instance).and_then(|inst| inst.memory(memory_idx)) else {
            return u64::MAX;
        };
        match store.memory_mut(mem).expect("live memory").grow(delta, max) {
            Some(prev) => prev,
            None => u64::MAX,
        }
    }
}

unsafe extern "C" fn trampoline_table_grow(instance: *mut c_void, table_idx: u32, delta: u32, init: u64) -> u64 {
    // SAFETY: see `trampoline_call`.
    unsafe {
        let ctx = Ctx::from_raw(instance);
        let store = &mut *ctx.store;
        let Some(table_id) = store.instance(ctx.instance).and_then(|inst| inst.table(table_idx)) else {
            return u64::from(u32::MAX);
        };
        let elem = store.table(table_id).expect("live table").ty().element;
        let init = reg_to_ref(init, elem);
        match store.table_mut(table_id).expect("live table").grow(delta, init) {
            Some(prev) => u64::from(prev),
            None => u64::from(u32::MAX),
        }
    }
}

unsafe extern "C" fn trampoline_memory_base(instance: *mut c_void, memory_idx: u32) -> *mut u8 {
    // SAFETY: see `trampoline_call`.
    unsafe {
        let ctx = Ctx::from_raw(instance);
        let store = &mut *ctx.store;
        let Some(mem) = store.instance(ctx.instance).and_then(|inst| inst.memory(memory_idx)) else {
            return core::ptr::null_mut();
        };
        store.memory_mut(mem).expect("live memory").base_ptr()
    }
}

unsafe extern "C" fn trampoline_memory_size(instance: *mut c_void, memory_idx: u32) -> u64 {
    // SAFETY: see `trampoline_call`.
    unsafe {
        let ctx = Ctx::from_raw(instance);
        let store = &mut *ctx.store;
        let Some(mem) = store.instance(ctx.instance).and_then(|inst| inst.memory(memory_idx)) else {
            return 0;
        };
        store.memory(mem).expect("live memory").committed_bytes()
    }
}

unsafe extern "C" fn trampoline_global_get(instance: *mut c_void, global_idx: u32) -> u64 {
    // SAFETY: see `trampoline_call`.
    unsafe {
        let ctx = Ctx::from_raw(instance);
        let store = &mut *ctx.store;
        let Some(global) = store.instance(ctx.instance).and_then(|inst| inst.global(global_idx)) else {
            return 0;
        };
        store.global(global).expect("live global").get()
    }
}

unsafe extern "C" fn trampoline_global_set(instance: *mut c_void, global_idx: u32, value: u64) {
    // SAFETY: see `trampoline_call`.
    unsafe {
        let ctx = Ctx::from_raw(instance);
        let store = &mut *ctx.store;
        let Some(global) = store.instance(ctx.instance).and_then(|inst| inst.global(global_idx)) else {
            return;
        };
        store.global_mut(global).expect("live global").set(value);
    }
}
