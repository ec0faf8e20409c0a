//! The raw-pointer calling convention (§4.5/§4.6) that lets JIT-compiled
//! code and the Tier 2 interpreter call into each other without either side
//! depending on the other's concrete types.
//!
//! JIT code never sees `Vm` or `Instance`; it receives them as opaque
//! `*mut c_void` and only ever passes them back unchanged through a
//! [`Trampolines`] function pointer.

use core::ffi::c_void;

/// Entry point of a compiled function. `regs` points at the callee's
/// register frame (`reg_count + FRAME_RESERVED_SLOTS` consecutive `u64`
/// slots, matching [`zwasm_ir::RegFunc::frame_size`]); results are written
/// back into the low slots of the same frame before returning.
///
/// Returns a trap ordinal: `0` on normal return, `1..=9` a [`TrapCode`]
/// ordinal (see `zwasm_core::trap`), matching the values the interpreter
/// itself propagates so a caller can treat JIT and interpreted calls
/// uniformly.
///
/// [`TrapCode`]: zwasm_core::TrapCode
pub type JitFn = unsafe extern "C" fn(regs: *mut u64, vm: *mut c_void, instance: *mut c_void) -> u64;

/// Host-provided callbacks that compiled code uses to reach back into the
/// engine for anything it cannot inline: ordinary calls, indirect calls,
/// and memory/table growth (which can move the memory base pointer or
/// reallocate the table, so compiled code must never inline these).
#[derive(Debug, Clone, Copy)]
pub struct Trampolines {
    /// `call $func_idx` — resolves the callee (possibly another compiled
    /// function, possibly interpreter-only) and executes it with `args`
    /// already packed into the ABI's argument slots.
    pub call: unsafe extern "C" fn(
        vm: *mut c_void,
        instance: *mut c_void,
        func_idx: u32,
        args: *const u64,
        args_len: u32,
        results: *mut u64,
        results_len: u32,
    ) -> u64,

    /// `call_indirect $type_idx (table $table_idx)` — additionally
    /// performs the bounds/null/signature checks §4.6 requires before the
    /// call, trapping with `UndefinedElement` or `MismatchedSignatures`
    /// rather than invoking anything on failure.
    ///
    /// `table_type_packed` is `(table_idx << 32) | type_idx`, the same
    /// packing the RegIR itself uses (`Op::CallIndirect`'s `pool64` entry)
    /// — AAPCS64 only has 8 integer argument registers, and packing these
    /// two keeps this call within that budget without spilling to the
    /// stack.
    pub call_indirect: unsafe extern "C" fn(
        vm: *mut c_void,
        instance: *mut c_void,
        table_type_packed: u64,
        elem_idx: u32,
        args: *const u64,
        args_len: u32,
        results: *mut u64,
        results_len: u32,
    ) -> u64,

    /// `memory.grow` — compiled code must call back rather than growing
    /// memory itself because growth can move the backing allocation,
    /// invalidating any cached base pointer compiled code holds.
    pub memory_grow: unsafe extern "C" fn(instance: *mut c_void, memory_idx: u32, delta: u64) -> u64,

    /// `table.grow`, for the same reason as `memory_grow`.
    pub table_grow: unsafe extern "C" fn(instance: *mut c_void, table_idx: u32, delta: u32, init: u64) -> u64,

    /// Returns the current base pointer of memory 0, loaded once in a
    /// compiled function's prologue and cached in `x22` (§4.5's "memory
    /// cache"). Any trampoline that can grow memory invalidates the cache
    /// by reloading it through this same callback on return.
    pub memory_base: unsafe extern "C" fn(instance: *mut c_void, memory_idx: u32) -> *mut u8,

    /// Current size in bytes of memory 0. Compiled code calls this before
    /// every load/store to bound the access rather than caching it, since
    /// unlike the base pointer a stale size would silently widen the
    /// accessible range instead of just pointing at stale data.
    pub memory_size: unsafe extern "C" fn(instance: *mut c_void, memory_idx: u32) -> u64,

    /// `global.get $idx`.
    pub global_get: unsafe extern "C" fn(instance: *mut c_void, global_idx: u32) -> u64,

    /// `global.set $idx`.
    pub global_set: unsafe extern "C" fn(instance: *mut c_void, global_idx: u32, value: u64),
}
