//! §3 "Store... function records": a function is either Wasm-defined
//! (lowered to [`RegFunc`], possibly promoted to native code) or a host
//! import. §4.4 "Hotness and promotion" lives here as a per-function call
//! counter the engine increments on every invocation.

use alloc::sync::Arc;
use core::cell::{Cell, RefCell};

use zwasm_core::{FuncType, Trap};
use zwasm_ir::RegFunc;

use crate::engine::Caller;
use crate::store::InstanceIdx;

/// A host-provided function import. Implementors read/write guest memory
/// and globals only through `caller`, never by holding their own pointer
/// into the `Store` (the `Store` may reallocate memory between calls).
pub trait HostFunc: Send + Sync {
    fn call(&self, caller: Caller<'_>, args: &[u64], results: &mut [u64]) -> Result<(), Trap>;
}

pub struct HostFuncRecord {
    ty: FuncType,
    func: Arc<dyn HostFunc>,
}

impl HostFuncRecord {
    #[must_use]
    pub fn new(ty: FuncType, func: Arc<dyn HostFunc>) -> Self {
        Self { ty, func }
    }

    #[must_use]
    pub fn func(&self) -> &dyn HostFunc {
        &*self.func
    }

    /// Clones the `Arc` so a call site can drop its `&Store` borrow before
    /// building the `Caller` the callback needs.
    #[must_use]
    pub fn func_arc(&self) -> Arc<dyn HostFunc> {
        self.func.clone()
    }
}

/// A function defined in the module's code section, plus the engine's
/// tiering state for it (§4.4).
pub struct WasmFunc {
    ty: FuncType,
    code: Arc<RegFunc>,
    instance: InstanceIdx,
    call_count: Cell<u32>,
    /// Compiled native code, once the hotness threshold promotes this
    /// function (§4.4/§4.5). `None` until then, and permanently `None` if
    /// compilation failed (`CompileError::Unsupported`) — the function
    /// just keeps running in Tier 2. Behind an `Arc` so a call site can
    /// clone it out and drop the `&Store` borrow before the JIT call needs
    /// a mutable one.
    jit: RefCell<Option<Arc<zwasm_jit::JitCode>>>,
    /// Set once a compile attempt has failed, so the engine does not retry
    /// every single call past the hotness threshold.
    jit_failed: Cell<bool>,
}

impl WasmFunc {
    #[must_use]
    pub fn new(ty: FuncType, code: Arc<RegFunc>, instance: InstanceIdx) -> Self {
        Self {
            ty,
            code,
            instance,
            call_count: Cell::new(0),
            jit: RefCell::new(None),
            jit_failed: Cell::new(false),
        }
    }

    #[must_use]
    pub fn code(&self) -> &RegFunc {
        &self.code
    }

    /// Clones the `Arc` so a call site can drop its `&Store` borrow before
    /// the recursive dispatch needs a fresh one.
    #[must_use]
    pub fn code_arc(&self) -> Arc<RegFunc> {
        self.code.clone()
    }

    #[must_use]
    pub fn instance(&self) -> InstanceIdx {
        self.instance
    }

    /// Increments the call counter and returns the post-increment value,
    /// saturating rather than wrapping so a long-lived hot function does
    /// not spuriously reset below the promotion threshold.
    pub fn bump_call_count(&self) -> u32 {
        let next = self.call_count.get().saturating_add(1);
        self.call_count.set(next);
        next
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.call_count.get()
    }

    /// Clones the `Arc` out so the caller can release this `WasmFunc`'s
    /// borrow before the JIT call needs a mutable `Store`.
    #[must_use]
    pub fn jit_code(&self) -> Option<Arc<zwasm_jit::JitCode>> {
        self.jit.borrow().clone()
    }

    #[must_use]
    pub fn jit_attempted(&self) -> bool {
        self.jit_failed.get() || self.jit.borrow().is_some()
    }

    pub fn set_jit_code(&self, code: zwasm_jit::JitCode) {
        *self.jit.borrow_mut() = Some(Arc::new(code));
    }

    pub fn mark_jit_failed(&self) {
        self.jit_failed.set(true);
    }
}

pub enum FuncRecord {
    Wasm(WasmFunc),
    Host(HostFuncRecord),
}

impl FuncRecord {
    #[must_use]
    pub fn ty(&self) -> &FuncType {
        match self {
            FuncRecord::Wasm(f) => &f.ty,
            FuncRecord::Host(f) => &f.ty,
        }
    }

    #[must_use]
    pub fn as_wasm(&self) -> Option<&WasmFunc> {
        match self {
            FuncRecord::Wasm(f) => Some(f),
            FuncRecord::Host(_) => None,
        }
    }

    #[must_use]
    pub fn as_host(&self) -> Option<&HostFuncRecord> {
        match self {
            FuncRecord::Host(f) => Some(f),
            FuncRecord::Wasm(_) => None,
        }
    }
}
