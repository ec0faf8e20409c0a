//! §4.6 "Host-call context": what a [`crate::func::HostFunc`] sees when the
//! engine invokes it. A host function only ever reaches guest state through
//! this handle, never through a pointer it cached on a previous call — the
//! `Store` is free to reallocate a memory between calls.

use crate::global::GlobalInstance;
use crate::instance::Extern;
use crate::memory::LinearMemory;
use crate::store::{InstanceIdx, Store};

/// The calling instance's context, handed to a host function for the
/// duration of one call.
pub struct Caller<'a> {
    store: &'a mut Store,
    instance: InstanceIdx,
}

impl<'a> Caller<'a> {
    pub(crate) fn new(store: &'a mut Store, instance: InstanceIdx) -> Self {
        Self { store, instance }
    }

    #[must_use]
    pub fn instance(&self) -> InstanceIdx {
        self.instance
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        self.store
    }

    /// The calling instance's exported/imported memory at module-relative
    /// index `module_idx` (almost always `0`).
    #[must_use]
    pub fn memory(&self, module_idx: u32) -> Option<&LinearMemory> {
        let idx = self.store.instance(self.instance)?.memory(module_idx)?;
        self.store.memory(idx)
    }

    pub fn memory_mut(&mut self, module_idx: u32) -> Option<&mut LinearMemory> {
        let idx = self.store.instance(self.instance)?.memory(module_idx)?;
        self.store.memory_mut(idx)
    }

    #[must_use]
    pub fn global(&self, module_idx: u32) -> Option<&GlobalInstance> {
        let idx = self.store.instance(self.instance)?.global(module_idx)?;
        self.store.global(idx)
    }

    /// Looks up one of the calling instance's exports by name, without
    /// resolving it against the `Store` (callers that need to invoke an
    /// exported function back go through [`crate::engine::call_function`]
    /// with the `FuncIdx` returned here).
    #[must_use]
    pub fn export(&self, name: &str) -> Option<Extern> {
        self.store.instance(self.instance)?.export(name)
    }
}
