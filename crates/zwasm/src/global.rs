//! §3 `Global`: a cell holding a typed value and a mutability flag.

use crate::module::GlobalType;

pub struct GlobalInstance {
    ty: GlobalType,
    value: u64,
}

impl GlobalInstance {
    #[must_use]
    pub fn new(ty: GlobalType, value: u64) -> Self {
        Self { ty, value }
    }

    #[must_use]
    pub fn ty(&self) -> GlobalType {
        self.ty
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.value
    }

    /// # Panics
    ///
    /// If the global is immutable; callers must check `ty().mutable`
    /// themselves (the validator rejects `global.set` on immutable
    /// globals at compile time, so this is an internal invariant, not a
    /// recoverable runtime condition).
    pub fn set(&mut self, value: u64) {
        assert!(self.ty.mutable, "store attempted to write an immutable global");
        self.value = value;
    }
}
