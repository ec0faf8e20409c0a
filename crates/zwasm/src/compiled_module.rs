//! A decoded, validated and translated module, ready to be instantiated any
//! number of times without repeating that work. Analogous to `wasmi::Module`
//! and `wasmtime::Module`: one `CompiledModule` can back many `Instance`s in
//! possibly many `Store`s.

use alloc::sync::Arc;
use alloc::vec::Vec;

use zwasm_core::{InstantiationError, WasmError};
use zwasm_ir::RegFunc;

use crate::instance::{self, Imports};
use crate::module::{self, Module};
use crate::store::{InstanceIdx, Store};
use crate::validate;

/// The output of the decode → validate → translate pipeline (§4 components
/// 1-3), shared read-only by every instantiation.
pub struct CompiledModule {
    module: Arc<Module>,
    code: Vec<Arc<RegFunc>>,
}

impl CompiledModule {
    /// Runs the full front end over a raw Wasm binary: decodes the section
    /// structure, validates every function body and module-level constant
    /// expression, then lowers each function to RegIR.
    ///
    /// # Errors
    ///
    /// Returns the first [`WasmError`] encountered, in pipeline order
    /// (decode errors before validation errors before translation errors).
    pub fn new(bytes: &[u8]) -> Result<Self, WasmError> {
        let module = module::decode(bytes)?;
        validate::validate_module(&module)?;
        let code = crate::translate::translate_module(&module)?
            .into_iter()
            .map(Arc::new)
            .collect();
        Ok(Self { module: Arc::new(module), code })
    }

    #[must_use]
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    #[must_use]
    pub fn code(&self) -> &[Arc<RegFunc>] {
        &self.code
    }

    /// Instantiates this module into `store`, resolving its imports from
    /// `imports`. Equivalent to [`crate::instance::instantiate`] but avoids
    /// making callers thread `module()`/`code()` through by hand.
    ///
    /// # Errors
    ///
    /// See [`crate::instance::instantiate`].
    pub fn instantiate(&self, store: &mut Store, imports: &Imports) -> Result<InstanceIdx, InstantiationError> {
        instance::instantiate(store, self.module.clone(), &self.code, imports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_module_bytes() -> Vec<u8> {
        alloc::vec![0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]
    }

    #[test]
    fn compiles_the_empty_module() {
        let compiled = CompiledModule::new(&empty_module_bytes()).unwrap();
        assert_eq!(compiled.module().total_funcs(), 0);
        assert!(compiled.code().is_empty());
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(CompiledModule::new(&[0xff; 8]).is_err());
    }
}
