//! Bundles a primary module together with any `--link`ed modules into one
//! `Store`, resolving each one's imports against the WASI namespace first
//! and sibling `--link` exports second. Mirrors the teacher CLI's
//! `Context`, generalized from "one module, one instance" to "a primary
//! module plus a small linked-module graph" for the batch protocol's
//! `invoke_on`/`get_on`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Error};
use zwasm::{CompiledModule, Config, Extern, Imports, InstanceIdx, Module, Store};
use zwasm_wasi::WasiCtx;

use crate::values::LinkSpec;

struct Linked {
    name: String,
    compiled: CompiledModule,
    instance: InstanceIdx,
}

pub struct Context {
    pub store: Store,
    wasi: Arc<WasiCtx>,
    linked: Vec<Linked>,
    main: CompiledModule,
    main_instance: InstanceIdx,
}

impl Context {
    pub fn new(wasm_path: &Path, config: Config, wasi: WasiCtx, links: &[LinkSpec]) -> Result<Self, Error> {
        let mut store = Store::new(config);
        let wasi = Arc::new(wasi);
        let mut linked = Vec::with_capacity(links.len());
        for spec in links {
            let bytes = fs::read(&spec.path)
                .with_context(|| format!("failed to read linked module {:?}", spec.path))?;
            let compiled = CompiledModule::new(&bytes)
                .with_context(|| format!("failed to compile linked module {:?}", spec.path))?;
            let imports = resolve_imports(&mut store, &wasi, compiled.module(), &linked)?;
            let instance = compiled
                .instantiate(&mut store, &imports)
                .with_context(|| format!("failed to instantiate linked module {:?}", spec.name))?;
            linked.push(Linked { name: spec.name.clone(), compiled, instance });
        }

        let bytes = fs::read(wasm_path).with_context(|| format!("failed to read {wasm_path:?}"))?;
        let main = CompiledModule::new(&bytes).with_context(|| format!("failed to compile {wasm_path:?}"))?;
        let imports = resolve_imports(&mut store, &wasi, main.module(), &linked)?;
        let main_instance = main.instantiate(&mut store, &imports).context("failed to instantiate module")?;

        Ok(Self { store, wasi, linked, main, main_instance })
    }

    #[must_use]
    pub fn wasi(&self) -> &Arc<WasiCtx> {
        &self.wasi
    }

    #[must_use]
    pub fn main_module(&self) -> &Module {
        self.main.module()
    }

    #[must_use]
    pub fn main_instance(&self) -> InstanceIdx {
        self.main_instance
    }

    /// Resolves a `--link`-loaded module by the name it was linked under.
    /// `None` selects the primary module (the batch protocol's plain
    /// `invoke`/`get`, as opposed to `invoke_on`/`get_on`).
    pub fn resolve_target(&self, name: Option<&str>) -> Result<(InstanceIdx, &Module), Error> {
        match name {
            None => Ok((self.main_instance, self.main.module())),
            Some(name) => self
                .linked
                .iter()
                .find(|l| l.name == name)
                .map(|l| (l.instance, l.compiled.module()))
                .ok_or_else(|| anyhow!("no module linked under the name {name:?}")),
        }
    }

    /// Looks up an exported function by name on the given target,
    /// returning its `FuncIdx` and signature.
    pub fn exported_func(&self, target: Option<&str>, name: &str) -> Result<(zwasm::FuncIdx, zwasm_core::FuncType), Error> {
        let (instance_idx, module) = self.resolve_target(target)?;
        let instance = self.store.instance(instance_idx).expect("resolved instance");
        match instance.export(name) {
            Some(Extern::Func(idx)) => {
                let ty = self
                    .store
                    .func(idx)
                    .map(zwasm::FuncRecord::ty)
                    .cloned()
                    .expect("resolved function");
                Ok((idx, ty))
            }
            Some(_) => bail!("export {name:?} is not a function"),
            None => bail!("no exported function named {name:?}{}", module_suffix(module)),
        }
    }

    /// Looks up an exported global by name, returning its current value
    /// and declared type.
    pub fn exported_global(&self, target: Option<&str>, name: &str) -> Result<(u64, zwasm_core::ValType), Error> {
        let (instance_idx, _) = self.resolve_target(target)?;
        let instance = self.store.instance(instance_idx).expect("resolved instance");
        match instance.export(name) {
            Some(Extern::Global(idx)) => {
                let global = self.store.global(idx).expect("resolved global");
                Ok((global.get(), global.ty().content))
            }
            Some(_) => bail!("export {name:?} is not a global"),
            None => bail!("no exported global named {name:?}"),
        }
    }
}

fn module_suffix(module: &Module) -> String {
    let names: Vec<_> = module
        .exports
        .iter()
        .filter(|e| matches!(e.kind, zwasm::ExportKind::Func))
        .map(|e| e.name.as_str())
        .collect();
    if names.is_empty() {
        String::from(" (module exports no functions)")
    } else {
        format!(" (module exports: {})", names.join(", "))
    }
}

fn resolve_imports(store: &mut Store, wasi: &Arc<WasiCtx>, module: &Module, linked: &[Linked]) -> Result<Imports, Error> {
    let mut imports = Imports::new();
    for import in &module.imports {
        if let Some(ext) = zwasm_wasi::resolve(store, wasi, &import.module, &import.name) {
            imports.push(ext);
            continue;
        }
        if let Some(found) = linked.iter().find(|l| l.name == import.module) {
            let instance = store.instance(found.instance).expect("linked instance");
            if let Some(ext) = instance.export(&import.name) {
                imports.push(ext);
                continue;
            }
        }
        bail!("unresolved import: {}::{}", import.module, import.name);
    }
    Ok(imports)
}
