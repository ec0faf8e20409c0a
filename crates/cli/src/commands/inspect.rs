//! `zwasm inspect` (§6): prints a module's section structure without
//! instantiating or running it — the read-only counterpart to `run`.
//! Grounded on `wasmi_cli`'s `DisplayExportedFuncs` idea, generalized to
//! cover every section §3's `Module` record carries rather than just
//! exported functions.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Error};
use clap::Parser;
use zwasm::{CompiledModule, ExportKind};

use crate::display::DisplayFuncType;
use super::Command;

/// Prints a module's types, imports, exports and resource counts.
#[derive(Parser)]
pub struct InspectCommand {
    /// Print machine-readable JSON instead of a plain report.
    #[clap(long)]
    json: bool,
    /// The `.wasm` file to inspect.
    #[clap(value_name = "FILE.wasm")]
    file: PathBuf,
}

impl Command for InspectCommand {
    fn execute(self) -> Result<(), Error> {
        let bytes = fs::read(&self.file).with_context(|| format!("failed to read {:?}", self.file))?;
        let compiled = CompiledModule::new(&bytes).with_context(|| format!("failed to compile {:?}", self.file))?;
        let module = compiled.module();

        if self.json {
            print_json(module);
        } else {
            print_text(module);
        }
        Ok(())
    }
}

fn print_text(module: &zwasm::Module) {
    println!("types: {}", module.types.len());
    println!(
        "functions: {} ({} imported, {} defined)",
        module.total_funcs(),
        module.num_imported_funcs,
        module.funcs.len()
    );
    println!(
        "tables: {} ({} imported, {} defined)",
        module.total_tables(),
        module.num_imported_tables,
        module.tables.len()
    );
    println!(
        "memories: {} ({} imported, {} defined)",
        module.total_memories(),
        module.num_imported_memories,
        module.memories.len()
    );
    println!(
        "globals: {} ({} imported, {} defined)",
        module.total_globals(),
        module.num_imported_globals,
        module.globals.len()
    );
    println!("element segments: {}", module.elements.len());
    println!("data segments: {}", module.data.len());
    match module.start {
        Some(idx) => println!("start function: {idx}"),
        None => println!("start function: none"),
    }

    if !module.imports.is_empty() {
        println!("\nimports:");
        for import in &module.imports {
            println!("  {}::{}", import.module, import.name);
        }
    }

    if !module.exports.is_empty() {
        println!("\nexports:");
        for export in &module.exports {
            match export.kind {
                ExportKind::Func => {
                    let ty = module.func_type(export.index).cloned().unwrap_or_default();
                    println!("  {}", DisplayFuncType { name: &export.name, ty: &ty });
                }
                ExportKind::Table => println!("  table {} -> table#{}", export.name, export.index),
                ExportKind::Memory => println!("  memory {} -> memory#{}", export.name, export.index),
                ExportKind::Global => println!("  global {} -> global#{}", export.name, export.index),
            }
        }
    }
}

fn print_json(module: &zwasm::Module) {
    print!(
        "{{\"types\":{},\"functions\":{},\"tables\":{},\"memories\":{},\"globals\":{},\"elements\":{},\"data\":{},",
        module.types.len(),
        module.total_funcs(),
        module.total_tables(),
        module.total_memories(),
        module.total_globals(),
        module.elements.len(),
        module.data.len(),
    );
    match module.start {
        Some(idx) => print!("\"start\":{idx},"),
        None => print!("\"start\":null,"),
    }
    print!("\"exports\":[");
    for (i, export) in module.exports.iter().enumerate() {
        if i > 0 {
            print!(",");
        }
        let kind = match export.kind {
            ExportKind::Func => "func",
            ExportKind::Table => "table",
            ExportKind::Memory => "memory",
            ExportKind::Global => "global",
        };
        print!("{{\"name\":{:?},\"kind\":\"{kind}\",\"index\":{}}}", export.name, export.index);
    }
    print!("],\"imports\":[");
    for (i, import) in module.imports.iter().enumerate() {
        if i > 0 {
            print!(",");
        }
        print!("{{\"module\":{:?},\"name\":{:?}}}", import.module, import.name);
    }
    println!("]}}");
}
