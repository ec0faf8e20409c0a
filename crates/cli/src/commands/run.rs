//! `zwasm run` (§6), the default subcommand. Instantiates a module (plus
//! any `--link`ed siblings), resolves the function to invoke, decodes its
//! arguments from the command line, calls it, and prints the results or
//! propagates its trap as a process exit code (§7 "User-visible
//! behavior"). Also implements the line-oriented `--batch` protocol.
//!
//! Grounded on `wasmi_cli`'s `RunCommand`: flag surface and the
//! invoke-or-fall-back-to-WASI-entry-point resolution are the same shape,
//! generalized for this crate's u64-register ABI and multi-module linking.

use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context as _, Error};
use clap::Parser;
use zwasm::{Config, TraceConfig};
use zwasm_core::Capabilities;
use zwasm_wasi::WasiBuilder;

use super::Command;
use crate::context::Context;
use crate::display::DisplayExportedFuncs;
use crate::values::{decode_args, flatten_args, format_result as format_result_store, KeyValue, LinkSpec};

/// Executes a Wasm module.
#[derive(Parser)]
pub struct RunCommand {
    /// The function to invoke. Falls back to `""` then `"_start"` if
    /// omitted (the conventional WASI entry points).
    #[clap(long = "invoke", value_name = "FUNC")]
    invoke: Option<String>,

    /// Reads newline-delimited `invoke`/`invoke_on`/`get`/`get_on` commands
    /// from stdin instead of running a single invocation (§6 "Batch
    /// protocol").
    #[clap(long)]
    batch: bool,

    /// Links an additional module under `NAME`, instantiated before the
    /// primary module so its exports are available to it and to
    /// `invoke_on`/`get_on` batch commands.
    #[clap(long = "link", value_name = "NAME=PATH", action = clap::ArgAction::Append)]
    link: Vec<LinkSpec>,

    /// Pre-opens a host directory for WASI `path_open`, exposed to the
    /// guest under the same path.
    #[clap(long = "dir", value_name = "PATH", action = clap::ArgAction::Append)]
    dir: Vec<PathBuf>,

    /// Sets an environment variable visible to the guest's WASI `environ`.
    #[clap(long = "env", value_name = "K=V", value_parser(KeyValue::from_str), action = clap::ArgAction::Append)]
    env: Vec<KeyValue>,

    /// Enables opcode-frequency profiling (§4.4); disables JIT promotion
    /// for this run so counts stay meaningful.
    #[clap(long)]
    profile: bool,

    /// Grants WASI filesystem read access.
    #[clap(long = "allow-read")]
    allow_read: bool,
    /// Grants WASI filesystem write access.
    #[clap(long = "allow-write")]
    allow_write: bool,
    /// Grants WASI access to the guest-visible environment.
    #[clap(long = "allow-env")]
    allow_env: bool,
    /// Grants WASI `path_open` under `--dir`-preopened directories.
    #[clap(long = "allow-path")]
    allow_path: bool,
    /// Grants WASI raw file-descriptor operations beyond stdio.
    #[clap(long = "allow-fd")]
    allow_fd: bool,
    /// Grants every capability above.
    #[clap(long = "allow-all")]
    allow_all: bool,

    /// Caps any single linear memory's growth, independent of the
    /// module's own declared maximum (§9 "Open Questions").
    #[clap(long = "max-memory", value_name = "BYTES")]
    max_memory: Option<u64>,

    /// Enables fuel metering; execution traps with `OutOfFuel` once `N`
    /// instructions have run (§4.4).
    #[clap(long, value_name = "N")]
    fuel: Option<u64>,

    /// Comma-separated trace categories to log at `trace`/`debug` level:
    /// `opcodes`, `tiering`.
    #[clap(long, value_name = "CATS")]
    trace: Option<String>,

    /// Dumps the RegIR of module-relative function index `N` to stderr
    /// before running.
    #[clap(long = "dump-regir", value_name = "N")]
    dump_regir: Option<u32>,

    /// Reports Tier 3 JIT compilation status for module-relative function
    /// index `N` to stderr after running.
    #[clap(long = "dump-jit", value_name = "N")]
    dump_jit: Option<u32>,

    /// The Wasm module, followed by arguments to the invoked function (or,
    /// with no `--invoke`, WASI CLI arguments passed to `_start`).
    #[clap(value_name = "FILE.wasm", trailing_var_arg = true)]
    module_and_args: Vec<String>,
}

impl Command for RunCommand {
    fn execute(self) -> Result<(), Error> {
        if self.module_and_args.is_empty() {
            bail!("expected a Wasm module path");
        }
        let wasm_path = PathBuf::from(&self.module_and_args[0]);
        let extra_args = &self.module_and_args[1..];

        let capabilities = self.capabilities();
        let config = self.config(capabilities);
        let mut wasi_builder = WasiBuilder::new().capabilities(capabilities).arg(self.module_and_args[0].clone());
        for arg in extra_args {
            wasi_builder = wasi_builder.arg(arg.clone());
        }
        for kv in &self.env {
            wasi_builder = wasi_builder.env(kv.key.clone(), kv.value.clone());
        }
        for dir in &self.dir {
            let guest_path = dir.to_string_lossy().into_owned();
            wasi_builder = wasi_builder.preopen_dir(guest_path, dir.clone());
        }
        let wasi = wasi_builder.build();

        let mut ctx = Context::new(&wasm_path, config, wasi, &self.link)?;

        if let Some(idx) = self.dump_regir {
            dump_regir(&ctx, idx);
        }

        let result = if self.batch {
            run_batch(&mut ctx)
        } else {
            run_once(&mut ctx, self.invoke.as_deref(), extra_args)
        };

        if let Some(idx) = self.dump_jit {
            dump_jit(&ctx, idx);
        }

        result
    }
}

impl RunCommand {
    fn capabilities(&self) -> Capabilities {
        if self.allow_all {
            return Capabilities::all();
        }
        Capabilities {
            allow_read: self.allow_read,
            allow_write: self.allow_write,
            allow_env: self.allow_env,
            allow_path: self.allow_path,
            allow_fd: self.allow_fd,
        }
    }

    fn config(&self, capabilities: Capabilities) -> Config {
        let mut trace = TraceConfig { profile: self.profile, ..TraceConfig::default() };
        for cat in self.trace.iter().flat_map(|s| s.split(',')) {
            match cat {
                "opcodes" => trace.log_opcodes = true,
                "tiering" => trace.log_tiering = true,
                "" => {}
                other => log::warn!("unknown trace category {other:?}"),
            }
        }
        Config::new()
            .with_fuel(self.fuel)
            .with_max_memory_pages(self.max_memory.map(|bytes| bytes / 65536))
            .with_capabilities(capabilities)
            .with_trace(trace)
    }
}

fn run_once(ctx: &mut Context, invoke: Option<&str>, extra_args: &[String]) -> Result<(), Error> {
    let (func_idx, ty, name) = resolve_invoked(ctx, invoke)?;
    let args = decode_args(&ty, extra_args)?;
    let flat_args = flatten_args(&mut ctx.store, &args);
    let mut raw_results = vec![0u64; ty.results().len()];

    match zwasm::invoke(&mut ctx.store, ctx.main_instance(), func_idx, &flat_args, &mut raw_results) {
        Ok(()) => {
            print_results(&ctx.store, &ty, &raw_results);
            Ok(())
        }
        Err(trap) => {
            if let Some(status) = trap.i32_exit_status() {
                print_results(&ctx.store, &ty, &raw_results);
                process::exit(status);
            }
            Err(anyhow!("failed during execution of {name}: {trap}"))
        }
    }
}

fn resolve_invoked(ctx: &Context, invoke: Option<&str>) -> Result<(zwasm::FuncIdx, zwasm_core::FuncType, String), Error> {
    match invoke {
        Some(name) => {
            let (idx, ty) = ctx
                .exported_func(None, name)
                .map_err(|e| anyhow!("{e}\n\n{}", DisplayExportedFuncs::new(ctx.main_module())))?;
            Ok((idx, ty, name.to_string()))
        }
        None => {
            if let Ok((idx, ty)) = ctx.exported_func(None, "") {
                return Ok((idx, ty, String::new()));
            }
            if let Ok((idx, ty)) = ctx.exported_func(None, "_start") {
                return Ok((idx, ty, "_start".to_string()));
            }
            bail!(
                "did not specify --invoke and no WASI entry point is exported\n\n{}",
                DisplayExportedFuncs::new(ctx.main_module())
            )
        }
    }
}

fn print_results(store: &zwasm::Store, ty: &zwasm_core::FuncType, raw: &[u64]) {
    let rendered: Vec<String> =
        ty.results().iter().zip(raw.iter()).map(|(t, v)| format_result_store(store, *t, *v)).collect();
    if !rendered.is_empty() {
        println!("{}", rendered.join(" "));
    }
}

fn dump_regir(ctx: &Context, idx: u32) {
    let Some(func_idx) = ctx.store.instance(ctx.main_instance()).and_then(|i| i.func(idx)) else {
        eprintln!("--dump-regir: no function at index {idx}");
        return;
    };
    match ctx.store.func(func_idx).and_then(zwasm::FuncRecord::as_wasm) {
        Some(wasm) => {
            eprintln!("; regir for function {idx} ({} vregs, {} locals)", wasm.code().reg_count(), wasm.code().local_count());
            for (pc, instr) in wasm.code().code().iter().enumerate() {
                eprintln!("{pc:>5}: {instr:?}");
            }
        }
        None => eprintln!("--dump-regir: function {idx} is a host import, no RegIR"),
    }
}

fn dump_jit(ctx: &Context, idx: u32) {
    let Some(func_idx) = ctx.store.instance(ctx.main_instance()).and_then(|i| i.func(idx)) else {
        eprintln!("--dump-jit: no function at index {idx}");
        return;
    };
    match ctx.store.func(func_idx).and_then(zwasm::FuncRecord::as_wasm) {
        Some(wasm) => match wasm.jit_code() {
            Some(jit) => eprintln!("--dump-jit: function {idx} compiled to {} bytes of native code", jit.code_size()),
            None => eprintln!("--dump-jit: function {idx} has not been promoted to tier 3 (called {} times)", wasm.call_count()),
        },
        None => eprintln!("--dump-jit: function {idx} is a host import, not JIT-eligible"),
    }
}

/// Reads newline-delimited batch commands from stdin until EOF, writing
/// one `ok ...`/`error ...` response line per command to stdout (§6
/// "Batch protocol").
fn run_batch(ctx: &mut Context) -> Result<(), Error> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read batch command")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match crate::batch::dispatch(ctx, line) {
            Ok(rendered) => format!("ok {rendered}").trim_end().to_string(),
            Err(e) => format!("error {e}"),
        };
        writeln!(out, "{response}").context("failed to write batch response")?;
        out.flush().context("failed to flush stdout")?;
    }
    Ok(())
}
