//! Subcommand dispatch (§6 CLI surface). Mirrors the teacher CLI's
//! `commands::{Command, WasmiApp}` split: one `clap::Parser` struct per
//! subcommand, a shared `Command` trait to execute it, and a top-level
//! `App` that defaults to `run` when no subcommand is named.

mod features;
mod inspect;
mod run;
mod validate;

use anyhow::Error;
use clap::Parser;

pub use features::FeaturesCommand;
pub use inspect::InspectCommand;
pub use run::RunCommand;
pub use validate::ValidateCommand;

#[derive(Parser)]
#[command(
    name = "zwasm",
    version,
    about = "A standalone tiered WebAssembly runtime: interpreter + ARM64 JIT",
    after_help = "If no subcommand is given, `run` is used."
)]
#[command(args_conflicts_with_subcommands = true)]
pub struct App {
    #[command(subcommand)]
    subcommand: Option<SubCommand>,
    #[command(flatten)]
    run: RunCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Executes a Wasm module (the default subcommand).
    Run(RunCommand),
    /// Prints a module's structure without running it.
    Inspect(InspectCommand),
    /// Decodes and validates a module, printing nothing on success.
    Validate(ValidateCommand),
    /// Lists the Wasm proposals this runtime's decoder/validator accept.
    Features(FeaturesCommand),
}

/// Implemented by every subcommand in order to execute it.
pub trait Command {
    /// # Errors
    ///
    /// Any fatal error surfaced while loading or running the module; the
    /// caller converts this into `error: <context>: <kind>` on stderr and
    /// exit code 1 (§7 "User-visible behavior"), except where `execute`
    /// itself already called `process::exit` with a `proc_exit` code.
    fn execute(self) -> Result<(), Error>;
}

impl Command for App {
    fn execute(self) -> Result<(), Error> {
        match self.subcommand.unwrap_or(SubCommand::Run(self.run)) {
            SubCommand::Run(c) => c.execute(),
            SubCommand::Inspect(c) => c.execute(),
            SubCommand::Validate(c) => c.execute(),
            SubCommand::Features(c) => c.execute(),
        }
    }
}
