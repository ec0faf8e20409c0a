//! `zwasm validate` (§6): runs decode → validate → translate (§4.1-§4.3)
//! over a module and prints nothing on success, matching the Wasm spec
//! testsuite's `assert_valid`/`assert_invalid` convention. Exit code alone
//! carries the verdict; `error: ...` on stderr explains a failure (§7).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Error};
use clap::Parser;
use zwasm::CompiledModule;

use super::Command;

/// Decodes and validates a Wasm module without instantiating or running it.
#[derive(Parser)]
pub struct ValidateCommand {
    /// The `.wasm` file to validate.
    #[clap(value_name = "FILE.wasm")]
    file: PathBuf,
}

impl Command for ValidateCommand {
    fn execute(self) -> Result<(), Error> {
        let bytes = fs::read(&self.file).with_context(|| format!("failed to read {:?}", self.file))?;
        CompiledModule::new(&bytes).with_context(|| format!("module {:?} is invalid", self.file))?;
        Ok(())
    }
}
