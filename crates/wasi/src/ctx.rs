//! §6 "Environment": the process-level state a WASI instance is built
//! against — arguments, environment variables, preopened directories and
//! the open file-descriptor table. Owned by the embedder (the CLI builds
//! one from its flags), shared read/write by every host call through a
//! `Mutex` since [`zwasm::HostFunc::call`] only ever sees `&self` and must
//! stay `Send + Sync`.

use std::fs::File;
use std::sync::Mutex;
use std::path::PathBuf;

use zwasm_core::Capabilities;

pub(crate) enum FdEntry {
    Stdin,
    Stdout,
    Stderr,
    /// A preopened directory, exposed to the guest starting at fd 3.
    PreopenDir { guest_path: String, host_path: PathBuf },
    File(File),
    Closed,
}

/// Everything a WASI host call needs beyond the guest's own memory/globals
/// (which it reaches through [`zwasm::Caller`]).
pub struct WasiCtx {
    pub(crate) capabilities: Capabilities,
    pub(crate) args: Vec<String>,
    pub(crate) env: Vec<(String, String)>,
    pub(crate) fds: Mutex<Vec<FdEntry>>,
}

impl WasiCtx {
    fn new(capabilities: Capabilities, args: Vec<String>, env: Vec<(String, String)>, preopens: Vec<(String, PathBuf)>) -> Self {
        let mut fds = vec![FdEntry::Stdin, FdEntry::Stdout, FdEntry::Stderr];
        for (guest_path, host_path) in preopens {
            fds.push(FdEntry::PreopenDir { guest_path, host_path });
        }
        Self { capabilities, args, env, fds: Mutex::new(fds) }
    }
}

/// Builds a [`WasiCtx`] the way the CLI's `--dir`/`--env`/`--allow-*` flags
/// populate one (§6).
#[derive(Default)]
pub struct WasiBuilder {
    capabilities: Capabilities,
    args: Vec<String>,
    env: Vec<(String, String)>,
    preopens: Vec<(String, PathBuf)>,
}

impl WasiBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Preopens `host_path`, exposed to the guest as `guest_path` (fd 3, 4,
    /// …, in the order preopened). Denied entirely unless `allow_path` is
    /// set on the builder's capabilities.
    #[must_use]
    pub fn preopen_dir(mut self, guest_path: impl Into<String>, host_path: impl Into<PathBuf>) -> Self {
        self.preopens.push((guest_path.into(), host_path.into()));
        self
    }

    #[must_use]
    pub fn build(self) -> WasiCtx {
        WasiCtx::new(self.capabilities, self.args, self.env, self.preopens)
    }
}
