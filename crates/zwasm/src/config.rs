//! Explicit engine configuration (§9 REDESIGN FLAGS: "Profile / Trace
//! configuration... passed as explicit configuration structs... rather
//! than set on globals"). Every knob the interpreter, JIT and store
//! consult is reachable from a [`Config`] value the embedder constructs up
//! front; nothing here is read from a process-global.

/// Tiering and resource-limit knobs, given to [`crate::store::Store::new`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Calls before a function is considered for Tier 3 promotion (§4.4).
    pub hot_call_threshold: u32,
    /// Taken back-edges (loop iterations) before an in-progress Tier 2
    /// execution requests on-stack promotion (§4.4).
    pub hot_back_edge_threshold: u32,
    /// Whether Tier 3 compilation ever runs. `false` pins every function
    /// to the Tier 2 interpreter — useful on non-ARM64 hosts or when
    /// debugging miscompiles.
    pub jit_enabled: bool,
    /// Whether linear memories reserve a 4 GiB guard zone and elide
    /// explicit bounds checks in compiled code (§4.7). Ignored (treated as
    /// `false`) if the guard-page signal handler fails to install.
    pub guard_pages: bool,
    /// Ceiling on any single linear memory's page count, independent of
    /// the module's own declared maximum (§9 "Open Questions": checked
    /// before allocation, not after).
    pub max_memory_pages: Option<u64>,
    /// Fuel metering; `None` disables the fuel check in the interpreter's
    /// dispatch loop entirely rather than checking against an infinite
    /// budget every instruction.
    pub fuel: Option<u64>,
    pub trace: TraceConfig,
    pub capabilities: zwasm_core::Capabilities,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hot_call_threshold: 1_000,
            hot_back_edge_threshold: 10_000,
            jit_enabled: cfg!(target_arch = "aarch64"),
            guard_pages: cfg!(target_arch = "aarch64"),
            max_memory_pages: None,
            fuel: None,
            trace: TraceConfig::default(),
            capabilities: zwasm_core::Capabilities::none(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fuel(mut self, fuel: Option<u64>) -> Self {
        self.fuel = fuel;
        self
    }

    #[must_use]
    pub fn with_max_memory_pages(mut self, pages: Option<u64>) -> Self {
        self.max_memory_pages = pages;
        self
    }

    #[must_use]
    pub fn with_jit_enabled(mut self, enabled: bool) -> Self {
        self.jit_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_guard_pages(mut self, enabled: bool) -> Self {
        self.guard_pages = enabled;
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: zwasm_core::Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: TraceConfig) -> Self {
        self.trace = trace;
        self
    }
}

/// What the engine reports while running, independent of whether tracing
/// is ever consulted by a caller — constructing one costs nothing unless
/// a field is actually turned on.
#[derive(Debug, Clone, Default)]
pub struct TraceConfig {
    /// Log every opcode dispatched in Tier 2 at `trace` level.
    pub log_opcodes: bool,
    /// Log each function's tiering transitions (promoted to Tier 3,
    /// demoted after a failed compile) at `debug` level.
    pub log_tiering: bool,
    /// Count per-opcode dispatch totals, retrievable for `--dump-regir`
    /// style diagnostics. Disables JIT promotion for the profiled run
    /// (§4.4: profiling and native code generation are mutually
    /// exclusive for a given execution).
    pub profile: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Release,
    Debug,
}
