//! Guard-page fault recovery (§4.7): a JIT function that elided a bounds
//! check relies on the OS to fault on an out-of-range linear-memory access
//! inside the 4 GiB reservation ([`crate::abi`] doesn't see this — it's
//! entirely a signal-handler concern).
//!
//! The registry below is append-only and read under a short-lived lock
//! (§5's shared-resource policy: "a process-wide table, appended to as
//! functions compile, never removed from"). The handler itself runs with
//! signals essentially disabled and must not allocate, log, or panic.

use alloc::vec::Vec;
use spin::Mutex;

/// One compiled function's recoverable address range: if the fault PC
/// falls in `[code_start, code_end)`, resume at `recovery_stub` instead of
/// delivering the signal to the process's previous handler.
#[derive(Debug, Clone, Copy)]
struct GuardEntry {
    code_start: usize,
    code_end: usize,
    recovery_stub: usize,
}

pub struct GuardRegistry {
    entries: Mutex<Vec<GuardEntry>>,
}

impl Default for GuardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }

    /// Registers `recovery_stub` as the resume address for faults whose PC
    /// lands in `[code_start, code_end)`. Called once per compiled
    /// function, right after it is published (made executable).
    pub fn register(&self, code_start: usize, code_end: usize, recovery_stub: usize) {
        self.entries.lock().push(GuardEntry { code_start, code_end, recovery_stub });
    }

    fn lookup(&self, fault_pc: usize) -> Option<usize> {
        self.entries
            .lock()
            .iter()
            .find(|e| fault_pc >= e.code_start && fault_pc < e.code_end)
            .map(|e| e.recovery_stub)
    }
}

static REGISTRY: GuardRegistry = GuardRegistry::new();

#[must_use]
pub fn global_registry() -> &'static GuardRegistry {
    &REGISTRY
}

#[cfg(all(target_os = "linux", target_arch = "aarch64", feature = "std"))]
mod linux_aarch64 {
    use super::REGISTRY;
    use core::ffi::c_void;
    use libc::{c_int, sigaction, siginfo_t, ucontext_t, SA_SIGINFO, SIGSEGV};

    extern "C" fn handle_segv(_signum: c_int, _info: *mut siginfo_t, ctx: *mut c_void) {
        // SAFETY: the kernel passes a valid `ucontext_t*` for an
        // `SA_SIGINFO` handler on this target.
        let ucontext = unsafe { &mut *(ctx as *mut ucontext_t) };
        let fault_pc = ucontext.uc_mcontext.pc as usize;

        if let Some(stub) = REGISTRY.lookup(fault_pc) {
            ucontext.uc_mcontext.pc = stub as u64;
            return;
        }

        // Not one of ours: restore the default disposition and re-raise so
        // the process terminates the way it would have without this
        // handler installed at all (never swallow a real segfault).
        unsafe {
            let mut default: sigaction = core::mem::zeroed();
            default.sa_sigaction = libc::SIG_DFL;
            libc::sigaction(SIGSEGV, &default, core::ptr::null_mut());
            libc::raise(SIGSEGV);
        }
    }

    /// Installs the process-wide `SIGSEGV` handler. Idempotent to call more
    /// than once; only the first call has an effect in a given process
    /// since `sigaction` simply overwrites with the same handler again.
    pub fn install() -> bool {
        unsafe {
            let mut action: sigaction = core::mem::zeroed();
            action.sa_sigaction = handle_segv as usize;
            action.sa_flags = SA_SIGINFO;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(SIGSEGV, &action, core::ptr::null_mut()) == 0
        }
    }
}

/// Installs the guard-page fault handler. Returns `false` (a no-op) on
/// targets where guard-page elision isn't implemented; callers should
/// treat that as "the JIT must not elide bounds checks on this host" and
/// the translator/config layer falls back to explicit checks accordingly.
#[must_use]
pub fn install_guard_handler() -> bool {
    #[cfg(all(target_os = "linux", target_arch = "aarch64", feature = "std"))]
    {
        linux_aarch64::install()
    }
    #[cfg(not(all(target_os = "linux", target_arch = "aarch64", feature = "std")))]
    {
        false
    }
}
