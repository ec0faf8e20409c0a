//! Tier 3: an ARM64 just-in-time compiler backend for hot `zwasm`
//! functions (§4.5).
//!
//! This crate knows nothing about `Store`, `Instance`, or `Vm` — it
//! compiles a [`zwasm_ir::RegFunc`] into a blob of native code behind the
//! raw-pointer [`abi::JitFn`] ABI, and calls back into the engine only
//! through the [`abi::Trampolines`] the caller supplies. That keeps the
//! dependency edge one-directional: `zwasm` depends on `zwasm-jit`, never
//! the reverse.
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

mod abi;
mod buffer;
mod codegen;
mod encode;
mod guard;

pub use abi::{JitFn, Trampolines};
pub use codegen::{compile, CompileError, JitCode};
pub use guard::{install_guard_handler, GuardRegistry};
