//! A WebAssembly runtime built around a tiered execution pipeline: Wasm
//! binaries are decoded, validated and lowered to a register-based
//! intermediate representation once, then executed by a bytecode
//! interpreter (Tier 2) that promotes hot functions to native ARM64 code
//! (Tier 3) as they accumulate calls.
//!
//! The overall structure mirrors `wasmtime`'s split between a front end
//! (decode/validate/translate, producing an immutable [`CompiledModule`])
//! and a `Store`-centric runtime (`Instance`s holding only indices into a
//! `Store`'s arenas, never direct references).
//!
//! # Example
//!
//! ```
//! use zwasm::{CompiledModule, Config, Imports, Store};
//!
//! # fn main() -> Result<(), zwasm_core::WasmError> {
//! // `(module (func (export "answer") (result i32) i32.const 42))`
//! let wasm: &[u8] = &[
//!     0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00,
//!     0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f,
//!     0x03, 0x02, 0x01, 0x00,
//!     0x07, 0x0a, 0x01, 0x06, b'a', b'n', b's', b'w', b'e', b'r', 0x00, 0x00,
//!     0x0a, 0x06, 0x01, 0x04, 0x00, 0x41, 0x2a, 0x0b,
//! ];
//!
//! let compiled = CompiledModule::new(wasm)?;
//! let mut store = Store::new(Config::default());
//! let _instance = compiled.instantiate(&mut store, &Imports::new())?;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate Features
//!
//! | Feature | Description |
//! |:-:|:--|
//! | `std` | Enables the standard library (`std::error::Error` impls for this crate's error types, and the same for `zwasm-core`/`zwasm-collections`/`zwasm-ir`). Disabling it keeps the crate `no_std` + `alloc`, suitable for embedding on platforms without an OS. Enabled by default. |

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(clippy::missing_errors_doc)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod compiled_module;
mod config;
mod engine;
mod func;
mod global;
mod instance;
mod leb128;
mod memory;
mod module;
mod store;
mod table;
mod translate;
mod trampoline;
mod validate;

pub use compiled_module::CompiledModule;
pub use config::{Config, Profile, TraceConfig};
pub use engine::{call_function, invoke, Caller, Vm};
pub use func::{FuncRecord, HostFunc, HostFuncRecord, WasmFunc};
pub use global::GlobalInstance;
pub use instance::{instantiate, Extern, Imports, Instance};
pub use memory::{LinearMemory, GUARD_ZONE_BYTES};
pub use module::{decode, Export, ExportKind, Import, Module};
pub use store::{FuncIdx, GlobalIdx, InstanceIdx, MemoryIdx, Store, TableIdx};
pub use table::{RefValue, Table};

pub use zwasm_core::{
    Capabilities, DecodeError, FuncType, InstantiationError, RefType, Trap, TrapCode, ValType,
    ValidationError, WasmError,
};
