//! Core primitives shared by every layer of the `zwasm` runtime.
//!
//! This crate intentionally has no knowledge of Wasm bytecode, modules or
//! instances: it only defines the value- and error-level vocabulary
//! (`ValType`, `FuncType`, `TrapCode`, `WasmError`, `Capabilities`, `Fuel`)
//! that every other crate in the workspace builds on.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(clippy::missing_errors_doc)]

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std as alloc;

mod capabilities;
mod error;
mod fuel;
mod trap;
mod ty;

pub use capabilities::Capabilities;
pub use error::{DecodeError, InstantiationError, ValidationError, WasmError};
pub use fuel::{Fuel, FuelError};
pub use trap::{InvalidTrapCode, Trap, TrapCode};
pub use ty::{FuncType, RefType, ValType};
