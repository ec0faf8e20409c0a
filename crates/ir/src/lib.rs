//! The register-based intermediate representation produced by lowering
//! (§4.3) and consumed by both the Tier 2 interpreter and the Tier 3 JIT.
//!
//! A [`RegInstr`] is a fixed 8-byte word; a [`RegFunc`] is the flat
//! instruction stream plus an out-of-line 64-bit immediate pool for a
//! single Wasm function.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod func;
mod instr;
mod op;

#[cfg(test)]
mod tests;

pub use func::{RegFunc, FRAME_RESERVED_SLOTS, MAX_VREG};
pub use instr::{Pc, RegInstr};
pub use op::{InvalidOp, Op};
