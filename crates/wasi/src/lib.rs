//! §6 "Host-call ABI (WASI)": a capability-gated subset of
//! `wasi_snapshot_preview1` for the zwasm runtime — enough for guests built
//! against `wasm32-wasi` to read their arguments and environment, write to
//! stdout/stderr, and read/write files under directories the embedder has
//! explicitly preopened.
//!
//! Every host call consults the [`zwasm_core::Capabilities`] baked into the
//! [`WasiCtx`] it was built with; none of it reaches the OS unless the
//! embedder opted in.

mod ctx;
mod errno;
mod funcs;

pub use ctx::{WasiBuilder, WasiCtx};
pub use funcs::resolve;
