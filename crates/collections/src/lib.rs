//! Fast arena allocators backing the `zwasm` Store.
//!
//! They cannot deallocate single entities; the Store is an append-only
//! index space for the lifetime of its owning `Vm` (§3, §5: "Instances hold
//! weak indices only; dropping the Store invalidates all Instances").
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std as alloc;

pub mod arena;
mod index;

pub use arena::{Arena, ArenaIndex, Iter, IterMut};
