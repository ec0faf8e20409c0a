//! WASI preview1 `errno` values this crate actually returns. Not the full
//! table — only the subset the implemented host calls can produce.

pub const SUCCESS: u32 = 0;
pub const TOOBIG: u32 = 1;
pub const ACCES: u32 = 2;
pub const BADF: u32 = 8;
pub const INVAL: u32 = 28;
pub const IO: u32 = 29;
pub const NOENT: u32 = 44;
pub const NOSYS: u32 = 52;
pub const NOTCAPABLE: u32 = 76;
