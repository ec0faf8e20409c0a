//! Converts between the textual values the CLI and the batch protocol
//! accept and the raw `u64` register slots [`zwasm::engine::invoke`] reads
//! and writes. There is no `Val` enum here the way there would be in an
//! embedder API with boxed values — a function's [`FuncType`] is the only
//! thing that tells us how to interpret a slot.

use anyhow::{anyhow, bail, Context as _, Error};
use zwasm::Store;
use zwasm_core::{FuncType, ValType};

/// `NAME=VALUE`, parsed by `--env`.
#[derive(Debug, Clone)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once('=').ok_or_else(|| anyhow!("expected NAME=VALUE, got {s:?}"))?;
        if key.is_empty() {
            bail!("empty environment variable name in {s:?}");
        }
        Ok(Self { key: key.to_string(), value: value.to_string() })
    }
}

/// `NAME=PATH`, parsed by `--link`.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub name: String,
    pub path: std::path::PathBuf,
}

impl std::str::FromStr for LinkSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = s.split_once('=').ok_or_else(|| anyhow!("expected NAME=PATH, got {s:?}"))?;
        if name.is_empty() {
            bail!("empty link name in {s:?}");
        }
        Ok(Self { name: name.to_string(), path: path.into() })
    }
}

/// One decoded argument, register slot plus an extra 128-bit payload for
/// `v128` (allocated into the `Store`'s v128 pool only once the call site
/// actually has a `&mut Store` to allocate into).
pub enum ArgValue {
    Reg(u64),
    V128(u128),
}

/// Parses command-line invocation arguments (`zwasm run a.wasm -- 1 2 3`)
/// against a function's parameter types. Integers parse as decimal (signed
/// or unsigned), floats by `FromStr`, `v128` as `lo:hi` hex or decimal
/// pairs. Reference types cannot be synthesized from text and are
/// rejected, matching what every teacher-derived CLI in this ecosystem
/// does.
pub fn decode_args(ty: &FuncType, raw: &[String]) -> Result<Vec<ArgValue>, Error> {
    if raw.len() != ty.params().len() {
        bail!("function expects {} argument(s), got {}", ty.params().len(), raw.len());
    }
    ty.params()
        .iter()
        .zip(raw.iter())
        .enumerate()
        .map(|(i, (p, text))| decode_one_arg(*p, text).with_context(|| format!("argument {i} ({text:?})")))
        .collect()
}

fn decode_one_arg(ty: ValType, text: &str) -> Result<ArgValue, Error> {
    Ok(match ty {
        ValType::I32 => ArgValue::Reg(u64::from(
            text.parse::<i32>().map_err(|_| anyhow!("failed to parse {text:?} as i32"))? as u32,
        )),
        ValType::I64 => {
            ArgValue::Reg(text.parse::<i64>().map_err(|_| anyhow!("failed to parse {text:?} as i64"))? as u64)
        }
        ValType::F32 => ArgValue::Reg(u64::from(
            text.parse::<f32>().map_err(|_| anyhow!("failed to parse {text:?} as f32"))?.to_bits(),
        )),
        ValType::F64 => {
            ArgValue::Reg(text.parse::<f64>().map_err(|_| anyhow!("failed to parse {text:?} as f64"))?.to_bits())
        }
        ValType::V128 => ArgValue::V128(parse_v128(text)?),
        ValType::Ref(_) => bail!("cannot synthesize a reference-typed argument from the command line"),
        ValType::Unknown => bail!("cannot synthesize a value for an unknown type"),
    })
}

/// Parses the batch protocol's `v128:lo:hi` argument form (the `v128:`
/// prefix already stripped by the caller), each half a decimal or
/// `0x`-prefixed hex `u64`.
pub fn parse_v128(rest: &str) -> Result<u128, Error> {
    let (lo, hi) = rest.split_once(':').ok_or_else(|| anyhow!("expected v128:lo:hi, got v128:{rest}"))?;
    let lo = parse_u64_flexible(lo)?;
    let hi = parse_u64_flexible(hi)?;
    Ok((u128::from(hi) << 64) | u128::from(lo))
}

fn parse_u64_flexible(s: &str) -> Result<u64, Error> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).map_err(|_| anyhow!("failed to parse {s:?} as hex u64"))
    } else {
        s.parse::<u64>().map_err(|_| anyhow!("failed to parse {s:?} as u64"))
    }
}

/// Lowers decoded arguments into the flat `&[u64]` slice `invoke` expects,
/// interning any `v128` payloads into the store first.
pub fn flatten_args(store: &mut Store, args: &[ArgValue]) -> Vec<u64> {
    args.iter()
        .map(|a| match a {
            ArgValue::Reg(v) => *v,
            ArgValue::V128(v) => u64::from(store.alloc_v128(*v)),
        })
        .collect()
}

/// Formats one result register as text given the type it's supposed to
/// hold, resolving `v128` slab indices back through the store.
pub fn format_result(store: &Store, ty: ValType, raw: u64) -> String {
    let v128 = matches!(ty, ValType::V128).then(|| store.v128(raw as u32)).flatten();
    crate::display::format_result(ty, raw, v128)
}
