//! §6 "Batch protocol": a line-oriented `invoke`/`invoke_on`/`get`/`get_on`
//! command language read from stdin when `zwasm run --batch` is given.
//! Kept separate from `commands::run` so the line-parsing grammar (name
//! tokens are length-prefixed, not whitespace-delimited, since an export
//! name may itself contain spaces) has its own focused module.

use anyhow::{anyhow, bail, Error};

use crate::context::Context;
use crate::values::{format_result, parse_v128};

/// Parses and executes one batch-protocol command line, returning the
/// text that follows `ok ` in the response (empty string for a call with
/// no results).
///
/// # Errors
///
/// Any parse failure or propagated [`zwasm_core::WasmError`]; the caller
/// renders this as `error <kind>`.
pub fn dispatch(ctx: &mut Context, line: &str) -> Result<String, Error> {
    let (cmd, rest) = split_first_word(line);
    match cmd {
        "invoke" => invoke(ctx, None, rest),
        "invoke_on" => {
            let (target, rest) = split_first_word(rest);
            invoke(ctx, Some(target), rest)
        }
        "get" => get(ctx, None, rest),
        "get_on" => {
            let (target, rest) = split_first_word(rest);
            get(ctx, Some(target), rest)
        }
        other => bail!("unknown batch command {other:?}"),
    }
}

fn invoke(ctx: &mut Context, target: Option<&str>, rest: &str) -> Result<String, Error> {
    let (name, rest) = parse_name_token(rest)?;
    let (func_idx, ty) = ctx.exported_func(target, &name)?;
    let raw_args = parse_raw_args(&mut ctx.store, rest)?;
    if raw_args.len() != ty.params().len() {
        bail!("function {name:?} expects {} argument(s), got {}", ty.params().len(), raw_args.len());
    }
    let mut results = vec![0u64; ty.results().len()];
    zwasm::invoke(&mut ctx.store, ctx.main_instance(), func_idx, &raw_args, &mut results)?;
    let rendered: Vec<String> =
        ty.results().iter().zip(results.iter()).map(|(t, v)| format_result(&ctx.store, *t, *v)).collect();
    Ok(rendered.join(" "))
}

fn get(ctx: &Context, target: Option<&str>, rest: &str) -> Result<String, Error> {
    let (name, _rest) = parse_name_token(rest)?;
    let (value, ty) = ctx.exported_global(target, &name)?;
    Ok(format_result(&ctx.store, ty, value))
}

/// Parses a `<len>:<name>` or `hex:<hex>` name token, returning the
/// decoded name and whatever text follows it.
fn parse_name_token(rest: &str) -> Result<(String, &str), Error> {
    let rest = rest.trim_start();
    if let Some(hex_and_rest) = rest.strip_prefix("hex:") {
        let (token, remainder) = split_first_word(hex_and_rest);
        let bytes = decode_hex(token)?;
        let name = String::from_utf8(bytes).map_err(|e| anyhow!("export name is not valid UTF-8: {e}"))?;
        return Ok((name, remainder));
    }
    let colon = rest.find(':').ok_or_else(|| anyhow!("expected <len>:<name>, got {rest:?}"))?;
    let len: usize = rest[..colon].parse().map_err(|_| anyhow!("invalid name length in {rest:?}"))?;
    let after_colon = &rest[colon + 1..];
    if after_colon.len() < len {
        bail!("name token claims length {len} but only {} bytes remain", after_colon.len());
    }
    Ok((after_colon[..len].to_string(), &after_colon[len..]))
}

/// Parses the whitespace-separated argument list following a name token:
/// decimal `u64` register fills, or `v128:lo:hi`.
fn parse_raw_args(store: &mut zwasm::Store, rest: &str) -> Result<Vec<u64>, Error> {
    let mut args = Vec::new();
    for tok in rest.split_whitespace() {
        if let Some(v128) = tok.strip_prefix("v128:") {
            let payload = parse_v128(v128)?;
            args.push(u64::from(store.alloc_v128(payload)));
        } else {
            let value = tok.parse::<u64>().map_err(|_| anyhow!("failed to parse argument {tok:?} as u64"))?;
            args.push(value);
        }
    }
    Ok(args)
}

fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, Error> {
    if s.len() % 2 != 0 {
        bail!("hex string {s:?} has odd length");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| anyhow!("invalid hex byte in {s:?}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_length_prefixed_name() {
        let (name, rest) = parse_name_token("3:add 1 2").unwrap();
        assert_eq!(name, "add");
        assert_eq!(rest, "1 2");
    }

    #[test]
    fn parses_hex_name() {
        let (name, rest) = parse_name_token("hex:616464 1 2").unwrap();
        assert_eq!(name, "add");
        assert_eq!(rest, "1 2");
    }

    #[test]
    fn rejects_truncated_name() {
        assert!(parse_name_token("10:short").is_err());
    }

    #[test]
    fn splits_command_words() {
        let (cmd, rest) = split_first_word("invoke_on mod 3:add 1 2");
        assert_eq!(cmd, "invoke_on");
        assert_eq!(rest, "mod 3:add 1 2");
    }
}
