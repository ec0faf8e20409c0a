//! `zwasm features` (§6): lists the Wasm 1.0 + proposal set this runtime's
//! decoder and validator accept. Unlike `wasmi`'s per-engine feature
//! toggles, none of this is configurable at runtime — the list below is
//! exactly what §6 "Wasm binary format" names, so there is nothing to read
//! back from a `Config`; it is simply printed.

use anyhow::Error;
use clap::Parser;

use super::Command;

/// One proposal this runtime accepts, and whether it is executed or only
/// decoded (accepted by the decoder/validator but not run, per §1 and the
/// exception-handling/GC notes in DESIGN.md).
const FEATURES: &[(&str, bool)] = &[
    ("sign-extension", true),
    ("nontrapping-float-to-int", true),
    ("bulk-memory", true),
    ("reference-types", true),
    ("multi-value", true),
    ("fixed-width-simd", true),
    ("tail-call", true),
    ("extended-const", true),
    ("function-references", true),
    ("gc", false),
    ("multi-memory", true),
    ("relaxed-simd", false),
    ("branch-hinting", false),
    ("exception-handling", false),
    ("memory64", true),
    ("wide-arithmetic", false),
    ("custom-page-sizes", true),
    ("threads", false),
];

/// Lists the Wasm 1.0 + proposal set this runtime accepts.
#[derive(Parser)]
pub struct FeaturesCommand {
    /// Print machine-readable JSON instead of a plain list.
    #[clap(long)]
    json: bool,
}

impl Command for FeaturesCommand {
    fn execute(self) -> Result<(), Error> {
        if self.json {
            print!("{{\"features\":[");
            for (i, (name, executed)) in FEATURES.iter().enumerate() {
                if i > 0 {
                    print!(",");
                }
                print!("{{\"name\":\"{name}\",\"executed\":{executed}}}");
            }
            println!("]}}");
        } else {
            for (name, executed) in FEATURES {
                let note = if *executed { "" } else { " (decode-only)" };
                println!("{name}{note}");
            }
        }
        Ok(())
    }
}
