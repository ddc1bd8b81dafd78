//! Basic block listing loader.
//!
//! Input is a disassembly-style listing: one `address: encoding` pair per
//! line (4 hex digits for a narrow Thumb encoding, 8 for a wide one), with
//! anything after the encoding ignored. Blank lines separate basic blocks,
//! `#` starts a comment line.

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::isa::{is_wide_prefix, Inst};
use crate::utils::parse_hex;

/// Parse a listing into basic blocks of decoded instructions.
pub fn parse_listing(src: &str) -> Result<Vec<Vec<Inst>>> {
    let line_re = Regex::new(r"^\s*([0-9a-fA-F]+):\s*([0-9a-fA-F]{4,8})(\s|$)").unwrap();

    let mut blocks: Vec<Vec<Inst>> = Vec::new();
    let mut current: Vec<Inst> = Vec::new();

    for (lineno, line) in src.lines().enumerate() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.trim_start().starts_with('#') {
            continue;
        }
        let cap = line_re
            .captures(line)
            .with_context(|| format!("line {}: expected `address: encoding`", lineno + 1))?;
        let addr = parse_hex(&cap[1])
            .with_context(|| format!("line {}: bad address", lineno + 1))? as u32;
        let enc = &cap[2];
        let raw = parse_hex(enc).with_context(|| format!("line {}: bad encoding", lineno + 1))?;
        let inst = match enc.len() {
            4 => {
                if is_wide_prefix(raw as u16) {
                    bail!(
                        "line {}: `{}` opens a 32-bit encoding, expected 8 digits",
                        lineno + 1,
                        enc
                    );
                }
                Inst::decode(addr, raw as u32, false)
            }
            8 => Inst::decode(addr, raw as u32, true),
            _ => bail!("line {}: encoding must be 4 or 8 hex digits", lineno + 1),
        };
        current.push(inst);
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    Ok(blocks)
}
