//! # `snes65816` core library
//!
//! This library is the shared engine behind three user-facing tools for
//! 65816/SPC700/SuperFX ROM hacking: an assembler, a disassembler, and a
//! language server. The `assemble`, `disassemble`, and `lsp` binaries under
//! `src/bin` are thin front ends over it.
//!
//! ## Architecture
//!
//! * `lang::asm` is the shared engine: tokenizer and source reader, expression
//!   evaluator, opcode table, symbol store, two-pass assembler session, M/X
//!   state tracker, linter, disassembler, hook manifest, and project graph.
//! * `lang::server` holds generic traits and helpers used to answer LSP
//!   requests (hover, completion, semantic tokens, checkpoints) regardless of
//!   which analyzer produced the data, mirroring how a single server crate can
//!   host more than one language's worth of tooling.
//! * `lang` itself holds the `Document` type and small helpers shared by both.
//! * `cli` builds the `clap::Command`s the `assemble` and `disassemble`
//!   binaries parse their arguments with.

pub mod cli;
pub mod lang;

use std::fmt::Write;

/// Convenience alias used throughout the crate for boxed, type-erased errors.
pub type DYNERR = Box<dyn std::error::Error>;
/// Convenience alias for fallible operations with no success payload.
pub type STDRESULT = Result<(), DYNERR>;

/// Render a byte slice as rows of hex plus an ascii gutter, in the manner of a hex editor.
/// Used by the CLI `--summary` output and by hover text for raw data regions.
pub fn display_block(start_addr: u32, block: &[u8]) -> String {
    let mut out = String::new();
    let mut slice_start = 0;
    loop {
        let row_label = start_addr as usize + slice_start;
        let slice_end = std::cmp::min(slice_start + 16, block.len());
        let slice = &block[slice_start..slice_end];
        write!(out, "{:06X} : ", row_label).expect("unreachable");
        for byte in slice {
            write!(out, "{:02X} ", byte).expect("unreachable");
        }
        for _blank in slice_end..slice_start + 16 {
            out.push_str("   ");
        }
        out.push_str("| ");
        for byte in slice {
            let c = if *byte >= 0x20 && *byte < 0x7f { *byte as char } else { '.' };
            out.push(c);
        }
        out.push('\n');
        slice_start += 16;
        if slice_end == block.len() {
            break;
        }
    }
    out
}

#[test]
fn test_display_block_wraps_at_16() {
    let block: Vec<u8> = (0..20).collect();
    let rendered = display_block(0x8000, &block);
    assert_eq!(rendered.lines().count(), 2);
}
