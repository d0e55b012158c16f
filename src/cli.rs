//! Command line argument definitions for the `assemble` and
//! `disassemble` binaries. Grounded on the teacher's `cli.rs`: one builder
//! function per binary, `clap`'s non-derive `Command`/`arg!` style, and
//! `ValueHint::FilePath` on path-shaped arguments.

use clap::{arg, crate_version, Arg, ArgAction, Command, ValueHint};

pub fn build_assemble_cli() -> Command {
    Command::new("assemble")
        .version(crate_version!())
        .about("Assemble a 65816/SPC700/SuperFX source tree into an existing SNES ROM image")
        .arg(arg!(<MAIN> "path to the root source file").value_hint(ValueHint::FilePath))
        .arg(arg!(<ROM> "path to the ROM image to patch in place").value_hint(ValueHint::FilePath))
        .arg(
            arg!(-c --config <PATH> "path to the project configuration file (defaults to snes65816.json next to MAIN)")
                .required(false)
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("emit")
                .long("emit")
                .help("emit a machine-readable artifact: diagnostics.json, symbols.mlb, symbols.sym, or hooks.json")
                .value_name("PATH")
                .action(ArgAction::Append)
                .required(false),
        )
        .arg(arg!(--summary "print a hex-dump summary of every write block to stderr").action(ArgAction::SetTrue))
        .arg(arg!(--"no-summary" "suppress the hex-dump summary").action(ArgAction::SetTrue))
}

pub fn build_disassemble_cli() -> Command {
    Command::new("disassemble")
        .version(crate_version!())
        .about("Disassemble a bank range of a SNES ROM image into re-assemblable source")
        .arg(arg!(--rom <PATH> "path to the ROM image").value_hint(ValueHint::FilePath))
        .arg(
            arg!(--symbols <PATH> "an externally supplied .mlb symbol table")
                .required(false)
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            arg!(--hooks <PATH> "a hook manifest used to seed and annotate the listing")
                .required(false)
                .value_hint(ValueHint::FilePath),
        )
        .arg(arg!(--"bank-start" <HH> "first bank to decode, as two hex digits"))
        .arg(arg!(--"bank-end" <HH> "last bank to decode, inclusive, as two hex digits"))
        .arg(
            arg!(--mapper <NAME> "memory mapper used to translate SNES addresses to ROM offsets")
                .required(false)
                .value_parser(["lorom", "hirom", "exlorom", "exhirom"])
                .default_value("lorom"),
        )
        .arg(arg!(--out <DIR> "output directory, one file written per decoded bank").value_hint(ValueHint::DirPath))
}
