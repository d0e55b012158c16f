//! The `disassemble` CLI: a thin front end over the symbol-aware
//! disassembler. Grounded on the `assemble` binary's shape (env_logger from
//! `RUST_LOG`, one `clap::Command` from `cli::build_*`, plain stderr
//! diagnostics), since both CLIs are thin wrappers over the same engine.

use std::path::PathBuf;
use std::process::ExitCode;

use snes65816::cli;
use snes65816::lang::asm::{disassembly, hooks, symfile, Mapper, Severity};
use snes65816::DYNERR;

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "info",
        Severity::Hint => "hint",
    }
}

fn run() -> Result<bool, DYNERR> {
    let matches = cli::build_disassemble_cli().get_matches();
    let rom_path = PathBuf::from(matches.get_one::<String>("rom").expect("required"));
    let out_dir = PathBuf::from(matches.get_one::<String>("out").expect("required"));
    let bank_start = matches.get_one::<String>("bank-start").expect("required");
    let bank_end = matches.get_one::<String>("bank-end").expect("required");
    let mapper_name = matches.get_one::<String>("mapper").expect("has default");

    let mapper = Mapper::from_str(mapper_name)
        .ok_or_else(|| format!("unknown mapper: {}", mapper_name))?;
    let bank_lo = u8::from_str_radix(bank_start.trim_start_matches('$').trim_start_matches("0x"), 16)
        .map_err(|_| format!("invalid --bank-start: {}", bank_start))?;
    let bank_hi = u8::from_str_radix(bank_end.trim_start_matches('$').trim_start_matches("0x"), 16)
        .map_err(|_| format!("invalid --bank-end: {}", bank_end))?;

    let rom = std::fs::read(&rom_path)?;

    let mut labels: Vec<(String, u32)> = Vec::new();
    if let Some(symbols_path) = matches.get_one::<String>("symbols") {
        let text = std::fs::read_to_string(symbols_path)?;
        labels = symfile::read_mlb(&text);
    }

    let mut hook_entries = Vec::new();
    if let Some(hooks_path) = matches.get_one::<String>("hooks") {
        let text = std::fs::read_to_string(hooks_path)?;
        hook_entries = hooks::load(&text)?.entries;
    }

    let out = disassembly::disassemble(&rom, mapper, &labels, &hook_entries, bank_lo, bank_hi);

    for d in &out.diagnostics {
        eprintln!("{:#08x}: {} [{}]: {}", d.start.byte_offset, severity_str(d.severity), d.code, d.message);
    }
    let has_errors = out.diagnostics.iter().any(|d| d.severity == Severity::Error);

    std::fs::create_dir_all(&out_dir)?;
    for (bank, text) in &out.banks {
        let path = out_dir.join(format!("bank_{:02X}.asm", bank));
        std::fs::write(path, text)?;
    }

    Ok(!has_errors)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("fatal: {}", e);
            ExitCode::from(1)
        }
    }
}
