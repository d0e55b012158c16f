//! The `assemble` CLI: a thin front end over the assembler engine.
//!
//! Grounded on the teacher's `main.rs` dispatch (env_logger installed from
//! `RUST_LOG`, a `cli::build_*` function supplying the `clap::Command`) and
//! `lib.rs::display_block` for the `--summary` hex dump. Unlike the teacher's
//! single multi-subcommand binary, this crate ships one binary per tool,
//! so there is no subcommand dispatch here, just flag handling.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde_json::json;

use snes65816::cli;
use snes65816::lang::asm::hooks::HookManifest;
use snes65816::lang::asm::settings::{Settings, SymbolsMode};
use snes65816::lang::asm::source::SourceReader;
use snes65816::lang::asm::{assembler, hooks, linter, symfile, Diagnostic, Severity};
use snes65816::DYNERR;

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "info",
        Severity::Hint => "hint",
    }
}

fn print_diagnostic(d: &Diagnostic, file_paths: &[PathBuf]) {
    let file = file_paths.get(d.file_id).map(|p| p.display().to_string()).unwrap_or_else(|| "<unknown>".to_string());
    eprintln!(
        "{}:{}:{}: {} [{}]: {}",
        file,
        d.start.line + 1,
        d.start.column + 1,
        severity_str(d.severity),
        d.code,
        d.message
    );
}

fn load_settings(main_path: &Path, explicit: Option<&str>) -> Result<Settings, DYNERR> {
    if let Some(path) = explicit {
        return Settings::load_file(Path::new(path));
    }
    let conventional = main_path.parent().unwrap_or(Path::new(".")).join("snes65816.json");
    if conventional.is_file() {
        return Settings::load_file(&conventional);
    }
    Ok(Settings::new())
}

/// Patch every write block into `rom`, extending the buffer with zero bytes
/// if a block writes past the current end, so offset 0 always holds the
/// very first byte the session wrote, regardless of ROM file length.
fn apply_write_blocks(rom: &mut Vec<u8>, blocks: &[snes65816::lang::asm::WriteBlock]) {
    for wb in blocks {
        let end = wb.rom_offset + wb.bytes.len();
        if rom.len() < end {
            rom.resize(end, 0);
        }
        rom[wb.rom_offset..end].copy_from_slice(&wb.bytes);
    }
}

fn diagnostics_json(diags: &[Diagnostic], file_paths: &[PathBuf]) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = diags
        .iter()
        .map(|d| {
            let file = file_paths.get(d.file_id).map(|p| p.display().to_string()).unwrap_or_default();
            json!({
                "severity": severity_str(d.severity),
                "code": d.code,
                "message": d.message,
                "file": file,
                "range": {
                    "start": {"line": d.start.line, "column": d.start.column},
                    "end": {"line": d.end.line, "column": d.end.column},
                },
            })
        })
        .collect();
    serde_json::Value::Array(entries)
}

fn emit_artifact(
    path: &str,
    diags: &[Diagnostic],
    file_paths: &[PathBuf],
    symbols: &snes65816::lang::asm::Symbols,
    hooks_list: &[snes65816::lang::asm::HookEntry],
    rom_path: &Path,
) -> Result<(), DYNERR> {
    let name = Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path);
    if name.contains("diagnostics") {
        let text = serde_json::to_string_pretty(&diagnostics_json(diags, file_paths))?;
        std::fs::write(path, text)?;
    } else if name.ends_with(".mlb") || name.contains("symbols.mlb") {
        let labels = symbols.labels();
        std::fs::write(path, symfile::write_mlb(&labels))?;
    } else if name.ends_with(".sym") || name.contains("symbols.sym") {
        let labels = symbols.labels();
        std::fs::write(path, symfile::write_sym(&labels))?;
    } else if name.contains("hooks") {
        let manifest = HookManifest {
            version: "1".to_string(),
            rom_path: Some(rom_path.display().to_string()),
            rom_sha1: None,
            entries: hooks_list.to_vec(),
        };
        std::fs::write(path, hooks::save(&manifest))?;
    } else {
        log::warn!("--emit {}: unrecognized artifact name, skipping", path);
    }
    Ok(())
}

fn run() -> Result<bool, DYNERR> {
    let matches = cli::build_assemble_cli().get_matches();
    let main_path = PathBuf::from(matches.get_one::<String>("MAIN").expect("required"));
    let rom_path = PathBuf::from(matches.get_one::<String>("ROM").expect("required"));
    let settings = load_settings(&main_path, matches.get_one::<String>("config").map(|s| s.as_str()))?;

    let include_dirs: Vec<PathBuf> = settings.include_paths.iter().map(PathBuf::from).collect();
    let mut reader = SourceReader::new(include_dirs);
    let expanded = reader.expand(&main_path)?;

    let out = assembler::assemble(&expanded, &settings);
    let lint_diags = linter::lint(&out.symbols, &expanded, &out.hooks, &out.mx, &settings);

    let mut diagnostics = out.diagnostics.clone();
    diagnostics.extend(lint_diags);
    for d in &diagnostics {
        print_diagnostic(d, &expanded.file_paths);
    }
    let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);

    if let Some(emit_paths) = matches.get_many::<String>("emit") {
        for path in emit_paths {
            emit_artifact(path, &diagnostics, &expanded.file_paths, &out.symbols, &out.hooks, &rom_path)?;
        }
    }
    if matches!(settings.symbols, SymbolsMode::Wla | SymbolsMode::Mlb) && !has_errors {
        log::debug!("symbol output mode {:?} configured; use --emit to write it out", settings.symbols);
    }

    if has_errors {
        return Ok(false);
    }

    let mut rom = std::fs::read(&rom_path)?;
    apply_write_blocks(&mut rom, &out.write_blocks);
    std::fs::write(&rom_path, &rom)?;

    let want_summary = matches.get_flag("summary") && !matches.get_flag("no-summary");
    if want_summary {
        for wb in &out.write_blocks {
            eprintln!("; wrote {} bytes at ${:06X}", wb.bytes.len(), wb.snes_address);
            eprint!("{}", snes65816::display_block(wb.snes_address, &wb.bytes));
        }
    }
    Ok(true)
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
