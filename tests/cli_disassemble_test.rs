//! CLI-level coverage for the `disassemble` binary, chained behind
//! a prior `assemble` invocation so the fixture ROM and symbol table are
//! produced by the real assembler rather than hand-crafted bytes.

use assert_cmd::cargo;
use predicates::prelude::*;
use std::fs;

type STDRESULT = Result<(), Box<dyn std::error::Error>>;

#[test]
fn disassembles_an_assembled_bank_using_its_own_symbol_table() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let main_path = dir.path().join("main.asm");
    fs::write(&main_path, "org $808000\nStart:\nLDA #$12\nSTA $2100\nRTS\n")?;
    let rom_path = dir.path().join("rom.sfc");
    fs::write(&rom_path, vec![0u8; 0x8000])?;
    let mlb_path = dir.path().join("symbols.mlb");

    let mut asm_cmd = cargo::cargo_bin_cmd!("assemble");
    asm_cmd
        .arg(&main_path)
        .arg(&rom_path)
        .arg("--emit")
        .arg(&mlb_path)
        .assert()
        .success();

    let out_dir = dir.path().join("out");
    let mut dasm_cmd = cargo::cargo_bin_cmd!("disassemble");
    dasm_cmd
        .arg("--rom")
        .arg(&rom_path)
        .arg("--symbols")
        .arg(&mlb_path)
        .arg("--bank-start")
        .arg("80")
        .arg("--bank-end")
        .arg("80")
        .arg("--out")
        .arg(&out_dir)
        .assert()
        .success();

    let listing = fs::read_to_string(out_dir.join("bank_80.asm"))?;
    assert!(listing.contains("Start"), "{}", listing);
    assert!(listing.contains("LDA"), "{}", listing);
    assert!(listing.contains("RTS"), "{}", listing);
    Ok(())
}

#[test]
fn missing_rom_file_is_a_fatal_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo::cargo_bin_cmd!("disassemble");
    cmd.arg("--rom")
        .arg(dir.path().join("does-not-exist.sfc"))
        .arg("--bank-start")
        .arg("00")
        .arg("--bank-end")
        .arg("00")
        .arg("--out")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("fatal"));
}
