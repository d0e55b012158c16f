//! CLI-level coverage for the `assemble` binary. Grounded on the
//! teacher's `tests/cli_test.rs`: one `assert_cmd` invocation per scenario,
//! predicates over stdout/stderr, fixtures built in a `tempfile::tempdir`
//! rather than checked into the repo.

use assert_cmd::cargo;
use predicates::prelude::*;
use std::fs;

type STDRESULT = Result<(), Box<dyn std::error::Error>>;

#[test]
fn org_and_db_patch_the_rom_at_offset_zero() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let main_path = dir.path().join("main.asm");
    fs::write(&main_path, "org $808000\ndb $01,$02\n")?;
    let rom_path = dir.path().join("rom.sfc");
    fs::write(&rom_path, [])?;

    let mut cmd = cargo::cargo_bin_cmd!("assemble");
    cmd.arg(&main_path).arg(&rom_path).assert().success();

    let rom = fs::read(&rom_path)?;
    assert_eq!(&rom[0..2], &[0x01, 0x02]);
    Ok(())
}

#[test]
fn define_is_substituted_into_a_data_directive() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let main_path = dir.path().join("main.asm");
    fs::write(&main_path, "org $808000\n!x = $42\ndb !x\n")?;
    let rom_path = dir.path().join("rom.sfc");
    fs::write(&rom_path, [])?;

    let mut cmd = cargo::cargo_bin_cmd!("assemble");
    cmd.arg(&main_path).arg(&rom_path).assert().success();

    let rom = fs::read(&rom_path)?;
    assert_eq!(rom[0], 0x42);
    Ok(())
}

#[test]
fn prohibited_range_write_fails_and_reports_the_code() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let main_path = dir.path().join("main.asm");
    fs::write(&main_path, "org $808000\nSTA $7E0100\n")?;
    fs::write(
        dir.path().join("snes65816.json"),
        r#"{"prohibited_memory_ranges": ["$7E0000-$7E01FF: saved state"]}"#,
    )?;
    let rom_path = dir.path().join("rom.sfc");
    fs::write(&rom_path, [])?;

    let mut cmd = cargo::cargo_bin_cmd!("assemble");
    cmd.arg(&main_path)
        .arg(&rom_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("prohibited_range"));
    Ok(())
}

#[test]
fn emit_symbols_mlb_contains_the_label() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let main_path = dir.path().join("main.asm");
    fs::write(&main_path, "org $808000\nStart:\nLDA #$12\nRTS\n")?;
    let rom_path = dir.path().join("rom.sfc");
    fs::write(&rom_path, [])?;
    let mlb_path = dir.path().join("symbols.mlb");

    let mut cmd = cargo::cargo_bin_cmd!("assemble");
    cmd.arg(&main_path)
        .arg(&rom_path)
        .arg("--emit")
        .arg(&mlb_path)
        .assert()
        .success();

    let text = fs::read_to_string(&mlb_path)?;
    assert!(text.contains("SnesMemory:808000:Start"), "{}", text);
    Ok(())
}

#[test]
fn invalid_invocation_exits_with_clap_error_code() {
    let mut cmd = cargo::cargo_bin_cmd!("assemble");
    cmd.assert().failure().code(2);
}
