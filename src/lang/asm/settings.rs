//! Project configuration. Parsed the way the teacher's
//! `merlin::settings::parse` reads LSP configuration payloads: unknown keys are
//! ignored and malformed values fall back to the current default for that
//! field, rather than aborting the whole parse.

use super::{AsmError, Mapper};
use crate::lang::{update_json_bool, update_json_string, update_json_vec_str};
use crate::DYNERR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolsMode {
    Wla,
    Mlb,
    None,
}

#[derive(Debug, Clone)]
pub struct ProhibitedRange {
    pub start: u32,
    pub end: u32,
    pub reason: String,
}

/// A pool the `hook`/`freecode`/`freedata`/`freespace` directives bump-allocate
/// from — the session owns allocation, not the directive. Configured the same
/// `"$start-$end"` way as a prohibited range, minus the reason.
#[derive(Debug, Clone, Copy)]
pub struct FreeRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub preset: Option<String>,
    pub mapper: Mapper,
    pub rom_size: i64,
    pub include_paths: Vec<String>,
    pub symbols: SymbolsMode,
    pub warn_unused_symbols: bool,
    pub prohibited_memory_ranges: Vec<ProhibitedRange>,
    pub free_space_ranges: Vec<FreeRange>,
    pub main_files: Vec<String>,
    pub emit: Vec<String>,
    pub lsp_log_enabled: bool,
    pub lsp_log_path: String,
    /// Macro expansion recursion limit (configurable depth, default 128).
    pub macro_max_depth: usize,
}

impl Settings {
    pub fn new() -> Self {
        Self {
            preset: None,
            mapper: Mapper::LoRom,
            rom_size: 0x200000,
            include_paths: Vec::new(),
            symbols: SymbolsMode::Wla,
            warn_unused_symbols: false,
            prohibited_memory_ranges: Vec::new(),
            free_space_ranges: Vec::new(),
            main_files: Vec::new(),
            emit: Vec::new(),
            lsp_log_enabled: false,
            lsp_log_path: "snes65816_lsp.log".to_string(),
            macro_max_depth: 128,
        }
    }

    /// Strict path: a file that isn't valid JSON at all is a fatal `config_parse`.
    pub fn load_file(path: &std::path::Path) -> Result<Settings, DYNERR> {
        let text = std::fs::read_to_string(path).map_err(|e| Box::new(AsmError::RomIo(e.to_string())) as DYNERR)?;
        if serde_json::from_str::<serde_json::Value>(&text).is_err() {
            return Err(Box::new(AsmError::ConfigParse(format!("{} is not valid JSON", path.display()))));
        }
        Ok(parse(&text))
    }
}

/// Tolerant parse: never fails. Unknown keys are ignored; malformed values keep
/// whatever default `Settings::new()` already set for that field.
pub fn parse(json: &str) -> Settings {
    let mut ans = Settings::new();
    let Ok(root) = serde_json::from_str::<serde_json::Value>(json) else {
        return ans;
    };
    let Some(obj) = root.as_object() else {
        return ans;
    };

    if let Some(preset) = obj.get("preset").and_then(|v| v.as_str()) {
        apply_preset(&mut ans, preset);
    }

    for (key, val) in obj {
        match key.as_str() {
            "mapper" => {
                if let Some(s) = val.as_str() {
                    if let Some(m) = Mapper::from_str(s) {
                        ans.mapper = m;
                    }
                }
            }
            "rom_size" => {
                if let Some(n) = val.as_i64() {
                    ans.rom_size = n;
                }
            }
            "include_paths" => update_json_vec_str(&root, "include_paths", &mut ans.include_paths),
            "symbols" => {
                ans.symbols = match val.as_str() {
                    Some("wla") => SymbolsMode::Wla,
                    Some("mlb") => SymbolsMode::Mlb,
                    Some("none") => SymbolsMode::None,
                    _ => ans.symbols,
                }
            }
            "warn_unused_symbols" => update_json_bool(&root, "warn_unused_symbols", &mut ans.warn_unused_symbols),
            "prohibited_memory_ranges" => {
                if let Some(ary) = val.as_array() {
                    ans.prohibited_memory_ranges =
                        ary.iter().filter_map(|v| v.as_str()).filter_map(parse_prohibited_range).collect();
                }
            }
            "free_space_ranges" => {
                if let Some(ary) = val.as_array() {
                    ans.free_space_ranges =
                        ary.iter().filter_map(|v| v.as_str()).filter_map(parse_free_range).collect();
                }
            }
            "main" => {
                ans.main_files = match val {
                    serde_json::Value::String(s) => vec![s.clone()],
                    serde_json::Value::Array(ary) => ary.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect(),
                    _ => ans.main_files,
                }
            }
            "main_files" => update_json_vec_str(&root, "main_files", &mut ans.main_files),
            "emit" => update_json_vec_str(&root, "emit", &mut ans.emit),
            "lsp_log_enabled" => update_json_bool(&root, "lsp_log_enabled", &mut ans.lsp_log_enabled),
            "lsp_log_path" => update_json_string(&root, "lsp_log_path", &mut ans.lsp_log_path),
            "macro_max_depth" => {
                if let Some(n) = val.as_u64() {
                    ans.macro_max_depth = n as usize;
                }
            }
            _ => {}
        }
    }
    ans
}

fn apply_preset(settings: &mut Settings, preset: &str) {
    match preset {
        "lorom" => settings.mapper = Mapper::LoRom,
        "hirom" => settings.mapper = Mapper::HiRom,
        "exlorom" => settings.mapper = Mapper::ExLoRom,
        "exhirom" => settings.mapper = Mapper::ExHiRom,
        _ => {}
    }
}

/// Parse `"$start-$end: reason"` into a `ProhibitedRange`.
fn parse_prohibited_range(s: &str) -> Option<ProhibitedRange> {
    let (range_part, reason) = match s.split_once(':') {
        Some((r, reason)) => (r.trim(), reason.trim().to_string()),
        None => (s.trim(), String::new()),
    };
    let (start_s, end_s) = range_part.split_once('-')?;
    let start = parse_hex_addr(start_s.trim())?;
    let end = parse_hex_addr(end_s.trim())?;
    Some(ProhibitedRange { start, end, reason })
}

/// Parse `"$start-$end"` into a `FreeRange` (no trailing reason, unlike a
/// prohibited range).
fn parse_free_range(s: &str) -> Option<FreeRange> {
    let (start_s, end_s) = s.trim().split_once('-')?;
    let start = parse_hex_addr(start_s.trim())?;
    let end = parse_hex_addr(end_s.trim())?;
    Some(FreeRange { start, end })
}

fn parse_hex_addr(s: &str) -> Option<u32> {
    let s = s.trim_start_matches('$').trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(s, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_ignored() {
        let s = parse(r#"{"mapper":"hirom","bogus_future_key":123}"#);
        assert_eq!(s.mapper, Mapper::HiRom);
    }

    #[test]
    fn malformed_value_falls_back_to_default() {
        let s = parse(r#"{"rom_size":"not a number"}"#);
        assert_eq!(s.rom_size, Settings::new().rom_size);
    }

    #[test]
    fn prohibited_range_parses() {
        let s = parse(r#"{"prohibited_memory_ranges":["$7E0000-$7E01FF: saved state"]}"#);
        assert_eq!(s.prohibited_memory_ranges.len(), 1);
        assert_eq!(s.prohibited_memory_ranges[0].start, 0x7E0000);
        assert_eq!(s.prohibited_memory_ranges[0].end, 0x7E01FF);
    }

    #[test]
    fn totally_invalid_json_is_fatal_via_load_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("snes65816.json");
        std::fs::write(&path, "not json at all {{{").unwrap();
        let err = Settings::load_file(&path).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
