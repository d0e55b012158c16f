//! Linter: diagnostics that need a whole-program view of an already
//! assembled source. Prohibited-range and overlapping-write diagnostics are
//! raised inline by the assembler session as it emits bytes; this
//! module covers the analyses that only make sense once the program is fully
//! collected: unused symbols, hex literals that happen to match a known
//! label, SNES register-mirror quirks, and hook call sites whose M/X state
//! contradicts the callee's declared ABI.

use super::mxstate::Tracker;
use super::source::ExpandedSource;
use super::settings::Settings;
use super::{Diagnostic, HookEntry, SourceLocation, Severity, Symbol, Symbols};
use regex::Regex;

/// Run every whole-program lint and return the diagnostics they produce, in
/// addition to whatever the assembler session already collected.
pub fn lint(symbols: &Symbols, expanded: &ExpandedSource, hooks: &[HookEntry], tracker: &Tracker, settings: &Settings) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    if settings.warn_unused_symbols {
        diags.extend(unused_symbols(symbols, expanded));
    }
    diags.extend(hex_literal_hints(symbols, expanded));
    diags.extend(register_mirror_quirks(expanded));
    diags.extend(hook_abi_violations(hooks, tracker));
    diags
}

fn loc_for(expanded: &ExpandedSource, line_idx: usize) -> SourceLocation {
    let (file_id, line) = expanded.origins.get(line_idx).copied().unwrap_or((0, line_idx));
    SourceLocation::new(file_id, line, 0, 0)
}

/// A label or define that appears nowhere but its own definition line.
fn unused_symbols(symbols: &Symbols, expanded: &ExpandedSource) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for sym in symbols.entries.values() {
        let (name, loc) = match sym {
            Symbol::Label(l) if !l.is_local => (l.name.clone(), l.defined_at),
            Symbol::Define(d) => (d.name.clone(), d.defined_at),
            _ => continue,
        };
        let Ok(re) = Regex::new(&format!(r"\b{}\b", regex::escape(&name))) else {
            continue;
        };
        let uses = expanded.lines.iter().filter(|line| re.is_match(line)).count();
        if uses <= 1 {
            diags.push(Diagnostic {
                severity: Severity::Warning,
                code: "unused_symbol",
                message: format!("{} is never referenced", name),
                file_id: loc.file_id,
                start: loc,
                end: loc,
            });
        }
    }
    diags
}

static HEX_LITERAL: &str = r"\$([0-9A-Fa-f]{2,6})\b";

/// A raw hex literal in the source whose value exactly matches a known label's
/// address; surfaced as a hint so an editor can offer to swap it for the name.
fn hex_literal_hints(symbols: &Symbols, expanded: &ExpandedSource) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let Ok(re) = Regex::new(HEX_LITERAL) else {
        return diags;
    };
    for (idx, line) in expanded.lines.iter().enumerate() {
        for cap in re.captures_iter(line) {
            let Ok(val) = u32::from_str_radix(&cap[1], 16) else {
                continue;
            };
            if let Some(label) = symbols.labels().into_iter().find(|l| l.address == val) {
                if line.contains(&label.name) {
                    continue;
                }
                let loc = loc_for(expanded, idx);
                diags.push(Diagnostic {
                    severity: Severity::Hint,
                    code: "hex_literal_matches_label",
                    message: format!("${:06X} matches label {}", val, label.name),
                    file_id: loc.file_id,
                    start: loc,
                    end: loc,
                });
            }
        }
    }
    diags
}

/// PPU/CPU registers (`$21xx`/`$42xx`) are canonically accessed from banks
/// $00-$3F, but are mirrored into banks $80-$BF as well. A 24-bit literal that
/// reaches a register through the mirror isn't wrong, just worth a note.
fn register_mirror_quirks(expanded: &ExpandedSource) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let Ok(re) = Regex::new(r"\$([0-9A-Fa-f]{6})\b") else {
        return diags;
    };
    for (idx, line) in expanded.lines.iter().enumerate() {
        for cap in re.captures_iter(line) {
            let Ok(val) = u32::from_str_radix(&cap[1], 16) else {
                continue;
            };
            let bank = (val >> 16) & 0xff;
            let offset = val & 0xffff;
            let is_register = (0x2100..=0x213f).contains(&offset) || (0x4200..=0x421f).contains(&offset);
            if is_register && (0x80..=0xbf).contains(&bank) {
                let loc = loc_for(expanded, idx);
                diags.push(Diagnostic {
                    severity: Severity::Info,
                    code: "register_mirror",
                    message: format!("${:06X} reaches a register through the bank ${:02X} mirror", val, bank),
                    file_id: loc.file_id,
                    start: loc,
                    end: loc,
                });
            }
        }
    }
    diags
}

/// A hook whose declared `expected_m`/`expected_x` contradicts the M/X state
/// observed at its own entry point. Skipped for `abi_class: "long_entry"`,
/// whose calling convention doesn't constrain M/X at entry.
fn hook_abi_violations(hooks: &[HookEntry], tracker: &Tracker) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for hook in hooks {
        if hook.skip_abi || hook.abi_class.as_deref() == Some("long_entry") {
            continue;
        }
        let Some(entry_state) = tracker.routine_entry(&hook.name) else {
            continue;
        };
        let probe = Tracker::new(entry_state);
        if let Err(e) = probe.check_expected(&hook.name, hook.expected_m, hook.expected_x) {
            diags.push(Diagnostic::from_error(&e, hook.source_location));
        }
    }
    diags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::asm::mxstate::MxState;
    use crate::lang::asm::{HookKind, RegWidth};
    use std::path::PathBuf;

    fn expand(lines: &[&str]) -> ExpandedSource {
        let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        let origins = lines.iter().enumerate().map(|(i, _)| (0usize, i)).collect();
        ExpandedSource { lines, origins, file_paths: vec![PathBuf::from("main.asm")] }
    }

    #[test]
    fn unreferenced_label_is_flagged() {
        let mut symbols = Symbols::new();
        symbols.define_label("Dead".to_string(), 0x808000, SourceLocation::default()).unwrap();
        let src = expand(&["Dead:", "RTS"]);
        let diags = unused_symbols(&symbols, &src);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "unused_symbol");
    }

    #[test]
    fn referenced_label_is_not_flagged() {
        let mut symbols = Symbols::new();
        symbols.define_label("Start".to_string(), 0x808000, SourceLocation::default()).unwrap();
        let src = expand(&["Start:", "JSR Start"]);
        let diags = unused_symbols(&symbols, &src);
        assert!(diags.is_empty());
    }

    #[test]
    fn hex_literal_matching_label_is_hinted() {
        let mut symbols = Symbols::new();
        symbols.define_label("Handler".to_string(), 0x808010, SourceLocation::default()).unwrap();
        let src = expand(&["JML $808010"]);
        let diags = hex_literal_hints(&symbols, &src);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "hex_literal_matches_label");
    }

    #[test]
    fn register_access_through_mirror_bank_is_noted() {
        let src = expand(&["STA $802122"]);
        let diags = register_mirror_quirks(&src);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "register_mirror");
    }

    #[test]
    fn long_entry_abi_class_suppresses_mismatch() {
        let mut tracker = Tracker::new(MxState::EMULATION);
        tracker.record_routine_entry("Routine", MxState { m: RegWidth::W16, x: RegWidth::W8 });
        let hook = HookEntry {
            name: "Routine".to_string(),
            address: 0x808000,
            size: 4,
            kind: HookKind::Jsl,
            target: 0x818000,
            source_location: SourceLocation::default(),
            note: None,
            expected_m: Some(RegWidth::W8),
            expected_x: None,
            module: None,
            abi_class: Some("long_entry".to_string()),
            skip_abi: false,
        };
        let diags = hook_abi_violations(&[hook], &tracker);
        assert!(diags.is_empty());
    }

    #[test]
    fn mismatched_abi_is_flagged() {
        let mut tracker = Tracker::new(MxState::EMULATION);
        tracker.record_routine_entry("Routine", MxState { m: RegWidth::W16, x: RegWidth::W8 });
        let hook = HookEntry {
            name: "Routine".to_string(),
            address: 0x808000,
            size: 4,
            kind: HookKind::Jsl,
            target: 0x818000,
            source_location: SourceLocation::default(),
            note: None,
            expected_m: Some(RegWidth::W8),
            expected_x: None,
            module: None,
            abi_class: None,
            skip_abi: false,
        };
        let diags = hook_abi_violations(&[hook], &tracker);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "mx_mismatch");
    }
}
