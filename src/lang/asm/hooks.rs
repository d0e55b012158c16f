//! Hook manifest: a JSON document describing patched ROM regions, loaded
//! tolerantly (unknown fields ignored, flexible address encodings, legacy
//! boolean `expected_*` coercion) and saved deterministically.

use super::{AsmError, HookEntry, HookKind, RegWidth, SourceLocation};
use serde_json::{json, Value};

#[derive(Debug, Clone, Default)]
pub struct HookManifest {
    pub version: String,
    pub rom_path: Option<String>,
    pub rom_sha1: Option<String>,
    pub entries: Vec<HookEntry>,
}

pub fn load(text: &str) -> Result<HookManifest, AsmError> {
    let root: Value = serde_json::from_str(text).map_err(|e| AsmError::HookParse(e.to_string()))?;
    let obj = root.as_object().ok_or_else(|| AsmError::HookParse("manifest is not a JSON object".to_string()))?;

    let mut manifest = HookManifest::default();
    manifest.version = obj.get("version").and_then(|v| v.as_str()).unwrap_or("1").to_string();
    if let Some(rom) = obj.get("rom").and_then(|v| v.as_object()) {
        manifest.rom_path = rom.get("path").and_then(|v| v.as_str()).map(|s| s.to_string());
        manifest.rom_sha1 = rom.get("sha1").and_then(|v| v.as_str()).map(|s| s.to_string());
    }

    if let Some(entries) = obj.get("entries").and_then(|v| v.as_array()) {
        for raw in entries {
            if let Some(entry) = parse_entry(raw) {
                manifest.entries.push(entry);
            }
        }
    }
    Ok(manifest)
}

fn parse_entry(raw: &Value) -> Option<HookEntry> {
    let obj = raw.as_object()?;
    let name = obj.get("name")?.as_str()?.to_string();
    let address = parse_flexible_addr(obj.get("address")?)?;
    let kind = obj.get("kind").and_then(|v| v.as_str()).and_then(HookKind::from_str).unwrap_or(HookKind::Patch);
    let target = obj.get("target").and_then(parse_flexible_addr).unwrap_or(0);
    let size = obj.get("size").and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or_else(|| kind.patch_size());
    let note = obj.get("note").and_then(|v| v.as_str()).map(|s| s.to_string());
    let module = obj.get("module").and_then(|v| v.as_str()).map(|s| s.to_string());
    let abi_class = obj.get("abi_class").and_then(|v| v.as_str()).map(|s| s.to_string());
    let skip_abi = obj.get("skip_abi").and_then(|v| v.as_bool()).unwrap_or(false);
    let expected_m = obj.get("expected_m").and_then(parse_flexible_width);
    let expected_x = obj.get("expected_x").and_then(parse_flexible_width);

    Some(HookEntry {
        name,
        address,
        size,
        kind,
        target,
        source_location: SourceLocation::default(),
        note,
        expected_m,
        expected_x,
        module,
        abi_class,
        skip_abi,
    })
}

fn parse_flexible_addr(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => {
            let s = s.trim().trim_start_matches('$').trim_start_matches("0x").trim_start_matches("0X");
            u32::from_str_radix(s, 16).ok()
        }
        _ => None,
    }
}

/// Numbers map directly to a width (8 or 16); booleans coerce for backward
/// compatibility: `true` -> 8-bit, `false` -> 16-bit.
fn parse_flexible_width(v: &Value) -> Option<RegWidth> {
    match v {
        Value::Number(n) => match n.as_u64()? {
            8 => Some(RegWidth::W8),
            16 => Some(RegWidth::W16),
            _ => None,
        },
        Value::Bool(true) => Some(RegWidth::W8),
        Value::Bool(false) => Some(RegWidth::W16),
        _ => None,
    }
}

fn width_to_json(w: RegWidth) -> Option<Value> {
    match w {
        RegWidth::W8 => Some(json!(8)),
        RegWidth::W16 => Some(json!(16)),
        RegWidth::Top => None,
    }
}

/// Deterministic serialization: hooks sorted by address, empty fields omitted.
pub fn save(manifest: &HookManifest) -> String {
    let mut entries = manifest.entries.clone();
    entries.sort_by_key(|e| e.address);

    let entries_json: Vec<Value> = entries
        .iter()
        .map(|e| {
            let mut obj = serde_json::Map::new();
            obj.insert("name".to_string(), json!(e.name));
            obj.insert("address".to_string(), json!(format!("${:06X}", e.address)));
            obj.insert("kind".to_string(), json!(e.kind.as_str()));
            obj.insert("target".to_string(), json!(format!("${:06X}", e.target)));
            obj.insert("size".to_string(), json!(e.size));
            if let Some(note) = &e.note {
                if !note.is_empty() {
                    obj.insert("note".to_string(), json!(note));
                }
            }
            if let Some(module) = &e.module {
                if !module.is_empty() {
                    obj.insert("module".to_string(), json!(module));
                }
            }
            if let Some(abi_class) = &e.abi_class {
                if !abi_class.is_empty() {
                    obj.insert("abi_class".to_string(), json!(abi_class));
                }
            }
            if e.skip_abi {
                obj.insert("skip_abi".to_string(), json!(true));
            }
            if let Some(em) = e.expected_m.and_then(width_to_json) {
                obj.insert("expected_m".to_string(), em);
            }
            if let Some(ex) = e.expected_x.and_then(width_to_json) {
                obj.insert("expected_x".to_string(), ex);
            }
            Value::Object(obj)
        })
        .collect();

    let mut root = serde_json::Map::new();
    root.insert("version".to_string(), json!(manifest.version));
    if manifest.rom_path.is_some() || manifest.rom_sha1.is_some() {
        let mut rom = serde_json::Map::new();
        if let Some(p) = &manifest.rom_path {
            rom.insert("path".to_string(), json!(p));
        }
        if let Some(s) = &manifest.rom_sha1 {
            rom.insert("sha1".to_string(), json!(s));
        }
        root.insert("rom".to_string(), Value::Object(rom));
    }
    root.insert("entries".to_string(), Value::Array(entries_json));
    serde_json::to_string_pretty(&Value::Object(root)).expect("manifest always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_flexible_address_encodings() {
        let text = r#"{"version":"1","entries":[
            {"name":"A","address":"$02C0C3","kind":"jsl","target":16711680},
            {"name":"B","address":8405059,"kind":"jmp","target":"0x7E8000"}
        ]}"#;
        let m = load(text).unwrap();
        assert_eq!(m.entries[0].address, 0x02C0C3);
        assert_eq!(m.entries[1].target, 0x7E8000);
    }

    #[test]
    fn boolean_expected_width_coerces() {
        let text = r#"{"version":"1","entries":[
            {"name":"A","address":"$808000","kind":"jsl","target":"$808100","expected_m":true,"expected_x":false}
        ]}"#;
        let m = load(text).unwrap();
        assert_eq!(m.entries[0].expected_m, Some(RegWidth::W8));
        assert_eq!(m.entries[0].expected_x, Some(RegWidth::W16));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let text = r#"{"version":"1","future_field":"ignored","entries":[
            {"name":"A","address":"$808000","kind":"jsl","target":"$808100","unexpected":true}
        ]}"#;
        let m = load(text).unwrap();
        assert_eq!(m.entries.len(), 1);
    }

    #[test]
    fn save_sorts_by_address_and_omits_empty_fields() {
        let manifest = HookManifest {
            version: "1".to_string(),
            rom_path: None,
            rom_sha1: None,
            entries: vec![
                HookEntry {
                    name: "Second".to_string(),
                    address: 0x808100,
                    size: 4,
                    kind: HookKind::Jsl,
                    target: 0xC08000,
                    source_location: SourceLocation::default(),
                    note: None,
                    expected_m: None,
                    expected_x: None,
                    module: None,
                    abi_class: None,
                    skip_abi: false,
                },
                HookEntry {
                    name: "First".to_string(),
                    address: 0x808000,
                    size: 4,
                    kind: HookKind::Jsl,
                    target: 0xC08100,
                    source_location: SourceLocation::default(),
                    note: None,
                    expected_m: None,
                    expected_x: None,
                    module: None,
                    abi_class: None,
                    skip_abi: false,
                },
            ],
        };
        let text = save(&manifest);
        let first_idx = text.find("First").unwrap();
        let second_idx = text.find("Second").unwrap();
        assert!(first_idx < second_idx);
        assert!(!text.contains("\"note\""));
    }
}
