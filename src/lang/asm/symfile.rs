//! Symbol file I/O: writers for the `.mlb` and `.sym` formats, and a
//! tolerant `.mlb` reader used by the disassembler when given an externally
//! supplied symbol table.

use super::LabelSym;

/// `SnesMemory:AAAAAA:Name[:comment]`, uppercase hex, no leading `$`.
pub fn write_mlb(labels: &[&LabelSym]) -> String {
    let mut sorted: Vec<&&LabelSym> = labels.iter().collect();
    sorted.sort_by_key(|l| l.address);
    let mut out = String::new();
    for l in sorted {
        out.push_str(&format!("SnesMemory:{:06X}:{}\n", l.address, l.name));
    }
    out
}

/// `[labels]` header followed by `BB:AAAA Name` lines (WLA symbol file convention).
pub fn write_sym(labels: &[&LabelSym]) -> String {
    let mut sorted: Vec<&&LabelSym> = labels.iter().collect();
    sorted.sort_by_key(|l| l.address);
    let mut out = String::from("[labels]\n");
    for l in sorted {
        let offset = l.address & 0xffff;
        out.push_str(&format!("{:02X}:{:04X} {}\n", l.bank, offset, l.name));
    }
    out
}

/// Tolerant `.mlb` reader: unparseable lines are skipped rather than failing the
/// whole read, mirroring the hook manifest's tolerant-parse posture.
pub fn read_mlb(text: &str) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.splitn(4, ':').collect();
        if parts.len() < 3 {
            continue;
        }
        let Ok(addr) = u32::from_str_radix(parts[1], 16) else {
            continue;
        };
        out.push((parts[2].to_string(), addr));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::asm::SourceLocation;

    fn label(name: &str, addr: u32) -> LabelSym {
        LabelSym {
            name: name.to_string(),
            address: addr,
            bank: ((addr >> 16) & 0xff) as u8,
            is_local: false,
            is_nested_parent: true,
            defined_at: SourceLocation::default(),
        }
    }

    #[test]
    fn mlb_writer_formats_and_sorts_by_address() {
        let a = label("Second", 0x808010);
        let b = label("First", 0x808000);
        let text = write_mlb(&[&a, &b]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "SnesMemory:808000:First");
        assert_eq!(lines[1], "SnesMemory:808010:Second");
    }

    #[test]
    fn sym_writer_has_labels_header() {
        let a = label("Start", 0x808000);
        let text = write_sym(&[&a]);
        assert!(text.starts_with("[labels]\n"));
        assert!(text.contains("80:8000 Start"));
    }

    #[test]
    fn mlb_reader_skips_bad_lines() {
        let text = "SnesMemory:808000:Start\nnot a valid line\nSnesMemory:ZZZZZZ:Bad\n";
        let entries = read_mlb(text);
        assert_eq!(entries, vec![("Start".to_string(), 0x808000)]);
    }
}
