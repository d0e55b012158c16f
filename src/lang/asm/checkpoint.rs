//! Checkpoint manager: the per-document view fed to an LSP client while the
//! analyzer runs on a worker thread, grounded on the same
//! `server::Checkpoint` trait the Merlin checkpoint manager implements, but
//! driven by the flat `Symbols` table this engine builds rather than a
//! tree-sitter parse.

use crate::lang::server::Checkpoint;
use crate::lang::Document;
use lsp_types as lsp;
use regex::Regex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use super::{Symbol, Symbols};

/// Everything a checkpoint needs about the workspace at the moment a request
/// arrives: the shared symbol table, a way to turn a `file_id` back into a
/// URI, and the raw text of every workspace document (for whole-word scans
/// backing references/rename).
pub struct CheckpointManager {
    doc: Document,
    current_file_id: usize,
    symbols: Arc<Symbols>,
    file_uris: Arc<Vec<String>>,
    workspace_texts: Arc<HashMap<String, String>>,
}

fn ident_re() -> Regex {
    Regex::new(r"[A-Za-z_.][A-Za-z0-9_.]*").expect("static pattern")
}

/// The identifier token touching `col` on `line`, if any, with its column span.
pub(super) fn word_at(line: &str, col: usize) -> Option<(String, usize, usize)> {
    for m in ident_re().find_iter(line) {
        if m.start() <= col && col <= m.end() {
            return Some((m.as_str().to_string(), m.start(), m.end()));
        }
    }
    None
}

fn symbol_kind(sym: &Symbol) -> lsp::SymbolKind {
    match sym {
        Symbol::Label(_) => lsp::SymbolKind::CONSTANT,
        Symbol::Define(_) => lsp::SymbolKind::CONSTANT,
        Symbol::Macro(_) => lsp::SymbolKind::FUNCTION,
        Symbol::Struct(_) => lsp::SymbolKind::STRUCT,
    }
}

#[allow(deprecated)]
fn doc_symbol(name: &str, kind: lsp::SymbolKind, rng: lsp::Range) -> lsp::DocumentSymbol {
    lsp::DocumentSymbol {
        name: name.to_string(),
        detail: None,
        kind,
        range: rng,
        selection_range: rng,
        tags: None,
        children: None,
        deprecated: None,
    }
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self {
            doc: Document::from_string(String::new(), 0),
            current_file_id: 0,
            symbols: Arc::new(Symbols::new()),
            file_uris: Arc::new(Vec::new()),
            workspace_texts: Arc::new(HashMap::new()),
        }
    }
    pub fn update_doc(&mut self, doc: Document, file_id: usize) {
        self.doc = doc;
        self.current_file_id = file_id;
    }
    pub fn update_symbols(&mut self, symbols: Arc<Symbols>) {
        self.symbols = symbols;
    }
    pub fn update_file_uris(&mut self, file_uris: Arc<Vec<String>>) {
        self.file_uris = file_uris;
    }
    pub fn update_workspace_texts(&mut self, texts: Arc<HashMap<String, String>>) {
        self.workspace_texts = texts;
    }

    fn loc_for(&self, file_id: usize, line: usize, start_col: usize, end_col: usize) -> Option<lsp::Location> {
        let uri_str = self.file_uris.get(file_id)?;
        let uri = lsp::Uri::from_str(uri_str).ok()?;
        let range = lsp::Range::new(lsp::Position::new(line as u32, start_col as u32), lsp::Position::new(line as u32, end_col as u32));
        Some(lsp::Location::new(uri, range))
    }

    fn identifier_under(&self, sel_loc: &lsp::Location) -> Option<String> {
        let target_file = self.file_uris.iter().position(|u| u == &sel_loc.uri.to_string())?;
        let text = if target_file == self.current_file_id {
            self.doc.text.clone()
        } else {
            self.workspace_texts.get(&sel_loc.uri.to_string())?.clone()
        };
        let line = text.lines().nth(sel_loc.range.start.line as usize)?;
        word_at(line, sel_loc.range.start.character as usize).map(|(name, _, _)| name)
    }
}

impl Checkpoint for CheckpointManager {
    fn get_doc(&self) -> Document {
        self.doc.clone()
    }
    fn get_line(&self, row: usize) -> Option<String> {
        self.doc.text.lines().nth(row).map(|s| s.to_string())
    }
    fn get_symbols(&self) -> Vec<lsp::DocumentSymbol> {
        let mut ans = Vec::new();
        for sym in self.symbols.entries.values() {
            let loc = sym.defined_at();
            if loc.file_id != self.current_file_id {
                continue;
            }
            let rng = lsp::Range::new(lsp::Position::new(loc.line as u32, loc.column as u32), lsp::Position::new(loc.line as u32, loc.column as u32));
            ans.push(doc_symbol(sym.name(), symbol_kind(sym), rng));
        }
        for m in self.symbols.macros.values() {
            if m.defined_at.file_id != self.current_file_id {
                continue;
            }
            let rng = lsp::Range::new(
                lsp::Position::new(m.defined_at.line as u32, m.defined_at.column as u32),
                lsp::Position::new(m.defined_at.line as u32, m.defined_at.column as u32),
            );
            ans.push(doc_symbol(&m.name, lsp::SymbolKind::FUNCTION, rng));
        }
        ans
    }
    fn get_decs(&self, sel_loc: &lsp::Location) -> Vec<lsp::Location> {
        self.get_defs(sel_loc)
    }
    fn get_defs(&self, sel_loc: &lsp::Location) -> Vec<lsp::Location> {
        let Some(name) = self.identifier_under(sel_loc) else {
            return Vec::new();
        };
        let loc = match self.symbols.resolve(&name) {
            Some(sym) => Some(sym.defined_at()),
            None => self.symbols.macros.get(&name).map(|m| m.defined_at),
        };
        match loc {
            Some(l) => self.loc_for(l.file_id, l.line, l.column, l.column + name.len()).into_iter().collect(),
            None => Vec::new(),
        }
    }
    fn get_refs(&self, sel_loc: &lsp::Location) -> Vec<lsp::Location> {
        let Some(name) = self.identifier_under(sel_loc) else {
            return Vec::new();
        };
        let mut ans = Vec::new();
        let Ok(re) = Regex::new(&format!(r"\b{}\b", regex::escape(&name))) else {
            return ans;
        };
        let mut scan = |uri: &str, text: &str| {
            for (row, line) in text.lines().enumerate() {
                for m in re.find_iter(line) {
                    if let Ok(u) = lsp::Uri::from_str(uri) {
                        let range = lsp::Range::new(lsp::Position::new(row as u32, m.start() as u32), lsp::Position::new(row as u32, m.end() as u32));
                        ans.push(lsp::Location::new(u, range));
                    }
                }
            }
        };
        scan(&self.doc.uri.to_string(), &self.doc.text);
        for (uri, text) in self.workspace_texts.iter() {
            if *uri != self.doc.uri.to_string() {
                scan(uri, text);
            }
        }
        ans
    }
    fn get_renamables(&self, sel_loc: &lsp::Location) -> Vec<lsp::Location> {
        self.get_refs(sel_loc)
    }
    fn get_folding_ranges(&self) -> Vec<lsp::FoldingRange> {
        let mut ans = Vec::new();
        let mut open: Vec<(usize, &str)> = Vec::new();
        for (row, raw) in self.doc.text.lines().enumerate() {
            let line = raw.trim_start().to_ascii_lowercase();
            if line.starts_with("macro") {
                open.push((row, "macro"));
            } else if line.starts_with("endmacro") {
                if let Some((start, _)) = pop_matching(&mut open, "macro") {
                    ans.push(fold(start, row));
                }
            } else if line.starts_with("struct") {
                open.push((row, "struct"));
            } else if line.starts_with("endstruct") {
                if let Some((start, _)) = pop_matching(&mut open, "struct") {
                    ans.push(fold(start, row));
                }
            } else if line.starts_with("hook") {
                open.push((row, "hook"));
            } else if line.starts_with("endhook") {
                if let Some((start, _)) = pop_matching(&mut open, "hook") {
                    ans.push(fold(start, row));
                }
            }
        }
        ans
    }
    fn get_inlay_hints(&self, range: &lsp::Range) -> Vec<lsp::InlayHint> {
        let mut by_addr: HashMap<u32, &str> = HashMap::new();
        for l in self.symbols.labels() {
            by_addr.insert(l.address, &l.name);
        }
        let Ok(re) = Regex::new(r"\$([0-9A-Fa-f]{2,6})\b") else {
            return Vec::new();
        };
        let mut ans = Vec::new();
        for row in range.start.line as usize..=range.end.line as usize {
            let Some(line) = self.doc.text.lines().nth(row) else {
                break;
            };
            for cap in re.captures_iter(line) {
                let Ok(val) = u32::from_str_radix(&cap[1], 16) else {
                    continue;
                };
                if let Some(label) = by_addr.get(&val) {
                    let m = cap.get(0).unwrap();
                    ans.push(lsp::InlayHint {
                        position: lsp::Position::new(row as u32, m.end() as u32),
                        label: lsp::InlayHintLabel::String(format!(" ({})", label)),
                        kind: Some(lsp::InlayHintKind::TYPE),
                        text_edits: None,
                        tooltip: None,
                        padding_left: Some(true),
                        padding_right: None,
                        data: None,
                    });
                }
            }
        }
        ans
    }
    fn get_signature_help(&self, pos: &lsp::Position) -> Option<lsp::SignatureHelp> {
        let line = self.doc.text.lines().nth(pos.line as usize)?;
        let prefix: String = line.chars().take(pos.character as usize).collect();
        let open_paren = prefix.rfind('(')?;
        let call = &prefix[..open_paren];
        let (name, _, _) = word_at(call, call.len().saturating_sub(1))?;
        let mac = self.symbols.macros.get(&name)?;
        let active_comma_count = prefix[open_paren..].matches(',').count();
        let params = mac.parameters.iter().map(|p| lsp::ParameterInformation {
            label: lsp::ParameterLabel::Simple(p.clone()),
            documentation: None,
        });
        Some(lsp::SignatureHelp {
            signatures: vec![lsp::SignatureInformation {
                label: format!("{}({})", mac.name, mac.parameters.join(", ")),
                documentation: None,
                parameters: Some(params.collect()),
                active_parameter: Some(active_comma_count as u32),
            }],
            active_signature: Some(0),
            active_parameter: Some(active_comma_count as u32),
        })
    }
}

fn pop_matching<'a>(open: &mut Vec<(usize, &'a str)>, kind: &str) -> Option<(usize, &'a str)> {
    let idx = open.iter().rposition(|(_, k)| *k == kind)?;
    Some(open.remove(idx))
}

fn fold(start: usize, end: usize) -> lsp::FoldingRange {
    lsp::FoldingRange {
        start_line: start as u32,
        start_character: None,
        end_line: end as u32,
        end_character: None,
        kind: Some(lsp::FoldingRangeKind::Region),
        collapsed_text: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::asm::SourceLocation;

    #[test]
    fn word_at_finds_identifier_touching_column() {
        let (name, start, end) = word_at("  JSR MyRoutine", 8).unwrap();
        assert_eq!(name, "MyRoutine");
        assert_eq!(start, 6);
        assert_eq!(end, 15);
    }

    #[test]
    fn folding_ranges_pair_macro_endmacro() {
        let mut mgr = CheckpointManager::new();
        mgr.update_doc(Document::from_string("macro Foo\nLDA #1\nendmacro\n".to_string(), 0), 0);
        let folds = mgr.get_folding_ranges();
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].start_line, 0);
        assert_eq!(folds[0].end_line, 2);
    }

    #[test]
    fn get_defs_resolves_through_shared_symbols() {
        let mut symbols = Symbols::new();
        symbols.define_label("Start".to_string(), 0x808000, SourceLocation::new(0, 4, 0, 0)).unwrap();
        let mut mgr = CheckpointManager::new();
        mgr.update_file_uris(Arc::new(vec!["file:///main.asm".to_string()]));
        mgr.update_symbols(Arc::new(symbols));
        mgr.update_doc(Document::new(lsp::Uri::from_str("file:///main.asm").unwrap(), "JSR Start\n".to_string(), None), 0);
        let sel = lsp::Location::new(lsp::Uri::from_str("file:///main.asm").unwrap(), lsp::Range::new(lsp::Position::new(0, 5), lsp::Position::new(0, 5)));
        let defs = mgr.get_defs(&sel);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].range.start.line, 4);
    }
}
