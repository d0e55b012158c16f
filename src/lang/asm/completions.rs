//! Completions: prefix match over the workspace symbol index plus the
//! mnemonic/directive table, grounded on the teacher's `CompletionProvider`
//! (pull the current line out of the `Lines` iterator by `pos.line`, slice
//! the prefix up to `pos.character`, match against a few candidate sources).

use crate::lang::server::Completions;
use lsp_types as lsp;
use std::str::Lines;
use std::sync::Arc;

use super::opcodes::OPCODES;
use super::{Symbol, Symbols};
use std::collections::BTreeSet;

fn all_mnemonics() -> BTreeSet<&'static str> {
    OPCODES.iter().map(|e| e.mnemonic).collect()
}

pub struct CompletionProvider {
    symbols: Arc<Symbols>,
}

impl CompletionProvider {
    pub fn new() -> Self {
        Self { symbols: Arc::new(Symbols::new()) }
    }
    pub fn use_shared_symbols(&mut self, symbols: Arc<Symbols>) {
        self.symbols = symbols;
    }
}

fn current_prefix(line: &str, character: usize) -> String {
    let upto: String = line.chars().take(character).collect();
    let start = upto.rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.')).map(|i| i + 1).unwrap_or(0);
    upto[start..].to_string()
}

fn symbol_item(name: &str, sym: &Symbol) -> lsp::CompletionItem {
    let kind = match sym {
        Symbol::Label(_) => lsp::CompletionItemKind::CONSTANT,
        Symbol::Define(_) => lsp::CompletionItemKind::CONSTANT,
        Symbol::Macro(_) => lsp::CompletionItemKind::FUNCTION,
        Symbol::Struct(_) => lsp::CompletionItemKind::STRUCT,
    };
    lsp::CompletionItem { label: name.to_string(), kind: Some(kind), ..Default::default() }
}

impl Completions for CompletionProvider {
    fn get(&mut self, lines: &mut Lines, ctx: &lsp::CompletionContext, pos: &lsp::Position) -> Result<Vec<lsp::CompletionItem>, String> {
        let Some(curr) = lines.nth(pos.line as usize) else {
            return Ok(Vec::new());
        };
        if pos.character as usize > curr.chars().count() {
            return Ok(Vec::new());
        }
        let _ = ctx;
        let prefix = current_prefix(curr, pos.character as usize);
        let mut ans = Vec::new();
        if prefix.is_empty() {
            return Ok(ans);
        }
        let prefix_upper = prefix.to_ascii_uppercase();
        for m in all_mnemonics() {
            if m.starts_with(&prefix_upper) {
                ans.push(lsp::CompletionItem { label: m.to_string(), kind: Some(lsp::CompletionItemKind::KEYWORD), ..Default::default() });
            }
        }
        for (name, sym) in self.symbols.entries.iter() {
            if name.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()) {
                ans.push(symbol_item(name, sym));
            }
        }
        for (name, mac) in self.symbols.macros.iter() {
            if name.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()) {
                ans.push(symbol_item(name, &Symbol::Macro(mac.clone())));
            }
        }
        Ok(ans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::asm::SourceLocation;

    #[test]
    fn prefix_is_sliced_back_to_the_nearest_separator() {
        assert_eq!(current_prefix("  JSR MyRo", 10), "MyRo");
    }

    #[test]
    fn mnemonic_prefix_completes_to_full_mnemonics() {
        let mut provider = CompletionProvider::new();
        let text = "LD";
        let mut lines = text.lines();
        let ctx = lsp::CompletionContext { trigger_kind: lsp::CompletionTriggerKind::INVOKED, trigger_character: None };
        let items = provider.get(&mut lines, &ctx, &lsp::Position::new(0, 2)).unwrap();
        assert!(items.iter().any(|i| i.label == "LDA"));
    }

    #[test]
    fn label_prefix_completes_from_symbol_table() {
        let mut symbols = Symbols::new();
        symbols.define_label("MainLoop".to_string(), 0x808000, SourceLocation::default()).unwrap();
        let mut provider = CompletionProvider::new();
        provider.use_shared_symbols(Arc::new(symbols));
        let text = "JSR Main";
        let mut lines = text.lines();
        let ctx = lsp::CompletionContext { trigger_kind: lsp::CompletionTriggerKind::INVOKED, trigger_character: None };
        let items = provider.get(&mut lines, &ctx, &lsp::Position::new(0, 8)).unwrap();
        assert!(items.iter().any(|i| i.label == "MainLoop"));
    }
}
