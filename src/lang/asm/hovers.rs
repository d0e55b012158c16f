//! Hover: renders a markdown summary for the identifier under the
//! cursor, grounded on the teacher's `HoverProvider` (code block + docstring +
//! used-by section), but sourced from `Symbols` instead of a tree-sitter node.

use crate::lang::server::Hovers;
use lsp_types as lsp;
use std::sync::Arc;

use super::checkpoint::word_at;
use super::opcodes;
use super::{Symbol, Symbols};

pub struct HoverProvider {
    symbols: Arc<Symbols>,
}

impl HoverProvider {
    pub fn new() -> Self {
        Self { symbols: Arc::new(Symbols::new()) }
    }
    pub fn use_shared_symbols(&mut self, symbols: Arc<Symbols>) {
        self.symbols = symbols;
    }
}

fn markup(value: String) -> lsp::Hover {
    lsp::Hover {
        contents: lsp::HoverContents::Markup(lsp::MarkupContent { kind: lsp::MarkupKind::Markdown, value }),
        range: None,
    }
}

fn mnemonic_hover(mnemonic: &str) -> Option<lsp::Hover> {
    let modes = opcodes::modes_for(mnemonic);
    if modes.is_empty() {
        return None;
    }
    let mut value = format!("```\n{}\n```\n\naddressing modes:\n", mnemonic.to_ascii_uppercase());
    for m in modes {
        value += &format!("- {:?}\n", m);
    }
    Some(markup(value))
}

fn symbol_hover(name: &str, sym: &Symbol) -> lsp::Hover {
    let body = match sym {
        Symbol::Label(l) => format!("```\n{}: ${:06X}\n```\nlabel (bank ${:02X})", l.name, l.address, l.bank),
        Symbol::Define(d) => format!("```\n{} = {}\n```", d.name, d.value_text),
        Symbol::Macro(m) => format!("```\nmacro {}({})\n```", m.name, m.parameters.join(", ")),
        Symbol::Struct(s) => {
            let mut fields: Vec<_> = s.fields.iter().collect();
            fields.sort_by_key(|(_, off)| **off);
            let listing = fields.iter().map(|(n, off)| format!("  {} @ {}", n, off)).collect::<Vec<_>>().join("\n");
            format!("```\nstruct {}\n{}\n```", name, listing)
        }
    };
    markup(body)
}

impl Hovers for HoverProvider {
    fn get(&mut self, line: String, row: isize, col: isize) -> Option<lsp::Hover> {
        if row < 0 || col < 0 {
            return None;
        }
        let (name, _, _) = word_at(&line, col as usize)?;
        if opcodes::is_mnemonic(&name) {
            return mnemonic_hover(&name);
        }
        if let Some(sym) = self.symbols.resolve(&name) {
            return Some(symbol_hover(&name, sym));
        }
        if let Some(mac) = self.symbols.macros.get(&name) {
            return Some(symbol_hover(&name, &Symbol::Macro(mac.clone())));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::asm::SourceLocation;

    #[test]
    fn hovering_a_mnemonic_lists_its_addressing_modes() {
        let mut hov = HoverProvider::new();
        let result = hov.get("LDA #$12".to_string(), 0, 1).unwrap();
        match result.contents {
            lsp::HoverContents::Markup(m) => assert!(m.value.contains("addressing modes")),
            _ => panic!("expected markup"),
        }
    }

    #[test]
    fn hovering_a_known_label_shows_its_address() {
        let mut symbols = Symbols::new();
        symbols.define_label("Start".to_string(), 0x808000, SourceLocation::default()).unwrap();
        let mut hov = HoverProvider::new();
        hov.use_shared_symbols(Arc::new(symbols));
        let result = hov.get("JSR Start".to_string(), 0, 5).unwrap();
        match result.contents {
            lsp::HoverContents::Markup(m) => assert!(m.value.contains("808000")),
            _ => panic!("expected markup"),
        }
    }

    #[test]
    fn hovering_unknown_identifier_returns_none() {
        let mut hov = HoverProvider::new();
        assert!(hov.get("JSR Mystery".to_string(), 0, 5).is_none());
    }
}
