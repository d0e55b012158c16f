//! Semantic tokens: classifies each line with the same tokenizer the
//! assembler front end uses, rather than the teacher's tree-sitter
//! `Navigate` walk, since this engine has no parse tree to walk.

use crate::lang::server::{SemanticTokensBuilder, Tokens};
use crate::DYNERR;
use lsp_types as lsp;

use super::opcodes;
use super::source::strip_comment;
use super::tokenizer::{tokenize_line, TokenKind};

#[derive(Default)]
pub struct SemanticTokensProvider {
    builder: SemanticTokensBuilder,
}

impl SemanticTokensProvider {
    pub fn new() -> Self {
        Self { builder: SemanticTokensBuilder::new() }
    }
}

/// Classify one identifier token given what comes before it on the line: a
/// mnemonic is a keyword, a name immediately followed by `:` is a label, a
/// local name (leading `.`) is a variable, everything else defaults to
/// variable until a resolved symbol table says otherwise (hovers/completions
/// carry that distinction; tokens stay cheap and local).
fn classify_identifier(text: &str, is_first_on_line: bool, followed_by_colon: bool) -> &'static str {
    if opcodes::is_mnemonic(text) {
        "keyword"
    } else if is_first_on_line && followed_by_colon {
        "label"
    } else if text.starts_with('.') {
        "variable"
    } else if is_first_on_line {
        "macro"
    } else {
        "variable"
    }
}

impl Tokens for SemanticTokensProvider {
    fn get(&mut self, txt: &str) -> Result<lsp::SemanticTokens, DYNERR> {
        self.builder.reset();
        for (row, raw) in txt.lines().enumerate() {
            let code = strip_comment(raw);
            let toks = tokenize_line(code, 0, row);
            let mut seen_ident = false;
            for (idx, tok) in toks.iter().enumerate() {
                if tok.kind == TokenKind::Newline {
                    continue;
                }
                let rng = lsp::Range::new(
                    lsp::Position::new(row as u32, tok.location.column as u32),
                    lsp::Position::new(row as u32, (tok.location.column + tok.text.chars().count()) as u32),
                );
                let typ = match tok.kind {
                    TokenKind::Directive => "keyword",
                    TokenKind::Number => "number",
                    TokenKind::String => "string",
                    TokenKind::Punctuation => "operator",
                    TokenKind::Newline => unreachable!("filtered above"),
                    TokenKind::Identifier => {
                        let is_first = !seen_ident;
                        let followed_by_colon = toks.get(idx + 1).map(|n| n.text == ":").unwrap_or(false);
                        seen_ident = true;
                        classify_identifier(&tok.text, is_first, followed_by_colon)
                    }
                };
                self.builder.push(rng, typ);
            }
            if code.len() < raw.len() {
                let comment_start = code.len();
                let rng = lsp::Range::new(
                    lsp::Position::new(row as u32, comment_start as u32),
                    lsp::Position::new(row as u32, raw.chars().count() as u32),
                );
                self.builder.push(rng, "comment");
            }
        }
        self.builder.clone_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_is_classified_as_keyword() {
        assert_eq!(classify_identifier("LDA", false, false), "keyword");
    }

    #[test]
    fn label_definition_is_classified_as_label() {
        assert_eq!(classify_identifier("Start", true, true), "label");
    }

    #[test]
    fn local_label_is_classified_as_variable() {
        assert_eq!(classify_identifier(".loop", true, true), "variable");
    }

    #[test]
    fn tokenizing_a_document_produces_tokens_for_every_line() {
        let mut provider = SemanticTokensProvider::new();
        let result = provider.get("Start: LDA #$12 ; comment\nRTS\n").unwrap();
        assert!(!result.data.is_empty());
    }
}
