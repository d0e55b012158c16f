//! Lexer: turns a line of (comment-stripped) source text into a `Vec<Token>`.

use super::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Punctuation,
    Directive,
    Newline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, location: SourceLocation) -> Self {
        Self { kind, text: text.into(), location }
    }
}

const DIRECTIVES: &[&str] = &[
    "org", "base", "lorom", "hirom", "exlorom", "exhirom", "freecode", "freedata", "freespace",
    "pad", "fillbyte", "warnpc", "incsrc", "include", "incdir", "incbin", "macro", "endmacro",
    "struct", "endstruct", "hook", "endhook", "pushns", "popns", "namespace", "db", "dw", "dl",
    "dd", "equ", "if", "else", "endif",
];

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.' || c == '!'
}
fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Tokenize one line of already comment-stripped source text.
pub fn tokenize_line(text: &str, file_id: usize, line: usize) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        let loc = SourceLocation::new(file_id, line, i, 0);
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let start = i;
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                if chars[i] == quote {
                    i += 1;
                    break;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::new(TokenKind::String, text, loc));
            continue;
        }
        if c == '$' || c.is_ascii_digit() || c == '%' {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::new(TokenKind::Number, text, loc));
            continue;
        }
        if is_ident_start(c) {
            let start = i;
            i += 1;
            while i < chars.len() && is_ident_continue(chars[i]) {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let kind = if DIRECTIVES.contains(&text.to_ascii_lowercase().as_str()) {
                TokenKind::Directive
            } else {
                TokenKind::Identifier
            };
            tokens.push(Token::new(kind, text, loc));
            continue;
        }
        // punctuation: operators and separators, single char unless a known 2-char operator
        let two: String = chars[i..std::cmp::min(i + 2, chars.len())].iter().collect();
        if ["<<", ">>", "==", "!=", "<=", ">="].contains(&two.as_str()) {
            tokens.push(Token::new(TokenKind::Punctuation, two, loc));
            i += 2;
            continue;
        }
        tokens.push(Token::new(TokenKind::Punctuation, c.to_string(), loc));
        i += 1;
    }
    tokens.push(Token::new(TokenKind::Newline, "\n", SourceLocation::new(file_id, line, chars.len(), 0)));
    tokens
}

/// Tokenize a whole (already comment-stripped, include-expanded) document, one line at a time.
pub fn tokenize(text: &str, file_id: usize) -> Vec<Token> {
    let mut out = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        out.extend(tokenize_line(line, file_id, line_no));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_label_and_directive() {
        let toks = tokenize_line("Start: LDA #$12 ; trailing", 0, 0);
        assert_eq!(toks[0].kind, TokenKind::Identifier);
        assert_eq!(toks[0].text, "Start");
    }

    #[test]
    fn string_literal_is_one_token() {
        let toks = tokenize_line(r#"db "hello, world""#, 0, 0);
        let strs: Vec<_> = toks.iter().filter(|t| t.kind == TokenKind::String).collect();
        assert_eq!(strs.len(), 1);
        assert_eq!(strs[0].text, "\"hello, world\"");
    }

    #[test]
    fn hex_and_binary_numbers() {
        let toks = tokenize_line("db $AA, %1010", 0, 0);
        let nums: Vec<_> = toks.iter().filter(|t| t.kind == TokenKind::Number).collect();
        assert_eq!(nums.len(), 2);
        assert_eq!(nums[0].text, "$AA");
        assert_eq!(nums[1].text, "%1010");
    }

    #[test]
    fn directive_keyword_is_tagged() {
        let toks = tokenize_line("org $808000", 0, 0);
        assert_eq!(toks[0].kind, TokenKind::Directive);
    }
}
