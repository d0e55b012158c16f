//! # Language module
//!
//! Holds the `Document` type and small helpers shared between the assembler
//! engine (`asm`) and the generic LSP plumbing (`server`). Everything specific
//! to the 65816/SPC700/SuperFX family lives in `asm`.

pub mod asm;
pub mod server;

use lsp_types as lsp;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub type DYNERR = crate::DYNERR;
pub type STDRESULT = crate::STDRESULT;

#[derive(Error, Debug)]
pub enum Error {
    #[error("document not found")]
    DocumentNotFound,
    #[error("could not convert URI to a path")]
    BadUri,
}

/// An open (or volatile, i.e. read-from-disk-but-not-editor-owned) source file.
#[derive(Clone)]
pub struct Document {
    pub uri: lsp::Uri,
    pub text: String,
    pub version: Option<i32>,
}

impl Document {
    pub fn new(uri: lsp::Uri, text: String, version: Option<i32>) -> Self {
        Self { uri, text, version }
    }
    /// Construct a document with a placeholder URI, used by checkpoint managers
    /// before the first real document has been seen.
    pub fn from_string(text: String, version: i32) -> Self {
        Self {
            uri: lsp::Uri::from_str("file:///untitled").expect("unreachable"),
            text,
            version: Some(version),
        }
    }
}

/// Does `range` contain `pos` (inclusive of both endpoints, matching typical editor selection semantics)?
pub fn range_contains_pos(range: &lsp::Range, pos: &lsp::Position) -> bool {
    let after_start = pos.line > range.start.line
        || (pos.line == range.start.line && pos.character >= range.start.character);
    let before_end =
        pos.line < range.end.line || (pos.line == range.end.line && pos.character <= range.end.character);
    after_start && before_end
}

/// Clients occasionally send URIs that differ only in drive-letter case or path
/// separator style (most visible on Windows). Round-trip through a `PathBuf` so
/// the workspace's internal maps use one consistent key per file.
pub fn normalize_client_uri(uri: lsp::Uri) -> lsp::Uri {
    match pathbuf_from_uri(&uri).and_then(|p| uri_from_path(&p)) {
        Ok(normalized) => normalized,
        Err(_) => uri,
    }
}

pub fn pathbuf_from_uri(uri: &lsp::Uri) -> Result<PathBuf, DYNERR> {
    if uri.scheme().map(|s| s.as_str()) != Some("file") {
        return Err(Box::new(Error::BadUri));
    }
    let mut path_str = uri.path().as_str().to_string();
    #[cfg(windows)]
    {
        path_str = path_str.trim_start_matches('/').to_string();
    }
    Ok(PathBuf::from(path_str))
}

pub fn uri_from_path(path: &std::path::Path) -> Result<lsp::Uri, DYNERR> {
    let s = path.to_string_lossy().replace('\\', "/");
    let prefixed = if s.starts_with('/') { s } else { format!("/{}", s) };
    lsp::Uri::from_str(&format!("file://{}", prefixed)).map_err(|_| Box::new(Error::BadUri) as DYNERR)
}

pub fn update_json_bool(obj: &serde_json::Value, key: &str, curr: &mut bool) {
    if let Some(v) = obj.get(key).and_then(|v| v.as_bool()) {
        *curr = v;
    }
}
pub fn update_json_i64(obj: &serde_json::Value, key: &str, curr: &mut i64) {
    if let Some(v) = obj.get(key).and_then(|v| v.as_i64()) {
        *curr = v;
    }
}
pub fn update_json_f64(obj: &serde_json::Value, key: &str, curr: &mut f64) {
    if let Some(v) = obj.get(key).and_then(|v| v.as_f64()) {
        *curr = v;
    }
}
pub fn update_json_string(obj: &serde_json::Value, key: &str, curr: &mut String) {
    if let Some(v) = obj.get(key).and_then(|v| v.as_str()) {
        *curr = v.to_string();
    }
}
pub fn update_json_vec_str(obj: &serde_json::Value, key: &str, curr: &mut Vec<String>) {
    if let Some(v) = obj.get(key).and_then(|v| v.as_array()) {
        *curr = v.iter().filter_map(|x| x.as_str().map(|s| s.to_string())).collect();
    }
}
pub fn update_json_severity(obj: &serde_json::Value, key: &str, curr: &mut Option<lsp::DiagnosticSeverity>) {
    if let Some(v) = obj.get(key) {
        *curr = match v.as_str() {
            Some("error") => Some(lsp::DiagnosticSeverity::ERROR),
            Some("warning") => Some(lsp::DiagnosticSeverity::WARNING),
            Some("info") => Some(lsp::DiagnosticSeverity::INFORMATION),
            Some("hint") => Some(lsp::DiagnosticSeverity::HINT),
            Some("off") | Some("none") => None,
            _ => curr.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn range_contains_pos_endpoints_inclusive() {
        let range = lsp::Range::new(lsp::Position::new(2, 3), lsp::Position::new(2, 10));
        assert!(range_contains_pos(&range, &lsp::Position::new(2, 3)));
        assert!(range_contains_pos(&range, &lsp::Position::new(2, 10)));
        assert!(range_contains_pos(&range, &lsp::Position::new(2, 7)));
        assert!(!range_contains_pos(&range, &lsp::Position::new(2, 2)));
        assert!(!range_contains_pos(&range, &lsp::Position::new(1, 7)));
    }
}
