//! Source reader: include-path search, include-directive expansion, and
//! string-literal-aware comment stripping, with per-line origin tracking.

use super::AsmError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Strip a `;`-comment from a line. A `;` inside a `"..."` or `'...'` literal is not
/// a comment start; a backslash escapes the following character (including a quote).
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_string: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = in_string {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                in_string = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => {
                in_string = Some(b);
                i += 1;
            }
            b';' => return &line[..i],
            _ => i += 1,
        }
    }
    line
}

/// Expanded, include-resolved source: one logical line per entry, each carrying
/// the `(file_id, original_line_number)` it came from.
pub struct ExpandedSource {
    pub lines: Vec<String>,
    pub origins: Vec<(usize, usize)>,
    pub file_paths: Vec<PathBuf>,
}

pub struct SourceReader {
    pub include_dirs: Vec<PathBuf>,
    file_paths: Vec<PathBuf>,
    file_ids: std::collections::HashMap<PathBuf, usize>,
}

impl SourceReader {
    pub fn new(include_dirs: Vec<PathBuf>) -> Self {
        Self { include_dirs, file_paths: Vec::new(), file_ids: std::collections::HashMap::new() }
    }

    fn file_id_for(&mut self, path: &Path) -> usize {
        let canon = canonicalize_or_self(path);
        if let Some(id) = self.file_ids.get(&canon) {
            return *id;
        }
        let id = self.file_paths.len();
        self.file_paths.push(canon.clone());
        self.file_ids.insert(canon, id);
        id
    }

    fn resolve_include(&self, requested: &str, including_dir: &Path) -> Option<PathBuf> {
        let direct = including_dir.join(requested);
        if direct.is_file() {
            return Some(direct);
        }
        for dir in &self.include_dirs {
            let candidate = dir.join(requested);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Expand `root` and all transitively included files into one logical source.
    pub fn expand(&mut self, root: &Path) -> Result<ExpandedSource, AsmError> {
        let mut out = ExpandedSource { lines: Vec::new(), origins: Vec::new(), file_paths: Vec::new() };
        let mut stack: Vec<PathBuf> = Vec::new();
        self.expand_into(root, &mut out, &mut stack)?;
        out.file_paths = self.file_paths.clone();
        Ok(out)
    }

    fn expand_into(&mut self, path: &Path, out: &mut ExpandedSource, stack: &mut Vec<PathBuf>) -> Result<(), AsmError> {
        // Canonicalized so the same physical file reached through two different
        // relative spellings (`../a.asm` from one dir, `a.asm` from another) is
        // recognized as one file: both for cycle detection and for `file_id`,
        // which the SourceMap and every diagnostic's `file_id` key off of.
        let canon = canonicalize_or_self(path);
        if stack.contains(&canon) {
            return Err(AsmError::IncludeCycle(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| AsmError::IncludeNotFound(format!("{}: {}", path.display(), e)))?;
        let file_id = self.file_id_for(path);
        stack.push(canon);
        let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let mut local_include_dirs = self.include_dirs.clone();

        for (line_no, raw_line) in text.lines().enumerate() {
            let stripped = strip_comment(raw_line);
            let trimmed = stripped.trim();
            let lower = trimmed.to_ascii_lowercase();

            if let Some(rest) = strip_directive(&lower, trimmed, "incdir") {
                let new_dir = dir.join(unquote(rest));
                local_include_dirs.push(new_dir.clone());
                self.include_dirs.push(new_dir);
                continue;
            }
            if let Some(rest) = strip_directive(&lower, trimmed, "incsrc")
                .or_else(|| strip_directive(&lower, trimmed, "include"))
            {
                let requested = unquote(rest);
                let target = self
                    .resolve_include_with(&requested, &dir, &local_include_dirs)
                    .ok_or_else(|| AsmError::IncludeNotFound(requested.to_string()))?;
                self.expand_into(&target, out, stack)?;
                continue;
            }
            if let Some(rest) = strip_directive(&lower, trimmed, "incbin") {
                let requested = unquote(rest);
                let target = self
                    .resolve_include_with(&requested, &dir, &local_include_dirs)
                    .ok_or_else(|| AsmError::IncludeNotFound(requested.to_string()))?;
                let bytes = std::fs::read(&target)
                    .map_err(|e| AsmError::IncludeNotFound(format!("{}: {}", target.display(), e)))?;
                let hex_bytes: Vec<String> = bytes.iter().map(|b| format!("${:02X}", b)).collect();
                out.lines.push(format!("db {}", hex_bytes.join(",")));
                out.origins.push((file_id, line_no));
                continue;
            }

            out.lines.push(stripped.to_string());
            out.origins.push((file_id, line_no));
        }
        stack.pop();
        Ok(())
    }

    fn resolve_include_with(&self, requested: &str, dir: &Path, extra_dirs: &[PathBuf]) -> Option<PathBuf> {
        let direct = dir.join(requested);
        if direct.is_file() {
            return Some(direct);
        }
        for d in extra_dirs {
            let candidate = d.join(requested);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        self.resolve_include(requested, dir)
    }

    pub fn file_paths(&self) -> &[PathBuf] {
        &self.file_paths
    }
}

fn canonicalize_or_self(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn strip_directive<'a>(lower: &str, original: &'a str, directive: &str) -> Option<&'a str> {
    if let Some(tail) = lower.strip_prefix(directive) {
        // Require a word boundary after the prefix so e.g. `incsrcValue equ $42`
        // isn't mistaken for an `incsrc` directive.
        if tail.is_empty() || tail.starts_with(char::is_whitespace) {
            return Some(original[directive.len()..].trim());
        }
    }
    None
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[allow(dead_code)]
fn unique_paths(paths: &[PathBuf]) -> HashSet<PathBuf> {
    paths.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_comment() {
        assert_eq!(strip_comment("LDA #$12 ; load a"), "LDA #$12 ");
    }

    #[test]
    fn semicolon_in_string_is_not_a_comment() {
        assert_eq!(strip_comment(r#"db "a;b" ; real comment"#), r#"db "a;b" "#);
    }

    #[test]
    fn backslash_escapes_quote_inside_string() {
        assert_eq!(strip_comment(r#"db "a\"b" ; c"#), r#"db "a\"b" "#);
    }

    #[test]
    fn expands_incsrc_inline() {
        let tmp = tempfile::tempdir().unwrap();
        let inc_path = tmp.path().join("a.asm");
        std::fs::write(&inc_path, "db $AA\n").unwrap();
        let main_path = tmp.path().join("main.asm");
        std::fs::write(&main_path, "incsrc \"a.asm\"\ndb $BB\n").unwrap();

        let mut reader = SourceReader::new(vec![]);
        let expanded = reader.expand(&main_path).unwrap();
        assert_eq!(expanded.lines, vec!["db $AA".to_string(), "db $BB".to_string()]);
    }

    #[test]
    fn identifier_merely_prefixed_with_a_directive_name_is_not_mistaken_for_one() {
        let tmp = tempfile::tempdir().unwrap();
        let main_path = tmp.path().join("main.asm");
        std::fs::write(&main_path, "incsrcValue equ $42\n").unwrap();

        let mut reader = SourceReader::new(vec![]);
        let expanded = reader.expand(&main_path).unwrap();
        assert_eq!(expanded.lines, vec!["incsrcValue equ $42".to_string()]);
    }

    #[test]
    fn detects_include_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let a_path = tmp.path().join("a.asm");
        let b_path = tmp.path().join("b.asm");
        std::fs::write(&a_path, "incsrc \"b.asm\"\n").unwrap();
        std::fs::write(&b_path, "incsrc \"a.asm\"\n").unwrap();

        let mut reader = SourceReader::new(vec![]);
        let err = reader.expand(&a_path).unwrap_err();
        assert_eq!(err.code(), "include_cycle");
    }
}
