//! Analysis orchestrator: implements `server::Analysis` by driving
//! `assembler::assemble` plus `linter::lint` over whichever file the project
//! graph says is the current root, grounded on the teacher's
//! `diagnostics::Analyzer` (reset-then-run-passes-then-summarize shape) but
//! single-pass rather than a 3-pass tree-walk, since this engine's assembler
//! already does collect-then-emit internally.

use crate::lang::server::Analysis;
use crate::lang::Document;
use crate::{DYNERR, STDRESULT};
use lsp_types as lsp;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use super::project_graph::ProjectGraph;
use super::settings::Settings;
use super::source::SourceReader;
use super::hooks::{self, HookManifest};
use super::{assembler, linter, Diagnostic as AsmDiagnostic, Severity};

fn to_lsp_severity(sev: Severity) -> lsp::DiagnosticSeverity {
    match sev {
        Severity::Error => lsp::DiagnosticSeverity::ERROR,
        Severity::Warning => lsp::DiagnosticSeverity::WARNING,
        Severity::Info => lsp::DiagnosticSeverity::INFORMATION,
        Severity::Hint => lsp::DiagnosticSeverity::HINT,
    }
}

fn to_lsp_diagnostic(d: &AsmDiagnostic) -> lsp::Diagnostic {
    let pos = lsp::Position::new(d.start.line as u32, d.start.column as u32);
    let end = lsp::Position::new(d.end.line as u32, (d.end.column + 1).max(d.start.column as usize + 1) as u32);
    lsp::Diagnostic {
        range: lsp::Range::new(pos, end),
        severity: Some(to_lsp_severity(d.severity)),
        code: Some(lsp::NumberOrString::String(d.code.to_string())),
        code_description: None,
        source: Some("snes65816".to_string()),
        message: d.message.clone(),
        related_information: None,
        tags: None,
        data: None,
    }
}

pub struct AsmAnalyzer {
    settings: Settings,
    workspace_folders: Vec<lsp::Uri>,
    graph: ProjectGraph,
    workspace_texts: Arc<HashMap<String, String>>,
    diagnostics: HashMap<String, Vec<lsp::Diagnostic>>,
    folds: HashMap<String, Vec<lsp::FoldingRange>>,
    symbols: Arc<super::Symbols>,
    file_uris: Arc<Vec<String>>,
}

impl AsmAnalyzer {
    pub fn new() -> Self {
        Self {
            settings: Settings::new(),
            workspace_folders: Vec::new(),
            graph: ProjectGraph::new(),
            workspace_texts: Arc::new(HashMap::new()),
            diagnostics: HashMap::new(),
            folds: HashMap::new(),
            symbols: Arc::new(super::Symbols::new()),
            file_uris: Arc::new(Vec::new()),
        }
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn shared_symbols(&self) -> Arc<super::Symbols> {
        Arc::clone(&self.symbols)
    }
    pub fn shared_workspace_texts(&self) -> Arc<HashMap<String, String>> {
        Arc::clone(&self.workspace_texts)
    }
    /// URIs of every file the most recent `analyze()` expanded, indexed by
    /// `SourceLocation::file_id` so a `CheckpointManager` can turn a symbol's
    /// definition site back into a `lsp::Location` even when it lives in a
    /// different file than the one being edited.
    pub fn shared_file_uris(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.file_uris)
    }

    /// Scan every workspace folder for source files and register include
    /// edges in the project graph, so a later `analyze()` on an included file
    /// can find its nearest preferred master.
    fn gather_workspace(&mut self) -> STDRESULT {
        self.graph.clear();
        let mut texts = HashMap::new();
        for dir in &self.workspace_folders {
            let Ok(path) = crate::lang::pathbuf_from_uri(dir) else {
                continue;
            };
            let opt = glob::MatchOptions { case_sensitive: false, require_literal_leading_dot: false, require_literal_separator: false };
            for ext in ["asm", "s", "inc", "a"] {
                let patt = path.join("**").join(format!("*.{}", ext));
                let Some(globable) = patt.as_os_str().to_str() else {
                    continue;
                };
                let Ok(paths) = glob::glob_with(globable, opt) else {
                    continue;
                };
                for entry in paths.flatten() {
                    let Ok(uri) = crate::lang::uri_from_path(&entry) else {
                        continue;
                    };
                    let Ok(text) = std::fs::read_to_string(&entry) else {
                        continue;
                    };
                    register_includes(&mut self.graph, &uri.to_string(), &text);
                    texts.insert(uri.to_string(), text);
                }
            }
        }
        self.workspace_texts = Arc::new(texts);
        Ok(())
    }

    fn preferred_masters(&self) -> HashSet<String> {
        let mut ans = HashSet::new();
        for main in &self.settings.main_files {
            ans.insert(main.clone());
            for uri in self.workspace_texts.keys() {
                if uri.ends_with(main.as_str()) {
                    ans.insert(uri.clone());
                }
            }
        }
        for uri in self.workspace_texts.keys() {
            let lower = uri.to_ascii_lowercase();
            if lower.ends_with("main.asm") || lower.ends_with("main.s") {
                ans.insert(uri.clone());
            }
        }
        ans
    }

    /// `missing_label: Name` is often a root-selection artifact: the label is
    /// defined in a sibling master's include tree that this root never pulled
    /// in. Before surfacing it, check whether the name is already known in
    /// the symbol table this same assemble pass produced.
    fn known_elsewhere(&self, message: &str) -> bool {
        let Some(name) = message.strip_prefix("missing label: ") else {
            return false;
        };
        self.symbols.resolve(name).is_some() || self.symbols.macros.contains_key(name)
    }
}

/// Scan a file's text for `incsrc`/`include` directives and register the
/// resulting include edges in the project graph, resolving each target
/// relative to the including file's directory.
fn register_includes(graph: &mut ProjectGraph, parent_uri: &str, text: &str) {
    let Ok(parsed) = lsp::Uri::from_str(parent_uri) else {
        return;
    };
    let Ok(parent_path) = crate::lang::pathbuf_from_uri(&parsed) else {
        return;
    };
    let dir = parent_path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
    for raw in text.lines() {
        let stripped = super::source::strip_comment(raw).trim();
        let lower = stripped.to_ascii_lowercase();
        for directive in ["incsrc", "include"] {
            let Some(tail) = lower.strip_prefix(directive) else {
                continue;
            };
            // Word-boundary check so e.g. `incsrcValue equ $42` isn't mistaken
            // for an `incsrc` directive (matches the source reader's rule).
            if !tail.is_empty() && !tail.starts_with(char::is_whitespace) {
                continue;
            }
            let rest = stripped[directive.len()..].trim().trim_matches('"');
            if rest.is_empty() {
                continue;
            }
            let target = dir.join(rest);
            if let Ok(child_uri) = crate::lang::uri_from_path(&target) {
                graph.register(parent_uri, &child_uri.to_string());
            }
        }
    }
}

impl Analysis for AsmAnalyzer {
    fn init_workspace(&mut self, source_dirs: Vec<lsp::Uri>, volatile_docs: Vec<Document>) -> STDRESULT {
        self.workspace_folders = source_dirs;
        self.gather_workspace()?;
        let mut texts = (*self.workspace_texts).clone();
        for doc in volatile_docs {
            texts.insert(doc.uri.to_string(), doc.text);
        }
        self.workspace_texts = Arc::new(texts);
        Ok(())
    }

    fn analyze(&mut self, doc: &Document) -> Result<(), DYNERR> {
        self.diagnostics.remove(&doc.uri.to_string());
        self.folds.remove(&doc.uri.to_string());

        let mut texts = (*self.workspace_texts).clone();
        texts.insert(doc.uri.to_string(), doc.text.clone());
        register_includes(&mut self.graph, &doc.uri.to_string(), &doc.text);
        self.workspace_texts = Arc::new(texts);

        let preferred = self.preferred_masters();
        let root_uri = self.graph.select_root(&doc.uri.to_string(), &preferred);
        let root_parsed = lsp::Uri::from_str(&root_uri).unwrap_or_else(|_| doc.uri.clone());
        let Ok(root_path) = crate::lang::pathbuf_from_uri(&root_parsed) else {
            return Ok(());
        };
        if !root_path.is_file() {
            log::info!("root {} is not a file on disk, skipping analysis", root_path.display());
            return Ok(());
        }

        let include_dirs: Vec<std::path::PathBuf> =
            self.settings.include_paths.iter().map(std::path::PathBuf::from).collect();
        let mut reader = SourceReader::new(include_dirs);
        let expanded = reader.expand(&root_path)?;

        let out = assembler::assemble(&expanded, &self.settings);
        let hooks = out.hooks.clone();
        let lint_diags = linter::lint(&out.symbols, &expanded, &hooks, &out.mx, &self.settings);

        self.symbols = Arc::new(out.symbols);

        let file_uri = |file_id: usize| -> Option<String> {
            expanded.file_paths.get(file_id).and_then(|p| crate::lang::uri_from_path(p).ok()).map(|u| u.to_string())
        };
        self.file_uris = Arc::new(expanded.file_paths.iter().map(|p| crate::lang::uri_from_path(p).map(|u| u.to_string()).unwrap_or_default()).collect());

        // This analyze() re-derives diagnostics for every file in the include
        // tree rooted at root_uri, not just doc.uri — so every file that tree
        // can touch must have its old diagnostics cleared here, or repeated
        // edits would append duplicates onto files other than the one edited.
        for path in expanded.file_paths.iter() {
            if let Ok(uri) = crate::lang::uri_from_path(path) {
                self.diagnostics.remove(&uri.to_string());
            }
        }

        for d in out.diagnostics.iter().chain(lint_diags.iter()) {
            if d.code == "missing_label" && self.known_elsewhere(&d.message) {
                continue;
            }
            let Some(uri) = file_uri(d.file_id) else {
                continue;
            };
            self.diagnostics.entry(uri).or_default().push(to_lsp_diagnostic(d));
        }

        let fold_re_macro = regex::Regex::new(r"(?i)^\s*macro\b").unwrap();
        let fold_re_endmacro = regex::Regex::new(r"(?i)^\s*endmacro\b").unwrap();
        let mut open_stack: Vec<usize> = Vec::new();
        for (row, raw) in doc.text.lines().enumerate() {
            if fold_re_macro.is_match(raw) {
                open_stack.push(row);
            } else if fold_re_endmacro.is_match(raw) {
                if let Some(start) = open_stack.pop() {
                    self.folds.entry(doc.uri.to_string()).or_default().push(lsp::FoldingRange {
                        start_line: start as u32,
                        start_character: None,
                        end_line: row as u32,
                        end_character: None,
                        kind: Some(lsp::FoldingRangeKind::Region),
                        collapsed_text: None,
                    });
                }
            }
        }

        Ok(())
    }

    fn update_config(&mut self, json_str: &str) -> STDRESULT {
        self.settings = super::settings::parse(json_str);
        Ok(())
    }

    fn get_diags(&self, doc: &Document) -> Vec<lsp::Diagnostic> {
        self.diagnostics.get(&doc.uri.to_string()).cloned().unwrap_or_default()
    }

    fn get_folds(&self, doc: &Document) -> Vec<lsp::FoldingRange> {
        self.folds.get(&doc.uri.to_string()).cloned().unwrap_or_default()
    }

    fn err_warn_info_counts(&self) -> [usize; 3] {
        let mut err = 0;
        let mut warn = 0;
        let mut info = 0;
        for diags in self.diagnostics.values() {
            for d in diags {
                match d.severity {
                    Some(lsp::DiagnosticSeverity::ERROR) => err += 1,
                    Some(lsp::DiagnosticSeverity::WARNING) => warn += 1,
                    Some(lsp::DiagnosticSeverity::INFORMATION) => info += 1,
                    _ => {}
                }
            }
        }
        [err, warn, info]
    }

    fn eprint_summary(&self, doc: &str) {
        let [err, warn, info] = self.err_warn_info_counts();
        log::info!("{}: {} errors, {} warnings, {} notes", doc, err, warn, info);
    }

    fn read_stdin(&self) -> String {
        use std::io::Read;
        let mut program = String::new();
        std::io::stdin().read_to_string(&mut program).expect("failed to read stdin");
        program
    }
}

/// Optionally attach a hook manifest, validated against the current ROM's
/// checksum, before the next `analyze()` call runs the linter's ABI checks
/// against real hook entries instead of an empty list.
pub fn load_hooks(path: &std::path::Path) -> Result<HookManifest, DYNERR> {
    let text = std::fs::read_to_string(path)?;
    Ok(hooks::load(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_includes_links_parent_to_child() {
        let tmp = tempfile::tempdir().unwrap();
        let main_path = tmp.path().join("main.asm");
        std::fs::write(&main_path, "incsrc \"inc/header.asm\"\n").unwrap();
        let mut graph = ProjectGraph::new();
        let parent_uri = crate::lang::uri_from_path(&main_path).unwrap().to_string();
        register_includes(&mut graph, &parent_uri, "incsrc \"inc/header.asm\"\n");
        let child_path = main_path.parent().unwrap().join("inc").join("header.asm");
        let child_uri = crate::lang::uri_from_path(&child_path).unwrap().to_string();
        assert_eq!(graph.parents_of(&child_uri), vec![parent_uri]);
    }

    #[test]
    fn analyze_reports_diagnostics_for_the_edited_file() {
        let tmp = tempfile::tempdir().unwrap();
        let main_path = tmp.path().join("main.asm");
        std::fs::write(&main_path, "org $808000\nJSR Missing\n").unwrap();
        let uri = crate::lang::uri_from_path(&main_path).unwrap();
        let doc = Document::new(uri.clone(), std::fs::read_to_string(&main_path).unwrap(), Some(1));
        let mut analyzer = AsmAnalyzer::new();
        analyzer.analyze(&doc).unwrap();
        let diags = analyzer.get_diags(&doc);
        assert!(!diags.is_empty());
    }

    #[test]
    fn identifier_merely_prefixed_with_a_directive_name_is_not_registered_as_an_include() {
        let tmp = tempfile::tempdir().unwrap();
        let main_path = tmp.path().join("main.asm");
        let parent_uri = crate::lang::uri_from_path(&main_path).unwrap().to_string();
        let mut graph = ProjectGraph::new();
        register_includes(&mut graph, &parent_uri, "incsrcValue equ $42\n");
        // Reconstruct the bogus "child" the old prefix-only match would have
        // derived from the tail after "incsrc" and confirm no edge landed on it.
        let bogus_child = main_path.parent().unwrap().join("Value equ $42");
        let bogus_uri = crate::lang::uri_from_path(&bogus_child).unwrap().to_string();
        assert!(graph.parents_of(&bogus_uri).is_empty());
    }

    #[test]
    fn reanalyzing_the_root_does_not_duplicate_diagnostics_in_an_included_file() {
        let tmp = tempfile::tempdir().unwrap();
        let main_path = tmp.path().join("main.asm");
        let inc_path = tmp.path().join("header.asm");
        std::fs::write(&inc_path, "JSR Missing\n").unwrap();
        std::fs::write(&main_path, "org $808000\nincsrc \"header.asm\"\n").unwrap();

        let uri = crate::lang::uri_from_path(&main_path).unwrap();
        let inc_uri = crate::lang::uri_from_path(&inc_path).unwrap();
        let doc = Document::new(uri.clone(), std::fs::read_to_string(&main_path).unwrap(), Some(1));
        let inc_doc = Document::new(inc_uri.clone(), std::fs::read_to_string(&inc_path).unwrap(), Some(1));

        let mut analyzer = AsmAnalyzer::new();
        analyzer.analyze(&doc).unwrap();
        let first_count = analyzer.get_diags(&inc_doc).len();
        assert!(first_count > 0);

        analyzer.analyze(&doc).unwrap();
        let second_count = analyzer.get_diags(&inc_doc).len();
        assert_eq!(first_count, second_count);
    }

    #[test]
    fn missing_label_is_suppressed_once_it_resolves_in_the_same_pass() {
        let mut analyzer = AsmAnalyzer::new();
        analyzer.symbols = Arc::new({
            let mut s = super::super::Symbols::new();
            s.define_label("Missing".to_string(), 0x808010, super::super::SourceLocation::default()).unwrap();
            s
        });
        assert!(analyzer.known_elsewhere("missing label: Missing"));
        assert!(!analyzer.known_elsewhere("missing label: StillGone"));
    }
}
