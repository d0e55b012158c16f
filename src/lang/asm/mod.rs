//! # 65816/SPC700/SuperFX assembler engine
//!
//! Shared engine behind the `assemble`, `disassemble`, and `lsp` binaries:
//! tokenizer and source reader, expression evaluator, opcode table, symbol
//! store, two-pass assembler session, M/X state tracker, linter,
//! disassembler, hook manifest, and project graph.

pub mod source;
pub mod tokenizer;
pub mod expr;
pub mod opcodes;
pub mod mxstate;
pub mod assembler;
pub mod linter;
pub mod disassembly;
pub mod project_graph;
pub mod settings;
pub mod hooks;
pub mod symfile;
pub mod checkpoint;
pub mod completions;
pub mod hovers;
pub mod semantic_tokens;
pub mod debugger;
pub mod analyzer;

use std::collections::HashMap;
use thiserror::Error;

/// Stable, machine-readable error codes, one variant per code in the error
/// handling design. `.code()` renders the tag used in JSON diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsmError {
    #[error("undefined identifier: {0}")]
    ExpressionUndefined(String),
    #[error("expression result out of range: {0}")]
    ExpressionRange(String),
    #[error("syntax error in expression: {0}")]
    ExpressionSyntax(String),
    #[error("include file not found: {0}")]
    IncludeNotFound(String),
    #[error("include cycle detected at: {0}")]
    IncludeCycle(String),
    #[error("label redefined: {0}")]
    LabelRedefined(String),
    #[error("macro arity mismatch: {0}")]
    MacroArity(String),
    #[error("write touches prohibited range: {0}")]
    ProhibitedRange(String),
    #[error("write blocks overlap at offset {0}")]
    OverlapWrite(usize),
    #[error("M/X state mismatch: {0}")]
    MxMismatch(String),
    #[error("missing label: {0}")]
    MissingLabel(String),
    #[error("disassembly stuck at address {0:#08x}")]
    DisassemblyStuck(u32),
    #[error("could not parse hook manifest: {0}")]
    HookParse(String),
    #[error("could not parse configuration: {0}")]
    ConfigParse(String),
    #[error("ROM I/O error: {0}")]
    RomIo(String),
    #[error("debugger bridge error: {0}")]
    DebuggerIo(String),
}

impl AsmError {
    pub fn code(&self) -> &'static str {
        match self {
            AsmError::ExpressionUndefined(_) => "expression_undefined",
            AsmError::ExpressionRange(_) => "expression_range",
            AsmError::ExpressionSyntax(_) => "expression_syntax",
            AsmError::IncludeNotFound(_) => "include_not_found",
            AsmError::IncludeCycle(_) => "include_cycle",
            AsmError::LabelRedefined(_) => "label_redefined",
            AsmError::MacroArity(_) => "macro_arity",
            AsmError::ProhibitedRange(_) => "prohibited_range",
            AsmError::OverlapWrite(_) => "overlap_write",
            AsmError::MxMismatch(_) => "mx_mismatch",
            AsmError::MissingLabel(_) => "missing_label",
            AsmError::DisassemblyStuck(_) => "disassembly_stuck",
            AsmError::HookParse(_) => "hook_parse",
            AsmError::ConfigParse(_) => "config_parse",
            AsmError::RomIo(_) => "rom_io",
            AsmError::DebuggerIo(_) => "debugger_io",
        }
    }
}

/// `{file_id, line, column, byte_offset}`, immutable, created by the source reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    pub file_id: usize,
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

impl SourceLocation {
    pub fn new(file_id: usize, line: usize, column: usize, byte_offset: usize) -> Self {
        Self { file_id, line, column, byte_offset }
    }
}

/// Severity levels for a `Diagnostic`, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

/// `{severity, code, message, file, range}`. `code` is a stable tag (see `AsmError::code`).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub file_id: usize,
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl Diagnostic {
    pub fn from_error(err: &AsmError, loc: SourceLocation) -> Self {
        Self {
            severity: Severity::Error,
            code: err.code(),
            message: err.to_string(),
            file_id: loc.file_id,
            start: loc,
            end: loc,
        }
    }
}

/// A contiguous region the assembler wrote: `{rom_offset, snes_address, bytes, source_location}`.
#[derive(Debug, Clone)]
pub struct WriteBlock {
    pub rom_offset: usize,
    pub snes_address: u32,
    pub bytes: Vec<u8>,
    pub source_location: SourceLocation,
}

/// Ordered map from `rom_offset` to `SourceLocation`, built incrementally as bytes are emitted.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    entries: Vec<(usize, SourceLocation)>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, rom_offset: usize, loc: SourceLocation) {
        self.entries.push((rom_offset, loc));
    }
    pub fn lookup(&self, rom_offset: usize) -> Option<SourceLocation> {
        self.entries.iter().rev().find(|(off, _)| *off == rom_offset).map(|(_, loc)| *loc)
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `kind` of jump used to patch a hook call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Jsl,
    Jml,
    Jsr,
    Jmp,
    Patch,
    Data,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Jsl => "jsl",
            HookKind::Jml => "jml",
            HookKind::Jsr => "jsr",
            HookKind::Jmp => "jmp",
            HookKind::Patch => "patch",
            HookKind::Data => "data",
        }
    }
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jsl" => Some(HookKind::Jsl),
            "jml" => Some(HookKind::Jml),
            "jsr" => Some(HookKind::Jsr),
            "jmp" => Some(HookKind::Jmp),
            "patch" => Some(HookKind::Patch),
            "data" => Some(HookKind::Data),
            _ => None,
        }
    }
    /// Size in bytes of the call-site patch for this kind (long forms are 4, short are 3).
    pub fn patch_size(&self) -> usize {
        match self {
            HookKind::Jsl | HookKind::Jml => 4,
            HookKind::Jsr | HookKind::Jmp => 3,
            HookKind::Patch | HookKind::Data => 0,
        }
    }
}

/// `{name, address, size, kind, target, source_location, note, expected_m, expected_x, module, abi_class, skip_abi}`.
#[derive(Debug, Clone)]
pub struct HookEntry {
    pub name: String,
    pub address: u32,
    pub size: usize,
    pub kind: HookKind,
    pub target: u32,
    pub source_location: SourceLocation,
    pub note: Option<String>,
    pub expected_m: Option<RegWidth>,
    pub expected_x: Option<RegWidth>,
    pub module: Option<String>,
    pub abi_class: Option<String>,
    pub skip_abi: bool,
}

/// Register width lattice element used by the M/X tracker: 8, 16, or unknown (`Top`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegWidth {
    W8,
    W16,
    Top,
}

impl RegWidth {
    pub fn join(self, other: RegWidth) -> RegWidth {
        match (self, other) {
            (RegWidth::Top, _) | (_, RegWidth::Top) => RegWidth::Top,
            (a, b) if a == b => a,
            _ => RegWidth::Top,
        }
    }
}

/// A namespace-qualified symbol name, joined with `_` (e.g. `NS1_NS2_name`).
pub fn qualify(namespaces: &[String], name: &str) -> String {
    if namespaces.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", namespaces.join("_"), name)
    }
}

/// Supported memory mappers, used to translate between SNES addresses and ROM offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapper {
    LoRom,
    HiRom,
    ExLoRom,
    ExHiRom,
}

impl Mapper {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lorom" => Some(Mapper::LoRom),
            "hirom" => Some(Mapper::HiRom),
            "exlorom" => Some(Mapper::ExLoRom),
            "exhirom" => Some(Mapper::ExHiRom),
            _ => None,
        }
    }
    /// Convert a 24-bit SNES address to a linear ROM file offset, if it maps to ROM at all.
    pub fn to_rom_offset(&self, snes_addr: u32) -> Option<usize> {
        let bank = (snes_addr >> 16) & 0xff;
        let offset = snes_addr & 0xffff;
        match self {
            Mapper::LoRom => {
                if offset < 0x8000 {
                    return None;
                }
                let bank_index = bank & 0x7f;
                Some((bank_index as usize) * 0x8000 + (offset as usize - 0x8000))
            }
            Mapper::ExLoRom => {
                if offset < 0x8000 {
                    return None;
                }
                let bank_index = if bank >= 0x80 { bank - 0x80 } else { bank + 0x80 };
                Some((bank_index as usize) * 0x8000 + (offset as usize - 0x8000))
            }
            Mapper::HiRom => {
                let bank_index = bank & 0x3f;
                Some((bank_index as usize) * 0x10000 + offset as usize)
            }
            Mapper::ExHiRom => {
                let bank_index = if bank >= 0xc0 { bank - 0xc0 } else { bank & 0x3f };
                Some((bank_index as usize) * 0x10000 + offset as usize)
            }
        }
    }
    /// Convert a linear ROM file offset back to a canonical 24-bit SNES address.
    pub fn to_snes_address(&self, rom_offset: usize) -> u32 {
        match self {
            Mapper::LoRom => {
                let bank = (rom_offset / 0x8000) as u32;
                let offset = (rom_offset % 0x8000) as u32 + 0x8000;
                ((bank | 0x80) << 16) | offset
            }
            Mapper::ExLoRom => {
                let bank = (rom_offset / 0x8000) as u32;
                let offset = (rom_offset % 0x8000) as u32 + 0x8000;
                if bank < 0x80 {
                    (bank << 16) | offset
                } else {
                    (((bank - 0x80) | 0x80) << 16) | offset
                }
            }
            Mapper::HiRom => {
                let bank = (rom_offset / 0x10000) as u32;
                let offset = (rom_offset % 0x10000) as u32;
                ((bank | 0xc0) << 16) | offset
            }
            Mapper::ExHiRom => {
                let bank = (rom_offset / 0x10000) as u32;
                let offset = (rom_offset % 0x10000) as u32;
                if bank < 0x40 {
                    (((bank + 0xc0) & 0xff) << 16) | offset
                } else {
                    (bank << 16) | offset
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelSym {
    pub name: String,
    pub address: u32,
    pub bank: u8,
    pub is_local: bool,
    pub is_nested_parent: bool,
    pub defined_at: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct DefineSym {
    pub name: String,
    pub value_text: String,
    pub expanded_value_numeric: Option<i64>,
    pub defined_at: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct MacroSym {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<tokenizer::Token>,
    pub defined_at: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct StructSym {
    pub name: String,
    pub fields: HashMap<String, usize>,
    pub field_order: Vec<String>,
    pub total_size: usize,
    pub defined_at: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum Symbol {
    Label(LabelSym),
    Define(DefineSym),
    Macro(MacroSym),
    Struct(StructSym),
}

impl Symbol {
    pub fn defined_at(&self) -> SourceLocation {
        match self {
            Symbol::Label(l) => l.defined_at,
            Symbol::Define(d) => d.defined_at,
            Symbol::Macro(m) => m.defined_at,
            Symbol::Struct(s) => s.defined_at,
        }
    }
    pub fn name(&self) -> &str {
        match self {
            Symbol::Label(l) => &l.name,
            Symbol::Define(d) => &d.name,
            Symbol::Macro(m) => &m.name,
            Symbol::Struct(s) => &s.name,
        }
    }
}

/// Scoped dictionary of labels/defines/macros/structs with namespace-qualified lookup.
///
/// Labels and defines share one namespace (names must be unique across the two);
/// macros live in a sibling namespace keyed by arity-less name.
#[derive(Debug, Clone, Default)]
pub struct Symbols {
    pub entries: HashMap<String, Symbol>,
    pub macros: HashMap<String, MacroSym>,
    pub structs: HashMap<String, StructSym>,
    namespace_stack: Vec<String>,
    last_parent_label: Option<String>,
}

impl Symbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_namespace(&mut self, name: &str) {
        self.namespace_stack.push(name.to_string());
    }
    pub fn pop_namespace(&mut self) -> Option<String> {
        self.namespace_stack.pop()
    }
    pub fn current_namespaces(&self) -> &[String] {
        &self.namespace_stack
    }

    /// Resolve a bare name: current namespace, then each ancestor, then global.
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        if name.starts_with('.') {
            if let Some(parent) = &self.last_parent_label {
                let local_name = format!("{}{}", parent, name);
                if let Some(sym) = self.entries.get(&qualify(&self.namespace_stack, &local_name)) {
                    return Some(sym);
                }
                return self.entries.get(&local_name);
            }
            return None;
        }
        for depth in (0..=self.namespace_stack.len()).rev() {
            let qualified = qualify(&self.namespace_stack[..depth], name);
            if let Some(sym) = self.entries.get(&qualified) {
                return Some(sym);
            }
        }
        self.entries.get(name)
    }

    pub fn resolve_macro(&self, name: &str) -> Option<&MacroSym> {
        self.macros.get(name)
    }

    pub fn resolve_struct(&self, name: &str) -> Option<&StructSym> {
        self.structs.get(name)
    }

    /// Define a label. If it's a local label (`.foo`), it's scoped to the nearest
    /// preceding non-local label rather than namespace-qualified.
    pub fn define_label(&mut self, mut name: String, address: u32, loc: SourceLocation) -> Result<(), AsmError> {
        let is_local = name.starts_with('.');
        if is_local {
            let parent = self.last_parent_label.clone().ok_or_else(|| {
                AsmError::LabelRedefined(format!("local label {} with no enclosing parent label", name))
            })?;
            name = format!("{}{}", parent, name);
        }
        let qualified = qualify(&self.namespace_stack, &name);
        if self.entries.contains_key(&qualified) {
            return Err(AsmError::LabelRedefined(qualified));
        }
        let bank = ((address >> 16) & 0xff) as u8;
        self.entries.insert(
            qualified.clone(),
            Symbol::Label(LabelSym {
                name: qualified.clone(),
                address,
                bank,
                is_local,
                is_nested_parent: !is_local,
                defined_at: loc,
            }),
        );
        if !is_local {
            self.last_parent_label = Some(qualified);
        }
        Ok(())
    }

    pub fn define_define(&mut self, name: String, value_text: String, loc: SourceLocation) -> Result<(), AsmError> {
        let qualified = qualify(&self.namespace_stack, &name);
        if self.entries.contains_key(&qualified) {
            return Err(AsmError::LabelRedefined(qualified));
        }
        self.entries.insert(
            qualified.clone(),
            Symbol::Define(DefineSym { name: qualified, value_text, expanded_value_numeric: None, defined_at: loc }),
        );
        Ok(())
    }

    pub fn define_macro(&mut self, m: MacroSym) -> Result<(), AsmError> {
        if self.macros.contains_key(&m.name) {
            return Err(AsmError::LabelRedefined(m.name.clone()));
        }
        self.macros.insert(m.name.clone(), m);
        Ok(())
    }

    pub fn define_struct(&mut self, s: StructSym) -> Result<(), AsmError> {
        if self.structs.contains_key(&s.name) {
            return Err(AsmError::LabelRedefined(s.name.clone()));
        }
        self.structs.insert(s.name.clone(), s);
        Ok(())
    }

    pub fn address_of(&self, name: &str) -> Option<u32> {
        match self.resolve(name) {
            Some(Symbol::Label(l)) => Some(l.address),
            _ => None,
        }
    }

    pub fn labels(&self) -> Vec<&LabelSym> {
        self.entries
            .values()
            .filter_map(|s| if let Symbol::Label(l) = s { Some(l) } else { None })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new(0, 1, 0, 0)
    }

    #[test]
    fn lorom_round_trips_address() {
        let m = Mapper::LoRom;
        let offset = m.to_rom_offset(0x808000).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(m.to_snes_address(0), 0x808000);
    }

    #[test]
    fn hirom_round_trips_address() {
        let m = Mapper::HiRom;
        let offset = m.to_rom_offset(0xC00000).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(m.to_snes_address(0x10000), 0xC10000);
    }

    #[test]
    fn local_label_scopes_to_parent() {
        let mut syms = Symbols::new();
        syms.define_label("Start".to_string(), 0x808000, loc()).unwrap();
        syms.define_label(".loop".to_string(), 0x808010, loc()).unwrap();
        assert_eq!(syms.address_of(".loop"), Some(0x808010));
        assert_eq!(syms.address_of("Start.loop"), Some(0x808010));
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let mut syms = Symbols::new();
        syms.define_label("Start".to_string(), 0x808000, loc()).unwrap();
        let err = syms.define_label("Start".to_string(), 0x808010, loc()).unwrap_err();
        assert_eq!(err.code(), "label_redefined");
    }

    #[test]
    fn reg_width_join_unknown_on_mismatch() {
        assert_eq!(RegWidth::W8.join(RegWidth::W8), RegWidth::W8);
        assert_eq!(RegWidth::W8.join(RegWidth::W16), RegWidth::Top);
        assert_eq!(RegWidth::Top.join(RegWidth::W16), RegWidth::Top);
    }
}
