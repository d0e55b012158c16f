//! Two-pass assembler session: walks an already include-expanded,
//! comment-stripped source twice. The first pass assigns addresses to every
//! label and records, per instruction, the addressing mode chosen for it; the
//! second pass re-walks the identical line sequence, reusing those recorded
//! modes so instruction sizes can never drift between the two passes, and
//! emits bytes, hook entries, and diagnostics.

use super::expr::{narrow_to_width, sizeof, ByteSource, Evaluator};
use super::mxstate::{MxState, Tracker};
use super::opcodes::{self, AddrMode, BranchKind};
use super::source::ExpandedSource;
use super::tokenizer::{tokenize_line, Token, TokenKind};
use super::{
    AsmError, Diagnostic, HookEntry, HookKind, Mapper, MacroSym, RegWidth, SourceLocation, StructSym, Symbols,
    WriteBlock,
};
use crate::lang::asm::settings::Settings;
use std::collections::HashMap;

/// Which of the two walks over the program is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Assigns label addresses and records the chosen `AddrMode` per instruction.
    Collect,
    /// Re-derives identical sizes from the recorded modes and emits bytes.
    Emit,
}

pub struct AssembleOutput {
    pub write_blocks: Vec<WriteBlock>,
    pub source_map: SourceMapOut,
    pub diagnostics: Vec<Diagnostic>,
    pub hooks: Vec<HookEntry>,
    pub symbols: Symbols,
    /// Final M/X tracker state, including the per-routine entry/exit history
    /// the linter needs to check hook ABI contracts.
    pub mx: Tracker,
}

pub type SourceMapOut = super::SourceMap;

struct RomBytes<'a> {
    blocks: &'a [WriteBlock],
    mapper: Mapper,
}
impl<'a> ByteSource for RomBytes<'a> {
    fn read_byte(&self, snes_address: u32) -> Option<u8> {
        let offset = self.mapper.to_rom_offset(snes_address)?;
        for b in self.blocks {
            if offset >= b.rom_offset && offset < b.rom_offset + b.bytes.len() {
                return Some(b.bytes[offset - b.rom_offset]);
            }
        }
        None
    }
}

#[derive(Clone, Copy)]
struct CondFrame {
    parent_active: bool,
    branch_taken: bool,
    in_else: bool,
}

/// Body captured between a `hook <addr>, <kind>` line and its matching
/// `endhook`, held as raw (uninterpreted) lines until the free-space address
/// is known and they can be replayed through `process_line` at that address.
struct HookBuilder {
    addr: u32,
    kind: HookKind,
    start_loc: SourceLocation,
    lines: Vec<(String, usize, usize)>,
}

struct Session<'s> {
    settings: &'s Settings,
    symbols: Symbols,
    mapper: Mapper,
    mx: Tracker,
    pc: u32,
    fillbyte: u8,
    write_blocks: Vec<WriteBlock>,
    source_map: super::SourceMap,
    diagnostics: Vec<Diagnostic>,
    hooks: Vec<HookEntry>,
    /// One entry per instruction line *attempted* during Collect, in order,
    /// `None` where Collect itself failed to resolve an addressing mode.
    /// Emit must consume exactly one entry per instruction line it encounters
    /// regardless of success, or the two passes' instruction streams desync.
    resolved_modes: Vec<Option<AddrMode>>,
    mode_cursor: usize,
    cond_stack: Vec<CondFrame>,
    struct_building: Option<StructSym>,
    macro_invocation: usize,
    hook_building: Option<HookBuilder>,
    free_cursor: Option<u32>,
    free_range_idx: usize,
    hook_counter: usize,
    /// Set while scanning between a top-level `macro` line and its matching
    /// `endmacro`; the body is already captured by `collect_macro_definitions`
    /// and must never be assembled in place as ordinary code, only replayed
    /// at each call site by `expand_macro`.
    in_macro_def: bool,
}

impl<'s> Session<'s> {
    fn new(settings: &'s Settings) -> Self {
        Self {
            settings,
            symbols: Symbols::new(),
            mapper: settings.mapper,
            mx: Tracker::new(MxState::EMULATION),
            pc: 0,
            fillbyte: 0,
            write_blocks: Vec::new(),
            source_map: super::SourceMap::new(),
            diagnostics: Vec::new(),
            hooks: Vec::new(),
            resolved_modes: Vec::new(),
            mode_cursor: 0,
            cond_stack: Vec::new(),
            struct_building: None,
            macro_invocation: 0,
            hook_building: None,
            free_cursor: None,
            free_range_idx: 0,
            hook_counter: 0,
            in_macro_def: false,
        }
    }

    fn active(&self) -> bool {
        self.cond_stack.iter().all(|f| f.branch_taken && f.parent_active || (!f.branch_taken && f.parent_active))
            && self.cond_stack.iter().all(|f| f.parent_active)
            && self.cond_stack.last().map(|f| f.branch_taken).unwrap_or(true)
    }

    fn evaluator(&self) -> Evaluator<'_> {
        let bytes: &dyn ByteSource = &super::expr::NullBytes;
        // Safety note: read1/2/3() over already-written bytes only matters during
        // Emit; Collect never calls it because sizes don't depend on byte contents.
        Evaluator::new(&self.symbols, bytes)
    }

    fn eval(&self, text: &str) -> Result<i64, AsmError> {
        self.evaluator().evaluate(text)
    }

    fn run(&mut self, expanded: &ExpandedSource, pass: Pass) -> Result<(), AsmError> {
        self.pc = 0;
        self.mapper = self.settings.mapper;
        self.mx = Tracker::new(MxState::EMULATION);
        self.cond_stack.clear();
        self.struct_building = None;
        self.macro_invocation = 0;
        self.mode_cursor = 0;
        self.hook_building = None;
        self.free_cursor = None;
        self.free_range_idx = 0;
        self.hook_counter = 0;
        self.in_macro_def = false;
        if pass == Pass::Collect {
            self.resolved_modes.clear();
        }
        // Directive/expression failures are diagnosed and the session presses on
        // to the next top-level line, so a single file can surface many problems
        // in one run instead of stopping at the first. Any half-open construct
        // (struct/hook/macro body) the failing line was inside is abandoned,
        // which is the "unwind to a safe point (next top-level directive)" rule
        // for unbalanced `struct`/`endstruct`-style errors.
        for (i, raw) in expanded.lines.iter().enumerate() {
            let (file_id, line_no) = expanded.origins[i];
            if let Err(e) = self.process_line(raw, file_id, line_no, pass, 0) {
                let loc = self.loc(file_id, line_no, 0);
                self.push_diag(&e, loc);
                self.struct_building = None;
                self.hook_building = None;
                self.in_macro_def = false;
            }
        }
        Ok(())
    }

    fn loc(&self, file_id: usize, line_no: usize, col: usize) -> SourceLocation {
        SourceLocation::new(file_id, line_no, col, 0)
    }

    fn push_diag(&mut self, err: &AsmError, loc: SourceLocation) {
        self.diagnostics.push(Diagnostic::from_error(err, loc));
    }

    fn process_line(
        &mut self,
        raw: &str,
        file_id: usize,
        line_no: usize,
        pass: Pass,
        macro_depth: usize,
    ) -> Result<(), AsmError> {
        let tokens = tokenize_line(raw, file_id, line_no);
        let tokens: Vec<Token> = tokens.into_iter().filter(|t| t.kind != TokenKind::Newline).collect();
        if tokens.is_empty() {
            return Ok(());
        }

        // A hook body is captured verbatim, label lines and all: none of it is
        // processed at the surrounding PC, only later when replayed at the
        // address the session allocates for it (see `finish_hook`).
        if let Some(mut hb) = self.hook_building.take() {
            if tokens[0].kind == TokenKind::Identifier && tokens[0].text.eq_ignore_ascii_case("endhook") {
                let loc = self.loc(file_id, line_no, tokens[0].location.column);
                return self.finish_hook(hb, loc, pass);
            }
            hb.lines.push((raw.to_string(), file_id, line_no));
            self.hook_building = Some(hb);
            return Ok(());
        }

        // A macro body between `macro` and `endmacro` is already captured by
        // the pre-pass; skip it here so it's never assembled in place.
        if self.in_macro_def {
            if tokens[0].kind == TokenKind::Directive && tokens[0].text.eq_ignore_ascii_case("endmacro") {
                self.in_macro_def = false;
            }
            return Ok(());
        }

        // Conditional-assembly directives are evaluated even while skipping a
        // disabled branch, so the stack stays balanced; everything else
        // (including label definitions) is skipped outright when inactive, so
        // this must be detected and dispatched before any label stripping.
        let lower0 = tokens[0].text.to_ascii_lowercase();
        if lower0 == "if" || lower0 == "else" || lower0 == "endif" {
            let rest_col = tokens.get(1).map(|t| t.location.column);
            let operand_text = match rest_col {
                Some(col) => raw.chars().skip(col).collect::<String>().trim().to_string(),
                None => String::new(),
            };
            let loc = self.loc(file_id, line_no, tokens[0].location.column);
            return self.handle_conditional(&lower0, &operand_text, loc);
        }
        if !self.active() {
            return Ok(());
        }

        // `!name = expr` and `Name equ expr` both define a text-substitution
        // define; detect them before generic label parsing treats `name` as a
        // label (a define is not a label, so it must never reach `handle_label`).
        if tokens.len() >= 2 && tokens[0].kind == TokenKind::Identifier {
            let is_bang_assign =
                tokens[0].text.starts_with('!') && tokens[1].kind == TokenKind::Punctuation && tokens[1].text == "=";
            let is_equ = tokens[1].kind == TokenKind::Directive && tokens[1].text.eq_ignore_ascii_case("equ");
            if is_bang_assign || is_equ {
                let rest_col = tokens.get(2).map(|t| t.location.column);
                let operand_text = match rest_col {
                    Some(col) => raw.chars().skip(col).collect::<String>().trim().to_string(),
                    None => String::new(),
                };
                let loc = self.loc(file_id, line_no, tokens[0].location.column);
                return self.handle_define(&tokens[0].text, &operand_text, loc, pass);
            }
        }

        let mut idx = 0usize;
        let mut label: Option<String> = None;
        if tokens[idx].kind == TokenKind::Identifier {
            if tokens.len() > idx + 1 && tokens[idx + 1].kind == TokenKind::Punctuation && tokens[idx + 1].text == ":" {
                label = Some(tokens[idx].text.clone());
                idx += 2;
            } else if self.symbols.resolve_macro(&tokens[idx].text).is_none()
                && !opcodes::is_mnemonic(&tokens[idx].text)
                && !is_known_directive(&tokens[idx].text)
            {
                // A bare leading identifier with no trailing `:` is a label,
                // unless it names a macro -- a macro invocation like
                // `SetAxis $12` has no colon either, and must reach the macro
                // dispatch below with the name still at `idx`.
                label = Some(tokens[idx].text.clone());
                idx += 1;
            }
        }

        if let Some(name) = &label {
            self.handle_label(name, file_id, line_no, pass)?;
        }

        if idx >= tokens.len() {
            return Ok(());
        }

        let keyword = tokens[idx].text.clone();
        let rest_col = tokens.get(idx + 1).map(|t| t.location.column);
        let operand_text = match rest_col {
            Some(col) => raw.chars().skip(col).collect::<String>().trim().to_string(),
            None => String::new(),
        };
        let loc = self.loc(file_id, line_no, tokens[idx].location.column);
        let lower = keyword.to_ascii_lowercase();

        if let Some(sb) = self.struct_building.take() {
            let resumed = self.handle_struct_body(sb, &lower, &keyword, &operand_text, pass)?;
            self.struct_building = resumed;
            return Ok(());
        }

        if is_known_directive(&keyword) {
            return self.handle_directive(&lower, &operand_text, file_id, line_no, loc, pass);
        }

        if let Some(macro_sym) = self.symbols.resolve_macro(&keyword).cloned() {
            return self.expand_macro(&macro_sym, &operand_text, pass, macro_depth);
        }

        if opcodes::is_mnemonic(&keyword) {
            return self.handle_instruction(&keyword, &operand_text, loc, pass);
        }

        Err(AsmError::ExpressionSyntax(format!("unknown mnemonic or directive `{}`", keyword)))
    }

    fn handle_label(&mut self, name: &str, file_id: usize, line_no: usize, pass: Pass) -> Result<(), AsmError> {
        if pass != Pass::Collect {
            return Ok(());
        }
        let loc = self.loc(file_id, line_no, 0);
        self.symbols.define_label(name.to_string(), self.pc, loc)
    }

    fn handle_conditional(&mut self, lower: &str, operand: &str, loc: SourceLocation) -> Result<(), AsmError> {
        match lower {
            "if" => {
                let parent_active = self.active();
                let taken = if parent_active { self.eval(operand)? != 0 } else { false };
                self.cond_stack.push(CondFrame { parent_active, branch_taken: taken, in_else: false });
            }
            "else" => {
                let frame = self
                    .cond_stack
                    .last_mut()
                    .ok_or_else(|| AsmError::ExpressionSyntax("`else` without matching `if`".to_string()))?;
                if frame.in_else {
                    return Err(AsmError::ExpressionSyntax("duplicate `else`".to_string()));
                }
                frame.in_else = true;
                frame.branch_taken = frame.parent_active && !frame.branch_taken;
            }
            "endif" => {
                self.cond_stack
                    .pop()
                    .ok_or_else(|| AsmError::ExpressionSyntax("`endif` without matching `if`".to_string()))?;
            }
            _ => unreachable!(),
        }
        let _ = loc;
        Ok(())
    }

    fn handle_directive(
        &mut self,
        lower: &str,
        operand: &str,
        file_id: usize,
        line_no: usize,
        loc: SourceLocation,
        pass: Pass,
    ) -> Result<(), AsmError> {
        match lower {
            "lorom" => self.mapper = Mapper::LoRom,
            "hirom" => self.mapper = Mapper::HiRom,
            "exlorom" => self.mapper = Mapper::ExLoRom,
            "exhirom" => self.mapper = Mapper::ExHiRom,
            "org" | "base" => {
                self.pc = self.eval(operand)? as u32;
            }
            "freecode" | "freedata" | "freespace" => {
                if !operand.trim().is_empty() {
                    self.pc = self.eval(operand)? as u32;
                }
            }
            "fillbyte" => {
                self.fillbyte = (self.eval(operand)? & 0xff) as u8;
            }
            "pad" => {
                let target = self.eval(operand)? as u32;
                if target < self.pc {
                    return Err(AsmError::ProhibitedRange(format!(
                        "pad target ${:06X} is behind current address ${:06X}",
                        target, self.pc
                    )));
                }
                let len = (target - self.pc) as usize;
                let bytes = vec![self.fillbyte; len];
                self.emit_bytes(&bytes, loc, pass)?;
            }
            "warnpc" => {
                let limit = self.eval(operand)? as u32;
                if self.pc > limit {
                    self.diagnostics.push(Diagnostic {
                        severity: super::Severity::Warning,
                        code: "warnpc",
                        message: format!("program counter ${:06X} has passed ${:06X}", self.pc, limit),
                        file_id,
                        start: loc,
                        end: loc,
                    });
                }
            }
            "pushns" => self.symbols.push_namespace(operand.trim()),
            "popns" => {
                self.symbols.pop_namespace();
            }
            "namespace" => self.symbols.push_namespace(operand.trim()),
            "macro" => self.begin_macro_def(operand, file_id, line_no)?,
            "endmacro" => {
                return Err(AsmError::ExpressionSyntax("`endmacro` without matching `macro`".to_string()))
            }
            "struct" => {
                let name = operand.trim().to_string();
                self.struct_building =
                    Some(StructSym { name, fields: HashMap::new(), field_order: Vec::new(), total_size: 0, defined_at: loc });
            }
            "endstruct" => {
                return Err(AsmError::ExpressionSyntax("`endstruct` without matching `struct`".to_string()))
            }
            "hook" => self.handle_hook_directive(operand, loc)?,
            "endhook" => return Err(AsmError::HookParse("`endhook` without matching `hook`".to_string())),
            "db" => self.emit_data(operand, 1, loc, pass)?,
            "dw" => self.emit_data(operand, 2, loc, pass)?,
            "dl" => self.emit_data(operand, 3, loc, pass)?,
            "dd" => self.emit_data(operand, 4, loc, pass)?,
            "equ" => self.handle_equ(operand, loc, pass)?,
            _ => return Err(AsmError::ExpressionSyntax(format!("unhandled directive `{}`", lower))),
        }
        Ok(())
    }

    fn handle_equ(&mut self, operand: &str, loc: SourceLocation, _pass: Pass) -> Result<(), AsmError> {
        // `Name equ expr` is recognized and dispatched to `handle_define`
        // directly in `process_line`, before generic label parsing ever runs;
        // a bare `equ` reaching here has no preceding name to bind.
        let _ = operand;
        Err(AsmError::ExpressionSyntax("`equ` with no preceding name".to_string()))
    }

    /// Defines a text-substitution define from `!name = expr` or
    /// `name equ expr`. Defines, like labels, are only recorded once —
    /// during the Collect pass — so the Emit pass doesn't see a spurious
    /// `label_redefined` for the same name.
    fn handle_define(&mut self, name: &str, operand: &str, loc: SourceLocation, pass: Pass) -> Result<(), AsmError> {
        if pass != Pass::Collect {
            return Ok(());
        }
        self.symbols.define_define(name.to_string(), operand.to_string(), loc)
    }

    /// `db`/`dw`/`dl`/`dd`. Forward references to labels not yet defined
    /// are permitted (per the two-pass contract): Collect only needs the byte
    /// count, which is fixed by `width` and doesn't depend on evaluating the
    /// expression, so evaluation -- and any resulting range/undefined error --
    /// is deferred to Emit, exactly like an instruction's immediate operand.
    fn emit_data(&mut self, operand: &str, width: usize, loc: SourceLocation, pass: Pass) -> Result<(), AsmError> {
        let mut bytes = Vec::new();
        for part in split_top_level_commas(operand) {
            let part = part.trim();
            if part.starts_with('"') {
                let unquoted = &part[1..part.len().saturating_sub(1)];
                bytes.extend(unquoted.bytes());
                continue;
            }
            if pass == Pass::Emit {
                // A bad value here is diagnosed in place rather than propagated:
                // propagating would make this directive emit fewer bytes than
                // Collect counted for it, desyncing every later label's address.
                match self.eval(part).and_then(|v| narrow_to_width(v, width)) {
                    Ok(narrowed) => bytes.extend_from_slice(&narrowed.to_le_bytes()[..width]),
                    Err(e) => {
                        self.push_diag(&e, loc);
                        bytes.extend(std::iter::repeat(0u8).take(width));
                    }
                }
            } else {
                bytes.extend(std::iter::repeat(0u8).take(width));
            }
        }
        self.emit_bytes(&bytes, loc, pass)
    }

    fn prohibited_range_for(&self, addr: u32) -> Option<&super::settings::ProhibitedRange> {
        self.settings.prohibited_memory_ranges.iter().find(|r| addr >= r.start && addr <= r.end)
    }

    fn emit_bytes(&mut self, bytes: &[u8], loc: SourceLocation, pass: Pass) -> Result<(), AsmError> {
        if pass == Pass::Emit && !bytes.is_empty() {
            if let Some(offset) = self.mapper.to_rom_offset(self.pc) {
                self.write_blocks.push(WriteBlock {
                    rom_offset: offset,
                    snes_address: self.pc,
                    bytes: bytes.to_vec(),
                    source_location: loc,
                });
                self.source_map.push(offset, loc);
            }
        }
        self.pc = self.pc.wrapping_add(bytes.len() as u32);
        Ok(())
    }

    /// `name`/`params` are already known to `self.symbols` from the
    /// `collect_macro_definitions` pre-pass; all this does is make
    /// `process_line` skip the body lines that follow, up to `endmacro`.
    fn begin_macro_def(&mut self, operand: &str, file_id: usize, line_no: usize) -> Result<(), AsmError> {
        let _ = (operand, file_id, line_no);
        self.in_macro_def = true;
        Ok(())
    }

    /// Structs, like labels and defines, are only recorded in `self.symbols`
    /// once -- during the Collect pass. The Emit pass still walks the same
    /// `struct`/`endstruct` span (to keep the line-by-line state machine in
    /// sync) but must not call `define_struct` again, which would otherwise
    /// fail with `label_redefined` against the Collect pass's definition.
    fn handle_struct_body(
        &mut self,
        mut sb: StructSym,
        lower: &str,
        _keyword: &str,
        operand: &str,
        pass: Pass,
    ) -> Result<Option<StructSym>, AsmError> {
        if lower == "endstruct" {
            if pass == Pass::Collect {
                self.symbols.define_struct(sb)?;
            }
            return Ok(None);
        }
        let width = match lower {
            "db" => 1,
            "dw" => 2,
            "dl" => 3,
            "dd" => 4,
            _ => return Err(AsmError::ExpressionSyntax(format!("unsupported struct member directive `{}`", lower))),
        };
        for field in operand.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
            sb.fields.insert(field.to_string(), sb.total_size);
            sb.field_order.push(field.to_string());
            sb.total_size += width;
        }
        Ok(Some(sb))
    }

    /// `hook <addr>, <kind>` opens capture of the body up to the matching
    /// `endhook`; the body itself is assembled once the free-space address is
    /// known, in `finish_hook`.
    fn handle_hook_directive(&mut self, operand: &str, loc: SourceLocation) -> Result<(), AsmError> {
        let parts = split_top_level_commas(operand);
        if parts.len() != 2 {
            return Err(AsmError::HookParse(format!("hook directive needs <addr>, <kind>: `{}`", operand)));
        }
        let addr = self.eval(parts[0].trim())? as u32;
        let kind = HookKind::from_str(parts[1].trim())
            .ok_or_else(|| AsmError::HookParse(format!("unknown hook kind `{}`", parts[1].trim())))?;
        if matches!(kind, HookKind::Patch | HookKind::Data) {
            return Err(AsmError::HookParse(format!(
                "hook kind `{}` only appears in an externally supplied manifest, not a hook directive",
                kind.as_str()
            )));
        }
        self.hook_building = Some(HookBuilder { addr, kind, start_loc: loc, lines: Vec::new() });
        Ok(())
    }

    /// Returns the next free-space address to bump-allocate a hook body from,
    /// advancing through `settings.free_space_ranges` in order.
    fn next_free_address(&mut self) -> Result<u32, AsmError> {
        if let Some(cursor) = self.free_cursor {
            return Ok(cursor);
        }
        let range = self
            .settings
            .free_space_ranges
            .get(self.free_range_idx)
            .ok_or_else(|| AsmError::HookParse("hook directive used with no free_space_ranges configured".to_string()))?;
        self.free_cursor = Some(range.start);
        Ok(range.start)
    }

    /// Assembles a captured hook body into free space, appends a terminator
    /// if the body fell through without one, and patches the call site at
    /// `hb.addr` with a jump of the requested kind.
    fn finish_hook(&mut self, hb: HookBuilder, end_loc: SourceLocation, pass: Pass) -> Result<(), AsmError> {
        let saved_pc = self.pc;
        let body_start = self.next_free_address()?;
        self.pc = body_start;
        for (raw, file_id, line_no) in &hb.lines {
            self.process_line(raw, *file_id, *line_no, pass, 0)?;
        }
        if !body_ends_in_terminator(&hb.lines, hb.kind) {
            let terminator = match hb.kind {
                HookKind::Jsl | HookKind::Jml => "RTL",
                _ => "RTS",
            };
            self.process_line(terminator, hb.start_loc.file_id, hb.start_loc.line, pass, 0)?;
        }
        let body_end = self.pc;

        let range = self.settings.free_space_ranges[self.free_range_idx];
        if body_end > range.end.wrapping_add(1) {
            self.pc = saved_pc;
            return Err(AsmError::HookParse(format!(
                "hook body at ${:06X} overflows free space range ${:06X}-${:06X}",
                body_start, range.start, range.end
            )));
        }
        self.free_cursor = Some(body_end);
        self.pc = saved_pc;

        self.hook_counter += 1;
        let patch_bytes = build_patch_bytes(hb.kind, hb.addr, body_start)?;
        if pass == Pass::Emit {
            self.hooks.push(HookEntry {
                name: format!("hook_{:03}_{:06X}", self.hook_counter, hb.addr),
                address: hb.addr,
                size: hb.kind.patch_size(),
                kind: hb.kind,
                target: body_start,
                source_location: hb.start_loc,
                note: None,
                expected_m: None,
                expected_x: None,
                module: None,
                abi_class: None,
                skip_abi: false,
            });
        }

        let prev_pc = self.pc;
        self.pc = hb.addr;
        self.emit_bytes(&patch_bytes, end_loc, pass)?;
        self.pc = prev_pc;
        Ok(())
    }

    fn expand_macro(&mut self, m: &MacroSym, operand: &str, pass: Pass, depth: usize) -> Result<(), AsmError> {
        if depth >= self.settings.macro_max_depth {
            return Err(AsmError::MacroArity(format!("macro `{}` nested too deeply", m.name)));
        }
        let args: Vec<String> = split_top_level_commas(operand).iter().map(|s| s.trim().to_string()).collect();
        if !m.parameters.is_empty() && args.len() != m.parameters.len() {
            return Err(AsmError::MacroArity(format!(
                "macro `{}` expects {} argument(s), got {}",
                m.name,
                m.parameters.len(),
                args.len()
            )));
        }
        let lines = expand_macro_body(m, &args);
        self.macro_invocation += 1;
        let ns = format!("{}__{}", m.name, self.macro_invocation);
        self.symbols.push_namespace(&ns);
        for line in &lines {
            let loc = m.defined_at;
            self.process_line(line, loc.file_id, loc.line, pass, depth + 1)?;
        }
        self.symbols.pop_namespace();
        Ok(())
    }

    fn handle_instruction(&mut self, mnemonic_raw: &str, operand: &str, loc: SourceLocation, pass: Pass) -> Result<(), AsmError> {
        let (mnemonic, forced_width) = split_width_suffix(mnemonic_raw);

        let mode = match pass {
            Pass::Collect => {
                let resolved = classify_operand(operand).and_then(|shape| {
                    let known = self.try_eval_quiet(&shape);
                    choose_mode(&mnemonic, &shape, forced_width, known)
                });
                match resolved {
                    Ok(mode) => {
                        self.resolved_modes.push(Some(mode));
                        mode
                    }
                    Err(e) => {
                        // Diagnosed here rather than propagated: propagating would
                        // skip the `resolved_modes.push` below and desync Emit's
                        // cursor against every instruction that follows.
                        self.push_diag(&e, loc);
                        self.resolved_modes.push(None);
                        return Ok(());
                    }
                }
            }
            Pass::Emit => {
                let slot = *self
                    .resolved_modes
                    .get(self.mode_cursor)
                    .ok_or_else(|| AsmError::ExpressionSyntax("instruction stream desynced between passes".to_string()))?;
                self.mode_cursor += 1;
                match slot {
                    Some(mode) => mode,
                    // Collect already diagnosed this line and emitted no bytes for
                    // it; mirror that silently instead of raising it twice.
                    None => return Ok(()),
                }
            }
        };

        let shape = classify_operand(operand)?;
        let entry = opcodes::lookup(&mnemonic, mode)
            .ok_or_else(|| AsmError::ExpressionSyntax(format!("{} does not support this addressing mode", mnemonic)))?;

        let mx_state = self.mx.state();
        let width = if mode == AddrMode::Immediate {
            match opcodes::immediate_width(&mnemonic, mx_state.m, mx_state.x) {
                RegWidth::W8 => 1,
                RegWidth::W16 => 2,
                RegWidth::Top => 2,
            }
        } else {
            entry.operand_width.unwrap_or(0)
        };

        let operand_len = match entry.branch_kind {
            BranchKind::Short => 1,
            BranchKind::Long | BranchKind::PushRelative => 2,
            _ if mode == AddrMode::BlockMove => 2,
            _ => width,
        };

        // A bad operand value is diagnosed and the operand bytes are zero-filled
        // to `operand_len` rather than propagated: Collect already committed to
        // this instruction occupying `1 + operand_len` bytes, and a shorter
        // write here would desync every later label's address in this pass.
        let operand_bytes: Result<Vec<u8>, AsmError> = if pass != Pass::Emit {
            Ok(vec![0u8; operand_len])
        } else {
            match entry.branch_kind {
                BranchKind::Short => self.eval(&shape.expr).and_then(|target| {
                    let pc_after = self.pc as i64 + 2;
                    branch_displacement(target, pc_after, false).map(|d| vec![d as u8])
                }),
                BranchKind::Long | BranchKind::PushRelative => self.eval(&shape.expr).and_then(|target| {
                    let pc_after = self.pc as i64 + 3;
                    branch_displacement(target, pc_after, true)
                        .map(|d| (d as i32 as u32).to_le_bytes()[..2].to_vec())
                }),
                _ if mode == AddrMode::BlockMove => shape
                    .block_move
                    .clone()
                    .ok_or_else(|| AsmError::ExpressionSyntax("MVN/MVP need two bank arguments".to_string()))
                    .and_then(|(a, b)| Ok(vec![(self.eval(&a)? & 0xff) as u8, (self.eval(&b)? & 0xff) as u8])),
                _ if width > 0 => self.eval(&shape.expr).and_then(|v| narrow_to_width(v, width)).map(|narrowed| {
                    narrowed.to_le_bytes()[..width].to_vec()
                }),
                _ => Ok(Vec::new()),
            }
        };
        let mut bytes = vec![entry.opcode_byte];
        match operand_bytes {
            Ok(extra) => bytes.extend(extra),
            Err(e) => {
                self.push_diag(&e, loc);
                bytes.extend(std::iter::repeat(0u8).take(operand_len));
            }
        }

        if pass == Pass::Emit {
            self.apply_mx_effects(&mnemonic, &shape);
            if let Some(callee) = mode_callee_name(entry.branch_kind, &shape) {
                self.mx.apply_call(&callee);
            }
            if is_store_mnemonic(&mnemonic) && mode != AddrMode::Accumulator && mode != AddrMode::Implied {
                if let Ok(target) = self.eval(&shape.expr) {
                    if let Some(range) = self.prohibited_range_for(target as u32) {
                        let err = AsmError::ProhibitedRange(format!("${:06X}: {}", target as u32, range.reason));
                        self.push_diag(&err, loc);
                    }
                }
            }
        }

        self.emit_bytes(&bytes, loc, pass)
    }

    fn try_eval_quiet(&self, shape: &OperandShape) -> Option<i64> {
        if shape.expr.is_empty() {
            return None;
        }
        self.eval(&shape.expr).ok()
    }

    fn apply_mx_effects(&mut self, mnemonic: &str, shape: &OperandShape) {
        match mnemonic {
            "SEP" => {
                if let Ok(v) = self.eval(&shape.expr) {
                    self.mx.sep(v as u8);
                }
            }
            "REP" => {
                if let Ok(v) = self.eval(&shape.expr) {
                    self.mx.rep(v as u8);
                }
            }
            "PHP" => self.mx.php(),
            "PLP" => self.mx.plp(),
            _ => {}
        }
    }
}

fn is_store_mnemonic(mnemonic: &str) -> bool {
    matches!(mnemonic, "STA" | "STX" | "STY" | "STZ")
}

fn mode_callee_name(bk: BranchKind, shape: &OperandShape) -> Option<String> {
    match bk {
        BranchKind::CallShort | BranchKind::CallLong => Some(shape.expr.clone()),
        _ => None,
    }
}

fn is_known_directive(s: &str) -> bool {
    const DIRECTIVES: &[&str] = &[
        "org", "base", "lorom", "hirom", "exlorom", "exhirom", "freecode", "freedata", "freespace", "pad",
        "fillbyte", "warnpc", "macro", "endmacro", "struct", "endstruct", "hook", "endhook", "pushns", "popns",
        "namespace", "db", "dw", "dl", "dd", "equ", "if", "else", "endif",
    ];
    DIRECTIVES.contains(&s.to_ascii_lowercase().as_str())
}

/// Does the captured hook body already end in a terminator matching `kind`'s
/// return convention? Scans backward over the raw lines, skipping blanks and
/// bare label lines, and inspects only the first word of the last real one.
fn body_ends_in_terminator(lines: &[(String, usize, usize)], kind: HookKind) -> bool {
    let expected: &[&str] = match kind {
        HookKind::Jsl | HookKind::Jml => &["rtl"],
        HookKind::Jsr | HookKind::Jmp => &["rts", "rti"],
        HookKind::Patch | HookKind::Data => return true,
    };
    for (raw, _, _) in lines.iter().rev() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let first_word = trimmed.split(char::is_whitespace).next().unwrap_or("");
        if first_word.ends_with(':') {
            continue;
        }
        return expected.contains(&first_word.to_ascii_lowercase().as_str());
    }
    false
}

/// Encodes the call-site patch for a hook: `JSL`/`JML` write a 4-byte long
/// jump to anywhere in the 24-bit address space; `JSR`/`JMP` write a 3-byte
/// jump, which 65816 only offers within the call site's own bank, so `target`
/// must share `addr`'s bank. `Patch`/`Data` never reach here (rejected at
/// `hook` directive parse time).
fn build_patch_bytes(kind: HookKind, addr: u32, target: u32) -> Result<Vec<u8>, AsmError> {
    match kind {
        HookKind::Jsl => {
            let mut bytes = vec![0x22];
            bytes.extend_from_slice(&target.to_le_bytes()[..3]);
            Ok(bytes)
        }
        HookKind::Jml => {
            let mut bytes = vec![0x5C];
            bytes.extend_from_slice(&target.to_le_bytes()[..3]);
            Ok(bytes)
        }
        HookKind::Jsr => {
            if (target >> 16) != (addr >> 16) {
                return Err(AsmError::HookParse(format!(
                    "jsr hook body at ${:06X} is not in the call site's bank (${:06X})",
                    target, addr
                )));
            }
            let mut bytes = vec![0x20];
            bytes.extend_from_slice(&(target as u16).to_le_bytes());
            Ok(bytes)
        }
        HookKind::Jmp => {
            if (target >> 16) != (addr >> 16) {
                return Err(AsmError::HookParse(format!(
                    "jmp hook body at ${:06X} is not in the call site's bank (${:06X})",
                    target, addr
                )));
            }
            let mut bytes = vec![0x4C];
            bytes.extend_from_slice(&(target as u16).to_le_bytes());
            Ok(bytes)
        }
        HookKind::Patch | HookKind::Data => {
            Err(AsmError::HookParse("patch/data hook kinds are only valid in an externally supplied manifest".to_string()))
        }
    }
}

/// Splits a comma-separated argument list at the top syntactic level only,
/// leaving commas inside `(...)`, `[...]`, or string literals untouched.
fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut current = String::new();
    for c in s.chars() {
        if let Some(q) = in_string {
            current.push(c);
            if c == q {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = Some(c);
                current.push(c);
            }
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Operand syntax shape, independent of which concrete opcode consumes it.
#[derive(Debug, Clone, Default)]
struct OperandShape {
    expr: String,
    immediate: bool,
    accumulator: bool,
    implied: bool,
    index: Option<char>,
    indirect: bool,
    indirect_long: bool,
    block_move: Option<(String, String)>,
}

fn classify_operand(raw: &str) -> Result<OperandShape, AsmError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(OperandShape { implied: true, ..Default::default() });
    }
    if raw.eq_ignore_ascii_case("a") {
        return Ok(OperandShape { accumulator: true, ..Default::default() });
    }
    if let Some(rest) = raw.strip_prefix('#') {
        return Ok(OperandShape { expr: rest.trim().to_string(), immediate: true, ..Default::default() });
    }
    if raw.starts_with('[') {
        let close = raw.find(']').ok_or_else(|| AsmError::ExpressionSyntax(format!("unbalanced `[` in `{}`", raw)))?;
        let inner = raw[1..close].trim().to_string();
        let after = raw[close + 1..].trim();
        let index = if after.eq_ignore_ascii_case(",y") { Some('Y') } else { None };
        return Ok(OperandShape { expr: inner, indirect: true, indirect_long: true, index, ..Default::default() });
    }
    if raw.starts_with('(') {
        let close = raw.find(')').ok_or_else(|| AsmError::ExpressionSyntax(format!("unbalanced `(` in `{}`", raw)))?;
        let inner = raw[1..close].trim().to_string();
        let after = raw[close + 1..].trim();
        let (inner, paren_index) = split_trailing_index(&inner);
        let index = if after.eq_ignore_ascii_case(",y") {
            Some('Y')
        } else if after.eq_ignore_ascii_case(",x") {
            Some('X')
        } else {
            paren_index
        };
        return Ok(OperandShape { expr: inner, indirect: true, index, ..Default::default() });
    }
    if raw.to_ascii_uppercase().matches(',').count() == 1 && looks_like_block_move(raw) {
        let (a, b) = raw.split_once(',').unwrap();
        return Ok(OperandShape {
            block_move: Some((a.trim().to_string(), b.trim().to_string())),
            ..Default::default()
        });
    }
    let (expr, index) = split_trailing_index(raw);
    Ok(OperandShape { expr, index, ..Default::default() })
}

fn looks_like_block_move(raw: &str) -> bool {
    !raw.contains("(") && {
        let (_, idx) = split_trailing_index(raw);
        idx.is_none()
    }
}

fn split_trailing_index(s: &str) -> (String, Option<char>) {
    let trimmed = s.trim();
    let lower = trimmed.to_ascii_lowercase();
    if let Some(prefix) = lower.strip_suffix(",x") {
        return (trimmed[..prefix.len()].trim().to_string(), Some('X'));
    }
    if let Some(prefix) = lower.strip_suffix(",y") {
        return (trimmed[..prefix.len()].trim().to_string(), Some('Y'));
    }
    if let Some(prefix) = lower.strip_suffix(",s") {
        return (trimmed[..prefix.len()].trim().to_string(), Some('S'));
    }
    (trimmed.to_string(), None)
}

/// `LDA.w $1234` forces a 2-byte operand regardless of the value's magnitude;
/// `.b` forces direct page (1 byte), `.l` forces a 3-byte long address.
fn split_width_suffix(mnemonic: &str) -> (String, Option<usize>) {
    if let Some((base, suffix)) = mnemonic.split_once('.') {
        let width = match suffix.to_ascii_lowercase().as_str() {
            "b" => Some(1),
            "w" => Some(2),
            "l" => Some(3),
            _ => None,
        };
        return (base.to_string(), width);
    }
    (mnemonic.to_string(), None)
}

/// Picks the concrete addressing mode from operand shape, any explicit `.b/.w/.l`
/// size suffix, and (when already resolvable) the operand's numeric value.
/// A forward reference to a not-yet-defined label defaults to the widest
/// non-long mode the instruction supports (`Absolute`), matching the common
/// two-pass-assembler convention of never guessing a narrower width than it
/// can prove.
fn choose_mode(mnemonic: &str, shape: &OperandShape, forced: Option<usize>, known: Option<i64>) -> Result<AddrMode, AsmError> {
    let supported = opcodes::modes_for(mnemonic);
    if supported.is_empty() {
        return Err(AsmError::ExpressionSyntax(format!("unknown mnemonic `{}`", mnemonic)));
    }
    if shape.implied {
        if supported.contains(&AddrMode::Implied) {
            return Ok(AddrMode::Implied);
        }
        if supported.contains(&AddrMode::Accumulator) {
            return Ok(AddrMode::Accumulator);
        }
    }
    if shape.accumulator && supported.contains(&AddrMode::Accumulator) {
        return Ok(AddrMode::Accumulator);
    }
    if shape.immediate && supported.contains(&AddrMode::Immediate) {
        return Ok(AddrMode::Immediate);
    }
    if shape.block_move.is_some() && supported.contains(&AddrMode::BlockMove) {
        return Ok(AddrMode::BlockMove);
    }
    if supported.contains(&AddrMode::Relative) {
        return Ok(AddrMode::Relative);
    }
    if supported.contains(&AddrMode::RelativeLong) {
        return Ok(AddrMode::RelativeLong);
    }

    if shape.indirect && shape.indirect_long {
        let mode = match shape.index {
            Some('Y') => AddrMode::DirectIndirectLongY,
            _ => AddrMode::DirectIndirectLong,
        };
        if supported.contains(&mode) {
            return Ok(mode);
        }
        if mode == AddrMode::DirectIndirectLong && supported.contains(&AddrMode::AbsoluteIndirectLong) {
            return Ok(AddrMode::AbsoluteIndirectLong);
        }
    }
    if shape.indirect {
        let mode = match shape.index {
            Some('X') => AddrMode::DirectIndirectX,
            Some('Y') => AddrMode::DirectIndirectY,
            _ => AddrMode::DirectIndirect,
        };
        if supported.contains(&mode) {
            return Ok(mode);
        }
        let abs_mode = match shape.index {
            Some('X') => AddrMode::AbsoluteIndirectX,
            _ => AddrMode::AbsoluteIndirect,
        };
        if supported.contains(&abs_mode) {
            return Ok(abs_mode);
        }
    }

    let byte_width = forced.or_else(|| known.map(width_for_value)).unwrap_or(2);
    let candidates: &[AddrMode] = match (shape.index, byte_width) {
        (None, 1) => &[AddrMode::Direct],
        (None, 2) => &[AddrMode::Absolute],
        (None, 3) => &[AddrMode::AbsoluteLong],
        (Some('X'), 1) => &[AddrMode::DirectX],
        (Some('X'), 2) => &[AddrMode::AbsoluteX],
        (Some('X'), 3) => &[AddrMode::AbsoluteLongX],
        (Some('Y'), 1) => &[AddrMode::DirectY],
        (Some('Y'), 2) => &[AddrMode::AbsoluteY],
        (Some('S'), _) => &[AddrMode::StackRelative],
        _ => &[AddrMode::Absolute],
    };
    for c in candidates {
        if supported.contains(c) {
            return Ok(*c);
        }
    }
    // Fall back to whatever width the instruction does support, preferring the
    // narrowest (most forward-compatible with later direct-page-only code).
    let mut fallback = supported.clone();
    fallback.sort_by_key(mode_rank);
    fallback
        .first()
        .copied()
        .ok_or_else(|| AsmError::ExpressionSyntax(format!("{} has no addressing mode matching this operand", mnemonic)))
}

fn width_for_value(v: i64) -> usize {
    if (0..=0xff).contains(&v) {
        1
    } else if (0..=0xffff).contains(&v) {
        2
    } else {
        3
    }
}

fn mode_rank(m: &AddrMode) -> u8 {
    match m {
        AddrMode::Direct | AddrMode::DirectX | AddrMode::DirectY => 0,
        AddrMode::Absolute | AddrMode::AbsoluteX | AddrMode::AbsoluteY => 1,
        _ => 2,
    }
}

fn branch_displacement(target: i64, pc_after: i64, long: bool) -> Result<i64, AsmError> {
    let disp = target - pc_after;
    if long {
        if !(-32768..=32767).contains(&disp) {
            return Err(AsmError::ExpressionRange(format!("branch displacement {} out of 16-bit range", disp)));
        }
    } else if !(-128..=127).contains(&disp) {
        return Err(AsmError::ExpressionRange(format!("branch displacement {} out of 8-bit range", disp)));
    }
    Ok(disp)
}

/// Replays a macro body's flat, `Newline`-delimited token stream into a `Vec`
/// of reconstructed source lines with `%1`/`%name` positional parameters
/// substituted.
fn expand_macro_body(m: &MacroSym, args: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for tok in &m.body {
        if tok.kind == TokenKind::Newline {
            if !current.trim().is_empty() {
                lines.push(current.trim().to_string());
            }
            current.clear();
            continue;
        }
        if !current.is_empty() && !current.ends_with(|c: char| c == '(' || c == '[') {
            current.push(' ');
        }
        current.push_str(&substitute_param(&tok.text, &m.parameters, args));
    }
    if !current.trim().is_empty() {
        lines.push(current.trim().to_string());
    }
    lines
}

fn substitute_param(text: &str, params: &[String], args: &[String]) -> String {
    if let Some(i) = params.iter().position(|p| p == text) {
        return args.get(i).cloned().unwrap_or_default();
    }
    if let Some(rest) = text.strip_prefix('%') {
        if let Ok(n) = rest.parse::<usize>() {
            return args.get(n.saturating_sub(1)).cloned().unwrap_or_default();
        }
    }
    text.to_string()
}

/// A pre-pass extracts `macro ... endmacro` and `sizeof(...)` definitions from
/// the flattened source before the two main passes run, since a macro must be
/// known (name, parameters, body) at every call site regardless of whether the
/// definition textually precedes or follows its first use.
fn collect_macro_definitions(expanded: &ExpandedSource, symbols: &mut Symbols) -> Result<(), AsmError> {
    let mut i = 0;
    while i < expanded.lines.len() {
        let raw = &expanded.lines[i];
        let (file_id, line_no) = expanded.origins[i];
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("macro") && (lower.len() == 5 || !lower.as_bytes()[5].is_ascii_alphanumeric()) {
            let operand = trimmed[5..].trim();
            let mut parts = operand.splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or("").trim().to_string();
            let params: Vec<String> = parts
                .next()
                .unwrap_or("")
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            let mut body = Vec::new();
            i += 1;
            while i < expanded.lines.len() {
                let inner_raw = &expanded.lines[i];
                let inner_trim = inner_raw.trim();
                if inner_trim.eq_ignore_ascii_case("endmacro") {
                    break;
                }
                let (inner_file, inner_line) = expanded.origins[i];
                body.extend(tokenize_line(inner_raw, inner_file, inner_line));
                i += 1;
            }
            symbols.define_macro(MacroSym { name, parameters: params, body, defined_at: SourceLocation::new(file_id, line_no, 0, 0) })?;
        }
        i += 1;
    }
    Ok(())
}

/// Runs the full two-pass assembly of an already include-expanded source.
pub fn assemble(expanded: &ExpandedSource, settings: &Settings) -> AssembleOutput {
    let mut session = Session::new(settings);
    if let Err(e) = collect_macro_definitions(expanded, &mut session.symbols) {
        session.push_diag(&e, SourceLocation::default());
    }

    if let Err(e) = session.run(expanded, Pass::Collect) {
        session.push_diag(&e, SourceLocation::default());
    }
    session.write_blocks.clear();
    session.source_map = super::SourceMap::new();
    if let Err(e) = session.run(expanded, Pass::Emit) {
        session.push_diag(&e, SourceLocation::default());
    }

    check_overlaps(&mut session);
    dedup_diagnostics(&mut session.diagnostics);

    AssembleOutput {
        write_blocks: session.write_blocks,
        source_map: session.source_map,
        diagnostics: session.diagnostics,
        hooks: session.hooks,
        symbols: session.symbols,
        mx: session.mx,
    }
}

/// Collect and Emit independently diagnose any line whose failure doesn't
/// depend on values only known at Emit time (unknown mnemonic, macro arity,
/// malformed operand shape); such lines report the identical diagnostic
/// twice. Collapse exact duplicates so a file with one bad line reports one
/// problem instead of two.
fn dedup_diagnostics(diags: &mut Vec<Diagnostic>) {
    let mut seen = std::collections::HashSet::new();
    diags.retain(|d| seen.insert((d.file_id, d.start, d.code, d.message.clone())));
}

fn check_overlaps(session: &mut Session) {
    let mut sorted: Vec<&WriteBlock> = session.write_blocks.iter().collect();
    sorted.sort_by_key(|b| b.rom_offset);
    for w in sorted.windows(2) {
        let (a, b) = (w[0], w[1]);
        if a.rom_offset + a.bytes.len() > b.rom_offset {
            let err = AsmError::OverlapWrite(b.rom_offset);
            session.diagnostics.push(Diagnostic::from_error(&err, b.source_location));
        }
    }
}

/// Looks up the `sizeof(Name)` form, which the expression evaluator itself
/// refuses to evaluate as an ordinary call (see `expr::sizeof`).
pub fn resolve_sizeof(symbols: &Symbols, name: &str) -> Result<i64, AsmError> {
    sizeof(symbols, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn expand(text: &str) -> ExpandedSource {
        let lines: Vec<String> = text.lines().map(|s| s.to_string()).collect();
        let origins = lines.iter().enumerate().map(|(i, _)| (0usize, i)).collect();
        ExpandedSource { lines, origins, file_paths: vec![PathBuf::from("main.asm")] }
    }

    fn settings() -> Settings {
        Settings::new()
    }

    #[test]
    fn assembles_simple_lorom_program() {
        let src = expand("org $808000\nStart:\nLDA #$12\nSTA $2100\nRTS\n");
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.symbols.address_of("Start"), Some(0x808000));
        let total: usize = out.write_blocks.iter().map(|b| b.bytes.len()).sum();
        assert_eq!(total, 2 + 3 + 1);
    }

    #[test]
    fn forward_reference_to_label_resolves() {
        let src = expand("org $808000\nJMP Target\nTarget:\nNOP\n");
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.symbols.address_of("Target"), Some(0x808003));
    }

    #[test]
    fn forward_reference_in_data_directive_resolves() {
        let src = expand("org $808000\ndw Target\nTarget:\nNOP\n");
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let block = out.write_blocks.iter().find(|b| b.snes_address == 0x808000).unwrap();
        assert_eq!(block.bytes, vec![0x03, 0x80]);
    }

    #[test]
    fn one_bad_line_does_not_abort_the_rest_of_the_file() {
        let src = expand("org $808000\ndb UndefinedOne\nLDA #$12\ndb UndefinedTwo\nSTA $2100\n");
        let out = assemble(&src, &settings());
        let undefined: Vec<_> = out.diagnostics.iter().filter(|d| d.code == "expression_undefined").collect();
        assert_eq!(undefined.len(), 2, "{:?}", out.diagnostics);
        let total: usize = out.write_blocks.iter().map(|b| b.bytes.len()).sum();
        assert_eq!(total, 1 + 2 + 1 + 3, "surviving lines should still be assembled: {:?}", out.write_blocks);
    }

    #[test]
    fn undefined_identifier_does_not_shift_a_later_labels_address() {
        let src = expand("org $808000\ndb Undefined\nAfter:\nNOP\n");
        let out = assemble(&src, &settings());
        assert_eq!(out.symbols.address_of("After"), Some(0x808001));
    }

    #[test]
    fn branch_out_of_range_is_an_error() {
        let mut body = String::from("org $808000\nBEQ Far\n");
        for _ in 0..200 {
            body.push_str("NOP\n");
        }
        body.push_str("Far:\nRTS\n");
        let src = expand(&body);
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.iter().any(|d| d.code == "expression_range"));
    }

    #[test]
    fn out_of_range_branch_does_not_shift_later_instruction_addresses() {
        let mut body = String::from("org $808000\nBEQ Far\n");
        for _ in 0..200 {
            body.push_str("NOP\n");
        }
        body.push_str("Far:\nLDA #$12\n");
        let src = expand(&body);
        let out = assemble(&src, &settings());
        let lda = out
            .write_blocks
            .iter()
            .find(|b| b.snes_address == out.symbols.address_of("Far").unwrap())
            .expect("LDA at Far should still be placed at its collected address");
        assert_eq!(lda.bytes.len(), 2);
    }

    #[test]
    fn macro_expands_with_positional_args() {
        let src = expand(
            "macro SetAxis param\nLDA #%1\nendmacro\norg $808000\nSetAxis $12\n",
        );
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.write_blocks.iter().map(|b| b.bytes.len()).sum::<usize>(), 2);
    }

    #[test]
    fn sep_rep_change_immediate_width() {
        let src = expand("org $808000\nREP #$20\nLDA #$1234\nSEP #$20\nLDA #$12\n");
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let sizes: Vec<usize> = out.write_blocks.iter().map(|b| b.bytes.len()).collect();
        assert_eq!(sizes, vec![2, 3, 2, 2]);
    }

    #[test]
    fn prohibited_range_write_is_rejected() {
        let mut settings = settings();
        settings.prohibited_memory_ranges.push(super::super::settings::ProhibitedRange {
            start: 0x7E0000,
            end: 0x7E01FF,
            reason: "save RAM".to_string(),
        });
        let src = expand("org $808000\nSTA $7E0100\n");
        let out = assemble(&src, &settings);
        assert!(out.diagnostics.iter().any(|d| d.code == "prohibited_range"));
    }

    #[test]
    fn hook_directive_records_entry() {
        let mut s = settings();
        s.free_space_ranges.push(crate::lang::asm::settings::FreeRange { start: 0xC08000, end: 0xC0FFFF });
        // The hook's patch address ($809000) is deliberately outside the org'd
        // block below, since it stands in for an existing ROM call site being
        // patched, not a location this source otherwise writes to.
        let src = expand("org $808000\nhook $809000, jsl\nLDA #$12\nRTL\nendhook\nRTS\n");
        let out = assemble(&src, &s);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.hooks.len(), 1);
        assert_eq!(out.hooks[0].address, 0x809000);
        assert_eq!(out.hooks[0].target, 0xC08000);
        let patch = out.write_blocks.iter().find(|b| b.snes_address == 0x809000).expect("patch block");
        assert_eq!(patch.bytes, vec![0x22, 0x00, 0x80, 0xC0]);
    }

    #[test]
    fn struct_fields_and_sizeof_are_usable_in_expressions() {
        let src = expand("struct Point\ndb x\ndw y\nendstruct\norg $808000\ndb sizeof(Point)\ndb Point.y\n");
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let bytes: Vec<u8> = out.write_blocks.iter().flat_map(|b| b.bytes.clone()).collect();
        assert_eq!(bytes, vec![3, 1]); // sizeof(Point) == 1 (db) + 2 (dw) == 3; Point.y offset == 1
    }

    #[test]
    fn macro_body_is_not_assembled_in_place() {
        // The macro is defined after `org`, so if its body were ever walked as
        // ordinary code (instead of only at the `Invoke` call site below) it
        // would land at a live PC and emit spurious bytes.
        let src = expand("org $808000\nmacro Tiny\nLDA #$01\nendmacro\nTiny\nNOP\n");
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let total: usize = out.write_blocks.iter().map(|b| b.bytes.len()).sum();
        assert_eq!(total, 2 + 1, "macro body must be emitted exactly once, at the call site");
    }

    #[test]
    fn bang_define_is_substituted_lazily() {
        let src = expand("org $808000\n!x = $42\ndb !x\n");
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.write_blocks.iter().flat_map(|b| b.bytes.clone()).collect::<Vec<u8>>(), vec![0x42]);
    }

    #[test]
    fn equ_defines_a_name_without_emitting_bytes() {
        let src = expand("org $808000\nFoo equ $99\ndb Foo\n");
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.write_blocks.iter().flat_map(|b| b.bytes.clone()).collect::<Vec<u8>>(), vec![0x99]);
        // `Foo` must be a define, not a label at $808000 -- resolving it at all would
        // otherwise coincidentally work if it were wrongly registered as a label there.
        assert!(matches!(out.symbols.resolve("Foo"), Some(crate::lang::asm::Symbol::Define(_))));
    }

    #[test]
    fn disabled_conditional_branch_does_not_define_its_label() {
        let src = expand("org $808000\nif 0\nSkipped:\ndb $01\nendif\ndb $02\n");
        let out = assemble(&src, &settings());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.symbols.address_of("Skipped"), None);
        assert_eq!(out.write_blocks.iter().flat_map(|b| b.bytes.clone()).collect::<Vec<u8>>(), vec![0x02]);
    }

    #[test]
    fn hook_body_falling_through_gets_a_terminator_appended() {
        let mut s = settings();
        s.free_space_ranges.push(crate::lang::asm::settings::FreeRange { start: 0x808100, end: 0x80FFFF });
        let src = expand("org $808000\nhook $809000, jsr\nLDA #$12\nendhook\nRTS\n");
        let out = assemble(&src, &s);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let body_total: usize = out
            .write_blocks
            .iter()
            .filter(|b| b.snes_address >= 0x808100 && b.snes_address < 0x809000)
            .map(|b| b.bytes.len())
            .sum();
        // LDA #$12 (2 bytes) + an appended RTS (1 byte)
        assert_eq!(body_total, 3);
    }
}
