//! M/X register-width abstract interpretation: tracks the accumulator (M)
//! and index-register (X) widths across control flow so the assembler and
//! linter can catch width mismatches that would otherwise silently mis-encode
//! an immediate operand.

use super::{AsmError, RegWidth};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MxState {
    pub m: RegWidth,
    pub x: RegWidth,
}

impl MxState {
    pub const UNKNOWN: MxState = MxState { m: RegWidth::Top, x: RegWidth::Top };
    /// 65816 native-mode reset state: both registers 16-bit until told otherwise is NOT
    /// assumed; emulation mode (the actual reset state) forces both to 8-bit.
    pub const EMULATION: MxState = MxState { m: RegWidth::W8, x: RegWidth::W8 };

    pub fn join(self, other: MxState) -> MxState {
        MxState { m: self.m.join(other.m), x: self.x.join(other.x) }
    }
}

/// Tracks state through a linear instruction stream, with an abstract `PHP`/`PLP`
/// stack and a per-routine record of the state observed at `JSR`/`JSL` targets
/// and at their corresponding returns (so callers can be checked against callees
/// regardless of visitation order, per the "analyze callees before callers" rule).
pub struct Tracker {
    current: MxState,
    php_stack: Vec<MxState>,
    routine_entry: HashMap<String, MxState>,
    routine_exit: HashMap<String, MxState>,
}

impl Tracker {
    pub fn new(initial: MxState) -> Self {
        Self { current: initial, php_stack: Vec::new(), routine_entry: HashMap::new(), routine_exit: HashMap::new() }
    }

    pub fn state(&self) -> MxState {
        self.current
    }
    pub fn set_state(&mut self, s: MxState) {
        self.current = s;
    }

    /// `SEP #imm`: set bits 0x20 -> m=8, 0x10 -> x=8.
    pub fn sep(&mut self, mask: u8) {
        if mask & 0x20 != 0 {
            self.current.m = RegWidth::W8;
        }
        if mask & 0x10 != 0 {
            self.current.x = RegWidth::W8;
        }
    }
    /// `REP #imm`: set bits 0x20 -> m=16, 0x10 -> x=16.
    pub fn rep(&mut self, mask: u8) {
        if mask & 0x20 != 0 {
            self.current.m = RegWidth::W16;
        }
        if mask & 0x10 != 0 {
            self.current.x = RegWidth::W16;
        }
    }
    pub fn php(&mut self) {
        self.php_stack.push(self.current);
    }
    /// `PLP`: pop the abstract stack. Underflow sets both registers to unknown.
    pub fn plp(&mut self) {
        self.current = self.php_stack.pop().unwrap_or(MxState::UNKNOWN);
    }

    /// Merge `other` into the current state at a control-flow merge point.
    pub fn join_with(&mut self, other: MxState) {
        self.current = self.current.join(other);
    }

    /// Record the state observed on entry to `routine` (first call wins; later
    /// calls are compared against it by the linter, not overwritten here).
    pub fn record_routine_entry(&mut self, routine: &str, state: MxState) {
        self.routine_entry.entry(routine.to_string()).or_insert(state);
    }
    pub fn routine_entry(&self, routine: &str) -> Option<MxState> {
        self.routine_entry.get(routine).copied()
    }
    pub fn record_routine_exit(&mut self, routine: &str, state: MxState) {
        self.routine_exit.insert(routine.to_string(), state);
    }
    pub fn routine_exit(&self, routine: &str) -> Option<MxState> {
        self.routine_exit.get(routine).copied()
    }

    /// Apply a call to `routine`: if its entry state is already known, join with
    /// it (the callee may run in either state depending on caller); on return,
    /// if an exit state was recorded, that overrides the caller's live state.
    pub fn apply_call(&mut self, routine: &str) {
        self.record_routine_entry(routine, self.current);
        if let Some(exit) = self.routine_exit(routine) {
            self.current = exit;
        }
    }

    /// Parse a trailing `; assume m:8`, `; assume x:16`, or `; assume mx:8` comment
    /// and force the named register(s) to that width.
    pub fn apply_override(&mut self, comment: &str) -> bool {
        if let Some((reg, width)) = parse_assume(comment) {
            match (reg.as_str(), width) {
                ("m", w) => self.current.m = w,
                ("x", w) => self.current.x = w,
                ("mx", w) => {
                    self.current.m = w;
                    self.current.x = w;
                }
                _ => return false,
            }
            return true;
        }
        false
    }

    /// Check a call site's live state against a callee's declared `expected_m`/`expected_x`.
    pub fn check_expected(
        &self,
        callee: &str,
        expected_m: Option<RegWidth>,
        expected_x: Option<RegWidth>,
    ) -> Result<(), AsmError> {
        if let Some(em) = expected_m {
            if self.current.m != RegWidth::Top && self.current.m != em {
                return Err(AsmError::MxMismatch(format!(
                    "call to {} expects m:{:?} but caller state is m:{:?}",
                    callee, em, self.current.m
                )));
            }
        }
        if let Some(ex) = expected_x {
            if self.current.x != RegWidth::Top && self.current.x != ex {
                return Err(AsmError::MxMismatch(format!(
                    "call to {} expects x:{:?} but caller state is x:{:?}",
                    callee, ex, self.current.x
                )));
            }
        }
        Ok(())
    }
}

fn parse_assume(comment: &str) -> Option<(String, RegWidth)> {
    let lower = comment.to_ascii_lowercase();
    let idx = lower.find("assume")?;
    let rest = lower[idx + "assume".len()..].trim();
    let (reg, val) = rest.split_once(':')?;
    let reg = reg.trim();
    let val = val.trim().trim_start_matches(|c: char| !c.is_ascii_digit());
    let width = match val.split(|c: char| !c.is_ascii_digit()).next()? {
        "8" => RegWidth::W8,
        "16" => RegWidth::W16,
        _ => return None,
    };
    if reg == "m" || reg == "x" || reg == "mx" {
        Some((reg.to_string(), width))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sep_rep_set_widths() {
        let mut t = Tracker::new(MxState::EMULATION);
        t.rep(0x30);
        assert_eq!(t.state(), MxState { m: RegWidth::W16, x: RegWidth::W16 });
        t.sep(0x20);
        assert_eq!(t.state().m, RegWidth::W8);
        assert_eq!(t.state().x, RegWidth::W16);
    }

    #[test]
    fn php_plp_round_trips_state() {
        let mut t = Tracker::new(MxState::EMULATION);
        t.rep(0x30);
        t.php();
        t.sep(0x30);
        assert_eq!(t.state(), MxState { m: RegWidth::W8, x: RegWidth::W8 });
        t.plp();
        assert_eq!(t.state(), MxState { m: RegWidth::W16, x: RegWidth::W16 });
    }

    #[test]
    fn plp_underflow_is_unknown() {
        let mut t = Tracker::new(MxState::EMULATION);
        t.plp();
        assert_eq!(t.state(), MxState::UNKNOWN);
    }

    #[test]
    fn branch_merge_joins_to_unknown_on_mismatch() {
        let mut t = Tracker::new(MxState { m: RegWidth::W8, x: RegWidth::W8 });
        t.join_with(MxState { m: RegWidth::W16, x: RegWidth::W8 });
        assert_eq!(t.state(), MxState { m: RegWidth::Top, x: RegWidth::W8 });
    }

    #[test]
    fn assume_override_forces_state() {
        let mut t = Tracker::new(MxState::UNKNOWN);
        assert!(t.apply_override("; assume m:8"));
        assert_eq!(t.state().m, RegWidth::W8);
        assert!(t.apply_override("; assume mx:16"));
        assert_eq!(t.state(), MxState { m: RegWidth::W16, x: RegWidth::W16 });
    }

    #[test]
    fn override_agreeing_with_inferred_state_is_a_no_op_change() {
        let mut t = Tracker::new(MxState { m: RegWidth::W8, x: RegWidth::W8 });
        let before = t.state();
        t.apply_override("; assume m:8");
        assert_eq!(t.state(), before);
    }

    #[test]
    fn call_site_mismatch_is_an_error() {
        let t = Tracker::new(MxState { m: RegWidth::W16, x: RegWidth::W8 });
        let err = t.check_expected("Routine", Some(RegWidth::W8), None).unwrap_err();
        assert_eq!(err.code(), "mx_mismatch");
    }
}
