//! Static 65816 opcode table indexed by `(mnemonic, addressing_mode)`.

use super::RegWidth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    Direct,
    DirectX,
    DirectY,
    DirectIndirect,
    DirectIndirectY,
    DirectIndirectX,
    DirectIndirectLong,
    DirectIndirectLongY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    AbsoluteLong,
    AbsoluteLongX,
    AbsoluteIndirect,
    AbsoluteIndirectLong,
    AbsoluteIndirectX,
    StackRelative,
    StackRelativeIndirectY,
    Relative,
    RelativeLong,
    BlockMove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    None,
    Short,
    Long,
    JumpShort,
    JumpLong,
    CallShort,
    CallLong,
    Return,
    /// `PER`: encodes a PC-relative 16-bit displacement exactly like `Long`,
    /// but (unlike `BRL`) never transfers control — execution always falls
    /// through to the next instruction, and the pushed value is not a jump
    /// target.
    PushRelative,
}

#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    pub mnemonic: &'static str,
    pub mode: AddrMode,
    pub opcode_byte: u8,
    /// Operand width in bytes for a fixed-width addressing mode; `None` for `Immediate`,
    /// whose width depends on the live M or X state (see `immediate_width`).
    pub operand_width: Option<usize>,
    pub affected_by_m: bool,
    pub affected_by_x: bool,
    pub branch_kind: BranchKind,
}

macro_rules! op {
    ($mn:expr, $mode:expr, $byte:expr, $width:expr, $m:expr, $x:expr, $bk:expr) => {
        OpcodeEntry {
            mnemonic: $mn,
            mode: $mode,
            opcode_byte: $byte,
            operand_width: $width,
            affected_by_m: $m,
            affected_by_x: $x,
            branch_kind: $bk,
        }
    };
}

/// Instructions whose immediate operand width tracks the accumulator (M flag)
/// rather than the index registers (X flag).
const M_WIDTH_MNEMONICS: &[&str] = &["LDA", "ADC", "SBC", "CMP", "AND", "ORA", "EOR", "BIT"];
const X_WIDTH_MNEMONICS: &[&str] = &["LDX", "LDY", "CPX", "CPY"];

pub fn immediate_width(mnemonic: &str, m: RegWidth, x: RegWidth) -> RegWidth {
    if M_WIDTH_MNEMONICS.contains(&mnemonic) {
        m
    } else if X_WIDTH_MNEMONICS.contains(&mnemonic) {
        x
    } else {
        RegWidth::W8
    }
}

pub static OPCODES: &[OpcodeEntry] = &[
    // Loads / stores, all addressing modes represented on LDA/STA as the canonical pair.
    op!("LDA", AddrMode::Immediate, 0xA9, None, true, false, BranchKind::None),
    op!("LDA", AddrMode::Direct, 0xA5, Some(1), true, false, BranchKind::None),
    op!("LDA", AddrMode::DirectX, 0xB5, Some(1), true, false, BranchKind::None),
    op!("LDA", AddrMode::DirectIndirect, 0xB2, Some(1), true, false, BranchKind::None),
    op!("LDA", AddrMode::DirectIndirectX, 0xA1, Some(1), true, false, BranchKind::None),
    op!("LDA", AddrMode::DirectIndirectY, 0xB1, Some(1), true, false, BranchKind::None),
    op!("LDA", AddrMode::DirectIndirectLong, 0xA7, Some(1), true, false, BranchKind::None),
    op!("LDA", AddrMode::DirectIndirectLongY, 0xB7, Some(1), true, false, BranchKind::None),
    op!("LDA", AddrMode::Absolute, 0xAD, Some(2), true, false, BranchKind::None),
    op!("LDA", AddrMode::AbsoluteX, 0xBD, Some(2), true, false, BranchKind::None),
    op!("LDA", AddrMode::AbsoluteY, 0xB9, Some(2), true, false, BranchKind::None),
    op!("LDA", AddrMode::AbsoluteLong, 0xAF, Some(3), true, false, BranchKind::None),
    op!("LDA", AddrMode::AbsoluteLongX, 0xBF, Some(3), true, false, BranchKind::None),
    op!("LDA", AddrMode::StackRelative, 0xA3, Some(1), true, false, BranchKind::None),
    op!("LDA", AddrMode::StackRelativeIndirectY, 0xB3, Some(1), true, false, BranchKind::None),
    op!("STA", AddrMode::Direct, 0x85, Some(1), true, false, BranchKind::None),
    op!("STA", AddrMode::DirectX, 0x95, Some(1), true, false, BranchKind::None),
    op!("STA", AddrMode::DirectIndirect, 0x92, Some(1), true, false, BranchKind::None),
    op!("STA", AddrMode::DirectIndirectX, 0x81, Some(1), true, false, BranchKind::None),
    op!("STA", AddrMode::DirectIndirectY, 0x91, Some(1), true, false, BranchKind::None),
    op!("STA", AddrMode::DirectIndirectLong, 0x87, Some(1), true, false, BranchKind::None),
    op!("STA", AddrMode::DirectIndirectLongY, 0x97, Some(1), true, false, BranchKind::None),
    op!("STA", AddrMode::Absolute, 0x8D, Some(2), true, false, BranchKind::None),
    op!("STA", AddrMode::AbsoluteX, 0x9D, Some(2), true, false, BranchKind::None),
    op!("STA", AddrMode::AbsoluteY, 0x99, Some(2), true, false, BranchKind::None),
    op!("STA", AddrMode::AbsoluteLong, 0x8F, Some(3), true, false, BranchKind::None),
    op!("STA", AddrMode::AbsoluteLongX, 0x9F, Some(3), true, false, BranchKind::None),
    op!("STA", AddrMode::StackRelative, 0x83, Some(1), true, false, BranchKind::None),
    op!("STA", AddrMode::StackRelativeIndirectY, 0x93, Some(1), true, false, BranchKind::None),
    op!("STZ", AddrMode::Direct, 0x64, Some(1), true, false, BranchKind::None),
    op!("STZ", AddrMode::DirectX, 0x74, Some(1), true, false, BranchKind::None),
    op!("STZ", AddrMode::Absolute, 0x9C, Some(2), true, false, BranchKind::None),
    op!("STZ", AddrMode::AbsoluteX, 0x9E, Some(2), true, false, BranchKind::None),

    op!("LDX", AddrMode::Immediate, 0xA2, None, false, true, BranchKind::None),
    op!("LDX", AddrMode::Direct, 0xA6, Some(1), false, true, BranchKind::None),
    op!("LDX", AddrMode::DirectY, 0xB6, Some(1), false, true, BranchKind::None),
    op!("LDX", AddrMode::Absolute, 0xAE, Some(2), false, true, BranchKind::None),
    op!("LDX", AddrMode::AbsoluteY, 0xBE, Some(2), false, true, BranchKind::None),
    op!("STX", AddrMode::Direct, 0x86, Some(1), false, true, BranchKind::None),
    op!("STX", AddrMode::DirectY, 0x96, Some(1), false, true, BranchKind::None),
    op!("STX", AddrMode::Absolute, 0x8E, Some(2), false, true, BranchKind::None),

    op!("LDY", AddrMode::Immediate, 0xA0, None, false, true, BranchKind::None),
    op!("LDY", AddrMode::Direct, 0xA4, Some(1), false, true, BranchKind::None),
    op!("LDY", AddrMode::DirectX, 0xB4, Some(1), false, true, BranchKind::None),
    op!("LDY", AddrMode::Absolute, 0xAC, Some(2), false, true, BranchKind::None),
    op!("LDY", AddrMode::AbsoluteX, 0xBC, Some(2), false, true, BranchKind::None),
    op!("STY", AddrMode::Direct, 0x84, Some(1), false, true, BranchKind::None),
    op!("STY", AddrMode::DirectX, 0x94, Some(1), false, true, BranchKind::None),
    op!("STY", AddrMode::Absolute, 0x8C, Some(2), false, true, BranchKind::None),

    // Arithmetic / logic. ADC/SBC/CMP/AND/ORA/EOR share the 65816's full
    // group-1 addressing-mode set (same rows as LDA/STA above).
    op!("ADC", AddrMode::Immediate, 0x69, None, true, false, BranchKind::None),
    op!("ADC", AddrMode::Direct, 0x65, Some(1), true, false, BranchKind::None),
    op!("ADC", AddrMode::DirectX, 0x75, Some(1), true, false, BranchKind::None),
    op!("ADC", AddrMode::DirectIndirect, 0x72, Some(1), true, false, BranchKind::None),
    op!("ADC", AddrMode::DirectIndirectX, 0x61, Some(1), true, false, BranchKind::None),
    op!("ADC", AddrMode::DirectIndirectY, 0x71, Some(1), true, false, BranchKind::None),
    op!("ADC", AddrMode::DirectIndirectLong, 0x67, Some(1), true, false, BranchKind::None),
    op!("ADC", AddrMode::DirectIndirectLongY, 0x77, Some(1), true, false, BranchKind::None),
    op!("ADC", AddrMode::Absolute, 0x6D, Some(2), true, false, BranchKind::None),
    op!("ADC", AddrMode::AbsoluteX, 0x7D, Some(2), true, false, BranchKind::None),
    op!("ADC", AddrMode::AbsoluteY, 0x79, Some(2), true, false, BranchKind::None),
    op!("ADC", AddrMode::AbsoluteLong, 0x6F, Some(3), true, false, BranchKind::None),
    op!("ADC", AddrMode::AbsoluteLongX, 0x7F, Some(3), true, false, BranchKind::None),
    op!("ADC", AddrMode::StackRelative, 0x63, Some(1), true, false, BranchKind::None),
    op!("ADC", AddrMode::StackRelativeIndirectY, 0x73, Some(1), true, false, BranchKind::None),
    op!("SBC", AddrMode::Immediate, 0xE9, None, true, false, BranchKind::None),
    op!("SBC", AddrMode::Direct, 0xE5, Some(1), true, false, BranchKind::None),
    op!("SBC", AddrMode::DirectX, 0xF5, Some(1), true, false, BranchKind::None),
    op!("SBC", AddrMode::DirectIndirect, 0xF2, Some(1), true, false, BranchKind::None),
    op!("SBC", AddrMode::DirectIndirectX, 0xE1, Some(1), true, false, BranchKind::None),
    op!("SBC", AddrMode::DirectIndirectY, 0xF1, Some(1), true, false, BranchKind::None),
    op!("SBC", AddrMode::DirectIndirectLong, 0xE7, Some(1), true, false, BranchKind::None),
    op!("SBC", AddrMode::DirectIndirectLongY, 0xF7, Some(1), true, false, BranchKind::None),
    op!("SBC", AddrMode::Absolute, 0xED, Some(2), true, false, BranchKind::None),
    op!("SBC", AddrMode::AbsoluteX, 0xFD, Some(2), true, false, BranchKind::None),
    op!("SBC", AddrMode::AbsoluteY, 0xF9, Some(2), true, false, BranchKind::None),
    op!("SBC", AddrMode::AbsoluteLong, 0xEF, Some(3), true, false, BranchKind::None),
    op!("SBC", AddrMode::AbsoluteLongX, 0xFF, Some(3), true, false, BranchKind::None),
    op!("SBC", AddrMode::StackRelative, 0xE3, Some(1), true, false, BranchKind::None),
    op!("SBC", AddrMode::StackRelativeIndirectY, 0xF3, Some(1), true, false, BranchKind::None),
    op!("CMP", AddrMode::Immediate, 0xC9, None, true, false, BranchKind::None),
    op!("CMP", AddrMode::Direct, 0xC5, Some(1), true, false, BranchKind::None),
    op!("CMP", AddrMode::DirectX, 0xD5, Some(1), true, false, BranchKind::None),
    op!("CMP", AddrMode::DirectIndirect, 0xD2, Some(1), true, false, BranchKind::None),
    op!("CMP", AddrMode::DirectIndirectX, 0xC1, Some(1), true, false, BranchKind::None),
    op!("CMP", AddrMode::DirectIndirectY, 0xD1, Some(1), true, false, BranchKind::None),
    op!("CMP", AddrMode::DirectIndirectLong, 0xC7, Some(1), true, false, BranchKind::None),
    op!("CMP", AddrMode::DirectIndirectLongY, 0xD7, Some(1), true, false, BranchKind::None),
    op!("CMP", AddrMode::Absolute, 0xCD, Some(2), true, false, BranchKind::None),
    op!("CMP", AddrMode::AbsoluteX, 0xDD, Some(2), true, false, BranchKind::None),
    op!("CMP", AddrMode::AbsoluteY, 0xD9, Some(2), true, false, BranchKind::None),
    op!("CMP", AddrMode::AbsoluteLong, 0xCF, Some(3), true, false, BranchKind::None),
    op!("CMP", AddrMode::AbsoluteLongX, 0xDF, Some(3), true, false, BranchKind::None),
    op!("CMP", AddrMode::StackRelative, 0xC3, Some(1), true, false, BranchKind::None),
    op!("CMP", AddrMode::StackRelativeIndirectY, 0xD3, Some(1), true, false, BranchKind::None),
    // CPX/CPY have no further addressing modes on real 65816 hardware; this is
    // their complete set.
    op!("CPX", AddrMode::Immediate, 0xE0, None, false, true, BranchKind::None),
    op!("CPX", AddrMode::Direct, 0xE4, Some(1), false, true, BranchKind::None),
    op!("CPX", AddrMode::Absolute, 0xEC, Some(2), false, true, BranchKind::None),
    op!("CPY", AddrMode::Immediate, 0xC0, None, false, true, BranchKind::None),
    op!("CPY", AddrMode::Direct, 0xC4, Some(1), false, true, BranchKind::None),
    op!("CPY", AddrMode::Absolute, 0xCC, Some(2), false, true, BranchKind::None),
    op!("AND", AddrMode::Immediate, 0x29, None, true, false, BranchKind::None),
    op!("AND", AddrMode::Direct, 0x25, Some(1), true, false, BranchKind::None),
    op!("AND", AddrMode::DirectX, 0x35, Some(1), true, false, BranchKind::None),
    op!("AND", AddrMode::DirectIndirect, 0x32, Some(1), true, false, BranchKind::None),
    op!("AND", AddrMode::DirectIndirectX, 0x21, Some(1), true, false, BranchKind::None),
    op!("AND", AddrMode::DirectIndirectY, 0x31, Some(1), true, false, BranchKind::None),
    op!("AND", AddrMode::DirectIndirectLong, 0x27, Some(1), true, false, BranchKind::None),
    op!("AND", AddrMode::DirectIndirectLongY, 0x37, Some(1), true, false, BranchKind::None),
    op!("AND", AddrMode::Absolute, 0x2D, Some(2), true, false, BranchKind::None),
    op!("AND", AddrMode::AbsoluteX, 0x3D, Some(2), true, false, BranchKind::None),
    op!("AND", AddrMode::AbsoluteY, 0x39, Some(2), true, false, BranchKind::None),
    op!("AND", AddrMode::AbsoluteLong, 0x2F, Some(3), true, false, BranchKind::None),
    op!("AND", AddrMode::AbsoluteLongX, 0x3F, Some(3), true, false, BranchKind::None),
    op!("AND", AddrMode::StackRelative, 0x23, Some(1), true, false, BranchKind::None),
    op!("AND", AddrMode::StackRelativeIndirectY, 0x33, Some(1), true, false, BranchKind::None),
    op!("ORA", AddrMode::Immediate, 0x09, None, true, false, BranchKind::None),
    op!("ORA", AddrMode::Direct, 0x05, Some(1), true, false, BranchKind::None),
    op!("ORA", AddrMode::DirectX, 0x15, Some(1), true, false, BranchKind::None),
    op!("ORA", AddrMode::DirectIndirect, 0x12, Some(1), true, false, BranchKind::None),
    op!("ORA", AddrMode::DirectIndirectX, 0x01, Some(1), true, false, BranchKind::None),
    op!("ORA", AddrMode::DirectIndirectY, 0x11, Some(1), true, false, BranchKind::None),
    op!("ORA", AddrMode::DirectIndirectLong, 0x07, Some(1), true, false, BranchKind::None),
    op!("ORA", AddrMode::DirectIndirectLongY, 0x17, Some(1), true, false, BranchKind::None),
    op!("ORA", AddrMode::Absolute, 0x0D, Some(2), true, false, BranchKind::None),
    op!("ORA", AddrMode::AbsoluteX, 0x1D, Some(2), true, false, BranchKind::None),
    op!("ORA", AddrMode::AbsoluteY, 0x19, Some(2), true, false, BranchKind::None),
    op!("ORA", AddrMode::AbsoluteLong, 0x0F, Some(3), true, false, BranchKind::None),
    op!("ORA", AddrMode::AbsoluteLongX, 0x1F, Some(3), true, false, BranchKind::None),
    op!("ORA", AddrMode::StackRelative, 0x03, Some(1), true, false, BranchKind::None),
    op!("ORA", AddrMode::StackRelativeIndirectY, 0x13, Some(1), true, false, BranchKind::None),
    op!("EOR", AddrMode::Immediate, 0x49, None, true, false, BranchKind::None),
    op!("EOR", AddrMode::Direct, 0x45, Some(1), true, false, BranchKind::None),
    op!("EOR", AddrMode::DirectX, 0x55, Some(1), true, false, BranchKind::None),
    op!("EOR", AddrMode::DirectIndirect, 0x52, Some(1), true, false, BranchKind::None),
    op!("EOR", AddrMode::DirectIndirectX, 0x41, Some(1), true, false, BranchKind::None),
    op!("EOR", AddrMode::DirectIndirectY, 0x51, Some(1), true, false, BranchKind::None),
    op!("EOR", AddrMode::DirectIndirectLong, 0x47, Some(1), true, false, BranchKind::None),
    op!("EOR", AddrMode::DirectIndirectLongY, 0x57, Some(1), true, false, BranchKind::None),
    op!("EOR", AddrMode::Absolute, 0x4D, Some(2), true, false, BranchKind::None),
    op!("EOR", AddrMode::AbsoluteX, 0x5D, Some(2), true, false, BranchKind::None),
    op!("EOR", AddrMode::AbsoluteY, 0x59, Some(2), true, false, BranchKind::None),
    op!("EOR", AddrMode::AbsoluteLong, 0x4F, Some(3), true, false, BranchKind::None),
    op!("EOR", AddrMode::AbsoluteLongX, 0x5F, Some(3), true, false, BranchKind::None),
    op!("EOR", AddrMode::StackRelative, 0x43, Some(1), true, false, BranchKind::None),
    op!("EOR", AddrMode::StackRelativeIndirectY, 0x53, Some(1), true, false, BranchKind::None),
    op!("BIT", AddrMode::Immediate, 0x89, None, true, false, BranchKind::None),
    op!("BIT", AddrMode::Direct, 0x24, Some(1), true, false, BranchKind::None),
    op!("BIT", AddrMode::Absolute, 0x2C, Some(2), true, false, BranchKind::None),

    op!("INC", AddrMode::Accumulator, 0x1A, Some(0), true, false, BranchKind::None),
    op!("INC", AddrMode::Direct, 0xE6, Some(1), true, false, BranchKind::None),
    op!("INC", AddrMode::DirectX, 0xF6, Some(1), true, false, BranchKind::None),
    op!("INC", AddrMode::Absolute, 0xEE, Some(2), true, false, BranchKind::None),
    op!("INC", AddrMode::AbsoluteX, 0xFE, Some(2), true, false, BranchKind::None),
    op!("DEC", AddrMode::Accumulator, 0x3A, Some(0), true, false, BranchKind::None),
    op!("DEC", AddrMode::Direct, 0xC6, Some(1), true, false, BranchKind::None),
    op!("DEC", AddrMode::DirectX, 0xD6, Some(1), true, false, BranchKind::None),
    op!("DEC", AddrMode::Absolute, 0xCE, Some(2), true, false, BranchKind::None),
    op!("DEC", AddrMode::AbsoluteX, 0xDE, Some(2), true, false, BranchKind::None),
    op!("INX", AddrMode::Implied, 0xE8, Some(0), false, true, BranchKind::None),
    op!("INY", AddrMode::Implied, 0xC8, Some(0), false, true, BranchKind::None),
    op!("DEX", AddrMode::Implied, 0xCA, Some(0), false, true, BranchKind::None),
    op!("DEY", AddrMode::Implied, 0x88, Some(0), false, true, BranchKind::None),

    op!("ASL", AddrMode::Accumulator, 0x0A, Some(0), true, false, BranchKind::None),
    op!("ASL", AddrMode::Direct, 0x06, Some(1), true, false, BranchKind::None),
    op!("ASL", AddrMode::DirectX, 0x16, Some(1), true, false, BranchKind::None),
    op!("ASL", AddrMode::Absolute, 0x0E, Some(2), true, false, BranchKind::None),
    op!("ASL", AddrMode::AbsoluteX, 0x1E, Some(2), true, false, BranchKind::None),
    op!("LSR", AddrMode::Accumulator, 0x4A, Some(0), true, false, BranchKind::None),
    op!("LSR", AddrMode::Direct, 0x46, Some(1), true, false, BranchKind::None),
    op!("LSR", AddrMode::DirectX, 0x56, Some(1), true, false, BranchKind::None),
    op!("LSR", AddrMode::Absolute, 0x4E, Some(2), true, false, BranchKind::None),
    op!("LSR", AddrMode::AbsoluteX, 0x5E, Some(2), true, false, BranchKind::None),
    op!("ROL", AddrMode::Accumulator, 0x2A, Some(0), true, false, BranchKind::None),
    op!("ROL", AddrMode::Direct, 0x26, Some(1), true, false, BranchKind::None),
    op!("ROL", AddrMode::DirectX, 0x36, Some(1), true, false, BranchKind::None),
    op!("ROL", AddrMode::Absolute, 0x2E, Some(2), true, false, BranchKind::None),
    op!("ROL", AddrMode::AbsoluteX, 0x3E, Some(2), true, false, BranchKind::None),
    op!("ROR", AddrMode::Accumulator, 0x6A, Some(0), true, false, BranchKind::None),
    op!("ROR", AddrMode::Direct, 0x66, Some(1), true, false, BranchKind::None),
    op!("ROR", AddrMode::DirectX, 0x76, Some(1), true, false, BranchKind::None),
    op!("ROR", AddrMode::Absolute, 0x6E, Some(2), true, false, BranchKind::None),
    op!("ROR", AddrMode::AbsoluteX, 0x7E, Some(2), true, false, BranchKind::None),
    op!("TRB", AddrMode::Direct, 0x14, Some(1), true, false, BranchKind::None),
    op!("TRB", AddrMode::Absolute, 0x1C, Some(2), true, false, BranchKind::None),
    op!("TSB", AddrMode::Direct, 0x04, Some(1), true, false, BranchKind::None),
    op!("TSB", AddrMode::Absolute, 0x0C, Some(2), true, false, BranchKind::None),

    // Control flow.
    op!("JMP", AddrMode::Absolute, 0x4C, Some(2), false, false, BranchKind::JumpShort),
    op!("JMP", AddrMode::AbsoluteIndirect, 0x6C, Some(2), false, false, BranchKind::JumpShort),
    op!("JMP", AddrMode::AbsoluteIndirectX, 0x7C, Some(2), false, false, BranchKind::JumpShort),
    op!("JML", AddrMode::AbsoluteLong, 0x5C, Some(3), false, false, BranchKind::JumpLong),
    op!("JML", AddrMode::AbsoluteIndirectLong, 0xDC, Some(2), false, false, BranchKind::JumpLong),
    op!("JSR", AddrMode::Absolute, 0x20, Some(2), false, false, BranchKind::CallShort),
    op!("JSR", AddrMode::AbsoluteIndirectX, 0xFC, Some(2), false, false, BranchKind::CallShort),
    op!("JSL", AddrMode::AbsoluteLong, 0x22, Some(3), false, false, BranchKind::CallLong),
    op!("RTS", AddrMode::Implied, 0x60, Some(0), false, false, BranchKind::Return),
    op!("RTL", AddrMode::Implied, 0x6B, Some(0), false, false, BranchKind::Return),
    op!("RTI", AddrMode::Implied, 0x40, Some(0), false, false, BranchKind::Return),
    op!("BRK", AddrMode::Implied, 0x00, Some(0), false, false, BranchKind::None),
    op!("COP", AddrMode::Immediate, 0x02, Some(1), false, false, BranchKind::None),
    op!("NOP", AddrMode::Implied, 0xEA, Some(0), false, false, BranchKind::None),
    op!("WDM", AddrMode::Immediate, 0x42, Some(1), false, false, BranchKind::None),

    op!("BPL", AddrMode::Relative, 0x10, Some(1), false, false, BranchKind::Short),
    op!("BMI", AddrMode::Relative, 0x30, Some(1), false, false, BranchKind::Short),
    op!("BVC", AddrMode::Relative, 0x50, Some(1), false, false, BranchKind::Short),
    op!("BVS", AddrMode::Relative, 0x70, Some(1), false, false, BranchKind::Short),
    op!("BCC", AddrMode::Relative, 0x90, Some(1), false, false, BranchKind::Short),
    op!("BCS", AddrMode::Relative, 0xB0, Some(1), false, false, BranchKind::Short),
    op!("BNE", AddrMode::Relative, 0xD0, Some(1), false, false, BranchKind::Short),
    op!("BEQ", AddrMode::Relative, 0xF0, Some(1), false, false, BranchKind::Short),
    op!("BRA", AddrMode::Relative, 0x80, Some(1), false, false, BranchKind::Short),
    op!("BRL", AddrMode::RelativeLong, 0x82, Some(2), false, false, BranchKind::Long),

    // Stack / register transfers / flag ops.
    op!("PHA", AddrMode::Implied, 0x48, Some(0), true, false, BranchKind::None),
    op!("PLA", AddrMode::Implied, 0x68, Some(0), true, false, BranchKind::None),
    op!("PHX", AddrMode::Implied, 0xDA, Some(0), false, true, BranchKind::None),
    op!("PLX", AddrMode::Implied, 0xFA, Some(0), false, true, BranchKind::None),
    op!("PHY", AddrMode::Implied, 0x5A, Some(0), false, true, BranchKind::None),
    op!("PLY", AddrMode::Implied, 0x7A, Some(0), false, true, BranchKind::None),
    op!("PHB", AddrMode::Implied, 0x8B, Some(0), false, false, BranchKind::None),
    op!("PLB", AddrMode::Implied, 0xAB, Some(0), false, false, BranchKind::None),
    op!("PHD", AddrMode::Implied, 0x0B, Some(0), false, false, BranchKind::None),
    op!("PLD", AddrMode::Implied, 0x2B, Some(0), false, false, BranchKind::None),
    op!("PHK", AddrMode::Implied, 0x4B, Some(0), false, false, BranchKind::None),
    op!("PHP", AddrMode::Implied, 0x08, Some(0), false, false, BranchKind::None),
    op!("PLP", AddrMode::Implied, 0x28, Some(0), false, false, BranchKind::None),
    // Push-effective-address family: width is fixed at 16 bits regardless of
    // the live M/X state, so these are neither `affected_by_m` nor `_x`.
    op!("PEA", AddrMode::Absolute, 0xF4, Some(2), false, false, BranchKind::None),
    op!("PEI", AddrMode::DirectIndirect, 0xD4, Some(1), false, false, BranchKind::None),
    op!("PER", AddrMode::RelativeLong, 0x62, Some(2), false, false, BranchKind::PushRelative),
    op!("TAX", AddrMode::Implied, 0xAA, Some(0), false, false, BranchKind::None),
    op!("TAY", AddrMode::Implied, 0xA8, Some(0), false, false, BranchKind::None),
    op!("TXA", AddrMode::Implied, 0x8A, Some(0), false, false, BranchKind::None),
    op!("TYA", AddrMode::Implied, 0x98, Some(0), false, false, BranchKind::None),
    op!("TXS", AddrMode::Implied, 0x9A, Some(0), false, false, BranchKind::None),
    op!("TSX", AddrMode::Implied, 0xBA, Some(0), false, false, BranchKind::None),
    op!("TXY", AddrMode::Implied, 0x9B, Some(0), false, false, BranchKind::None),
    op!("TYX", AddrMode::Implied, 0xBB, Some(0), false, false, BranchKind::None),
    op!("TCD", AddrMode::Implied, 0x5B, Some(0), false, false, BranchKind::None),
    op!("TDC", AddrMode::Implied, 0x7B, Some(0), false, false, BranchKind::None),
    op!("TCS", AddrMode::Implied, 0x1B, Some(0), false, false, BranchKind::None),
    op!("TSC", AddrMode::Implied, 0x3B, Some(0), false, false, BranchKind::None),
    op!("XCE", AddrMode::Implied, 0xFB, Some(0), false, false, BranchKind::None),
    op!("XBA", AddrMode::Implied, 0xEB, Some(0), false, false, BranchKind::None),
    op!("CLC", AddrMode::Implied, 0x18, Some(0), false, false, BranchKind::None),
    op!("SEC", AddrMode::Implied, 0x38, Some(0), false, false, BranchKind::None),
    op!("CLI", AddrMode::Implied, 0x58, Some(0), false, false, BranchKind::None),
    op!("SEI", AddrMode::Implied, 0x78, Some(0), false, false, BranchKind::None),
    op!("CLV", AddrMode::Implied, 0xB8, Some(0), false, false, BranchKind::None),
    op!("CLD", AddrMode::Implied, 0xD8, Some(0), false, false, BranchKind::None),
    op!("SED", AddrMode::Implied, 0xF8, Some(0), false, false, BranchKind::None),
    op!("STP", AddrMode::Implied, 0xDB, Some(0), false, false, BranchKind::None),
    op!("WAI", AddrMode::Implied, 0xCB, Some(0), false, false, BranchKind::None),

    op!("SEP", AddrMode::Immediate, 0xE2, Some(1), false, false, BranchKind::None),
    op!("REP", AddrMode::Immediate, 0xC2, Some(1), false, false, BranchKind::None),

    op!("MVN", AddrMode::BlockMove, 0x54, Some(2), false, false, BranchKind::None),
    op!("MVP", AddrMode::BlockMove, 0x44, Some(2), false, false, BranchKind::None),
];

pub fn lookup(mnemonic: &str, mode: AddrMode) -> Option<&'static OpcodeEntry> {
    let upper = mnemonic.to_ascii_uppercase();
    OPCODES.iter().find(|e| e.mnemonic == upper && e.mode == mode)
}

pub fn modes_for(mnemonic: &str) -> Vec<AddrMode> {
    let upper = mnemonic.to_ascii_uppercase();
    OPCODES.iter().filter(|e| e.mnemonic == upper).map(|e| e.mode).collect()
}

pub fn is_mnemonic(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    OPCODES.iter().any(|e| e.mnemonic == upper)
}

pub fn decode_byte(byte: u8) -> Option<&'static OpcodeEntry> {
    OPCODES.iter().find(|e| e.opcode_byte == byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lda_immediate_has_undetermined_width() {
        let e = lookup("LDA", AddrMode::Immediate).unwrap();
        assert_eq!(e.operand_width, None);
        assert!(e.affected_by_m);
    }

    #[test]
    fn immediate_width_tracks_m_for_lda_and_x_for_ldx() {
        assert_eq!(immediate_width("LDA", RegWidth::W8, RegWidth::W16), RegWidth::W8);
        assert_eq!(immediate_width("LDX", RegWidth::W8, RegWidth::W16), RegWidth::W16);
    }

    #[test]
    fn every_addressing_mode_has_at_least_one_instruction() {
        use AddrMode::*;
        for mode in [
            Implied, Accumulator, Immediate, Direct, DirectX, DirectY, DirectIndirect, DirectIndirectY,
            DirectIndirectX, DirectIndirectLong, DirectIndirectLongY, Absolute, AbsoluteX, AbsoluteY,
            AbsoluteLong, AbsoluteLongX, AbsoluteIndirect, AbsoluteIndirectLong, AbsoluteIndirectX,
            StackRelative, StackRelativeIndirectY, Relative, RelativeLong, BlockMove,
        ] {
            assert!(OPCODES.iter().any(|e| e.mode == mode), "no opcode uses mode {:?}", mode);
        }
    }

    #[test]
    fn decode_byte_round_trips() {
        let e = lookup("LDA", AddrMode::Absolute).unwrap();
        let decoded = decode_byte(e.opcode_byte).unwrap();
        assert_eq!(decoded.mnemonic, "LDA");
    }
}
