//! Compiled-in instruction set: classic opcodes with their operand layout,
//! and the default quantum opcode tables.

/// Operand layout of a classic instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Opcode only.
    Plain,
    /// `rd, rs, rt`
    RdRsRt,
    /// `rd, rt`
    RdRt,
    /// `rs, rt`
    RsRt,
    /// `cond, offset`
    Branch,
    /// `rd, imm20` signed
    LoadImm,
    /// `rd, uimm15`; rd is mirrored into the rs field
    LoadUpper,
    /// `cond, rd`
    FetchBranch,
    /// `rd, qs`
    FetchMeasurement,
    /// `sd, s-mask`
    SetMaskS,
    /// `td, pos, t-mask chunk`
    SetMaskT,
    /// `uimm20`
    Wait,
    /// `rs`
    WaitReg,
    /// Reserved; no assembler or disassembler support yet.
    Memory,
}

#[derive(Debug, Clone, Copy)]
pub struct InstrDesc {
    pub mnemonic: &'static str,
    pub opcode: u32,
    pub format: Format,
}

const fn desc(mnemonic: &'static str, opcode: u32, format: Format) -> InstrDesc {
    InstrDesc { mnemonic, opcode, format }
}

pub const TABLE: &[InstrDesc] = &[
    desc("NOP", 0x00, Format::Plain),
    desc("BR", 0x01, Format::Branch),
    desc("STOP", 0x08, Format::Plain),
    desc("LD", 0x0a, Format::Memory),
    desc("ST", 0x0b, Format::Memory),
    desc("CMP", 0x0d, Format::RsRt),
    desc("FBR", 0x14, Format::FetchBranch),
    desc("FMR", 0x15, Format::FetchMeasurement),
    desc("LDI", 0x16, Format::LoadImm),
    desc("LDUI", 0x17, Format::LoadUpper),
    desc("OR", 0x18, Format::RdRsRt),
    desc("XOR", 0x19, Format::RdRsRt),
    desc("AND", 0x1a, Format::RdRsRt),
    desc("NOT", 0x1b, Format::RdRt),
    desc("ADDC", 0x1c, Format::RdRsRt),
    desc("SUBC", 0x1d, Format::RdRsRt),
    desc("ADD", 0x1e, Format::RdRsRt),
    desc("SUB", 0x1f, Format::RdRsRt),
    desc("SMIS", 0x20, Format::SetMaskS),
    desc("SMIT", 0x28, Format::SetMaskT),
    desc("QWAIT", 0x30, Format::Wait),
    desc("QWAITR", 0x38, Format::WaitReg),
];

pub fn by_mnemonic(mnemonic: &str) -> Option<&'static InstrDesc> {
    TABLE.iter().find(|d| d.mnemonic.eq_ignore_ascii_case(mnemonic))
}

pub fn by_opcode(opcode: u32) -> Option<&'static InstrDesc> {
    TABLE.iter().find(|d| d.opcode == opcode)
}

/// Name of the quantum no-op; always bound to the filler opcode 0 by default.
pub const QNOP: &str = "QNOP";

pub const DEFAULT_Q_ARG_NONE: &[(&str, u32)] = &[(QNOP, 0x00)];

pub const DEFAULT_Q_ARG_ST: &[(&str, u32)] = &[
    ("I", 0x01),
    ("H", 0x02),
    ("X", 0x03),
    ("Y", 0x04),
    ("Z", 0x05),
    ("X90", 0x06),
    ("MX90", 0x07),
    ("Y90", 0x08),
    ("MY90", 0x09),
    ("S", 0x0a),
    ("SDAG", 0x0b),
    ("T", 0x0c),
    ("TDAG", 0x0d),
    ("PREPZ", 0x10),
    ("MEASZ", 0x11),
];

pub const DEFAULT_Q_ARG_TT: &[(&str, u32)] = &[("CZ", 0x80), ("CNOT", 0x81)];
