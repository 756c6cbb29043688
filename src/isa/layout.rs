//! Field positions and value ranges of the 32-bit QISA instruction word.

use crate::error::{AsmError, Span};

pub type Word = u32;

// Single (classic) format.
pub const DBL_FORMAT_BIT: u32 = 31;
pub const OPCODE_OFFSET: u32 = 25;
pub const OPCODE_MASK: u32 = 0x3f;

pub const RD_OFFSET: u32 = 20;
pub const RS_OFFSET: u32 = 15;
pub const RT_OFFSET: u32 = 10;
pub const REG_MASK: u32 = 0x1f;

pub const SD_OFFSET: u32 = 20;
pub const SD_MASK: u32 = 0x1f;
pub const S_MASK_MASK: u32 = 0x1_ffff;
pub const S_MASK_BITS: usize = 17;

pub const TD_OFFSET: u32 = 19;
pub const TD_MASK: u32 = 0x3f;
pub const POS_OFFSET: u32 = 16;
pub const POS_MASK: u32 = 0x3;
pub const T_MASK_MASK: u32 = 0xffff;
pub const T_MASK_CHUNK_BITS: usize = 16;
pub const T_MASK_CHUNKS: usize = 3;
pub const T_MASK_BITS: usize = T_MASK_CHUNK_BITS * T_MASK_CHUNKS;

pub const ADDR_OFFSET: u32 = 4;
pub const ADDR_MASK: u32 = 0x1f_ffff;
pub const ADDR_BITS: u32 = 21;
pub const COND_MASK: u32 = 0xf;

pub const IMM20_MASK: u32 = 0xf_ffff;
pub const IMM20_BITS: u32 = 20;
pub const U_IMM15_MASK: u32 = 0x7fff;
pub const U_IMM17_MASK: i64 = 0x1_ffff;
pub const U_IMM20_MASK: u32 = 0xf_ffff;
pub const QS_MASK: u32 = 0x7;

// Double (quantum) format.
pub const BS_MASK: u32 = 0x7;
pub const VLIW_INST_0_OFFSET: u32 = 17;
pub const VLIW_INST_1_OFFSET: u32 = 3;
pub const VLIW_Q_INST_MASK: u32 = 0x3fff;
pub const Q_INST_OPCODE_OFFSET: u32 = 6;
pub const Q_INST_OPCODE_MASK: u32 = 0xff;
pub const Q_INST_SD_MASK: u32 = 0x1f;
pub const Q_INST_ST_COND_OFFSET: u32 = 5;
pub const Q_INST_TD_MASK: u32 = 0x3f;
pub const MAX_QUANTUM_OPCODE: i64 = 0xff;

#[inline]
pub fn is_double_format(word: Word) -> bool {
    (word >> DBL_FORMAT_BIT) & 1 == 1
}

#[inline]
pub fn field(word: Word, offset: u32, mask: u32) -> u32 {
    (word >> offset) & mask
}

/// Sign-extends the low `bits` of `v`.
#[inline]
pub fn sign_ext(v: u32, bits: u32) -> i32 {
    let s = 32 - bits;
    ((v << s) as i32) >> s
}

/// Inclusive bounds for an immediate operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    pub what: &'static str,
    pub min: i64,
    pub max: i64,
}

impl ValueRange {
    pub const fn new(what: &'static str, min: i64, max: i64) -> Self {
        Self { what, min, max }
    }

    pub const fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn check(&self, value: i64, span: Span) -> Result<i64, AsmError> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(AsmError::ValueOutOfRange { what: self.what, value, min: self.min, max: self.max, span })
        }
    }
}

pub const BR_OFFSET: ValueRange = ValueRange::new("addr", -(1 << 20) + 1, (1 << 20) - 1);
pub const LDI_IMM: ValueRange = ValueRange::new("imm", -(1 << 19) + 1, (1 << 19) - 1);
pub const LDUI_IMM: ValueRange = ValueRange::new("imm", 0, (1 << 15) - 1);
pub const QWAIT_IMM: ValueRange = ValueRange::new("imm", 0, (1 << 20) - 1);
pub const SMIS_IMM: ValueRange = ValueRange::new("imm", 0, (1 << S_MASK_BITS) - 1);
pub const SMIT_IMM: ValueRange = ValueRange::new("imm", 0, (1 << T_MASK_BITS) - 1);
pub const MOV_IMM: ValueRange = ValueRange::new("imm", -(1 << 31) + 1, (1 << 31) - 1);
pub const BS_VALUE: ValueRange = ValueRange::new("bs", 0, BS_MASK as i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extension_of_branch_field() {
        assert_eq!(sign_ext(ADDR_MASK, ADDR_BITS), -1);
        assert_eq!(sign_ext(0x10_0001, ADDR_BITS), -(1 << 20) + 1);
        assert_eq!(sign_ext(0x0f_ffff, ADDR_BITS), (1 << 20) - 1);
        assert_eq!(sign_ext(0x8_0000, IMM20_BITS), -(1 << 19));
    }

    #[test]
    fn range_check_reports_bounds() {
        let err = LDUI_IMM.check(1 << 15, Span::new(3, 9)).unwrap_err();
        assert_eq!(err.to_string(), "3:9: imm (32768) too large, min=0, max=32767");
        assert_eq!(BS_VALUE.check(7, Span::default()).unwrap(), 7);
    }

    #[test]
    fn classic_fields_do_not_overlap_opcode() {
        assert_eq!((RD_OFFSET + 5), OPCODE_OFFSET);
        assert_eq!((TD_OFFSET + 6), OPCODE_OFFSET);
        assert_eq!((ADDR_OFFSET + ADDR_BITS), OPCODE_OFFSET);
        assert_eq!(OPCODE_OFFSET + 6, DBL_FORMAT_BIT);
    }
}
