//! Word-level decoding. Produces structured instructions; rendering to text
//! lives in [`crate::disasm`].

use serde::Serialize;

use crate::error::DisasmError;
use crate::instructions::Format;
use crate::isa::cond::BranchCondition;
use crate::isa::layout::*;
use crate::isa::registers::RegisterKind;
use crate::opcodes::{InstrKind, OpcodeRegistry};
use crate::topology::{TcPair, Topology};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Classic {
    Plain { mnemonic: &'static str },
    RdRsRt { mnemonic: &'static str, rd: u32, rs: u32, rt: u32 },
    Not { rd: u32, rt: u32 },
    Cmp { rs: u32, rt: u32 },
    Br { cond: BranchCondition, offset: i32 },
    Ldi { rd: u32, imm: i32 },
    Ldui { rd: u32, imm: u32 },
    Fbr { cond: BranchCondition, rd: u32 },
    Fmr { rd: u32, qs: u32 },
    Smis { sd: u32, qubits: Vec<u32> },
    Smit { td: u32, pos: u32, pairs: Vec<TcPair> },
    Qwait { imm: u32 },
    Qwaitr { rs: u32 },
    /// A known opcode the tools do not handle yet.
    Unsupported { mnemonic: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QuantumOp {
    NoArg { name: String },
    S { name: String, sd: u32, conditional: bool },
    T { name: String, td: u32 },
}

impl QuantumOp {
    pub fn name(&self) -> &str {
        match self {
            QuantumOp::NoArg { name } | QuantumOp::S { name, .. } | QuantumOp::T { name, .. } => name,
        }
    }
}

/// One VLIW slot: either a decoded instruction or the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Slot {
    Filler(QuantumOp),
    Op(QuantumOp),
    Invalid(DisasmError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decoded {
    Classic(Classic),
    Bundle { bs: u32, slots: [Slot; 2] },
}

impl Decoded {
    /// Condition and PC-relative destination of a branch word.
    pub fn branch(&self) -> Option<(BranchCondition, i32)> {
        match self {
            Decoded::Classic(Classic::Br { cond, offset }) => Some((*cond, *offset)),
            _ => None,
        }
    }

    /// First slot failure of a bundle, if any.
    pub fn slot_error(&self) -> Option<&DisasmError> {
        match self {
            Decoded::Bundle { slots, .. } => slots.iter().find_map(|s| match s {
                Slot::Invalid(e) => Some(e),
                _ => None,
            }),
            Decoded::Classic(_) => None,
        }
    }
}

pub trait Decoder {
    fn decode(&self, raw32: u32) -> Result<Decoded, DisasmError>;
}

/// Decoder bound to the opcode tables and topology of one session.
#[derive(Debug, Clone, Copy)]
pub struct QisaDecoder<'a> {
    registry: &'a OpcodeRegistry,
    topology: Option<&'a Topology>,
}

impl<'a> QisaDecoder<'a> {
    pub fn new(registry: &'a OpcodeRegistry, topology: Option<&'a Topology>) -> Self {
        Self { registry, topology }
    }

    fn classic(&self, w: Word) -> Result<Classic, DisasmError> {
        let opcode = field(w, OPCODE_OFFSET, OPCODE_MASK);
        let desc = self.registry.classic_by_opcode(opcode).ok_or(DisasmError::UnknownOpcode { opcode })?;
        let rd = || reg(RegisterKind::R, field(w, RD_OFFSET, REG_MASK));
        let rs = || reg(RegisterKind::R, field(w, RS_OFFSET, REG_MASK));
        let rt = || reg(RegisterKind::R, field(w, RT_OFFSET, REG_MASK));
        let cond = || {
            let code = w & COND_MASK;
            BranchCondition::from_code(code).ok_or(DisasmError::UnknownCondition { code })
        };

        Ok(match desc.format {
            Format::Plain => Classic::Plain { mnemonic: desc.mnemonic },
            Format::RdRsRt => Classic::RdRsRt { mnemonic: desc.mnemonic, rd: rd()?, rs: rs()?, rt: rt()? },
            Format::RdRt => Classic::Not { rd: rd()?, rt: rt()? },
            Format::RsRt => Classic::Cmp { rs: rs()?, rt: rt()? },
            Format::Branch => Classic::Br {
                cond: cond()?,
                offset: sign_ext(field(w, ADDR_OFFSET, ADDR_MASK), ADDR_BITS),
            },
            Format::LoadImm => Classic::Ldi { rd: rd()?, imm: sign_ext(w & IMM20_MASK, IMM20_BITS) },
            Format::LoadUpper => Classic::Ldui { rd: rd()?, imm: w & U_IMM15_MASK },
            Format::FetchBranch => Classic::Fbr { cond: cond()?, rd: field(w, RD_OFFSET, REG_MASK) },
            Format::FetchMeasurement => Classic::Fmr { rd: rd()?, qs: reg(RegisterKind::Q, w & QS_MASK)? },
            Format::SetMaskS => {
                let sd = reg(RegisterKind::S, field(w, SD_OFFSET, SD_MASK))?;
                let bits = (w & S_MASK_MASK) as u64;
                let qubits = match self.topology {
                    Some(t) => t.bits_to_s_mask(bits),
                    None => set_bits(bits, S_MASK_BITS),
                };
                Classic::Smis { sd, qubits }
            }
            Format::SetMaskT => {
                let td = reg(RegisterKind::T, field(w, TD_OFFSET, TD_MASK))?;
                let pos = field(w, POS_OFFSET, POS_MASK);
                let bits = ((w & T_MASK_MASK) as u64) << (T_MASK_CHUNK_BITS * pos as usize);
                let pairs = self.topology.map(|t| t.bits_to_t_mask(bits)).unwrap_or_default();
                Classic::Smit { td, pos, pairs }
            }
            Format::Wait => Classic::Qwait { imm: w & U_IMM20_MASK },
            Format::WaitReg => Classic::Qwaitr { rs: rs()? },
            Format::Memory => Classic::Unsupported { mnemonic: desc.mnemonic },
        })
    }

    fn slot(&self, bits: u32) -> Slot {
        match self.quantum(bits) {
            Ok(op) if field(bits, Q_INST_OPCODE_OFFSET, Q_INST_OPCODE_MASK) == crate::opcodes::FILLER_OPCODE => {
                Slot::Filler(op)
            }
            Ok(op) => Slot::Op(op),
            Err(e) => Slot::Invalid(e),
        }
    }

    fn quantum(&self, bits: u32) -> Result<QuantumOp, DisasmError> {
        let opcode = field(bits, Q_INST_OPCODE_OFFSET, Q_INST_OPCODE_MASK);
        let (name, kind) =
            self.registry.quantum_by_opcode(opcode).ok_or(DisasmError::UnknownQuantumOpcode { opcode })?;
        let name = name.to_string();
        Ok(match kind {
            InstrKind::QuantumS => QuantumOp::S {
                name,
                sd: reg(RegisterKind::S, bits & Q_INST_SD_MASK)?,
                conditional: (bits >> Q_INST_ST_COND_OFFSET) & 1 == 1,
            },
            InstrKind::QuantumT => QuantumOp::T { name, td: reg(RegisterKind::T, bits & Q_INST_TD_MASK)? },
            _ => QuantumOp::NoArg { name },
        })
    }
}

impl Decoder for QisaDecoder<'_> {
    fn decode(&self, raw32: u32) -> Result<Decoded, DisasmError> {
        if !is_double_format(raw32) {
            return self.classic(raw32).map(Decoded::Classic);
        }
        let bs = raw32 & BS_MASK;
        let slots = [
            self.slot(field(raw32, VLIW_INST_0_OFFSET, VLIW_Q_INST_MASK)),
            self.slot(field(raw32, VLIW_INST_1_OFFSET, VLIW_Q_INST_MASK)),
        ];
        Ok(Decoded::Bundle { bs, slots })
    }
}

fn reg(kind: RegisterKind, nr: u32) -> Result<u32, DisasmError> {
    if nr > kind.max() {
        return Err(DisasmError::RegisterOutOfRange { kind, nr, max: kind.max() });
    }
    Ok(nr)
}

fn set_bits(bits: u64, width: usize) -> Vec<u32> {
    (0..width).filter(|b| bits >> b & 1 == 1).map(|b| b as u32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(w: Word) -> Result<Decoded, DisasmError> {
        let reg = OpcodeRegistry::new();
        QisaDecoder::new(&reg, None).decode(w)
    }

    #[test]
    fn branch_offset_is_sign_extended() {
        let w = (0x01 << OPCODE_OFFSET) | ((ADDR_MASK & (-3i32 as u32)) << ADDR_OFFSET) | 0xa;
        assert_eq!(decode(w), Ok(Decoded::Classic(Classic::Br { cond: BranchCondition::Eq, offset: -3 })));
    }

    #[test]
    fn unknown_opcode_and_register_capacity() {
        assert_eq!(decode(0x3f << OPCODE_OFFSET), Err(DisasmError::UnknownOpcode { opcode: 0x3f }));
        let fmr_q7 = (0x15 << OPCODE_OFFSET) | 7;
        assert_eq!(
            decode(fmr_q7),
            Err(DisasmError::RegisterOutOfRange { kind: RegisterKind::Q, nr: 7, max: 6 })
        );
    }

    #[test]
    fn bundle_slots_report_unknown_opcodes() {
        let w = (1 << DBL_FORMAT_BIT) | ((0x7f << Q_INST_OPCODE_OFFSET) << VLIW_INST_0_OFFSET) | 2;
        let d = decode(w).unwrap();
        assert_eq!(d.slot_error(), Some(&DisasmError::UnknownQuantumOpcode { opcode: 0x7f }));
        let Decoded::Bundle { bs, slots } = d else { panic!("expected a bundle") };
        assert_eq!(bs, 2);
        assert!(matches!(&slots[1], Slot::Filler(op) if op.name() == "QNOP"));
    }
}
