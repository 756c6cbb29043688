//! Instruction encoder: one entry point per mnemonic family, plus the macro
//! aliases that expand into them.
//!
//! Every `emit_*` call validates its operands first and appends nothing on
//! failure. The caller decides whether to keep going; [`Assembler::finish`]
//! runs the deferred label pass and refuses to produce a program if anything
//! was reported.

use std::fmt::Write as _;

use serde::Serialize;

use crate::error::{AsmError, Diagnostics, Span, Spanned};
use crate::isa::cond::BranchCondition;
use crate::isa::layout::*;
use crate::isa::registers::RegisterKind;
use crate::opcodes::{InstrKind, OpcodeRegistry, FILLER_OPCODE};
use crate::session::Options;
use crate::symbols::{branch_offset_bits, correct_alias_offset, LabelRef, LabelResolver, PatchKind, SymbolTable};
use crate::topology::{TcPair, Topology};

/// One sub-instruction of a VLIW word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QInstr {
    NoArg { opcode: u32 },
    SReg { opcode: u32, sd: u32, conditional: bool },
    TReg { opcode: u32, td: u32 },
}

impl QInstr {
    pub const FILLER: QInstr = QInstr::NoArg { opcode: FILLER_OPCODE };

    pub fn opcode(self) -> u32 {
        match self {
            QInstr::NoArg { opcode } | QInstr::SReg { opcode, .. } | QInstr::TReg { opcode, .. } => opcode,
        }
    }

    /// Packs into the 14-bit VLIW slot layout.
    pub fn encode(self) -> Word {
        let op = (self.opcode() & Q_INST_OPCODE_MASK) << Q_INST_OPCODE_OFFSET;
        match self {
            QInstr::NoArg { .. } => op,
            QInstr::SReg { sd, conditional, .. } => {
                op | (sd & Q_INST_SD_MASK) | ((conditional as Word) << Q_INST_ST_COND_OFFSET)
            }
            QInstr::TReg { td, .. } => op | (td & Q_INST_TD_MASK),
        }
    }
}

/// Operand written after a quantum mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QOperand<'t> {
    Register(RegisterKind, Spanned<u32>),
    Alias(Spanned<&'t str>),
}

/// A branch destination as written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchTarget<'t> {
    Label(&'t str),
    Offset(i64),
}

/// Either a literal mask or the raw bit pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskOperand<T> {
    Set { items: Vec<Spanned<T>>, span: Span },
    Imm(Spanned<i64>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelEntry {
    pub name: String,
    pub addr: u64,
}

/// Output of a successful assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    pub words: Vec<Word>,
    pub labels: Vec<LabelEntry>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Raw native-endian word stream, the on-disk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    /// `0x%08x` per word, optionally followed by the bits in groups of four.
    pub fn hex_strings(&self, with_binary: bool) -> Vec<String> {
        self.words
            .iter()
            .map(|w| {
                if with_binary {
                    format!("{w:#010x} ({})", spaced_binary(*w))
                } else {
                    format!("{w:#010x}")
                }
            })
            .collect()
    }
}

fn spaced_binary(w: Word) -> String {
    let mut s = String::with_capacity(39);
    for nibble in (0..8).rev() {
        let _ = write!(s, "{:04b}", (w >> (nibble * 4)) & 0xf);
        if nibble > 0 {
            s.push(' ');
        }
    }
    s
}

/// State of one assembly run.
#[derive(Debug)]
pub struct Assembler<'a> {
    registry: &'a OpcodeRegistry,
    topology: &'a Topology,
    program: Vec<Word>,
    symbols: SymbolTable,
    labels: LabelResolver,
    diags: Diagnostics,
}

impl<'a> Assembler<'a> {
    pub fn new(registry: &'a OpcodeRegistry, topology: &'a Topology, options: Options) -> Self {
        Self {
            registry,
            topology,
            program: Vec::new(),
            symbols: SymbolTable::default(),
            labels: LabelResolver::new(options.contains(Options::ALLOW_LABEL_REDEFINITION)),
            diags: Diagnostics::default(),
        }
    }

    /// Index of the next instruction to be emitted.
    pub fn pc(&self) -> usize {
        self.program.len()
    }

    pub fn words(&self) -> &[Word] {
        &self.program
    }

    pub fn registry(&self) -> &'a OpcodeRegistry {
        self.registry
    }

    pub fn topology(&self) -> &'a Topology {
        self.topology
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn labels(&self) -> &LabelResolver {
        &self.labels
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    /// Records an error and carries on.
    pub fn report(&mut self, err: AsmError) {
        tracing::debug!(%err, "diagnostic");
        self.diags.push(err);
    }

    pub fn define_label(&mut self, name: &str, span: Span) -> Result<(), AsmError> {
        let pc = self.pc();
        self.labels.define_label(name, pc, span)
    }

    pub fn resolve_label(&mut self, name: &str, label_span: Span, site: Span, want_offset: bool) -> LabelRef {
        let pc = self.pc();
        self.labels.resolve_label_address(name, label_span, site, want_offset, pc)
    }

    /// Runs the deferred label pass and hands back the program, or every
    /// diagnostic collected along the way.
    pub fn finish(mut self) -> Result<Program, Diagnostics> {
        if let Err(more) = self.labels.resolve_deferred(&mut self.program) {
            self.diags.0.extend(more.0);
        }
        if !self.diags.is_empty() {
            return Err(self.diags);
        }
        let labels = self
            .labels
            .labels()
            .into_iter()
            .map(|(name, addr)| LabelEntry { name: name.to_string(), addr })
            .collect();
        Ok(Program { words: self.program, labels })
    }

    fn push(&mut self, word: Word, what: &str) {
        tracing::debug!(pc = self.program.len(), word = format_args!("{word:#010x}"), what, "emit");
        self.program.push(word);
    }

    fn classic(&self, name: &str, span: Span) -> Result<Word, AsmError> {
        let op = self.registry.lookup(name, InstrKind::Classic, span)?;
        Ok((op & OPCODE_MASK) << OPCODE_OFFSET)
    }

    fn reg(kind: RegisterKind, r: Spanned<u32>) -> Result<Word, AsmError> {
        kind.check(r.node, r.span)
    }

    pub fn emit_nop(&mut self, span: Span) -> Result<(), AsmError> {
        let word = self.classic("NOP", span)?;
        self.push(word, "NOP");
        Ok(())
    }

    pub fn emit_stop(&mut self, span: Span) -> Result<(), AsmError> {
        let word = self.classic("STOP", span)?;
        self.push(word, "STOP");
        Ok(())
    }

    /// `ADD`, `ADDC`, `SUB`, `SUBC`, `AND`, `OR`, `XOR`.
    pub fn emit_rrr(&mut self, name: &str, span: Span, rd: Spanned<u32>, rs: Spanned<u32>, rt: Spanned<u32>) -> Result<(), AsmError> {
        let op = self.classic(name, span)?;
        let rd = Self::reg(RegisterKind::R, rd)?;
        let rs = Self::reg(RegisterKind::R, rs)?;
        let rt = Self::reg(RegisterKind::R, rt)?;
        self.push(op | (rd << RD_OFFSET) | (rs << RS_OFFSET) | (rt << RT_OFFSET), name);
        Ok(())
    }

    pub fn emit_not(&mut self, span: Span, rd: Spanned<u32>, rt: Spanned<u32>) -> Result<(), AsmError> {
        let op = self.classic("NOT", span)?;
        let rd = Self::reg(RegisterKind::R, rd)?;
        let rt = Self::reg(RegisterKind::R, rt)?;
        self.push(op | (rd << RD_OFFSET) | (rt << RT_OFFSET), "NOT");
        Ok(())
    }

    pub fn emit_cmp(&mut self, span: Span, rs: Spanned<u32>, rt: Spanned<u32>) -> Result<(), AsmError> {
        let op = self.classic("CMP", span)?;
        let rs = Self::reg(RegisterKind::R, rs)?;
        let rt = Self::reg(RegisterKind::R, rt)?;
        self.push(op | (rs << RS_OFFSET) | (rt << RT_OFFSET), "CMP");
        Ok(())
    }

    fn resolve_target(&mut self, target: Spanned<BranchTarget<'_>>, site: Span) -> Spanned<LabelRef> {
        let node = match target.node {
            BranchTarget::Label(name) => self.resolve_label(name, target.span, site, true),
            BranchTarget::Offset(off) => LabelRef::Resolved(off),
        };
        Spanned::new(node, target.span)
    }

    /// `BR cond, target`. The instruction span doubles as the deferred use site.
    pub fn emit_br(&mut self, span: Span, cond: BranchCondition, target: Spanned<BranchTarget<'_>>) -> Result<(), AsmError> {
        let target = self.resolve_target(target, span);
        self.emit_br_resolved(span, cond, target, false)
    }

    /// Encodes a branch whose target has already been looked up.
    ///
    /// With `is_alias` the offset was computed from the `CMP` emitted just
    /// before this word, and is corrected accordingly.
    pub fn emit_br_resolved(&mut self, span: Span, cond: BranchCondition, target: Spanned<LabelRef>, is_alias: bool) -> Result<(), AsmError> {
        let mut word = self.classic("BR", span)? | (cond.code() & COND_MASK);
        match target.node {
            LabelRef::Resolved(offset) => {
                let offset = BR_OFFSET.check(offset, target.span)?;
                word |= branch_offset_bits(correct_alias_offset(offset, is_alias));
            }
            LabelRef::Deferred(site) => {
                let pc = self.pc();
                self.labels.claim(site, PatchKind::Branch, pc, is_alias)?;
            }
        }
        self.push(word, "BR");
        Ok(())
    }

    pub fn emit_ldi(&mut self, span: Span, rd: Spanned<u32>, imm: Spanned<i64>) -> Result<(), AsmError> {
        let op = self.classic("LDI", span)?;
        let rd = Self::reg(RegisterKind::R, rd)?;
        let imm = LDI_IMM.check(imm.node, imm.span)?;
        self.push(op | (rd << RD_OFFSET) | ((imm as Word) & IMM20_MASK), "LDI");
        Ok(())
    }

    /// The destination register is written to both the rd and rs fields.
    pub fn emit_ldui(&mut self, span: Span, rd: Spanned<u32>, imm: Spanned<i64>) -> Result<(), AsmError> {
        let op = self.classic("LDUI", span)?;
        let rd = Self::reg(RegisterKind::R, rd)?;
        let imm = LDUI_IMM.check(imm.node, imm.span)?;
        self.push(op | (rd << RD_OFFSET) | (rd << RS_OFFSET) | ((imm as Word) & U_IMM15_MASK), "LDUI");
        Ok(())
    }

    pub fn emit_fbr(&mut self, span: Span, cond: BranchCondition, rd: Spanned<u32>) -> Result<(), AsmError> {
        let op = self.classic("FBR", span)?;
        let rd = Self::reg(RegisterKind::R, rd)?;
        self.push(op | (rd << RD_OFFSET) | (cond.code() & COND_MASK), "FBR");
        Ok(())
    }

    pub fn emit_fmr(&mut self, span: Span, rd: Spanned<u32>, qs: Spanned<u32>) -> Result<(), AsmError> {
        let op = self.classic("FMR", span)?;
        let rd = Self::reg(RegisterKind::R, rd)?;
        let qs = Self::reg(RegisterKind::Q, qs)?;
        self.push(op | (rd << RD_OFFSET) | (qs & QS_MASK), "FMR");
        Ok(())
    }

    /// `SMIS sd, {q, ...}` or `SMIS sd, imm`; always a single word.
    pub fn emit_smis(&mut self, span: Span, sd: Spanned<u32>, mask: MaskOperand<i64>) -> Result<(), AsmError> {
        let op = self.classic("SMIS", span)?;
        let sd = Self::reg(RegisterKind::S, sd)?;
        let bits = match mask {
            MaskOperand::Set { items, span: mask_span } => {
                let qubits = items
                    .iter()
                    .map(|q| self.topology.validate_qubit(q.node, q.span))
                    .collect::<Result<Vec<_>, _>>()?;
                self.topology.validate_s_mask(&qubits, mask_span)?;
                self.topology.pack_s_mask(&qubits)
            }
            MaskOperand::Imm(imm) => SMIS_IMM.check(imm.node, imm.span)? as u64,
        };
        self.push(op | ((sd & SD_MASK) << SD_OFFSET) | (bits as Word & S_MASK_MASK), "SMIS");
        Ok(())
    }

    /// `SMIT td, {(t,c), ...}` or `SMIT td, imm`; one word per 16-bit chunk,
    /// each tagged with its position.
    pub fn emit_smit(&mut self, span: Span, td: Spanned<u32>, mask: MaskOperand<TcPair>) -> Result<(), AsmError> {
        let op = self.classic("SMIT", span)?;
        let td = Self::reg(RegisterKind::T, td)?;
        let bits = match mask {
            MaskOperand::Set { items, span: mask_span } => {
                for pair in &items {
                    self.topology.pair_to_bit(pair.node, pair.span)?;
                }
                let pairs: Vec<TcPair> = items.iter().map(|p| p.node).collect();
                self.topology.validate_t_mask(&pairs, mask_span)?;
                self.topology.pack_t_mask(&pairs, mask_span)?
            }
            MaskOperand::Imm(imm) => {
                SMIT_IMM.check(imm.node, imm.span)?;
                // every set bit must name a pair of this topology
                let assigned = ValueRange::new("imm", 0, (1i64 << self.topology.pairs().len()) - 1);
                let bits = assigned.check(imm.node, imm.span)? as u64;
                let pairs = self.topology.bits_to_t_mask(bits);
                self.topology.validate_t_mask(&pairs, imm.span)?;
                bits
            }
        };
        for (pos, chunk) in t_mask_chunks(bits).into_iter().enumerate() {
            let word = op | ((td & TD_MASK) << TD_OFFSET) | (((pos as Word) & POS_MASK) << POS_OFFSET) | chunk;
            self.push(word, "SMIT");
        }
        Ok(())
    }

    pub fn emit_qwait(&mut self, span: Span, imm: Spanned<i64>) -> Result<(), AsmError> {
        let op = self.classic("QWAIT", span)?;
        let imm = QWAIT_IMM.check(imm.node, imm.span)?;
        self.push(op | ((imm as Word) & U_IMM20_MASK), "QWAIT");
        Ok(())
    }

    pub fn emit_qwaitr(&mut self, span: Span, rs: Spanned<u32>) -> Result<(), AsmError> {
        let op = self.classic("QWAITR", span)?;
        let rs = Self::reg(RegisterKind::R, rs)?;
        self.push(op | (rs << RS_OFFSET), "QWAITR");
        Ok(())
    }

    // Aliases.

    /// `SHL1 rd, rs` and `MULT2 rd, rs` both become `ADD rd, rs, rs`.
    pub fn emit_shl1(&mut self, span: Span, rd: Spanned<u32>, rs: Spanned<u32>) -> Result<(), AsmError> {
        tracing::trace!(%span, "alias SHL1/MULT2 -> ADD");
        self.emit_rrr("ADD", span, rd, rs, rs)
    }

    pub fn emit_mult2(&mut self, span: Span, rd: Spanned<u32>, rs: Spanned<u32>) -> Result<(), AsmError> {
        self.emit_shl1(span, rd, rs)
    }

    /// `COPY rd, rs` and register form `MOV rd, rs` become `OR rd, rs, rs`.
    pub fn emit_copy(&mut self, span: Span, rd: Spanned<u32>, rs: Spanned<u32>) -> Result<(), AsmError> {
        tracing::trace!(%span, "alias COPY -> OR");
        self.emit_rrr("OR", span, rd, rs, rs)
    }

    /// `NAND`, `NOR`, `XNOR`: the base operation followed by `NOT rd, rd`.
    pub fn emit_negated(&mut self, name: &str, span: Span, rd: Spanned<u32>, rs: Spanned<u32>, rt: Spanned<u32>) -> Result<(), AsmError> {
        let base = match name.to_ascii_uppercase().as_str() {
            "NAND" => "AND",
            "NOR" => "OR",
            "XNOR" => "XOR",
            _ => return Err(AsmError::UnknownMnemonic { name: name.to_string(), span }),
        };
        tracing::trace!(%span, alias = name, base, "alias -> op + NOT");
        self.emit_rrr(base, span, rd, rs, rt)?;
        self.emit_not(span, rd, rd)
    }

    /// `BRA` / `GOTO`.
    pub fn emit_bra(&mut self, span: Span, target: Spanned<BranchTarget<'_>>) -> Result<(), AsmError> {
        self.emit_br(span, BranchCondition::Always, target)
    }

    pub fn emit_brn(&mut self, span: Span, target: Spanned<BranchTarget<'_>>) -> Result<(), AsmError> {
        self.emit_br(span, BranchCondition::Never, target)
    }

    /// `B<cond> rs, rt, target`: `CMP rs, rt` then `BR cond, target`.
    pub fn emit_br_cond(
        &mut self,
        span: Span,
        cond: BranchCondition,
        rs: Spanned<u32>,
        rt: Spanned<u32>,
        target: Spanned<BranchTarget<'_>>,
    ) -> Result<(), AsmError> {
        // A deferred label use must always be claimed by the BR below.
        Self::reg(RegisterKind::R, rs)?;
        Self::reg(RegisterKind::R, rt)?;
        let target = self.resolve_target(target, span);
        self.emit_cmp(span, rs, rt)?;
        self.emit_br_resolved(span, cond, target, true)
    }

    /// `MOV rd, imm`: one `LDI` when it fits, else `LDI` of the low 17 bits
    /// followed by `LDUI` of the upper 15.
    pub fn emit_mov_imm(&mut self, span: Span, rd: Spanned<u32>, imm: Spanned<i64>) -> Result<(), AsmError> {
        let value = MOV_IMM.check(imm.node, imm.span)?;
        if LDI_IMM.contains(value) {
            return self.emit_ldi(span, rd, imm);
        }
        let lower = value & U_IMM17_MASK;
        let upper = ((value & !U_IMM17_MASK) >> 17) & U_IMM15_MASK as i64;
        tracing::trace!(%span, value, lower, upper, "alias MOV -> LDI + LDUI");
        self.emit_ldi(span, rd, Spanned::new(lower, imm.span))?;
        self.emit_ldui(span, rd, Spanned::new(upper, imm.span))
    }

    // Quantum.

    /// Builds a quantum sub-instruction, resolving an alias operand to the
    /// register kind the mnemonic expects.
    pub fn quantum(&self, name: Spanned<&str>, operand: Option<QOperand<'_>>, conditional: bool) -> Result<QInstr, AsmError> {
        let (kind, nr) = match operand {
            None => (InstrKind::QuantumNone, None),
            Some(QOperand::Register(RegisterKind::S, nr)) => (InstrKind::QuantumS, Some(nr)),
            Some(QOperand::Register(RegisterKind::T, nr)) => (InstrKind::QuantumT, Some(nr)),
            Some(QOperand::Register(other, nr)) => {
                return Err(AsmError::syntax(format!("expected an S or T register, found {other}{}", nr.node), nr.span))
            }
            Some(QOperand::Alias(alias)) => {
                let kind = match self.registry.kind_of(name.node) {
                    Some(InstrKind::QuantumT) => InstrKind::QuantumT,
                    _ => InstrKind::QuantumS,
                };
                let reg_kind = if kind == InstrKind::QuantumT { RegisterKind::T } else { RegisterKind::S };
                // Report an unknown mnemonic before an unknown alias.
                self.registry.lookup(name.node, kind, name.span)?;
                let nr = self.symbols.lookup_register_alias(alias.node, reg_kind, alias.span)?;
                (kind, Some(Spanned::new(nr, alias.span)))
            }
        };
        let opcode = self.registry.lookup(name.node, kind, name.span)?;
        if conditional && kind != InstrKind::QuantumS {
            return Err(AsmError::syntax("conditional execution needs an S register instruction", name.span));
        }
        Ok(match (kind, nr) {
            (InstrKind::QuantumS, Some(sd)) => {
                QInstr::SReg { opcode, sd: Self::reg(RegisterKind::S, sd)?, conditional }
            }
            (InstrKind::QuantumT, Some(td)) => QInstr::TReg { opcode, td: Self::reg(RegisterKind::T, td)? },
            _ => QInstr::NoArg { opcode },
        })
    }

    /// Packs a bundle two instructions per word. Only the first word carries
    /// the bundle separator; an odd tail is padded with the filler.
    pub fn emit_bundle(&mut self, span: Span, bs: Spanned<i64>, bundle: &[QInstr]) -> Result<(), AsmError> {
        let bs = BS_VALUE.check(bs.node, bs.span)? as Word;
        if bundle.is_empty() {
            return Err(AsmError::syntax("empty quantum bundle", span));
        }
        for (i, pair) in bundle.chunks(2).enumerate() {
            let first = pair[0];
            let second = pair.get(1).copied().unwrap_or(QInstr::FILLER);
            let mut word = 1 << DBL_FORMAT_BIT;
            if i == 0 {
                word |= bs & BS_MASK;
            }
            word |= (first.encode() & VLIW_Q_INST_MASK) << VLIW_INST_0_OFFSET;
            word |= (second.encode() & VLIW_Q_INST_MASK) << VLIW_INST_1_OFFSET;
            self.push(word, "BUNDLE");
        }
        Ok(())
    }
}

/// Splits a packed t-mask into its three 16-bit position chunks.
pub fn t_mask_chunks(bits: u64) -> [Word; T_MASK_CHUNKS] {
    let mut chunks = [0; T_MASK_CHUNKS];
    for (pos, chunk) in chunks.iter_mut().enumerate() {
        *chunk = ((bits >> (T_MASK_CHUNK_BITS * pos)) as Word) & T_MASK_MASK;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Edge;

    fn line_topology() -> Topology {
        let edges = [Edge { index: 0, left: 0, right: 1 }, Edge { index: 1, left: 1, right: 2 }];
        Topology::load_from_edge_list(3, &edges).unwrap()
    }

    fn at<T>(node: T) -> Spanned<T> {
        Spanned::new(node, Span::new(1, 1))
    }

    #[test]
    fn failed_emit_appends_nothing() {
        let reg = OpcodeRegistry::new();
        let topo = line_topology();
        let mut asm = Assembler::new(&reg, &topo, Options::empty());
        assert!(asm.emit_ldi(Span::default(), at(32), at(1)).is_err());
        assert!(asm.emit_ldi(Span::default(), at(1), at(1 << 19)).is_err());
        assert_eq!(asm.pc(), 0);
    }

    #[test]
    fn spaced_binary_groups_nibbles() {
        assert_eq!(spaced_binary(0x8000_000f), "1000 0000 0000 0000 0000 0000 0000 1111");
        let program = Program { words: vec![0x2c00_0005], labels: vec![] };
        assert_eq!(program.hex_strings(false), vec!["0x2c000005".to_string()]);
    }

    #[test]
    fn t_mask_chunking() {
        assert_eq!(t_mask_chunks(0x0001_8000_0003), [0x0003, 0x8000, 0x0001]);
    }

    #[test]
    fn filler_and_conditional_encoding() {
        assert_eq!(QInstr::FILLER.encode(), 0);
        let q = QInstr::SReg { opcode: 0x02, sd: 3, conditional: true };
        assert_eq!(q.encode(), (0x02 << 6) | (1 << 5) | 3);
    }
}
