//! Text rendering of decoded words and reconstruction of branch labels over a
//! whole program.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::decoder::{Classic, Decoded, Decoder, QuantumOp, Slot};
use crate::error::DisasmError;
use crate::isa::cond::BranchCondition;
use crate::isa::layout::Word;
use crate::topology::TcPair;

pub const LABEL_PREFIX: &str = "label_";

/// Layout of a rendered listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingFormat {
    /// `0x........  # text`
    #[default]
    Compact,
    /// `text    # 0x........`, the hex column aligned.
    Aligned,
}

impl ListingFormat {
    /// Numeric ids as used on the command line of older tools.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(ListingFormat::Compact),
            2 => Some(ListingFormat::Aligned),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            ListingFormat::Compact => 1,
            ListingFormat::Aligned => 2,
        }
    }
}

pub fn fmt_classic(c: &Classic) -> String {
    match c {
        Classic::Plain { mnemonic } => mnemonic.to_string(),
        Classic::RdRsRt { mnemonic, rd, rs, rt } => format!("{mnemonic} R{rd}, R{rs}, R{rt}"),
        Classic::Not { rd, rt } => format!("NOT R{rd}, R{rt}"),
        Classic::Cmp { rs, rt } => format!("CMP R{rs}, R{rt}"),
        // The destination is appended once labels are known.
        Classic::Br { cond, .. } => format!("BR {cond}"),
        Classic::Ldi { rd, imm } => format!("LDI R{rd}, {imm}"),
        Classic::Ldui { rd, imm } => format!("LDUI R{rd}, {imm:#x}"),
        Classic::Fbr { cond, rd } => format!("FBR {cond}, R{rd}"),
        Classic::Fmr { rd, qs } => format!("FMR R{rd}, Q{qs}"),
        Classic::Smis { sd, qubits } => format!("SMIS S{sd}, {}", s_mask_str(qubits)),
        Classic::Smit { td, pairs, .. } => format!("SMIT T{td}, {}", t_mask_str(pairs)),
        Classic::Qwait { imm } => format!("QWAIT {imm}"),
        Classic::Qwaitr { rs } => format!("QWAITR R{rs}"),
        Classic::Unsupported { mnemonic } => format!("<Not yet supported: '{mnemonic}'>"),
    }
}

fn fmt_quantum(op: &QuantumOp) -> String {
    match op {
        QuantumOp::NoArg { name } => name.clone(),
        QuantumOp::S { name, sd, conditional: true } => format!("C,{name} S{sd}"),
        QuantumOp::S { name, sd, conditional: false } => format!("{name} S{sd}"),
        QuantumOp::T { name, td } => format!("{name} T{td}"),
    }
}

fn fmt_slot(slot: &Slot) -> String {
    match slot {
        Slot::Filler(op) | Slot::Op(op) => fmt_quantum(op),
        Slot::Invalid(e) => invalid(e),
    }
}

/// Text for a word that could not be decoded.
pub fn invalid(e: &DisasmError) -> String {
    match e {
        DisasmError::UnknownQuantumOpcode { opcode } => format!("<INVALID QUANTUM OPCODE: {opcode:#04x}>"),
        other => format!("<INVALID: {other}>"),
    }
}

pub fn fmt_decoded(d: &Decoded) -> String {
    match d {
        Decoded::Classic(c) => fmt_classic(c),
        Decoded::Bundle { bs, slots } => {
            // Fillers are hidden unless the whole word is filler.
            let body = match (&slots[0], &slots[1]) {
                (Slot::Filler(_), Slot::Filler(_)) => fmt_slot(&slots[0]),
                (Slot::Filler(_), other) | (other, Slot::Filler(_)) => fmt_slot(other),
                (a, b) => format!("{} | {}", fmt_slot(a), fmt_slot(b)),
            };
            format!("BS {bs} {body}")
        }
    }
}

pub fn s_mask_str(qubits: &[u32]) -> String {
    let items: Vec<String> = qubits.iter().map(|q| q.to_string()).collect();
    format!("{{{}}}", items.join(", "))
}

pub fn t_mask_str(pairs: &[TcPair]) -> String {
    let items: Vec<String> = pairs.iter().map(|p| p.to_string()).collect();
    format!("{{{}}}", items.join(", "))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisassembledInstruction {
    pub address: u64,
    pub word: Word,
    pub hex: String,
    pub text: String,
    /// `label_N: ` on a branch destination, blank padding elsewhere.
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DisasmError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchEdge {
    pub from: u64,
    pub cond: BranchCondition,
    pub to: i64,
    pub offset: i64,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub instructions: Vec<DisassembledInstruction>,
    /// Synthesized labels keyed by destination address.
    pub labels: BTreeMap<i64, String>,
    pub edges: Vec<BranchEdge>,
    /// Problem with the input past the last complete word.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_error: Option<DisasmError>,
    #[serde(skip)]
    label_width: usize,
}

impl Listing {
    /// Decodes every word and attaches synthesized labels to branch
    /// destinations. Failing words are kept with a placeholder text.
    pub fn build<D: Decoder>(decoder: &D, words: &[Word]) -> Self {
        let mut instructions = Vec::with_capacity(words.len());
        // destination -> branch sources
        let mut destinations: BTreeMap<i64, Vec<(u64, BranchCondition)>> = BTreeMap::new();

        for (i, &word) in words.iter().enumerate() {
            let address = i as u64;
            let (text, error) = match decoder.decode(word) {
                Ok(d) => {
                    if let Some((cond, offset)) = d.branch() {
                        destinations.entry(address as i64 + offset as i64).or_default().push((address, cond));
                    }
                    (fmt_decoded(&d), d.slot_error().cloned())
                }
                Err(e) => (invalid(&e), Some(e)),
            };
            if let Some(e) = &error {
                tracing::debug!(address, word = format_args!("{word:#010x}"), %e, "failed to decode");
            }
            instructions.push(DisassembledInstruction {
                address,
                word,
                hex: format!("{word:#010x}"),
                text,
                label: String::new(),
                error,
            });
        }

        let mut listing = Listing { instructions, ..Self::default() };
        listing.attach_labels(destinations);
        listing
    }

    fn attach_labels(&mut self, destinations: BTreeMap<i64, Vec<(u64, BranchCondition)>>) {
        if destinations.is_empty() {
            return;
        }
        let digits = destinations.len().to_string().len();
        self.label_width = LABEL_PREFIX.len() + digits + 2;
        for (n, &dest) in destinations.keys().enumerate() {
            self.labels.insert(dest, format!("{LABEL_PREFIX}{n:0digits$}"));
        }

        let mut source_to_dest = BTreeMap::new();
        for (&dest, sources) in &destinations {
            for &(src, cond) in sources {
                source_to_dest.insert(src, (dest, cond));
            }
        }

        let blank = " ".repeat(self.label_width);
        for instr in &mut self.instructions {
            instr.label = match self.labels.get(&(instr.address as i64)) {
                Some(name) => format!("{name}: "),
                None => blank.clone(),
            };
            if let Some(&(dest, cond)) = source_to_dest.get(&instr.address) {
                let offset = dest - instr.address as i64;
                let name = &self.labels[&dest];
                let _ = write!(instr.text, ", {name} # offset({offset:+})");
                self.edges.push(BranchEdge { from: instr.address, cond, to: dest, offset, label: name.clone() });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn set_tail_error(&mut self, e: DisasmError) {
        self.tail_error = Some(e);
    }

    /// Every decode failure with the address it occurred at.
    pub fn errors(&self) -> impl Iterator<Item = (u64, &DisasmError)> {
        let tail = self.tail_error.iter().map(|e| (self.instructions.len() as u64, e));
        self.instructions.iter().filter_map(|i| i.error.as_ref().map(|e| (i.address, e))).chain(tail)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Width of the label column, zero when the program has no branches.
    pub fn label_width(&self) -> usize {
        self.label_width
    }

    pub fn render(&self, format: ListingFormat) -> String {
        let mut out = String::new();
        match format {
            ListingFormat::Compact => {
                for i in &self.instructions {
                    let _ = writeln!(out, "{}  # {}{}", i.hex, i.label, i.text);
                }
            }
            ListingFormat::Aligned => {
                let longest = self.instructions.iter().map(|i| i.text.len()).max().unwrap_or(0);
                let width = longest + 4 + self.label_width;
                for i in &self.instructions {
                    let line = format!("{}{}", i.label, i.text);
                    let _ = writeln!(out, "{line:<width$}# {}", i.hex);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::QisaDecoder;
    use crate::opcodes::OpcodeRegistry;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_operands() {
        let ldi = Decoded::Classic(Classic::Ldi { rd: 1, imm: -5 });
        assert_eq!(fmt_decoded(&ldi), "LDI R1, -5");
        let fbr = Decoded::Classic(Classic::Fbr { cond: BranchCondition::Eq, rd: 3 });
        assert_eq!(fmt_decoded(&fbr), "FBR EQ, R3");
        let smit = Classic::Smit { td: 0, pos: 0, pairs: vec![TcPair::new(2, 0), TcPair::new(1, 3)] };
        assert_eq!(fmt_classic(&smit), "SMIT T0, {(2,0), (1,3)}");
        assert_eq!(fmt_classic(&Classic::Unsupported { mnemonic: "LD" }), "<Not yet supported: 'LD'>");
    }

    #[test]
    fn bundle_hides_filler() {
        let h = Slot::Op(QuantumOp::S { name: "H".into(), sd: 0, conditional: true });
        let cz = Slot::Op(QuantumOp::T { name: "CZ".into(), td: 1 });
        let nop = Slot::Filler(QuantumOp::NoArg { name: "QNOP".into() });
        let both = Decoded::Bundle { bs: 1, slots: [h.clone(), cz] };
        assert_eq!(fmt_decoded(&both), "BS 1 C,H S0 | CZ T1");
        let one = Decoded::Bundle { bs: 0, slots: [nop.clone(), h] };
        assert_eq!(fmt_decoded(&one), "BS 0 C,H S0");
        let none = Decoded::Bundle { bs: 2, slots: [nop.clone(), nop] };
        assert_eq!(fmt_decoded(&none), "BS 2 QNOP");
    }

    #[test]
    fn backward_branch_gets_label() {
        let reg = OpcodeRegistry::new();
        let dec = QisaDecoder::new(&reg, None);
        let nop = 0;
        let br_back = (0x01 << 25) | ((-1i32 as u32 & 0x1f_ffff) << 4);
        let listing = Listing::build(&dec, &[nop, br_back]);
        assert_eq!(listing.labels.get(&0).map(String::as_str), Some("label_0"));
        assert_eq!(
            listing.render(ListingFormat::Compact),
            "0x00000000  # label_0: NOP\n0x03fffff0  #          BR ALWAYS, label_0 # offset(-1)\n"
        );
    }
}
