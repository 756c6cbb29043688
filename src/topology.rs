//! Qubit connectivity: which (target, control) pairs exist and which mask bit
//! each one occupies.
//!
//! The edge list is the only source of truth. Pair-to-bit and bit-to-pair
//! lookups are both derived from it when the topology is built.

use std::collections::{HashMap, HashSet};
use std::fmt;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AsmError, Span, TopologyError};
use crate::isa::layout::{S_MASK_BITS, T_MASK_BITS};

/// Largest qubit count whose s-mask fits in one `SMIS` word.
pub const MAX_QUBITS: usize = S_MASK_BITS;
/// Largest number of pairs addressable by the three `SMIT` chunks.
pub const MAX_EDGES: usize = T_MASK_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TcPair {
    pub target: u32,
    pub control: u32,
}

impl TcPair {
    pub const fn new(target: u32, control: u32) -> Self {
        Self { target, control }
    }
}

impl fmt::Display for TcPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.target, self.control)
    }
}

/// One `<index>, <left>, <right>` line of an edge list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub index: u32,
    pub left: u32,
    pub right: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    qubit_count: usize,
    pairs: Vec<TcPair>,
    bits: HashMap<TcPair, usize>,
}

impl Topology {
    /// Builds a topology whose pair bit indices follow the order of `edges`.
    pub fn load_from_edge_list(qubit_count: usize, edges: &[Edge]) -> Result<Self, TopologyError> {
        if qubit_count == 0 {
            return Err(TopologyError::NoQubits);
        }
        if qubit_count > MAX_QUBITS {
            return Err(TopologyError::TooManyQubits { count: qubit_count, max: MAX_QUBITS });
        }
        if edges.len() > MAX_EDGES {
            return Err(TopologyError::TooManyEdges { count: edges.len(), max: MAX_EDGES });
        }

        let mut pairs = Vec::with_capacity(edges.len());
        let mut bits = HashMap::with_capacity(edges.len());
        for (bit, edge) in edges.iter().enumerate() {
            let pair = TcPair::new(edge.left, edge.right);
            for qubit in [edge.left, edge.right] {
                if qubit as usize >= qubit_count {
                    return Err(TopologyError::QubitOutOfRange { index: bit, qubit, count: qubit_count });
                }
            }
            if edge.left == edge.right {
                return Err(TopologyError::SelfPair { index: bit, pair });
            }
            if bits.insert(pair, bit).is_some() {
                return Err(TopologyError::DuplicatePair { index: bit, pair });
            }
            if edge.index as usize != bit {
                tracing::warn!(index = edge.index, bit, %pair, "edge index differs from its position, using position");
            }
            pairs.push(pair);
        }

        tracing::debug!(qubits = qubit_count, pairs = pairs.len(), "topology loaded");
        Ok(Self { qubit_count, pairs, bits })
    }

    /// Reads the `.NumQubits` / `.NumDirEdge` / `.EdgeList` text format.
    pub fn parse(text: &str) -> Result<Self, TopologyError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Section {
            Outside,
            Qubits,
            DirEdge,
            Edges,
        }

        let mut section = Section::Outside;
        let mut qubits: Option<usize> = None;
        let mut declared: Option<usize> = None;
        let mut edges: Option<Vec<Edge>> = None;

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let next = match line {
                ".NumQubits" => Some(Section::Qubits),
                ".NumDirEdge" => Some(Section::DirEdge),
                ".EdgeList" => {
                    edges.get_or_insert_with(Vec::new);
                    Some(Section::Edges)
                }
                ".EndNumQubits" | ".EndNumDirEdge" | ".EndEdgeList" => Some(Section::Outside),
                _ => None,
            };
            if let Some(next) = next {
                section = next;
                continue;
            }
            match section {
                Section::Qubits => qubits = Some(parse_count(line, line_no)?),
                Section::DirEdge => declared = Some(parse_count(line, line_no)?),
                Section::Edges => edges.get_or_insert_with(Vec::new).push(parse_edge(line, line_no)?),
                Section::Outside => {
                    return Err(TopologyError::Malformed {
                        line: line_no,
                        detail: format!("unexpected '{line}' outside of a section"),
                    })
                }
            }
        }

        let qubits = qubits.ok_or(TopologyError::MissingSection(".NumQubits"))?;
        let declared = declared.ok_or(TopologyError::MissingSection(".NumDirEdge"))?;
        let edges = edges.ok_or(TopologyError::MissingSection(".EdgeList"))?;
        if declared != edges.len() {
            return Err(TopologyError::EdgeCountMismatch { declared, listed: edges.len() });
        }
        Self::load_from_edge_list(qubits, &edges)
    }

    pub fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    /// All pairs, indexed by their mask bit.
    pub fn pairs(&self) -> &[TcPair] {
        &self.pairs
    }

    pub fn pair_to_bit(&self, pair: TcPair, span: Span) -> Result<usize, AsmError> {
        self.bits.get(&pair).copied().ok_or(AsmError::InvalidPair { pair, span })
    }

    pub fn bit_to_pair(&self, bit: usize) -> Option<TcPair> {
        self.pairs.get(bit).copied()
    }

    /// Qubits whose bit is set, ignoring bits beyond the qubit count.
    pub fn bits_to_s_mask(&self, bits: u64) -> Vec<u32> {
        bits.view_bits::<Lsb0>()[..self.qubit_count].iter_ones().map(|q| q as u32).collect()
    }

    /// Pairs whose bit is set, ignoring bits with no assigned pair.
    pub fn bits_to_t_mask(&self, bits: u64) -> Vec<TcPair> {
        bits.view_bits::<Lsb0>()[..self.pairs.len()].iter_ones().map(|b| self.pairs[b]).collect()
    }

    pub fn validate_qubit(&self, qubit: i64, span: Span) -> Result<u32, AsmError> {
        if qubit < 0 || qubit as u64 >= self.qubit_count as u64 {
            return Err(AsmError::InvalidQubit { qubit, max: self.qubit_count as u32 - 1, span });
        }
        Ok(qubit as u32)
    }

    /// Checks a qubit set whose members are already known to be in range.
    pub fn validate_s_mask(&self, mask: &[u32], span: Span) -> Result<(), AsmError> {
        if mask.is_empty() {
            return Err(AsmError::EmptySMask { span });
        }
        if mask.len() > self.qubit_count {
            return Err(AsmError::SMaskTooLarge { len: mask.len(), max: self.qubit_count, span });
        }
        let mut seen = HashSet::new();
        for &qubit in mask {
            if !seen.insert(qubit) {
                return Err(AsmError::DuplicateQubit { qubit, span });
            }
        }
        Ok(())
    }

    /// Checks a pair set whose members are already known to be valid pairs.
    pub fn validate_t_mask(&self, mask: &[TcPair], span: Span) -> Result<(), AsmError> {
        if mask.is_empty() {
            return Err(AsmError::EmptyTMask { span });
        }
        if mask.len() > self.pairs.len() {
            return Err(AsmError::TMaskTooLarge { len: mask.len(), max: self.pairs.len(), span });
        }
        let mut seen = HashSet::new();
        for &pair in mask {
            if !seen.insert(pair) {
                return Err(AsmError::DuplicatePair { pair, span });
            }
        }
        let mut used = HashSet::new();
        for &pair in mask {
            let reused: Vec<u32> = [pair.target, pair.control].into_iter().filter(|q| used.contains(q)).collect();
            if !reused.is_empty() {
                let bit = self.bits.get(&pair).copied().unwrap_or_default();
                return Err(AsmError::QubitReused { qubits: reused, pair, bit, span });
            }
            used.insert(pair.target);
            used.insert(pair.control);
        }
        Ok(())
    }

    pub fn pack_s_mask(&self, mask: &[u32]) -> u64 {
        let mut word = 0u64;
        let bits = word.view_bits_mut::<Lsb0>();
        for &qubit in mask {
            bits.set(qubit as usize, true);
        }
        word
    }

    pub fn pack_t_mask(&self, mask: &[TcPair], span: Span) -> Result<u64, AsmError> {
        let mut word = 0u64;
        let bits = word.view_bits_mut::<Lsb0>();
        for &pair in mask {
            bits.set(self.pair_to_bit(pair, span)?, true);
        }
        Ok(word)
    }
}

fn parse_count(line: &str, line_no: usize) -> Result<usize, TopologyError> {
    line.parse().map_err(|_| TopologyError::Malformed { line: line_no, detail: format!("expected a count, found '{line}'") })
}

fn parse_edge(line: &str, line_no: usize) -> Result<Edge, TopologyError> {
    let malformed = || TopologyError::Malformed {
        line: line_no,
        detail: format!("expected '<index>, <left>, <right>', found '{line}'"),
    };
    let fields: Vec<u32> = line
        .split(',')
        .map(|f| f.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed())?;
    match fields[..] {
        [index, left, right] => Ok(Edge { index, left, right }),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "\
# three qubits in a line
.NumQubits
3
.EndNumQubits

.NumDirEdge
4
.EndNumDirEdge

.EdgeList
0, 0, 1
1, 1, 0
2, 1, 2
3, 2, 1
.EndEdgeList
";

    #[test]
    fn parses_edge_list_in_file_order() {
        let topo = Topology::parse(FILE).unwrap();
        assert_eq!(topo.qubit_count(), 3);
        assert_eq!(topo.pair_to_bit(TcPair::new(1, 2), Span::default()), Ok(2));
        assert_eq!(topo.bit_to_pair(3), Some(TcPair::new(2, 1)));
        assert!(topo.pair_to_bit(TcPair::new(0, 2), Span::default()).is_err());
    }

    #[test]
    fn edge_count_must_match() {
        let text = FILE.replace("\n4\n", "\n5\n");
        assert_eq!(Topology::parse(&text), Err(TopologyError::EdgeCountMismatch { declared: 5, listed: 4 }));
    }

    #[test]
    fn rejects_bad_edges() {
        let text = FILE.replace("3, 2, 1", "3, 2, 7");
        assert!(matches!(Topology::parse(&text), Err(TopologyError::QubitOutOfRange { qubit: 7, .. })));
        let text = FILE.replace("3, 2, 1", "3, 1, 2");
        assert!(matches!(Topology::parse(&text), Err(TopologyError::DuplicatePair { index: 3, .. })));
        let text = FILE.replace("3, 2, 1", "3, 2");
        assert!(matches!(Topology::parse(&text), Err(TopologyError::Malformed { line: 14, .. })));
    }

    #[test]
    fn unpacking_ignores_unassigned_bits() {
        let topo = Topology::parse(FILE).unwrap();
        assert_eq!(topo.bits_to_s_mask(0b1_0101), vec![0, 2]);
        assert_eq!(topo.bits_to_t_mask(0b1_0110), vec![TcPair::new(1, 0), TcPair::new(1, 2)]);
    }

    #[test]
    fn t_mask_qubit_reuse_names_the_qubit() {
        let topo = Topology::parse(FILE).unwrap();
        let err = topo.validate_t_mask(&[TcPair::new(0, 1), TcPair::new(1, 2)], Span::new(4, 10)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "4:10: qubit '1' is used in more than one target-control pair in t_mask, offending entry: (1,2) (t_mask bit 2)"
        );
    }
}
