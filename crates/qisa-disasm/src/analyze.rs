use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use qisa_as::disasm::{DisassembledInstruction, Listing};
use qisa_as::instructions;
use qisa_as::isa::cond::BranchCondition;
use qisa_as::isa::layout::{field, is_double_format, Word, OPCODE_MASK, OPCODE_OFFSET};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Fallthrough,
    Branch,
    CondBranch,
}

impl EdgeKind {
    fn tag(self) -> &'static str {
        match self {
            EdgeKind::Fallthrough => "ft",
            EdgeKind::Branch => "br",
            EdgeKind::CondBranch => "cbr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeOut {
    pub from: u64,
    pub to: i64,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelKV {
    pub addr: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorOut {
    pub addr: u64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report<'l> {
    pub instructions: &'l [DisassembledInstruction],
    pub labels: Vec<LabelKV>,
    pub blocks: Vec<Block>,
    pub edges: Vec<EdgeOut>,
    pub errors: Vec<ErrorOut>,
}

fn is_stop(word: Word) -> bool {
    !is_double_format(word)
        && instructions::by_opcode(field(word, OPCODE_OFFSET, OPCODE_MASK)).is_some_and(|d| d.mnemonic == "STOP")
}

/// Splits the program into basic blocks at branch destinations and after
/// every branch or `STOP`, and lists the control flow edges between them.
pub fn analyze(listing: &Listing) -> Report<'_> {
    let instrs = &listing.instructions;
    let len = instrs.len() as i64;
    let in_range = |a: i64| (0..len).contains(&a);

    let mut leaders: BTreeSet<u64> = BTreeSet::new();
    if !instrs.is_empty() {
        leaders.insert(0);
    }
    let mut edges = Vec::new();
    for e in &listing.edges {
        if in_range(e.to) {
            leaders.insert(e.to as u64);
        }
        let next = e.from as i64 + 1;
        if in_range(next) {
            leaders.insert(next as u64);
        }
        let kind = match e.cond {
            BranchCondition::Always => EdgeKind::Branch,
            BranchCondition::Never => EdgeKind::Fallthrough,
            _ => EdgeKind::CondBranch,
        };
        if kind != EdgeKind::Fallthrough {
            edges.push(EdgeOut { from: e.from, to: e.to, kind: kind.tag().into() });
        }
        if kind != EdgeKind::Branch && in_range(next) {
            edges.push(EdgeOut { from: e.from, to: next, kind: EdgeKind::Fallthrough.tag().into() });
        }
    }
    for i in instrs.iter().filter(|i| is_stop(i.word)) {
        if in_range(i.address as i64 + 1) {
            leaders.insert(i.address + 1);
        }
    }

    let starts: Vec<u64> = leaders.into_iter().collect();
    let mut blocks = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(len as u64);
        blocks.push(Block { start, end });
        let last = end - 1;
        let ends_in_branch = listing.edges.iter().any(|e| e.from == last);
        if !ends_in_branch && !is_stop(instrs[last as usize].word) && end < len as u64 {
            edges.push(EdgeOut { from: last, to: end as i64, kind: EdgeKind::Fallthrough.tag().into() });
        }
    }
    edges.sort_by_key(|e| (e.from, e.to));

    Report {
        instructions: instrs,
        labels: listing.labels.iter().map(|(&addr, name)| LabelKV { addr, name: name.clone() }).collect(),
        blocks,
        edges,
        errors: listing.errors().map(|(addr, e)| ErrorOut { addr, message: e.to_string() }).collect(),
    }
}
