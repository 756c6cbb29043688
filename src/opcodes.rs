//! Name/opcode mappings for classic and quantum instructions.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::error::{AsmError, QmapError, Span};
use crate::instructions::{self, InstrDesc, DEFAULT_Q_ARG_NONE, DEFAULT_Q_ARG_ST, DEFAULT_Q_ARG_TT};
use crate::isa::layout::MAX_QUANTUM_OPCODE;

/// Opcode used to pad a VLIW word that carries only one real quantum instruction.
pub const FILLER_OPCODE: u32 = 0;

/// A user supplied quantum opcode table, before validation.
pub type QuantumOpcodeMap = BTreeMap<String, i64>;

/// Which mapping an instruction name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InstrKind {
    Classic,
    QuantumNone,
    QuantumS,
    QuantumT,
}

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstrKind::Classic => "a classic instruction",
            InstrKind::QuantumNone => "a quantum instruction without operand",
            InstrKind::QuantumS => "a quantum instruction taking an S register",
            InstrKind::QuantumT => "a quantum instruction taking a T register",
        })
    }
}

#[derive(Debug, Clone)]
pub struct OpcodeRegistry {
    classic: BTreeMap<String, u32>,
    q_none: BTreeMap<String, u32>,
    q_st: BTreeMap<String, u32>,
    q_tt: BTreeMap<String, u32>,
    q_reverse: BTreeMap<u32, (String, InstrKind)>,
}

impl Default for OpcodeRegistry {
    fn default() -> Self {
        let table = |entries: &[(&str, u32)]| -> BTreeMap<String, u32> {
            entries.iter().map(|(n, o)| (n.to_string(), *o)).collect()
        };
        let mut reg = Self {
            classic: instructions::TABLE.iter().map(|d| (d.mnemonic.to_string(), d.opcode)).collect(),
            q_none: table(DEFAULT_Q_ARG_NONE),
            q_st: table(DEFAULT_Q_ARG_ST),
            q_tt: table(DEFAULT_Q_ARG_TT),
            q_reverse: BTreeMap::new(),
        };
        reg.rebuild_reverse();
        reg
    }
}

impl OpcodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: InstrKind) -> &BTreeMap<String, u32> {
        match kind {
            InstrKind::Classic => &self.classic,
            InstrKind::QuantumNone => &self.q_none,
            InstrKind::QuantumS => &self.q_st,
            InstrKind::QuantumT => &self.q_tt,
        }
    }

    /// The mapping `name` belongs to, if any.
    pub fn kind_of(&self, name: &str) -> Option<InstrKind> {
        let upper = name.to_ascii_uppercase();
        [InstrKind::QuantumNone, InstrKind::QuantumS, InstrKind::QuantumT, InstrKind::Classic]
            .into_iter()
            .find(|k| self.map(*k).contains_key(&upper))
    }

    /// Resolves `name` as an instruction of `kind`.
    ///
    /// A name that exists under a different kind yields [`AsmError::KindMismatch`]
    /// rather than a plain "not found".
    pub fn lookup(&self, name: &str, kind: InstrKind, span: Span) -> Result<u32, AsmError> {
        let upper = name.to_ascii_uppercase();
        if let Some(op) = self.map(kind).get(&upper) {
            return Ok(*op);
        }
        match self.kind_of(&upper) {
            Some(found) => Err(AsmError::KindMismatch { name: upper, found, expected: kind, span }),
            None => Err(AsmError::UnknownMnemonic { name: upper, span }),
        }
    }

    pub fn classic_by_opcode(&self, opcode: u32) -> Option<&'static InstrDesc> {
        instructions::by_opcode(opcode)
    }

    pub fn quantum_by_opcode(&self, opcode: u32) -> Option<(&str, InstrKind)> {
        self.q_reverse.get(&opcode).map(|(n, k)| (n.as_str(), *k))
    }

    /// Replaces the three quantum tables after validating them together.
    ///
    /// On error the registry is left untouched.
    pub fn load_quantum_opcodes(
        &mut self,
        none: &QuantumOpcodeMap,
        st: &QuantumOpcodeMap,
        tt: &QuantumOpcodeMap,
    ) -> Result<(), QmapError> {
        let mut used_opcodes: BTreeMap<i64, String> = BTreeMap::new();
        let mut used_names: BTreeMap<String, String> = BTreeMap::new();

        let q_none = check_map("arg_none_map", none, &mut used_names, &mut used_opcodes)?;
        if !q_none.values().any(|op| *op == FILLER_OPCODE) {
            return Err(QmapError::MissingFiller);
        }
        let q_st = check_map("arg_st_map", st, &mut used_names, &mut used_opcodes)?;
        let q_tt = check_map("arg_tt_map", tt, &mut used_names, &mut used_opcodes)?;

        self.q_none = q_none;
        self.q_st = q_st;
        self.q_tt = q_tt;
        self.rebuild_reverse();
        tracing::debug!(
            none = self.q_none.len(),
            st = self.q_st.len(),
            tt = self.q_tt.len(),
            "installed quantum opcode tables"
        );
        Ok(())
    }

    fn rebuild_reverse(&mut self) {
        self.q_reverse.clear();
        for (kind, map) in [
            (InstrKind::QuantumNone, &self.q_none),
            (InstrKind::QuantumS, &self.q_st),
            (InstrKind::QuantumT, &self.q_tt),
        ] {
            for (name, op) in map {
                self.q_reverse.insert(*op, (name.clone(), kind));
            }
        }
    }

    /// Renders every table in QMAP syntax.
    ///
    /// The `def_opcode` section documents the compiled-in classic set and is
    /// skipped when the output is read back as a QMAP file.
    pub fn dump_specification(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "#");
        let _ = writeln!(out, "# QISA opcode specification (qisa-as {})", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(out, "#");
        let _ = writeln!(out);
        let _ = writeln!(out, "# Compiled-in classic instructions (single instruction format)");
        let mut classic: Vec<_> = self.classic.iter().collect();
        classic.sort_by_key(|(_, op)| **op);
        for (name, op) in classic {
            dump_line(&mut out, "def_opcode", name, *op);
        }
        let sections = [
            ("No arguments", "def_q_arg_none", &self.q_none),
            ("Uses 'S' register as parameter", "def_q_arg_st", &self.q_st),
            ("Uses 'T' register as parameter", "def_q_arg_tt", &self.q_tt),
        ];
        for (title, table, map) in sections {
            let _ = writeln!(out);
            let _ = writeln!(out, "# {title}");
            for (name, op) in map {
                dump_line(&mut out, table, name, *op);
            }
        }
        out
    }
}

fn dump_line(out: &mut String, table: &str, name: &str, op: u32) {
    let key = format!("{table}['{name}']");
    let _ = writeln!(out, "{key:<30}= {op:#04x}");
}

fn check_map(
    map_name: &'static str,
    input: &QuantumOpcodeMap,
    used_names: &mut BTreeMap<String, String>,
    used_opcodes: &mut BTreeMap<i64, String>,
) -> Result<BTreeMap<String, u32>, QmapError> {
    let mut out = BTreeMap::new();
    for (name, &value) in input {
        if value < 0 {
            return Err(QmapError::NegativeOpcode { map: map_name, name: name.clone(), value });
        }
        if value > MAX_QUANTUM_OPCODE {
            return Err(QmapError::OpcodeTooHigh {
                map: map_name,
                name: name.clone(),
                value,
                max: MAX_QUANTUM_OPCODE,
            });
        }
        if let Some(previous) = used_opcodes.get(&value) {
            return Err(QmapError::DuplicateOpcode {
                map: map_name,
                name: name.clone(),
                value,
                previous: previous.clone(),
            });
        }
        used_opcodes.insert(value, format!("{map_name}['{name}']"));

        let upper = name.to_ascii_uppercase();
        if let Some(previous) = used_names.get(&upper) {
            return Err(QmapError::DuplicateName { map: map_name, name: upper, previous: previous.clone() });
        }
        used_names.insert(upper.clone(), format!("{map_name}['{upper}']"));
        out.insert(upper, value as u32);
    }
    Ok(out)
}
