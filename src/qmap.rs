//! Reader for QMAP files: user supplied quantum opcode tables.
//!
//! ```text
//! # comment
//! def_q_arg_none['QNOP'] = 0x00
//! def_q_arg_st['H']      = 0x02
//! def_q_arg_tt['CZ']     = 0x80
//! ```
//!
//! `def_opcode[...]` lines (as written by
//! [`OpcodeRegistry::dump_specification`](crate::opcodes::OpcodeRegistry::dump_specification))
//! describe the compiled-in classic set and are skipped.

use crate::error::QmapError;
use crate::opcodes::QuantumOpcodeMap;
use crate::parser::parse_int;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuantumOpcodeTables {
    pub none: QuantumOpcodeMap,
    pub st: QuantumOpcodeMap,
    pub tt: QuantumOpcodeMap,
}

pub fn parse(text: &str) -> Result<QuantumOpcodeTables, QmapError> {
    let mut tables = QuantumOpcodeTables::default();
    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let syntax = |detail: String| QmapError::Syntax { line: line_no, detail };

        let (lhs, rhs) = line.split_once('=').ok_or_else(|| syntax(format!("expected '=' in '{line}'")))?;
        let (table, key) = lhs
            .trim()
            .split_once('[')
            .ok_or_else(|| syntax(format!("expected '<table>[<name>]', found '{}'", lhs.trim())))?;
        let name = key
            .trim()
            .strip_suffix(']')
            .map(|k| k.trim().trim_matches(|c| c == '\'' || c == '"'))
            .filter(|k| !k.is_empty())
            .ok_or_else(|| syntax(format!("malformed instruction name '{key}'")))?;
        let value = parse_int(rhs.trim()).ok_or_else(|| syntax(format!("invalid opcode value '{}'", rhs.trim())))?;

        let target = match table.trim() {
            "def_q_arg_none" => &mut tables.none,
            "def_q_arg_st" => &mut tables.st,
            "def_q_arg_tt" => &mut tables.tt,
            "def_opcode" => {
                tracing::debug!(line = line_no, name, "classic opcodes are compiled in, ignoring");
                continue;
            }
            other => return Err(syntax(format!("unknown table '{other}'"))),
        };
        if target.insert(name.to_string(), value).is_some() {
            return Err(syntax(format!("'{name}' defined twice in {}", table.trim())));
        }
    }
    Ok(tables)
}
