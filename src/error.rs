//! Error types and source locations for assembler diagnostics.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::isa::registers::RegisterKind;
use crate::opcodes::InstrKind;
use crate::topology::TcPair;

/// A 1-based position in the assembly source.
///
/// Also serves as the identity of a deferred label use: one use site per
/// distinct span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A value together with the place it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub const fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Validation, resolution and internal errors raised while assembling.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("{span}: opcode for '{name}' not found")]
    UnknownMnemonic { name: String, span: Span },

    #[error("{span}: '{name}' is {found}, expected {expected}")]
    KindMismatch { name: String, found: InstrKind, expected: InstrKind, span: Span },

    #[error("{span}: {kind} register nr ({nr}) too high, max={max}")]
    RegisterOutOfRange { kind: RegisterKind, nr: u32, max: u32, span: Span },

    #[error("{span}: {what} ({value}) too large, min={min}, max={max}")]
    ValueOutOfRange { what: &'static str, value: i64, min: i64, max: i64, span: Span },

    #[error("{span}: invalid qubit number {qubit} used, valid range: [0-{max}]")]
    InvalidQubit { qubit: i64, max: u32, span: Span },

    #[error("{span}: empty s-mask")]
    EmptySMask { span: Span },

    #[error("{span}: s-mask has {len} qubits, at most {max} allowed")]
    SMaskTooLarge { len: usize, max: usize, span: Span },

    #[error("{span}: qubit {qubit} appears more than once in s-mask")]
    DuplicateQubit { qubit: u32, span: Span },

    #[error("{span}: empty t-mask")]
    EmptyTMask { span: Span },

    #[error("{span}: t-mask has {len} pairs, at most {max} allowed")]
    TMaskTooLarge { len: usize, max: usize, span: Span },

    #[error("{span}: pair {pair} appears more than once in t-mask")]
    DuplicatePair { pair: TcPair, span: Span },

    #[error(
        "{span}: {} used in more than one target-control pair in t_mask, offending entry: {pair} (t_mask bit {bit})",
        qubit_phrase(qubits)
    )]
    QubitReused { qubits: Vec<u32>, pair: TcPair, bit: usize, span: Span },

    #[error("{span}: {pair} is an invalid target-control pair")]
    InvalidPair { pair: TcPair, span: Span },

    #[error("{span}: symbol '{name}' not found")]
    SymbolNotFound { name: String, span: Span },

    #[error("{span}: {kind} register alias '{name}' not found")]
    RegisterAliasNotFound { name: String, kind: RegisterKind, span: Span },

    #[error("{span}: label '{name}' not found")]
    LabelNotFound { name: String, span: Span },

    #[error("{span}: using multiple labels for one instruction is not supported")]
    MultipleLabels { span: Span },

    #[error("{span}: use of forward defined label '{name}' for this instruction is not yet supported")]
    DeferredNotSupported { name: String, span: Span },

    #[error("{span}: label '{name}' already defined at address {previous}")]
    LabelRedefined { name: String, previous: u64, span: Span },

    #[error("{span}: syntax error: {detail}")]
    Syntax { detail: String, span: Span },

    #[error("{span}: internal error: {detail}")]
    Internal { detail: String, span: Span },
}

impl AsmError {
    pub fn span(&self) -> Span {
        use AsmError::*;
        match self {
            UnknownMnemonic { span, .. }
            | KindMismatch { span, .. }
            | RegisterOutOfRange { span, .. }
            | ValueOutOfRange { span, .. }
            | InvalidQubit { span, .. }
            | EmptySMask { span }
            | SMaskTooLarge { span, .. }
            | DuplicateQubit { span, .. }
            | EmptyTMask { span }
            | TMaskTooLarge { span, .. }
            | DuplicatePair { span, .. }
            | QubitReused { span, .. }
            | InvalidPair { span, .. }
            | SymbolNotFound { span, .. }
            | RegisterAliasNotFound { span, .. }
            | LabelNotFound { span, .. }
            | MultipleLabels { span }
            | DeferredNotSupported { span, .. }
            | LabelRedefined { span, .. }
            | Syntax { span, .. }
            | Internal { span, .. } => *span,
        }
    }

    pub fn syntax(detail: impl Into<String>, span: Span) -> Self {
        AsmError::Syntax { detail: detail.into(), span }
    }

    pub fn internal(detail: impl Into<String>, span: Span) -> Self {
        AsmError::Internal { detail: detail.into(), span }
    }

    /// True for errors that indicate a defect in the assembler rather than in the source.
    pub fn is_internal(&self) -> bool {
        matches!(self, AsmError::Internal { .. })
    }
}

fn qubit_phrase(qubits: &[u32]) -> String {
    match qubits {
        [a, b] => format!("qubits '{a}' and '{b}' are"),
        [a] => format!("qubit '{a}' is"),
        _ => "qubits are".to_string(),
    }
}

/// Every error collected during one assembly run, in the order raised.
#[derive(thiserror::Error, Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(pub Vec<AsmError>);

impl Diagnostics {
    pub fn push(&mut self, err: AsmError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AsmError> {
        self.0.iter()
    }

    /// Location of the most recent error, if any.
    pub fn last_span(&self) -> Option<Span> {
        self.0.last().map(AsmError::span)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl From<AsmError> for Diagnostics {
    fn from(e: AsmError) -> Self {
        Diagnostics(vec![e])
    }
}

/// Failure to decode a single instruction word.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DisasmError {
    #[error("unknown opcode: {opcode:#04x}")]
    UnknownOpcode { opcode: u32 },
    #[error("unknown branch condition: {code:#04x}")]
    UnknownCondition { code: u32 },
    #[error("unknown quantum opcode: {opcode:#04x}")]
    UnknownQuantumOpcode { opcode: u32 },
    #[error("{kind} register nr ({nr}) too high, max={max}")]
    RegisterOutOfRange { kind: RegisterKind, nr: u32, max: u32 },
    #[error("{count} trailing bytes do not form a complete instruction word")]
    TrailingBytes { count: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("qubit count must be at least 1")]
    NoQubits,
    #[error("{count} qubits declared, at most {max} supported")]
    TooManyQubits { count: usize, max: usize },
    #[error("{count} edges declared, at most {max} supported")]
    TooManyEdges { count: usize, max: usize },
    #[error("edge {index}: qubit {qubit} out of range, topology has {count} qubits")]
    QubitOutOfRange { index: usize, qubit: u32, count: usize },
    #[error("edge {index}: pair {pair} uses the same qubit twice")]
    SelfPair { index: usize, pair: TcPair },
    #[error("edge {index}: pair {pair} already listed")]
    DuplicatePair { index: usize, pair: TcPair },
    #[error("missing section '{0}'")]
    MissingSection(&'static str),
    #[error("{declared} edges declared but {listed} listed")]
    EdgeCountMismatch { declared: usize, listed: usize },
    #[error("line {line}: {detail}")]
    Malformed { line: usize, detail: String },
}

/// Problems with a quantum opcode table, either while parsing or while installing it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QmapError {
    #[error("negative opcode not allowed: {map}['{name}'] = {value}")]
    NegativeOpcode { map: &'static str, name: String, value: i64 },
    #[error("opcode value too high (max={max}): {map}['{name}'] = ({value}/{value:#04x})")]
    OpcodeTooHigh { map: &'static str, name: String, value: i64, max: i64 },
    #[error("opcode ({value}/{value:#04x}) specified for {map}['{name}'] is already used in {previous}")]
    DuplicateOpcode { map: &'static str, name: String, value: i64, previous: String },
    #[error("instruction {map}['{name}'] is already used in {previous}")]
    DuplicateName { map: &'static str, name: String, previous: String },
    #[error("the quantum instruction for opcode 0 is missing; specify it in the no-argument map")]
    MissingFiller,
    #[error("line {line}: {detail}")]
    Syntax { line: usize, detail: String },
}

/// Errors surfaced by a [`crate::session::Session`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no qubit topology loaded, cannot assemble")]
    NoTopology,
    #[error("{0}")]
    Assembly(#[from] Diagnostics),
    #[error("topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("quantum opcode map: {0}")]
    Qmap(#[from] QmapError),
    #[error("input is empty")]
    EmptyInput,
    #[error("nothing to save; assemble or disassemble first")]
    NothingToSave,
    #[error("incorrect format id {0}, allowed is either 1 or 2")]
    BadFormatId(u8),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
