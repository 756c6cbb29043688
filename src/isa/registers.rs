use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AsmError, Span};

/// The four register files of the control processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegisterKind {
    /// Measurement result registers.
    Q,
    /// General purpose integer registers.
    R,
    /// Single-qubit target registers (hold an s-mask).
    S,
    /// Two-qubit target registers (hold a t-mask).
    T,
}

impl RegisterKind {
    pub const ALL: [RegisterKind; 4] = [RegisterKind::Q, RegisterKind::R, RegisterKind::S, RegisterKind::T];

    pub const fn capacity(self) -> u32 {
        match self {
            RegisterKind::Q => 7,
            RegisterKind::R => 32,
            RegisterKind::S => 32,
            RegisterKind::T => 64,
        }
    }

    pub const fn letter(self) -> char {
        match self {
            RegisterKind::Q => 'Q',
            RegisterKind::R => 'R',
            RegisterKind::S => 'S',
            RegisterKind::T => 'T',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'Q' => Some(RegisterKind::Q),
            'R' => Some(RegisterKind::R),
            'S' => Some(RegisterKind::S),
            'T' => Some(RegisterKind::T),
            _ => None,
        }
    }

    /// Highest valid register number.
    pub const fn max(self) -> u32 {
        self.capacity() - 1
    }

    pub fn check(self, nr: u32, span: Span) -> Result<u32, AsmError> {
        if nr < self.capacity() {
            Ok(nr)
        } else {
            Err(AsmError::RegisterOutOfRange { kind: self, nr, max: self.max(), span })
        }
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Splits `R12` style text into its register kind and number.
pub fn parse_register(text: &str) -> Option<(RegisterKind, u32)> {
    let mut chars = text.chars();
    let kind = RegisterKind::from_letter(chars.next()?)?;
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|nr| (kind, nr))
}
