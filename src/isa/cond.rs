use std::fmt;

use serde::{Deserialize, Serialize};

/// Condition evaluated by `BR` and `FBR` against the comparison flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchCondition {
    Always,
    Never,
    Eq,
    Ne,
    Ltz,
    Gez,
    Ltu,
    Geu,
    Leu,
    Gtu,
    Lt,
    Ge,
    Le,
    Gt,
}

use BranchCondition as BC;

const ALL: [BranchCondition; 14] = [
    BC::Always,
    BC::Never,
    BC::Leu,
    BC::Gtu,
    BC::Ltz,
    BC::Gez,
    BC::Ltu,
    BC::Geu,
    BC::Eq,
    BC::Ne,
    BC::Lt,
    BC::Ge,
    BC::Le,
    BC::Gt,
];

const ALIASES: &[(&str, BranchCondition)] = &[("NOTCARRY", BC::Ltu), ("CARRY", BC::Geu), ("EQZ", BC::Eq), ("NEZ", BC::Ne)];

/// `B<cond>` comparison branch macros and the condition each expands to.
const COMPARE_BRANCHES: &[(&str, BranchCondition)] = &[
    ("BEQ", BC::Eq),
    ("BNE", BC::Ne),
    ("BLT", BC::Lt),
    ("BLE", BC::Le),
    ("BGT", BC::Gt),
    ("BGE", BC::Ge),
    ("BLTU", BC::Ltu),
    ("BLEU", BC::Leu),
    ("BGTU", BC::Gtu),
    ("BGEU", BC::Geu),
];

impl BranchCondition {
    pub const fn code(self) -> u32 {
        match self {
            BC::Always => 0x0,
            BC::Never => 0x1,
            BC::Leu => 0x2,
            BC::Gtu => 0x3,
            BC::Ltz => 0x4,
            BC::Gez => 0x5,
            BC::Ltu => 0x8,
            BC::Geu => 0x9,
            BC::Eq => 0xa,
            BC::Ne => 0xb,
            BC::Lt => 0xc,
            BC::Ge => 0xd,
            BC::Le => 0xe,
            BC::Gt => 0xf,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        ALL.iter().copied().find(|c| c.code() == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            BC::Always => "ALWAYS",
            BC::Never => "NEVER",
            BC::Eq => "EQ",
            BC::Ne => "NE",
            BC::Ltz => "LTZ",
            BC::Gez => "GEZ",
            BC::Ltu => "LTU",
            BC::Geu => "GEU",
            BC::Leu => "LEU",
            BC::Gtu => "GTU",
            BC::Lt => "LT",
            BC::Ge => "GE",
            BC::Le => "LE",
            BC::Gt => "GT",
        }
    }

    /// Looks up a condition by canonical name or alias, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        ALL.iter()
            .copied()
            .find(|c| c.name() == upper)
            .or_else(|| ALIASES.iter().find(|(n, _)| *n == upper).map(|(_, c)| *c))
    }

    /// Condition for a `BEQ`-style compare-and-branch mnemonic.
    pub fn from_compare_branch(mnemonic: &str) -> Option<Self> {
        let upper = mnemonic.to_ascii_uppercase();
        COMPARE_BRANCHES.iter().find(|(n, _)| *n == upper).map(|(_, c)| *c)
    }
}

impl fmt::Display for BranchCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        for a in ALL {
            assert_eq!(BranchCondition::from_code(a.code()), Some(a));
        }
        assert_eq!(BranchCondition::from_code(0x6), None);
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(BranchCondition::from_name("carry"), Some(BC::Geu));
        assert_eq!(BranchCondition::from_name("EQZ"), Some(BC::Eq));
        assert_eq!(BranchCondition::from_name("gt"), Some(BC::Gt));
        assert_eq!(BranchCondition::from_compare_branch("bleu"), Some(BC::Leu));
        assert_eq!(BranchCondition::from_compare_branch("BR"), None);
    }
}
