//! Symbol tables, register aliases and label resolution, including the
//! deferred (second pass) patching of forward referenced branch targets.

use std::collections::HashMap;

use crate::error::{AsmError, Diagnostics, Span};
use crate::isa::layout::{Word, ADDR_MASK, ADDR_OFFSET, BR_OFFSET};
use crate::isa::registers::RegisterKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolValue {
    Int(i64),
    Str(String),
}

/// `.def_sym` and `.register` definitions. Later definitions replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    ints: HashMap<String, i64>,
    strs: HashMap<String, String>,
    aliases: HashMap<(RegisterKind, String), u32>,
}

impl SymbolTable {
    pub fn define(&mut self, name: &str, value: SymbolValue) {
        tracing::trace!(name, ?value, "define symbol");
        match value {
            SymbolValue::Int(v) => {
                self.ints.insert(name.to_string(), v);
            }
            SymbolValue::Str(s) => {
                self.strs.insert(name.to_string(), s);
            }
        }
    }

    pub fn lookup_int(&self, name: &str, span: Span) -> Result<i64, AsmError> {
        self.ints.get(name).copied().ok_or_else(|| AsmError::SymbolNotFound { name: name.to_string(), span })
    }

    pub fn lookup_str(&self, name: &str, span: Span) -> Result<&str, AsmError> {
        self.strs.get(name).map(String::as_str).ok_or_else(|| AsmError::SymbolNotFound { name: name.to_string(), span })
    }

    pub fn define_register_alias(&mut self, name: &str, kind: RegisterKind, nr: u32, span: Span) -> Result<(), AsmError> {
        kind.check(nr, span)?;
        self.aliases.insert((kind, name.to_string()), nr);
        Ok(())
    }

    pub fn lookup_register_alias(&self, name: &str, kind: RegisterKind, span: Span) -> Result<u32, AsmError> {
        self.aliases
            .get(&(kind, name.to_string()))
            .copied()
            .ok_or_else(|| AsmError::RegisterAliasNotFound { name: name.to_string(), kind, span })
    }

    /// Register kinds under which `name` is defined as an alias.
    pub fn alias_kinds(&self, name: &str) -> Vec<RegisterKind> {
        RegisterKind::ALL
            .into_iter()
            .filter(|k| self.aliases.contains_key(&(*k, name.to_string())))
            .collect()
    }
}

/// Result of looking up a label while assembling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRef {
    /// An absolute address or a PC-relative offset, whichever was asked for.
    Resolved(i64),
    /// Not defined yet; a deferred use was recorded under this use site.
    Deferred(Span),
}

/// Instruction kinds whose label operand can be patched after the first pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Branch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredUse {
    pub label: String,
    pub label_span: Span,
    pub want_offset: bool,
    /// Set by the instruction that consumes the label.
    pub kind: Option<PatchKind>,
    pub pc: usize,
    pub is_alias: bool,
    /// A second label was referenced from the same use site.
    pub poisoned: bool,
}

/// Branch offsets of a compare-and-branch macro are taken relative to its
/// leading `CMP`; non-positive ones must reach one further back.
pub fn correct_alias_offset(offset: i64, is_alias: bool) -> i64 {
    if is_alias && offset <= 0 {
        offset - 1
    } else {
        offset
    }
}

pub fn branch_offset_bits(offset: i64) -> Word {
    ((offset as Word) & ADDR_MASK) << ADDR_OFFSET
}

#[derive(Debug, Clone, Default)]
pub struct LabelResolver {
    labels: HashMap<String, (u64, Span)>,
    deferred: Vec<DeferredUse>,
    by_site: HashMap<Span, usize>,
    allow_redefinition: bool,
}

impl LabelResolver {
    pub fn new(allow_redefinition: bool) -> Self {
        Self { allow_redefinition, ..Self::default() }
    }

    pub fn define_label(&mut self, name: &str, pc: usize, span: Span) -> Result<(), AsmError> {
        let addr = pc as u64;
        if let Some(&(previous, prev_span)) = self.labels.get(name) {
            if !self.allow_redefinition {
                return Err(AsmError::LabelRedefined { name: name.to_string(), previous, span });
            }
            tracing::warn!(label = name, previous, addr, first = %prev_span, "label redefined");
        }
        tracing::debug!(label = name, addr, "define label");
        self.labels.insert(name.to_string(), (addr, span));
        Ok(())
    }

    pub fn address(&self, name: &str) -> Option<u64> {
        self.labels.get(name).map(|(a, _)| *a)
    }

    /// All labels sorted by address.
    pub fn labels(&self) -> Vec<(&str, u64)> {
        let mut out: Vec<_> = self.labels.iter().map(|(n, (a, _))| (n.as_str(), *a)).collect();
        out.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));
        out
    }

    pub fn deferred(&self) -> &[DeferredUse] {
        &self.deferred
    }

    /// Looks up `name` for the instruction at `pc`, recording a deferred use
    /// keyed by `site` when the label is not defined yet.
    pub fn resolve_label_address(&mut self, name: &str, label_span: Span, site: Span, want_offset: bool, pc: usize) -> LabelRef {
        if let Some(addr) = self.address(name) {
            let value = if want_offset { addr as i64 - pc as i64 } else { addr as i64 };
            return LabelRef::Resolved(value);
        }

        match self.by_site.get(&site).copied() {
            Some(idx) => {
                let entry = &mut self.deferred[idx];
                if entry.label != name {
                    tracing::debug!(first = %entry.label, second = name, %site, "second label at one use site");
                    entry.poisoned = true;
                    entry.label_span = label_span;
                }
            }
            None => {
                tracing::debug!(label = name, %site, "deferring label use");
                self.by_site.insert(site, self.deferred.len());
                self.deferred.push(DeferredUse {
                    label: name.to_string(),
                    label_span,
                    want_offset,
                    kind: None,
                    pc,
                    is_alias: false,
                    poisoned: false,
                });
            }
        }
        LabelRef::Deferred(site)
    }

    /// Tags the deferred use at `site` with the instruction that will need patching.
    pub fn claim(&mut self, site: Span, kind: PatchKind, pc: usize, is_alias: bool) -> Result<(), AsmError> {
        let idx = *self
            .by_site
            .get(&site)
            .ok_or_else(|| AsmError::internal(format!("no deferred label use recorded for {kind:?}"), site))?;
        let entry = &mut self.deferred[idx];
        entry.kind = Some(kind);
        entry.pc = pc;
        entry.is_alias = is_alias;
        Ok(())
    }

    /// Second pass: patches every deferred use into `program`.
    ///
    /// Errors accumulate, except a label that is still undefined, which stops
    /// the pass immediately.
    pub fn resolve_deferred(&self, program: &mut [Word]) -> Result<(), Diagnostics> {
        let mut diags = Diagnostics::default();
        for entry in &self.deferred {
            if entry.poisoned {
                diags.push(AsmError::MultipleLabels { span: entry.label_span });
                continue;
            }
            let Some(addr) = self.address(&entry.label) else {
                diags.push(AsmError::LabelNotFound { name: entry.label.clone(), span: entry.label_span });
                return Err(diags);
            };
            match entry.kind {
                Some(PatchKind::Branch) => {
                    let offset = addr as i64 - entry.pc as i64;
                    if let Err(e) = BR_OFFSET.check(offset, entry.label_span) {
                        diags.push(e);
                        return Err(diags);
                    }
                    let offset = correct_alias_offset(offset, entry.is_alias);
                    let Some(word) = program.get_mut(entry.pc) else {
                        diags.push(AsmError::internal(format!("patch target {} outside program", entry.pc), entry.label_span));
                        continue;
                    };
                    *word |= branch_offset_bits(offset);
                    tracing::debug!(pc = entry.pc, label = %entry.label, offset, "resolved deferred branch");
                }
                None => diags.push(AsmError::DeferredNotSupported { name: entry.label.clone(), span: entry.label_span }),
            }
        }
        if diags.is_empty() {
            Ok(())
        } else {
            Err(diags)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_last_writer_wins() {
        let mut syms = SymbolTable::default();
        syms.define("N", SymbolValue::Int(3));
        syms.define("N", SymbolValue::Int(4));
        syms.define("N", SymbolValue::Str("four".into()));
        assert_eq!(syms.lookup_int("N", Span::default()), Ok(4));
        assert_eq!(syms.lookup_str("N", Span::default()), Ok("four"));
        assert!(matches!(syms.lookup_int("M", Span::new(1, 1)), Err(AsmError::SymbolNotFound { .. })));
    }

    #[test]
    fn aliases_are_per_kind_and_range_checked() {
        let mut syms = SymbolTable::default();
        syms.define_register_alias("acc", RegisterKind::R, 5, Span::default()).unwrap();
        assert_eq!(syms.lookup_register_alias("acc", RegisterKind::R, Span::default()), Ok(5));
        assert!(syms.lookup_register_alias("acc", RegisterKind::S, Span::default()).is_err());
        assert!(syms.define_register_alias("q", RegisterKind::Q, 7, Span::default()).is_err());
        assert_eq!(syms.alias_kinds("acc"), vec![RegisterKind::R]);
    }

    #[test]
    fn redefinition_policy() {
        let mut strict = LabelResolver::new(false);
        strict.define_label("a", 0, Span::new(1, 1)).unwrap();
        assert!(matches!(strict.define_label("a", 3, Span::new(4, 1)), Err(AsmError::LabelRedefined { previous: 0, .. })));
        assert_eq!(strict.address("a"), Some(0));

        let mut lenient = LabelResolver::new(true);
        lenient.define_label("a", 0, Span::new(1, 1)).unwrap();
        lenient.define_label("a", 3, Span::new(4, 1)).unwrap();
        assert_eq!(lenient.address("a"), Some(3));
    }

    #[test]
    fn second_label_at_same_site_poisons_entry() {
        let mut res = LabelResolver::new(false);
        let site = Span::new(2, 1);
        assert_eq!(res.resolve_label_address("x", Span::new(2, 10), site, true, 0), LabelRef::Deferred(site));
        res.resolve_label_address("y", Span::new(2, 14), site, true, 0);
        res.claim(site, PatchKind::Branch, 0, false).unwrap();
        res.define_label("x", 1, Span::new(3, 1)).unwrap();
        res.define_label("y", 1, Span::new(3, 3)).unwrap();
        let mut program = vec![0u32];
        let diags = res.resolve_deferred(&mut program).unwrap_err();
        assert_eq!(diags.0, vec![AsmError::MultipleLabels { span: Span::new(2, 14) }]);
        assert_eq!(program[0], 0);
    }

    #[test]
    fn first_missing_label_stops_the_pass() {
        let mut res = LabelResolver::new(false);
        res.resolve_label_address("gone", Span::new(1, 4), Span::new(1, 1), true, 0);
        res.claim(Span::new(1, 1), PatchKind::Branch, 0, false).unwrap();
        res.resolve_label_address("later", Span::new(2, 4), Span::new(2, 1), true, 1);
        let mut program = vec![0u32, 0];
        let diags = res.resolve_deferred(&mut program).unwrap_err();
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags.0[0], AsmError::LabelNotFound { ref name, .. } if name == "gone"));
    }

    #[test]
    fn unclaimed_use_is_not_supported() {
        let mut res = LabelResolver::new(false);
        res.resolve_label_address("l", Span::new(1, 8), Span::new(1, 1), false, 0);
        res.define_label("l", 0, Span::new(2, 1)).unwrap();
        let diags = res.resolve_deferred(&mut []).unwrap_err();
        assert!(matches!(diags.0[0], AsmError::DeferredNotSupported { .. }));
    }

    #[test]
    fn claim_without_deferred_use_is_internal() {
        let mut res = LabelResolver::new(false);
        let err = res.claim(Span::new(9, 9), PatchKind::Branch, 0, false).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn alias_correction_is_asymmetric() {
        assert_eq!(correct_alias_offset(-3, true), -4);
        assert_eq!(correct_alias_offset(0, true), -1);
        assert_eq!(correct_alias_offset(5, true), 5);
        assert_eq!(correct_alias_offset(-3, false), -3);
    }
}
