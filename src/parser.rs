//! Line-oriented front end: tokenizes QISA source and drives the
//! [`Assembler`] one statement at a time.
//!
//! Each line holds any number of `name:` labels followed by at most one
//! statement. The first error on a line is recorded and the line is
//! abandoned; assembly continues with the next one.

use num_traits::Num;

use crate::encoder::{Assembler, BranchTarget, MaskOperand, QInstr, QOperand};
use crate::error::{AsmError, Span, Spanned};
use crate::instructions;
use crate::isa::cond::BranchCondition;
use crate::isa::registers::{parse_register, RegisterKind};
use crate::symbols::SymbolValue;
use crate::topology::TcPair;

/// Parses a decimal, `0x` hex or `0b` binary integer with optional sign.
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, digits) = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        (16, hex)
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        (2, bin)
    } else {
        (10, body)
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let value = <i64 as Num>::from_str_radix(digits, radix).ok()?;
    Some(if negative { -value } else { value })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Int(i64),
    Str(String),
    Comma,
    Colon,
    Pipe,
    LBrace,
    RBrace,
    LParen,
    RParen,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("'{s}'"),
            Tok::Int(v) => format!("'{v}'"),
            Tok::Str(s) => format!("\"{s}\""),
            Tok::Comma => "','".into(),
            Tok::Colon => "':'".into(),
            Tok::Pipe => "'|'".into(),
            Tok::LBrace => "'{'".into(),
            Tok::RBrace => "'}'".into(),
            Tok::LParen => "'('".into(),
            Tok::RParen => "')'".into(),
        }
    }
}

fn lex(line: &str, line_no: u32) -> Result<Vec<Spanned<Tok>>, AsmError> {
    let chars: Vec<char> = line.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let span = Span::new(line_no, i as u32 + 1);
        let single = match c {
            ',' => Some(Tok::Comma),
            ':' => Some(Tok::Colon),
            '|' => Some(Tok::Pipe),
            '{' => Some(Tok::LBrace),
            '}' => Some(Tok::RBrace),
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            _ => None,
        };
        if let Some(tok) = single {
            toks.push(Spanned::new(tok, span));
            i += 1;
            continue;
        }
        match c {
            '#' => break,
            c if c.is_whitespace() => i += 1,
            '"' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == '"')
                    .ok_or_else(|| AsmError::syntax("unterminated string", span))?;
                toks.push(Spanned::new(Tok::Str(chars[start..start + end].iter().collect()), span));
                i = start + end + 1;
            }
            c if c.is_ascii_digit() || ((c == '-' || c == '+') && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = parse_int(&text).ok_or_else(|| AsmError::syntax(format!("invalid number '{text}'"), span))?;
                toks.push(Spanned::new(Tok::Int(value), span));
            }
            c if c.is_alphabetic() || c == '_' || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                toks.push(Spanned::new(Tok::Ident(chars[start..i].iter().collect()), span));
            }
            other => return Err(AsmError::syntax(format!("unexpected character '{other}'"), span)),
        }
    }
    Ok(toks)
}

/// Assembles every line of `source` into `asm`, recording errors on it.
pub fn assemble_source(asm: &mut Assembler<'_>, source: &str) {
    for (i, line) in source.lines().enumerate() {
        let line_no = i as u32 + 1;
        let result = lex(line, line_no).and_then(|toks| {
            let end = Span::new(line_no, line.chars().count() as u32 + 1);
            Line { asm: &mut *asm, toks, pos: 0, end }.statement()
        });
        if let Err(e) = result {
            asm.report(e);
        }
    }
}

struct Line<'l, 'a> {
    asm: &'l mut Assembler<'a>,
    toks: Vec<Spanned<Tok>>,
    pos: usize,
    /// Position just past the last character, for "expected ..." at end of line.
    end: Span,
}

impl Line<'_, '_> {
    fn peek(&self) -> Option<&Spanned<Tok>> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.toks.get(self.pos + ahead).map(|t| &t.node)
    }

    fn next(&mut self, what: &str) -> Result<Spanned<Tok>, AsmError> {
        let tok = self
            .toks
            .get(self.pos)
            .cloned()
            .ok_or_else(|| AsmError::syntax(format!("expected {what}, found end of line"), self.end))?;
        self.pos += 1;
        Ok(tok)
    }

    fn unexpected(tok: &Spanned<Tok>, what: &str) -> AsmError {
        AsmError::syntax(format!("expected {what}, found {}", tok.node.describe()), tok.span)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek().is_some_and(|t| &t.node == tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<Span, AsmError> {
        let what = tok.describe();
        let got = self.next(&what)?;
        if got.node != tok {
            return Err(Self::unexpected(&got, &what));
        }
        Ok(got.span)
    }

    fn comma(&mut self) -> Result<(), AsmError> {
        self.expect(Tok::Comma).map(|_| ())
    }

    fn finish(&mut self) -> Result<(), AsmError> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(Self::unexpected(t, "end of line")),
        }
    }

    fn ident(&mut self, what: &str) -> Result<Spanned<String>, AsmError> {
        let tok = self.next(what)?;
        match tok.node {
            Tok::Ident(name) => Ok(Spanned::new(name, tok.span)),
            _ => Err(Self::unexpected(&tok, what)),
        }
    }

    /// A register of `kind`, written directly or through a `.register` alias.
    fn register(&mut self, kind: RegisterKind) -> Result<Spanned<u32>, AsmError> {
        let what = format!("{kind} register");
        let name = self.ident(&what)?;
        match parse_register(&name.node) {
            Some((k, nr)) if k == kind => Ok(Spanned::new(nr, name.span)),
            Some(_) => Err(AsmError::syntax(format!("expected {what}, found '{}'", name.node), name.span)),
            None => {
                let nr = self.asm.symbols().lookup_register_alias(&name.node, kind, name.span)?;
                Ok(Spanned::new(nr, name.span))
            }
        }
    }

    fn r(&mut self) -> Result<Spanned<u32>, AsmError> {
        self.register(RegisterKind::R)
    }

    /// An integer literal or the name of an integer symbol.
    fn imm(&mut self) -> Result<Spanned<i64>, AsmError> {
        let tok = self.next("integer")?;
        match tok.node {
            Tok::Int(v) => Ok(Spanned::new(v, tok.span)),
            Tok::Ident(ref name) => Ok(Spanned::new(self.asm.symbols().lookup_int(name, tok.span)?, tok.span)),
            _ => Err(Self::unexpected(&tok, "integer")),
        }
    }

    fn cond(&mut self) -> Result<BranchCondition, AsmError> {
        let name = self.ident("branch condition")?;
        BranchCondition::from_name(&name.node)
            .ok_or_else(|| AsmError::syntax(format!("unknown branch condition '{}'", name.node), name.span))
    }

    fn statement(mut self) -> Result<(), AsmError> {
        while matches!(self.peek_at(0), Some(Tok::Ident(_))) && self.peek_at(1) == Some(&Tok::Colon) {
            let name = self.ident("label")?;
            self.pos += 1;
            self.asm.define_label(&name.node, name.span)?;
        }
        let Some(first) = self.peek().cloned() else {
            return Ok(());
        };
        let Tok::Ident(word) = &first.node else {
            return Err(Self::unexpected(&first, "instruction or directive"));
        };
        let upper = word.to_ascii_uppercase();
        match upper.as_str() {
            ".DEF_SYM" => {
                self.pos += 1;
                self.def_sym()
            }
            ".REGISTER" => {
                self.pos += 1;
                self.register_alias()
            }
            "BS" => {
                self.pos += 1;
                let bs = self.imm()?;
                self.bundle(first.span, bs)
            }
            _ if self.is_quantum_start(&upper) => self.bundle(first.span, Spanned::new(1, first.span)),
            _ => {
                self.pos += 1;
                self.classic(&upper, first.span)
            }
        }?;
        self.finish()
    }

    fn is_quantum_start(&self, upper: &str) -> bool {
        if upper == "C" && self.peek_at(1) == Some(&Tok::Comma) {
            return true;
        }
        instructions::by_mnemonic(upper).is_none()
            && !is_classic_alias(upper)
            && self.asm.registry().kind_of(upper).is_some()
    }

    fn def_sym(&mut self) -> Result<(), AsmError> {
        let name = self.ident("symbol name")?;
        self.eat(&Tok::Comma);
        let tok = self.next("symbol value")?;
        let value = match tok.node {
            Tok::Int(v) => SymbolValue::Int(v),
            Tok::Str(s) => SymbolValue::Str(s),
            _ => return Err(Self::unexpected(&tok, "integer or string")),
        };
        self.asm.symbols_mut().define(&name.node, value);
        Ok(())
    }

    fn register_alias(&mut self) -> Result<(), AsmError> {
        let reg = self.ident("register")?;
        let (kind, nr) = parse_register(&reg.node)
            .ok_or_else(|| AsmError::syntax(format!("expected a register, found '{}'", reg.node), reg.span))?;
        self.eat(&Tok::Comma);
        let name = self.ident("alias name")?;
        self.asm.symbols_mut().define_register_alias(&name.node, kind, nr, reg.span)
    }

    fn classic(&mut self, upper: &str, span: Span) -> Result<(), AsmError> {
        if let Some(cond) = BranchCondition::from_compare_branch(upper) {
            let rs = self.r()?;
            self.comma()?;
            let rt = self.r()?;
            self.comma()?;
            return self.with_target(|asm, target| asm.emit_br_cond(span, cond, rs, rt, target));
        }
        match upper {
            "NOP" => self.asm.emit_nop(span),
            "STOP" => self.asm.emit_stop(span),
            "ADD" | "ADDC" | "SUB" | "SUBC" | "AND" | "OR" | "XOR" => {
                let (rd, rs, rt) = self.three_regs()?;
                self.asm.emit_rrr(upper, span, rd, rs, rt)
            }
            "NAND" | "NOR" | "XNOR" => {
                let (rd, rs, rt) = self.three_regs()?;
                self.asm.emit_negated(upper, span, rd, rs, rt)
            }
            "NOT" => {
                let (rd, rt) = self.two_regs()?;
                self.asm.emit_not(span, rd, rt)
            }
            "CMP" => {
                let (rs, rt) = self.two_regs()?;
                self.asm.emit_cmp(span, rs, rt)
            }
            "SHL1" => {
                let (rd, rs) = self.two_regs()?;
                self.asm.emit_shl1(span, rd, rs)
            }
            "MULT2" => {
                let (rd, rs) = self.two_regs()?;
                self.asm.emit_mult2(span, rd, rs)
            }
            "COPY" => {
                let (rd, rs) = self.two_regs()?;
                self.asm.emit_copy(span, rd, rs)
            }
            "MOV" => {
                let rd = self.r()?;
                self.comma()?;
                if self.next_is_register(RegisterKind::R) {
                    let rs = self.r()?;
                    self.asm.emit_copy(span, rd, rs)
                } else {
                    let imm = self.imm()?;
                    self.asm.emit_mov_imm(span, rd, imm)
                }
            }
            "BR" => {
                let cond = self.cond()?;
                self.comma()?;
                self.with_target(|asm, target| asm.emit_br(span, cond, target))
            }
            "BRA" | "GOTO" => self.with_target(|asm, target| asm.emit_bra(span, target)),
            "BRN" => self.with_target(|asm, target| asm.emit_brn(span, target)),
            "LDI" | "LDUI" => {
                let rd = self.r()?;
                self.comma()?;
                let imm = self.imm()?;
                if upper == "LDI" {
                    self.asm.emit_ldi(span, rd, imm)
                } else {
                    self.asm.emit_ldui(span, rd, imm)
                }
            }
            "FBR" => {
                let cond = self.cond()?;
                self.comma()?;
                let rd = self.r()?;
                self.asm.emit_fbr(span, cond, rd)
            }
            "FMR" => {
                let rd = self.r()?;
                self.comma()?;
                let qs = self.register(RegisterKind::Q)?;
                self.asm.emit_fmr(span, rd, qs)
            }
            "SMIS" => {
                let sd = self.register(RegisterKind::S)?;
                self.comma()?;
                let mask = self.s_mask()?;
                self.asm.emit_smis(span, sd, mask)
            }
            "SMIT" => {
                let td = self.register(RegisterKind::T)?;
                self.comma()?;
                let mask = self.t_mask()?;
                self.asm.emit_smit(span, td, mask)
            }
            "QWAIT" => {
                let imm = self.imm()?;
                self.asm.emit_qwait(span, imm)
            }
            "QWAITR" => {
                let rs = self.r()?;
                self.asm.emit_qwaitr(span, rs)
            }
            _ => {
                // Goes through the registry so a quantum or reserved name
                // gets the more specific message.
                self.asm.registry().lookup(upper, crate::opcodes::InstrKind::Classic, span)?;
                Err(AsmError::syntax(format!("'{upper}' cannot be assembled"), span))
            }
        }
    }

    fn two_regs(&mut self) -> Result<(Spanned<u32>, Spanned<u32>), AsmError> {
        let a = self.r()?;
        self.comma()?;
        let b = self.r()?;
        Ok((a, b))
    }

    fn three_regs(&mut self) -> Result<(Spanned<u32>, Spanned<u32>, Spanned<u32>), AsmError> {
        let (a, b) = self.two_regs()?;
        self.comma()?;
        let c = self.r()?;
        Ok((a, b, c))
    }

    fn next_is_register(&self, kind: RegisterKind) -> bool {
        match self.peek_at(0) {
            Some(Tok::Ident(name)) => match parse_register(name) {
                Some((k, _)) => k == kind,
                None => self.asm.symbols().alias_kinds(name).contains(&kind),
            },
            _ => false,
        }
    }

    /// Reads a branch target and hands it to `emit` while the label name is
    /// still borrowed from the token list.
    fn with_target<F>(&mut self, emit: F) -> Result<(), AsmError>
    where
        F: FnOnce(&mut Assembler<'_>, Spanned<BranchTarget<'_>>) -> Result<(), AsmError>,
    {
        let tok = self.next("branch target")?;
        let target = match &tok.node {
            Tok::Ident(name) => BranchTarget::Label(name.as_str()),
            Tok::Int(off) => BranchTarget::Offset(*off),
            _ => return Err(Self::unexpected(&tok, "label or offset")),
        };
        emit(&mut *self.asm, Spanned::new(target, tok.span))
    }

    fn s_mask(&mut self) -> Result<MaskOperand<i64>, AsmError> {
        let Some(open) = self.peek().filter(|t| t.node == Tok::LBrace).map(|t| t.span) else {
            return Ok(MaskOperand::Imm(self.imm()?));
        };
        self.pos += 1;
        let mut items = Vec::new();
        if !self.eat(&Tok::RBrace) {
            loop {
                items.push(self.imm()?);
                if self.eat(&Tok::RBrace) {
                    break;
                }
                self.comma()?;
            }
        }
        Ok(MaskOperand::Set { items, span: open })
    }

    fn t_mask(&mut self) -> Result<MaskOperand<TcPair>, AsmError> {
        let Some(open) = self.peek().filter(|t| t.node == Tok::LBrace).map(|t| t.span) else {
            return Ok(MaskOperand::Imm(self.imm()?));
        };
        self.pos += 1;
        let mut items = Vec::new();
        if !self.eat(&Tok::RBrace) {
            loop {
                let pair_span = self.expect(Tok::LParen)?;
                let target = self.imm()?;
                self.comma()?;
                let control = self.imm()?;
                self.expect(Tok::RParen)?;
                let topo = self.asm.topology();
                let pair = TcPair::new(
                    topo.validate_qubit(target.node, target.span)?,
                    topo.validate_qubit(control.node, control.span)?,
                );
                items.push(Spanned::new(pair, pair_span));
                if self.eat(&Tok::RBrace) {
                    break;
                }
                self.comma()?;
            }
        }
        Ok(MaskOperand::Set { items, span: open })
    }

    fn bundle(&mut self, span: Span, bs: Spanned<i64>) -> Result<(), AsmError> {
        let mut instrs: Vec<QInstr> = Vec::new();
        loop {
            instrs.push(self.quantum_instr()?);
            if !self.eat(&Tok::Pipe) {
                break;
            }
        }
        self.asm.emit_bundle(span, bs, &instrs)
    }

    fn quantum_instr(&mut self) -> Result<QInstr, AsmError> {
        let conditional = matches!(self.peek_at(0), Some(Tok::Ident(c)) if c.eq_ignore_ascii_case("C"))
            && self.peek_at(1) == Some(&Tok::Comma);
        if conditional {
            self.pos += 2;
        }
        let name = self.ident("quantum instruction")?;
        let operand = match self.peek_at(0) {
            Some(Tok::Ident(_)) => {
                let op = self.ident("operand")?;
                Some(op)
            }
            _ => None,
        };
        let operand = operand.as_ref().map(|op| match parse_register(&op.node) {
            Some((kind, nr)) => QOperand::Register(kind, Spanned::new(nr, op.span)),
            None => QOperand::Alias(Spanned::new(op.node.as_str(), op.span)),
        });
        self.asm.quantum(Spanned::new(name.node.as_str(), name.span), operand, conditional)
    }
}

fn is_classic_alias(upper: &str) -> bool {
    matches!(upper, "SHL1" | "MULT2" | "COPY" | "MOV" | "NAND" | "NOR" | "XNOR" | "BRA" | "GOTO" | "BRN")
        || BranchCondition::from_compare_branch(upper).is_some()
}
