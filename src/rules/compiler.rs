//! Lowers parsed rules into matchers and type-checked conditions.
//!
//! Literal strings (all ascii/wide variants) share two Aho-Corasick automata,
//! one case-sensitive and one ASCII case-insensitive. Hex strings and regular
//! expressions become byte regexes with Unicode disabled so they match raw
//! binary content.

use super::parser::{
    parse, ArithOp, CmpOp, Expr, HexToken, MetaValue, Pattern, Quantifier, ReadFn, RuleDecl,
    StringDecl, StringSet,
};
use crate::error::{Result, TriageError};
use aho_corasick::AhoCorasick;
use regex::bytes::{Regex, RegexBuilder};
use std::collections::HashMap;
use tracing::debug;

const REGEX_SIZE_LIMIT: usize = 16 * 1024 * 1024;

pub(crate) enum Matcher {
    /// Matches come from the shared automata.
    Literal,
    Regex(Regex),
}

pub(crate) struct CompiledString {
    pub rule: usize,
    pub id: String,
    pub fullword: bool,
    pub matcher: Matcher,
}

/// One automaton pattern and the string it belongs to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LiteralPattern {
    pub string: usize,
    pub wide: bool,
}

pub(crate) enum IntExpr {
    Const(i64),
    Filesize,
    Count(usize),
    Read(ReadFn, Box<IntExpr>),
    Arith(ArithOp, Box<IntExpr>, Box<IntExpr>),
}

pub(crate) enum BoolExpr {
    Const(bool),
    Matched(usize),
    At(usize, IntExpr),
    In(usize, IntExpr, IntExpr),
    Rule(usize),
    Not(Box<BoolExpr>),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
    Cmp(CmpOp, IntExpr, IntExpr),
    NonZero(IntExpr),
    /// Quantifier over global string indices.
    Of(Quantifier, Vec<usize>),
}

pub(crate) struct CompiledRule {
    pub name: String,
    pub tags: Vec<String>,
    pub meta: Vec<(String, MetaValue)>,
    pub private: bool,
    pub global: bool,
    pub condition: BoolExpr,
}

pub(crate) struct Compiled {
    pub rules: Vec<CompiledRule>,
    pub strings: Vec<CompiledString>,
    pub literals: Option<AhoCorasick>,
    pub literal_patterns: Vec<LiteralPattern>,
    pub literals_nocase: Option<AhoCorasick>,
    pub nocase_patterns: Vec<LiteralPattern>,
}

enum Typed {
    Bool(BoolExpr),
    Int(IntExpr),
}

struct Scope<'a> {
    rule_name: &'a str,
    line: usize,
    /// Local string id to global index, in declaration order.
    strings: &'a [(String, usize)],
    rules: &'a HashMap<String, usize>,
}

impl Scope<'_> {
    fn error(&self, message: impl Into<String>) -> TriageError {
        TriageError::rule_compilation(
            self.line,
            format!("rule '{}': {}", self.rule_name, message.into()),
        )
    }

    fn string(&self, id: &str) -> Result<usize> {
        self.strings
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, idx)| *idx)
            .ok_or_else(|| self.error(format!("undefined string identifier ${}", id)))
    }

    fn set(&self, set: &StringSet) -> Result<Vec<usize>> {
        let members: Vec<usize> = match set {
            StringSet::Them => self.strings.iter().map(|(_, idx)| *idx).collect(),
            StringSet::Patterns(ids) => {
                let mut out = Vec::new();
                for id in ids {
                    let matched: Vec<usize> = match id.strip_suffix('*') {
                        Some(prefix) => self
                            .strings
                            .iter()
                            .filter(|(name, _)| !name.is_empty() && name.starts_with(prefix))
                            .map(|(_, idx)| *idx)
                            .collect(),
                        None => vec![self.string(id)?],
                    };
                    if matched.is_empty() {
                        return Err(self.error(format!("no strings match ${}", id)));
                    }
                    for idx in matched {
                        if !out.contains(&idx) {
                            out.push(idx);
                        }
                    }
                }
                out
            }
        };
        if members.is_empty() {
            return Err(self.error("'them' used in a rule without strings"));
        }
        Ok(members)
    }

    fn lower(&self, expr: &Expr) -> Result<Typed> {
        Ok(match expr {
            Expr::Bool(b) => Typed::Bool(BoolExpr::Const(*b)),
            Expr::Int(n) => Typed::Int(IntExpr::Const(*n)),
            Expr::Filesize => Typed::Int(IntExpr::Filesize),
            Expr::Matched(id) => Typed::Bool(BoolExpr::Matched(self.string(id)?)),
            Expr::Count(id) => Typed::Int(IntExpr::Count(self.string(id)?)),
            Expr::At(id, offset) => Typed::Bool(BoolExpr::At(self.string(id)?, self.int(offset)?)),
            Expr::In(id, lo, hi) => {
                Typed::Bool(BoolExpr::In(self.string(id)?, self.int(lo)?, self.int(hi)?))
            }
            Expr::Read(read, offset) => Typed::Int(IntExpr::Read(*read, Box::new(self.int(offset)?))),
            Expr::Rule(name) => match self.rules.get(name) {
                Some(idx) => Typed::Bool(BoolExpr::Rule(*idx)),
                None => return Err(self.error(format!("undefined identifier '{}'", name))),
            },
            Expr::Not(inner) => Typed::Bool(BoolExpr::Not(Box::new(self.boolean(inner)?))),
            Expr::And(a, b) => Typed::Bool(BoolExpr::And(
                Box::new(self.boolean(a)?),
                Box::new(self.boolean(b)?),
            )),
            Expr::Or(a, b) => Typed::Bool(BoolExpr::Or(
                Box::new(self.boolean(a)?),
                Box::new(self.boolean(b)?),
            )),
            Expr::Cmp(op, a, b) => Typed::Bool(BoolExpr::Cmp(*op, self.int(a)?, self.int(b)?)),
            Expr::Arith(op, a, b) => Typed::Int(IntExpr::Arith(
                *op,
                Box::new(self.int(a)?),
                Box::new(self.int(b)?),
            )),
            Expr::Of(quantifier, set) => {
                let members = self.set(set)?;
                if let Quantifier::AtLeast(n) = quantifier {
                    if *n < 0 || *n as usize > members.len() {
                        return Err(self.error(format!(
                            "'{} of' exceeds the {} strings in the set",
                            n,
                            members.len()
                        )));
                    }
                }
                Typed::Bool(BoolExpr::Of(quantifier.clone(), members))
            }
        })
    }

    fn boolean(&self, expr: &Expr) -> Result<BoolExpr> {
        Ok(match self.lower(expr)? {
            Typed::Bool(b) => b,
            Typed::Int(i) => BoolExpr::NonZero(i),
        })
    }

    fn int(&self, expr: &Expr) -> Result<IntExpr> {
        match self.lower(expr)? {
            Typed::Int(i) => Ok(i),
            Typed::Bool(_) => Err(self.error("expected an integer expression")),
        }
    }
}

#[derive(Default)]
struct LiteralTable {
    patterns: Vec<Vec<u8>>,
    owners: Vec<LiteralPattern>,
}

impl LiteralTable {
    fn push(&mut self, bytes: Vec<u8>, owner: LiteralPattern) {
        self.patterns.push(bytes);
        self.owners.push(owner);
    }

    fn build(self, nocase: bool) -> Result<(Option<AhoCorasick>, Vec<LiteralPattern>)> {
        if self.patterns.is_empty() {
            return Ok((None, Vec::new()));
        }
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(nocase)
            .build(&self.patterns)
            .map_err(|e| TriageError::rule_compilation(0, e.to_string()))?;
        Ok((Some(automaton), self.owners))
    }
}

/// Parse and compile rule source.
pub(crate) fn compile(source: &str) -> Result<Compiled> {
    let decls = parse(source)?;

    let mut rules: Vec<CompiledRule> = Vec::with_capacity(decls.len());
    let mut rule_index: HashMap<String, usize> = HashMap::new();
    let mut strings: Vec<CompiledString> = Vec::new();
    let mut exact = LiteralTable::default();
    let mut folded = LiteralTable::default();

    for decl in &decls {
        if rule_index.contains_key(&decl.name) {
            return Err(TriageError::rule_compilation(
                decl.line,
                format!("duplicate rule name '{}'", decl.name),
            ));
        }
        let rule_idx = rules.len();

        let mut local: Vec<(String, usize)> = Vec::with_capacity(decl.strings.len());
        for s in &decl.strings {
            let idx = strings.len();
            let matcher = lower_string(decl, s, idx, &mut exact, &mut folded)?;
            strings.push(CompiledString {
                rule: rule_idx,
                id: s.id.clone(),
                fullword: s.modifiers.fullword,
                matcher,
            });
            local.push((s.id.clone(), idx));
        }

        let scope = Scope {
            rule_name: &decl.name,
            line: decl.line,
            strings: &local,
            rules: &rule_index,
        };
        let condition = scope.boolean(&decl.condition)?;

        rules.push(CompiledRule {
            name: decl.name.clone(),
            tags: decl.tags.clone(),
            meta: decl.meta.clone(),
            private: decl.private,
            global: decl.global,
            condition,
        });
        rule_index.insert(decl.name.clone(), rule_idx);
    }

    let (literals, literal_patterns) = exact.build(false)?;
    let (literals_nocase, nocase_patterns) = folded.build(true)?;
    debug!(
        rules = rules.len(),
        strings = strings.len(),
        literals = literal_patterns.len() + nocase_patterns.len(),
        "rule set compiled"
    );

    Ok(Compiled {
        rules,
        strings,
        literals,
        literal_patterns,
        literals_nocase,
        nocase_patterns,
    })
}

fn lower_string(
    rule: &RuleDecl,
    decl: &StringDecl,
    idx: usize,
    exact: &mut LiteralTable,
    folded: &mut LiteralTable,
) -> Result<Matcher> {
    let err = |message: &str| {
        TriageError::rule_compilation(
            decl.line,
            format!("rule '{}', string ${}: {}", rule.name, decl.id, message),
        )
    };
    let m = &decl.modifiers;
    match &decl.pattern {
        Pattern::Text(bytes) => {
            if bytes.is_empty() {
                return Err(err("empty text string"));
            }
            let table = if m.nocase { folded } else { exact };
            if m.ascii || !m.wide {
                table.push(
                    bytes.clone(),
                    LiteralPattern {
                        string: idx,
                        wide: false,
                    },
                );
            }
            if m.wide {
                table.push(
                    widen(bytes),
                    LiteralPattern {
                        string: idx,
                        wide: true,
                    },
                );
            }
            Ok(Matcher::Literal)
        }
        Pattern::Hex(tokens) => {
            if m.nocase || m.wide || m.ascii || m.fullword {
                return Err(err("hex strings only accept the 'private' modifier"));
            }
            let source = format!("(?s){}", hex_to_regex(tokens));
            build_regex(&source, false, true).map(Matcher::Regex).map_err(|e| err(e.as_str()))
        }
        Pattern::Regex {
            pattern,
            nocase,
            dotall,
        } => {
            if m.wide {
                return Err(err("'wide' is not supported on regular expressions"));
            }
            build_regex(pattern, *nocase || m.nocase, *dotall)
                .map(Matcher::Regex)
                .map_err(|e| err(e.as_str()))
        }
    }
}

fn build_regex(source: &str, nocase: bool, dotall: bool) -> std::result::Result<Regex, String> {
    RegexBuilder::new(source)
        .unicode(false)
        .case_insensitive(nocase)
        .dot_matches_new_line(dotall)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| e.to_string())
}

/// UTF-16LE expansion of an ASCII literal.
fn widen(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|&b| [b, 0]).collect()
}

pub(crate) fn hex_to_regex(tokens: &[HexToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            HexToken::Byte { value, mask: 0xFF } => out.push_str(&format!("\\x{:02X}", value)),
            HexToken::Byte { mask: 0x00, .. } => out.push('.'),
            HexToken::Byte { value, mask: 0xF0 } => {
                out.push_str(&format!("[\\x{:02X}-\\x{:02X}]", value, value | 0x0F))
            }
            HexToken::Byte { value, .. } => {
                out.push('[');
                for high in 0u8..16 {
                    out.push_str(&format!("\\x{:02X}", high << 4 | (value & 0x0F)));
                }
                out.push(']');
            }
            HexToken::Jump { min, max: Some(max) } => out.push_str(&format!(".{{{},{}}}", min, max)),
            HexToken::Jump { min, max: None } => out.push_str(&format!(".{{{},}}", min)),
            HexToken::Alternatives(branches) => {
                let parts: Vec<String> = branches.iter().map(|b| hex_to_regex(b)).collect();
                out.push_str("(?:");
                out.push_str(&parts.join("|"));
                out.push(')');
            }
        }
    }
    out
}
