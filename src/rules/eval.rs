//! String matching and condition evaluation over one input buffer.

use super::compiler::{BoolExpr, Compiled, IntExpr, LiteralPattern, Matcher};
use super::parser::{ArithOp, CmpOp, Quantifier, ReadFn};
use crate::error::{Result, TriageError};
use aho_corasick::AhoCorasick;

/// Sorted, deduplicated match offsets for every compiled string.
pub(crate) struct Matches {
    offsets: Vec<Vec<usize>>,
}

impl Matches {
    fn of(&self, string: usize) -> &[usize] {
        &self.offsets[string]
    }
}

/// Collect match offsets for all strings in `data`.
pub(crate) fn find_matches(compiled: &Compiled, data: &[u8], budget: usize) -> Result<Matches> {
    let mut offsets: Vec<Vec<usize>> = vec![Vec::new(); compiled.strings.len()];

    let automata = [
        (&compiled.literals, &compiled.literal_patterns),
        (&compiled.literals_nocase, &compiled.nocase_patterns),
    ];
    for (automaton, owners) in automata {
        if let Some(ac) = automaton {
            scan_literals(compiled, ac, owners, data, budget, &mut offsets)?;
        }
    }

    for (idx, string) in compiled.strings.iter().enumerate() {
        if let Matcher::Regex(re) = &string.matcher {
            let found = &mut offsets[idx];
            let mut pos = 0;
            while pos <= data.len() {
                let Some(m) = re.find_at(data, pos) else { break };
                if !string.fullword || is_full_word(data, m.start(), m.end(), 1) {
                    found.push(m.start());
                    check_budget(compiled, idx, found.len(), budget)?;
                }
                pos = m.start() + 1;
            }
        }
    }

    for found in offsets.iter_mut() {
        found.sort_unstable();
        found.dedup();
    }
    Ok(Matches { offsets })
}

fn scan_literals(
    compiled: &Compiled,
    ac: &AhoCorasick,
    owners: &[LiteralPattern],
    data: &[u8],
    budget: usize,
    offsets: &mut [Vec<usize>],
) -> Result<()> {
    for m in ac.find_overlapping_iter(data) {
        let owner = owners[m.pattern().as_usize()];
        let string = &compiled.strings[owner.string];
        let stride = if owner.wide { 2 } else { 1 };
        if string.fullword && !is_full_word(data, m.start(), m.end(), stride) {
            continue;
        }
        let found = &mut offsets[owner.string];
        found.push(m.start());
        check_budget(compiled, owner.string, found.len(), budget)?;
    }
    Ok(())
}

fn check_budget(compiled: &Compiled, string: usize, count: usize, budget: usize) -> Result<()> {
    if count > budget {
        let s = &compiled.strings[string];
        return Err(TriageError::RuleEvaluation(format!(
            "string ${} in rule '{}' exceeded {} matches",
            s.id, compiled.rules[s.rule].name, budget
        )));
    }
    Ok(())
}

/// A match is a full word when it is not flanked by alphanumeric characters.
fn is_full_word(data: &[u8], start: usize, end: usize, stride: usize) -> bool {
    let before = start
        .checked_sub(stride)
        .and_then(|i| data.get(i))
        .is_some_and(|b| b.is_ascii_alphanumeric());
    let after = data.get(end).is_some_and(|b| b.is_ascii_alphanumeric());
    !before && !after
}

pub(crate) struct Context<'a> {
    pub data: &'a [u8],
    pub filesize: u64,
    pub matches: &'a Matches,
    pub rule_results: &'a [bool],
}

impl Context<'_> {
    /// `None` is the undefined value (out-of-range read, overflow).
    fn int(&self, expr: &IntExpr) -> Option<i64> {
        match expr {
            IntExpr::Const(n) => Some(*n),
            IntExpr::Filesize => i64::try_from(self.filesize).ok(),
            IntExpr::Count(s) => i64::try_from(self.matches.of(*s).len()).ok(),
            IntExpr::Read(read, offset) => {
                let offset = usize::try_from(self.int(offset)?).ok()?;
                read_int(self.data, offset, *read)
            }
            IntExpr::Arith(op, a, b) => {
                let (a, b) = (self.int(a)?, self.int(b)?);
                match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                }
            }
        }
    }

    /// Three-valued evaluation; the caller treats `None` as false.
    pub(crate) fn eval(&self, expr: &BoolExpr) -> Option<bool> {
        match expr {
            BoolExpr::Const(b) => Some(*b),
            BoolExpr::Matched(s) => Some(!self.matches.of(*s).is_empty()),
            BoolExpr::At(s, offset) => {
                let offset = usize::try_from(self.int(offset)?).ok()?;
                Some(self.matches.of(*s).binary_search(&offset).is_ok())
            }
            BoolExpr::In(s, lo, hi) => {
                let (lo, hi) = (self.int(lo)?, self.int(hi)?);
                Some(
                    self.matches
                        .of(*s)
                        .iter()
                        .any(|&m| (m as i64) >= lo && (m as i64) <= hi),
                )
            }
            BoolExpr::Rule(idx) => Some(self.rule_results[*idx]),
            BoolExpr::Not(inner) => self.eval(inner).map(|b| !b),
            BoolExpr::And(a, b) => match (self.eval(a), self.eval(b)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            BoolExpr::Or(a, b) => match (self.eval(a), self.eval(b)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            BoolExpr::Cmp(op, a, b) => {
                let (a, b) = (self.int(a)?, self.int(b)?);
                Some(match op {
                    CmpOp::Eq => a == b,
                    CmpOp::Ne => a != b,
                    CmpOp::Lt => a < b,
                    CmpOp::Le => a <= b,
                    CmpOp::Gt => a > b,
                    CmpOp::Ge => a >= b,
                })
            }
            BoolExpr::NonZero(i) => self.int(i).map(|n| n != 0),
            BoolExpr::Of(quantifier, members) => {
                let hits = members
                    .iter()
                    .filter(|s| !self.matches.of(**s).is_empty())
                    .count();
                Some(match quantifier {
                    Quantifier::Any => hits >= 1,
                    Quantifier::All => hits == members.len(),
                    Quantifier::None => hits == 0,
                    Quantifier::AtLeast(n) => hits as i64 >= *n,
                })
            }
        }
    }
}

fn read_int(data: &[u8], offset: usize, read: ReadFn) -> Option<i64> {
    let bytes = data.get(offset..offset.checked_add(read.bytes)?)?;
    let mut raw: u32 = 0;
    if read.big_endian {
        for &b in bytes {
            raw = raw << 8 | u32::from(b);
        }
    } else {
        for &b in bytes.iter().rev() {
            raw = raw << 8 | u32::from(b);
        }
    }
    Some(match (read.signed, read.bytes) {
        (false, _) => i64::from(raw),
        (true, 1) => i64::from(raw as u8 as i8),
        (true, 2) => i64::from(raw as u16 as i16),
        (true, _) => i64::from(raw as i32),
    })
}

/// Evaluate every rule in order and return the names of reported matches.
pub(crate) fn evaluate(
    compiled: &Compiled,
    data: &[u8],
    filesize: u64,
    budget: usize,
) -> Result<Vec<String>> {
    let matches = find_matches(compiled, data, budget)?;
    let mut results: Vec<bool> = Vec::with_capacity(compiled.rules.len());
    for rule in &compiled.rules {
        let ctx = Context {
            data,
            filesize,
            matches: &matches,
            rule_results: &results,
        };
        let hit = ctx.eval(&rule.condition).unwrap_or(false);
        results.push(hit);
    }

    let global_failed = compiled
        .rules
        .iter()
        .zip(&results)
        .any(|(rule, hit)| rule.global && !hit);
    if global_failed {
        return Ok(Vec::new());
    }

    Ok(compiled
        .rules
        .iter()
        .zip(&results)
        .filter(|(rule, hit)| **hit && !rule.private)
        .map(|(rule, _)| rule.name.clone())
        .collect())
}
