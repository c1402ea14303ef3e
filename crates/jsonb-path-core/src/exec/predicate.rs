//! Tri-state predicate engine.
//!
//! Predicates evaluate to [`Truth`], never to a bare boolean: errors inside
//! a predicate collapse to `Unknown`, and only the outermost filter, match,
//! or exists site decides what `Unknown` means. The sole exceptions are the
//! resource guards (depth, interrupt), which propagate as real errors.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};

use crate::datetime::compare_datetimes;
use crate::error::PathError;
use crate::item::Item;
use crate::path::{CmpOp, NodeId, PathKind, RegexFlags};
use crate::sequence::ValueSeq;

use super::{ExecContext, ExecOutcome};

/// Three-valued predicate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    pub(crate) fn from_bool(b: bool) -> Truth {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }

    pub(crate) fn negate(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }
}

/// Result type for predicate evaluation: `Err` carries only the errors the
/// `unknown` collapse must not swallow.
pub(crate) type TruthResult = Result<Truth, PathError>;

impl<'a> ExecContext<'a> {
    pub(crate) fn execute_bool(&mut self, id: NodeId, value: &Item<'a>) -> TruthResult {
        let node = self.node(id);
        match &node.kind {
            PathKind::And(left, right) => {
                let lhs = self.execute_bool(*left, value)?;
                if lhs == Truth::False {
                    return Ok(Truth::False);
                }
                let rhs = self.execute_bool(*right, value)?;
                Ok(if rhs == Truth::True { lhs } else { rhs })
            }

            PathKind::Or(left, right) => {
                let lhs = self.execute_bool(*left, value)?;
                if lhs == Truth::True {
                    return Ok(Truth::True);
                }
                let rhs = self.execute_bool(*right, value)?;
                Ok(if rhs == Truth::False { lhs } else { rhs })
            }

            PathKind::Not(arg) => Ok(self.execute_bool(*arg, value)?.negate()),

            PathKind::IsUnknown(arg) => {
                let inner = self.execute_bool(*arg, value)?;
                Ok(Truth::from_bool(inner == Truth::Unknown))
            }

            PathKind::Compare { op, left, right } => {
                let op = *op;
                self.execute_pair_predicate(*left, Some(*right), value, |ctx, lhs, rhs| {
                    match rhs {
                        Some(rhs) => ctx.compare_items(op, lhs, rhs),
                        None => Truth::Unknown,
                    }
                })
            }

            PathKind::StartsWith { left, right } => {
                self.execute_pair_predicate(*left, Some(*right), value, |_, whole, initial| {
                    match (whole, initial) {
                        (Item::String(w), Some(Item::String(p))) => {
                            Truth::from_bool(w.starts_with(p.as_ref()))
                        }
                        _ => Truth::Unknown,
                    }
                })
            }

            PathKind::LikeRegex {
                target,
                pattern,
                flags,
                regex,
            } => {
                let compiled = match regex.get_or_try_init(|| build_regex(pattern, *flags)) {
                    Ok(re) => re,
                    // A bad pattern is an error, and inside a predicate
                    // errors are unknown.
                    Err(_) => return Ok(Truth::Unknown),
                };
                self.execute_pair_predicate(*target, None, value, |_, item, _| match item {
                    Item::String(s) => Truth::from_bool(compiled.is_match(s)),
                    _ => Truth::Unknown,
                })
            }

            PathKind::Exists(arg) => self.execute_exists(*arg, value),

            // Compilation rejects non-predicate nodes in boolean position.
            _ => Ok(Truth::Unknown),
        }
    }

    /// Evaluate operand sequences and fold the per-pair predicate according
    /// to the mode: strict scans every pair and reports `Unknown` on the
    /// first unknown pair; lax returns `True` as soon as one pair matches.
    fn execute_pair_predicate<F>(
        &mut self,
        left: NodeId,
        right: Option<NodeId>,
        value: &Item<'a>,
        pred: F,
    ) -> TruthResult
    where
        F: Fn(&Self, &Item<'a>, Option<&Item<'a>>) -> Truth,
    {
        let Some(lseq) = self.seq_or_unknown(left, value)? else {
            return Ok(Truth::Unknown);
        };
        let rseq = match right {
            Some(right) => {
                let Some(rseq) = self.seq_or_unknown(right, value)? else {
                    return Ok(Truth::Unknown);
                };
                Some(rseq)
            }
            None => None,
        };

        let strict = self.strict();
        let mut found = false;
        let mut saw_unknown = false;

        let rhs_items: Vec<Option<&Item<'a>>> = match &rseq {
            Some(rseq) => rseq.iter().map(Some).collect(),
            None => vec![None],
        };
        for lhs in lseq.iter() {
            for rhs in &rhs_items {
                match pred(self, lhs, *rhs) {
                    Truth::Unknown => {
                        if strict {
                            return Ok(Truth::Unknown);
                        }
                        saw_unknown = true;
                    }
                    Truth::True => {
                        if !strict {
                            return Ok(Truth::True);
                        }
                        found = true;
                    }
                    Truth::False => {}
                }
            }
        }
        Ok(if found {
            Truth::True
        } else if saw_unknown {
            Truth::Unknown
        } else {
            Truth::False
        })
    }

    /// Evaluate an operand into a sequence, mapping evaluation errors to
    /// `None` (= unknown) and letting resource errors through.
    fn seq_or_unknown(
        &mut self,
        id: NodeId,
        value: &Item<'a>,
    ) -> Result<Option<ValueSeq<'a>>, PathError> {
        match self.execute_to_seq(id, value, true) {
            Ok(seq) => Ok(Some(seq)),
            Err(err) if err.is_always_raised() => Err(err),
            Err(_) => Ok(None),
        }
    }

    fn execute_exists(&mut self, arg: NodeId, value: &Item<'a>) -> TruthResult {
        if self.strict() {
            // Evaluate to completion so every error is observed.
            let mut seq = ValueSeq::new();
            match self.execute_item(arg, value, Some(&mut seq)) {
                Ok(_) => Ok(Truth::from_bool(!seq.is_empty())),
                Err(err) if err.is_always_raised() => Err(err),
                Err(_) => Ok(Truth::Unknown),
            }
        } else {
            match self.execute_item(arg, value, None) {
                Ok(ExecOutcome::Found) => Ok(Truth::True),
                Ok(ExecOutcome::NotFound) => Ok(Truth::False),
                Err(err) if err.is_always_raised() => Err(err),
                Err(_) => Ok(Truth::Unknown),
            }
        }
    }

    /// Compare one pair of items. Incomparable pairs — mixed types,
    /// containers, datetime coercions without a zone — are `Unknown`.
    pub(crate) fn compare_items(&self, op: CmpOp, lhs: &Item<'a>, rhs: &Item<'a>) -> Truth {
        let ord = match (lhs, rhs) {
            (Item::Null, Item::Null) => Ordering::Equal,
            (Item::Null, _) | (_, Item::Null) => {
                // Null against non-null: only inequality holds.
                return Truth::from_bool(op == CmpOp::Ne);
            }
            (Item::Bool(a), Item::Bool(b)) => a.cmp(b),
            (Item::Number(a), Item::Number(b)) => a.cmp(b),
            (Item::String(a), Item::String(b)) => match op {
                // Equality is exact byte comparison, never collation.
                CmpOp::Eq => return Truth::from_bool(a == b),
                CmpOp::Ne => return Truth::from_bool(a != b),
                _ => self.collate(a, b),
            },
            (Item::Datetime(a), Item::Datetime(b)) => {
                match compare_datetimes(a, b, self.timezone()) {
                    Some(ord) => ord,
                    None => return Truth::Unknown,
                }
            }
            _ => return Truth::Unknown,
        };

        Truth::from_bool(match op {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        })
    }
}

/// Build the regex for a `like_regex` node. The `q` flag quotes the whole
/// pattern literally; `i` still applies on top of it.
fn build_regex(pattern: &str, flags: RegexFlags) -> Result<Regex, PathError> {
    let source = if flags.literal {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };
    let mut builder = RegexBuilder::new(&source);
    builder
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line);
    if !flags.literal {
        builder
            .dot_matches_new_line(flags.dot_all)
            .ignore_whitespace(flags.ignore_whitespace);
    }
    builder.build().map_err(|err| PathError::InvalidRegex {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}
