//! Arithmetic over singleton numeric operands.
//!
//! Binary operands are evaluated with lax auto-unwrap and must each be a
//! single number. Unary operators map over the whole operand sequence, so
//! `-$.a[*]` negates every element.

use bigdecimal::{BigDecimal, RoundingMode, Zero};

use crate::error::PathError;
use crate::item::Item;
use crate::path::{ArithOp, NodeId, UnaryOp};
use crate::sequence::ValueSeq;

use super::{ExecContext, ExecOutcome, ExecResult};

impl<'a> ExecContext<'a> {
    pub(crate) fn execute_binary_arith(
        &mut self,
        id: NodeId,
        op: ArithOp,
        left: NodeId,
        right: NodeId,
        value: &Item<'a>,
        found: Option<&mut ValueSeq<'a>>,
    ) -> ExecResult {
        let lseq = self.execute_to_seq(left, value, true)?;
        let rseq = self.execute_to_seq(right, value, true)?;
        let lhs = singleton_number(&lseq, "left", op)?;
        let rhs = singleton_number(&rseq, "right", op)?;
        let result = apply_binary(op, lhs, rhs)?;
        self.execute_next(id, Item::Number(result), found)
    }

    pub(crate) fn execute_unary_arith(
        &mut self,
        id: NodeId,
        op: UnaryOp,
        arg: NodeId,
        value: &Item<'a>,
        mut found: Option<&mut ValueSeq<'a>>,
    ) -> ExecResult {
        let seq = self.execute_to_seq(arg, value, true)?;
        let has_next = self.node(id).has_next();
        let mut out = ExecOutcome::NotFound;

        for item in seq {
            match item {
                Item::Number(n) => {
                    // Existence probes skip the computation entirely.
                    if found.is_none() && !has_next {
                        out = ExecOutcome::Found;
                        continue;
                    }
                    let result = match op {
                        UnaryOp::Plus => n,
                        UnaryOp::Minus => -n,
                    };
                    let res = self.execute_next(id, Item::Number(result), found.as_deref_mut())?;
                    if res == ExecOutcome::Found {
                        out = ExecOutcome::Found;
                    }
                }
                _ => {
                    if found.is_none() && !has_next {
                        continue;
                    }
                    return Err(PathError::NumberNotFound { op: op.as_str() });
                }
            }
        }
        Ok(out)
    }
}

fn singleton_number<'a>(
    seq: &ValueSeq<'a>,
    side: &str,
    op: ArithOp,
) -> Result<BigDecimal, PathError> {
    let err = || PathError::SingletonRequired {
        what: format!("{side} operand of jsonpath operator {}", op.as_str()),
        expected: "numeric value",
    };
    if seq.len() != 1 {
        return Err(err());
    }
    match seq.first() {
        Some(Item::Number(n)) => Ok(n.clone()),
        _ => Err(err()),
    }
}

fn apply_binary(op: ArithOp, lhs: BigDecimal, rhs: BigDecimal) -> Result<BigDecimal, PathError> {
    match op {
        ArithOp::Add => Ok(lhs + rhs),
        ArithOp::Sub => Ok(lhs - rhs),
        ArithOp::Mul => Ok(lhs * rhs),
        ArithOp::Div => {
            if rhs.is_zero() {
                return Err(PathError::DivisionByZero);
            }
            Ok(lhs / rhs)
        }
        ArithOp::Mod => {
            if rhs.is_zero() {
                return Err(PathError::DivisionByZero);
            }
            // Truncated division: the remainder keeps the dividend's sign.
            let quotient = (&lhs / &rhs).with_scale_round(0, RoundingMode::Down);
            Ok(lhs - quotient * rhs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn basic_operations() {
        assert_eq!(apply_binary(ArithOp::Add, dec("1.5"), dec("2")).unwrap(), dec("3.5"));
        assert_eq!(apply_binary(ArithOp::Sub, dec("1"), dec("2.25")).unwrap(), dec("-1.25"));
        assert_eq!(apply_binary(ArithOp::Mul, dec("0.5"), dec("8")).unwrap(), dec("4"));
        assert_eq!(apply_binary(ArithOp::Div, dec("10"), dec("4")).unwrap(), dec("2.5"));
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert!(matches!(
            apply_binary(ArithOp::Div, dec("1"), dec("0")),
            Err(PathError::DivisionByZero)
        ));
        assert!(matches!(
            apply_binary(ArithOp::Mod, dec("1"), dec("0")),
            Err(PathError::DivisionByZero)
        ));
    }

    #[test]
    fn modulo_keeps_dividend_sign() {
        assert_eq!(apply_binary(ArithOp::Mod, dec("7"), dec("3")).unwrap(), dec("1"));
        assert_eq!(apply_binary(ArithOp::Mod, dec("-7"), dec("3")).unwrap(), dec("-1"));
        assert_eq!(apply_binary(ArithOp::Mod, dec("7"), dec("-3")).unwrap(), dec("1"));
    }
}
