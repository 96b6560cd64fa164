//! Three-valued comparisons over offset terms.
//!
//! Both operands are normalized into an integer polynomial whose atoms are
//! variables, wire reads keyed by their normalized address, and opaque
//! non-linear sub-terms keyed by their normalized operands. A comparison is
//! decided only when the difference of the two polynomials is a constant.

use crate::abi::expr::{BinaryExpr, BinaryOp, Expr};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Certainty {
    True,
    False,
    Unknown,
}

impl Certainty {
    pub fn is_true(self) -> bool {
        self == Certainty::True
    }

    pub fn is_false(self) -> bool {
        self == Certainty::False
    }

    fn from_bool(value: bool) -> Self {
        if value { Certainty::True } else { Certainty::False }
    }
}

/// Sorted multiset of atom keys; the empty monomial is the constant term.
type Monomial = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Polynomial {
    terms: BTreeMap<Monomial, i64>,
}

impl Polynomial {
    pub fn constant(value: i64) -> Self {
        let mut terms = BTreeMap::new();
        if value != 0 {
            terms.insert(Vec::new(), value);
        }
        Self { terms }
    }

    fn atom(key: String) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(vec![key], 1);
        Self { terms }
    }

    /// Normal form of `expr`, `None` if a coefficient overflows.
    pub fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Literal(value) => Some(Self::constant(*value)),
            Expr::Var(name) => Some(Self::atom(name.clone())),
            Expr::Load(address) => {
                let address = Self::from_expr(address)?;
                Some(Self::atom(format!("calldataload({address})")))
            }
            Expr::Binary(BinaryExpr { op, left, right }) => {
                let left = Self::from_expr(left)?;
                let right = Self::from_expr(right)?;
                match op {
                    BinaryOp::Add => left.checked_add(&right),
                    BinaryOp::Sub => left.checked_sub(&right),
                    BinaryOp::Mul => left.checked_mul(&right),
                    BinaryOp::Shl => match right.as_constant() {
                        Some(shift) if (0..63).contains(&shift) => left.checked_scale(1i64 << shift),
                        _ => Self::opaque(*op, left, right),
                    },
                    _ => Self::opaque(*op, left, right),
                }
            }
        }
    }

    fn opaque(op: BinaryOp, left: Polynomial, right: Polynomial) -> Option<Self> {
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return op.apply(l, r).map(Self::constant);
        }
        Some(Self::atom(format!("({left} {} {right})", op.symbol())))
    }

    pub fn as_constant(&self) -> Option<i64> {
        match self.terms.len() {
            0 => Some(0),
            1 => self.terms.get(&Vec::new()).copied(),
            _ => None,
        }
    }

    fn insert(&mut self, monomial: Monomial, coefficient: i64) -> Option<()> {
        let entry = self.terms.entry(monomial).or_insert(0);
        *entry = entry.checked_add(coefficient)?;
        if *entry == 0 {
            self.terms.retain(|_, c| *c != 0);
        }
        Some(())
    }

    pub fn checked_add(&self, other: &Polynomial) -> Option<Self> {
        let mut out = self.clone();
        for (monomial, coefficient) in &other.terms {
            out.insert(monomial.clone(), *coefficient)?;
        }
        Some(out)
    }

    pub fn checked_sub(&self, other: &Polynomial) -> Option<Self> {
        let mut out = self.clone();
        for (monomial, coefficient) in &other.terms {
            out.insert(monomial.clone(), coefficient.checked_neg()?)?;
        }
        Some(out)
    }

    pub fn checked_mul(&self, other: &Polynomial) -> Option<Self> {
        let mut out = Polynomial::default();
        for (lm, lc) in &self.terms {
            for (rm, rc) in &other.terms {
                let mut monomial: Monomial = lm.iter().chain(rm.iter()).cloned().collect();
                monomial.sort();
                out.insert(monomial, lc.checked_mul(*rc)?)?;
            }
        }
        Some(out)
    }

    fn checked_scale(&self, factor: i64) -> Option<Self> {
        self.checked_mul(&Polynomial::constant(factor))
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        for (idx, (monomial, coefficient)) in self.terms.iter().enumerate() {
            if idx > 0 {
                write!(f, " + ")?;
            }
            if monomial.is_empty() {
                write!(f, "{coefficient}")?;
            } else {
                write!(f, "{coefficient}*{}", monomial.join("*"))?;
            }
        }
        Ok(())
    }
}

/// `a - b` when it reduces to a constant.
pub fn difference(a: &Expr, b: &Expr) -> Option<i64> {
    let a = Polynomial::from_expr(a)?;
    let b = Polynomial::from_expr(b)?;
    a.checked_sub(&b)?.as_constant()
}

fn compare(a: &Expr, b: &Expr, holds: impl Fn(i64) -> bool) -> Certainty {
    match difference(a, b) {
        Some(delta) => Certainty::from_bool(holds(delta)),
        None => Certainty::Unknown,
    }
}

pub fn gt(a: &Expr, b: &Expr) -> Certainty {
    compare(a, b, |delta| delta > 0)
}

pub fn gte(a: &Expr, b: &Expr) -> Certainty {
    compare(a, b, |delta| delta >= 0)
}

pub fn lt(a: &Expr, b: &Expr) -> Certainty {
    compare(a, b, |delta| delta < 0)
}

pub fn eq(a: &Expr, b: &Expr) -> Certainty {
    compare(a, b, |delta| delta == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var("x")
    }

    #[test]
    fn literals_compare_definitely() {
        assert_eq!(gt(&Expr::lit(64), &Expr::lit(32)), Certainty::True);
        assert_eq!(gt(&Expr::lit(32), &Expr::lit(32)), Certainty::False);
        assert_eq!(gte(&Expr::lit(32), &Expr::lit(32)), Certainty::True);
        assert_eq!(lt(&Expr::lit(1), &Expr::lit(2)), Certainty::True);
        assert_eq!(eq(&Expr::lit(7), &Expr::lit(8)), Certainty::False);
    }

    #[test]
    fn shared_symbols_cancel() {
        let a = x() * 32 + 96;
        let b = x() * 32 + 32;
        assert_eq!(difference(&a, &b), Some(64));
        assert!(gt(&a, &b).is_true());

        let n = Expr::load(Expr::lit(4));
        let a = (n.clone() * 32 + 32) + Expr::var("y");
        let b = Expr::var("y") + n * 32;
        assert_eq!(difference(&a, &b), Some(32));
    }

    #[test]
    fn independent_symbols_are_unknown() {
        assert_eq!(gt(&x(), &Expr::var("y")), Certainty::Unknown);
        assert_eq!(eq(&(x() * 2), &x()), Certainty::Unknown);
        assert_eq!(gt(&Expr::load(Expr::lit(0)), &Expr::load(Expr::lit(32))), Certainty::Unknown);
    }

    #[test]
    fn loads_are_keyed_by_normalized_address() {
        let a = Expr::load(x() + 32);
        let b = Expr::load(Expr::lit(16) + x() + 16);
        assert_eq!(eq(&a, &b), Certainty::True);
    }

    #[test]
    fn shifts_and_opaque_terms() {
        let len = Expr::load(Expr::lit(0));
        let padded = len.clone().round_up_to_word();
        assert_eq!(difference(&(padded.clone() + 32), &padded), Some(32));
        assert_eq!(difference(&(x() << 5), &(x() * 32)), Some(0));
        assert_eq!(gt(&padded, &len), Certainty::Unknown);
    }

    #[test]
    fn overflow_is_unknown() {
        let big = Expr::Binary(BinaryExpr {
            op: BinaryOp::Mul,
            left: Box::new(x()),
            right: Box::new(Expr::lit(i64::MAX)),
        });
        let bigger = Expr::Binary(BinaryExpr {
            op: BinaryOp::Mul,
            left: Box::new(big.clone()),
            right: Box::new(Expr::lit(4)),
        });
        assert_eq!(gt(&bigger, &big), Certainty::Unknown);
    }
}
