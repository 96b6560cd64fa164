use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Shl, Shr, Sub};

pub trait ConstantExpression {
    fn is_constant(&self) -> bool;
}

impl ConstantExpression for Expr {
    fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Var(_) => false,
            Expr::Load(_) => false, // A wire read is only known at evaluation time
            Expr::Binary(expr) => expr.left.is_constant() && expr.right.is_constant(),
        }
    }
}

/// Offset/size term used by the decoder planner.
///
/// Values are either literals or terms over evaluation-time values: named
/// registers and loop counters (`Var`) and 32-byte words read from the wire
/// (`Load`). Construct compound terms through the operator impls or the
/// named helpers so constants are folded eagerly.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Expr {
    Literal(i64),
    Var(String),
    Load(Box<Expr>),
    Binary(BinaryExpr),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        }
    }

    /// Applies the operator to two literals, `None` on overflow or a
    /// meaningless operand (division by zero, oversized shift).
    pub fn apply(self, left: i64, right: i64) -> Option<i64> {
        match self {
            BinaryOp::Add => left.checked_add(right),
            BinaryOp::Sub => left.checked_sub(right),
            BinaryOp::Mul => left.checked_mul(right),
            BinaryOp::Div => {
                if right == 0 {
                    None
                } else {
                    left.checked_div(right)
                }
            }
            BinaryOp::Shl => {
                if !(0..63).contains(&right) {
                    return None;
                }
                let shifted = left.checked_shl(right as u32)?;
                // Reject shifts that drop significant bits.
                if shifted >> right == left {
                    Some(shifted)
                } else {
                    None
                }
            }
            BinaryOp::Shr => {
                if (0..64).contains(&right) {
                    Some(left >> right)
                } else {
                    None
                }
            }
            BinaryOp::And => Some(left & right),
            BinaryOp::Or => Some(left | right),
            BinaryOp::Xor => Some(left ^ right),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Hash)]
#[serde(rename_all = "kebab-case")]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// Supplies evaluation-time values to [`Expr::evaluate`].
pub trait ExprEnv {
    fn var(&self, name: &str) -> Option<i64>;
    fn load(&self, address: i64) -> Option<i64>;
}

impl Expr {
    pub fn lit(value: i64) -> Expr {
        Expr::Literal(value)
    }

    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    pub fn load(address: Expr) -> Expr {
        Expr::Load(Box::new(address))
    }

    fn raw(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn as_literal(&self) -> Option<i64> {
        match self {
            Expr::Literal(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_literal() == Some(0)
    }

    /// Splits a trailing literal off `x + c` / `x - c`.
    fn split_constant(&self) -> (Option<&Expr>, i64) {
        match self {
            Expr::Literal(value) => (None, *value),
            Expr::Binary(BinaryExpr { op, left, right }) => match (op, right.as_ref()) {
                (BinaryOp::Add, Expr::Literal(c)) => (Some(left.as_ref()), *c),
                (BinaryOp::Sub, Expr::Literal(c)) if *c != i64::MIN => (Some(left.as_ref()), -*c),
                _ => (Some(self), 0),
            },
            _ => (Some(self), 0),
        }
    }

    fn with_constant(term: Expr, constant: i64) -> Expr {
        match constant {
            0 => term,
            c if c > 0 => Expr::raw(BinaryOp::Add, term, Expr::Literal(c)),
            c if c != i64::MIN => Expr::raw(BinaryOp::Sub, term, Expr::Literal(-c)),
            c => Expr::raw(BinaryOp::Add, term, Expr::Literal(c)),
        }
    }

    /// `left + right`, keeping literals gathered on the right.
    pub fn sum(left: Expr, right: Expr) -> Expr {
        let (left_term, left_const) = left.split_constant();
        let (right_term, right_const) = right.split_constant();
        let Some(constant) = left_const.checked_add(right_const) else {
            return Expr::raw(BinaryOp::Add, left, right);
        };
        let term = match (left_term, right_term) {
            (None, None) => return Expr::Literal(constant),
            (Some(term), None) | (None, Some(term)) => term.clone(),
            (Some(l), Some(r)) => Expr::raw(BinaryOp::Add, l.clone(), r.clone()),
        };
        Expr::with_constant(term, constant)
    }

    /// `left - right`; identical operands cancel.
    pub fn difference(left: Expr, right: Expr) -> Expr {
        if left == right {
            return Expr::Literal(0);
        }
        let (left_term, left_const) = left.split_constant();
        let (right_term, right_const) = right.split_constant();
        let Some(constant) = left_const.checked_sub(right_const) else {
            return Expr::raw(BinaryOp::Sub, left, right);
        };
        match (left_term, right_term) {
            (None, None) => Expr::Literal(constant),
            (Some(term), None) => Expr::with_constant(term.clone(), constant),
            (Some(l), Some(r)) if l == r => Expr::Literal(constant),
            (Some(l), Some(r)) => {
                Expr::with_constant(Expr::raw(BinaryOp::Sub, l.clone(), r.clone()), constant)
            }
            (None, Some(r)) => Expr::raw(BinaryOp::Sub, Expr::Literal(constant), r.clone()),
        }
    }

    pub fn product(left: Expr, right: Expr) -> Expr {
        match (left.as_literal(), right.as_literal()) {
            (Some(l), Some(r)) => match l.checked_mul(r) {
                Some(value) => Expr::Literal(value),
                None => Expr::raw(BinaryOp::Mul, left, right),
            },
            (Some(0), _) | (_, Some(0)) => Expr::Literal(0),
            (Some(1), _) => right,
            (_, Some(1)) => left,
            // Literal factors go on the right.
            (Some(_), None) => Expr::raw(BinaryOp::Mul, right, left),
            _ => Expr::raw(BinaryOp::Mul, left, right),
        }
    }

    /// Builds `left op right` for any operator, folding what can be folded.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        match op {
            BinaryOp::Add => return Expr::sum(left, right),
            BinaryOp::Sub => return Expr::difference(left, right),
            BinaryOp::Mul => return Expr::product(left, right),
            _ => {}
        }
        if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) {
            if let Some(value) = op.apply(l, r) {
                return Expr::Literal(value);
            }
        }
        match (op, left.as_literal(), right.as_literal()) {
            (BinaryOp::Div, _, Some(1)) => left,
            (BinaryOp::Div, Some(0), _) => Expr::Literal(0),
            (BinaryOp::Shl | BinaryOp::Shr, _, Some(0)) => left,
            (BinaryOp::Shl | BinaryOp::Shr, Some(0), _) => Expr::Literal(0),
            (BinaryOp::And, Some(0), _) | (BinaryOp::And, _, Some(0)) => Expr::Literal(0),
            (BinaryOp::Or | BinaryOp::Xor, _, Some(0)) => left,
            (BinaryOp::Or | BinaryOp::Xor, Some(0), _) => right,
            _ => Expr::raw(op, left, right),
        }
    }

    /// Rounds a byte count up to the next multiple of 32.
    pub fn round_up_to_word(self) -> Expr {
        ((self + 31) >> 5) << 5
    }

    /// Rewrites every wire address inside `Load` atoms, innermost first.
    pub fn map_loads(&self, f: &impl Fn(Expr) -> Expr) -> Expr {
        match self {
            Expr::Literal(_) | Expr::Var(_) => self.clone(),
            Expr::Load(address) => Expr::load(f(address.map_loads(f))),
            Expr::Binary(BinaryExpr { op, left, right }) => {
                Expr::binary(*op, left.map_loads(f), right.map_loads(f))
            }
        }
    }

    /// Names of all variables referenced by this term.
    pub fn vars(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Load(address) => address.collect_vars(out),
            Expr::Binary(expr) => {
                expr.left.collect_vars(out);
                expr.right.collect_vars(out);
            }
        }
    }

    /// Recursively evaluate this expression to a constant value if possible.
    /// Returns None if the expression contains variables or wire reads.
    pub fn try_evaluate_constant(&self) -> Option<i64> {
        match self {
            Expr::Literal(value) => Some(*value),
            Expr::Var(_) | Expr::Load(_) => None,
            Expr::Binary(expr) => {
                let left = expr.left.try_evaluate_constant()?;
                let right = expr.right.try_evaluate_constant()?;
                expr.op.apply(left, right)
            }
        }
    }

    /// Evaluates the term against concrete variable bindings and wire contents.
    pub fn evaluate(&self, env: &impl ExprEnv) -> Option<i64> {
        match self {
            Expr::Literal(value) => Some(*value),
            Expr::Var(name) => env.var(name),
            Expr::Load(address) => env.load(address.evaluate(env)?),
            Expr::Binary(expr) => {
                let left = expr.left.evaluate(env)?;
                let right = expr.right.evaluate(env)?;
                expr.op.apply(left, right)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Load(address) => write!(f, "calldataload({address})"),
            Expr::Binary(expr) => write!(f, "({} {} {})", expr.left, expr.op.symbol(), expr.right),
        }
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Literal(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Literal(value.into())
    }
}

impl From<u64> for Expr {
    fn from(value: u64) -> Self {
        // Layout sizes are far below i64::MAX; saturate rather than wrap.
        Expr::Literal(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Expr;

    fn add(self, rhs: T) -> Expr {
        Expr::sum(self, rhs.into())
    }
}

impl<T: Into<Expr>> Sub<T> for Expr {
    type Output = Expr;

    fn sub(self, rhs: T) -> Expr {
        Expr::difference(self, rhs.into())
    }
}

impl<T: Into<Expr>> Mul<T> for Expr {
    type Output = Expr;

    fn mul(self, rhs: T) -> Expr {
        Expr::product(self, rhs.into())
    }
}

impl Shl<i64> for Expr {
    type Output = Expr;

    fn shl(self, rhs: i64) -> Expr {
        Expr::binary(BinaryOp::Shl, self, Expr::Literal(rhs))
    }
}

impl Shr<i64> for Expr {
    type Output = Expr;

    fn shr(self, rhs: i64) -> Expr {
        Expr::binary(BinaryOp::Shr, self, Expr::Literal(rhs))
    }
}
