//! Abstract syntax of specification formulas.
//!
//! An [`Expr`] is produced by the [`parser`](crate::parser) with every identifier already
//! resolved: variables become [`VarId`] handles, references to named sub-specifications become
//! [`OutputId`] handles, and constants are replaced by their values. Trees are immutable once
//! built.
//!
//! Every node has a [`ValueType`]. Numeric nodes compute signal values, Boolean nodes compute
//! robustness: a signed distance to satisfaction where positive means the formula holds.
use std::fmt::{Display, Formatter};

use nonempty::NonEmpty;
use ordered_float::NotNan;

use crate::declarations::{Declarations, VarId, VarType};

/// Handle to a named output of a specification (a sub-specification or the top-level formula).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub(crate) usize);

impl OutputId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Numeric,
    Boolean,
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::Boolean => write!(f, "boolean"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            Self::Add => left + right,
            Self::Sub => left - right,
            Self::Mul => left * right,
            Self::Div => left / right,
        }
    }
}

/// Relational operator of an atomic comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    /// Robustness of `left op right`.
    ///
    /// | comparison | robustness     |
    /// | ---------- | -------------- |
    /// | `x <= y`   | `y - x`        |
    /// | `x < y`    | `y - x`        |
    /// | `x >= y`   | `x - y`        |
    /// | `x > y`    | `x - y`        |
    /// | `x == y`   | `-abs(x - y)`  |
    /// | `x != y`   | `abs(x - y)`   |
    pub fn robustness(&self, left: f64, right: f64) -> f64 {
        match self {
            Self::Lt | Self::Le => right - left,
            Self::Gt | Self::Ge => left - right,
            Self::Eq => -(left - right).abs(),
            Self::Ne => (left - right).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connective {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalOp {
    Eventually,
    Always,
    Once,
    Historically,
}

impl TemporalOp {
    /// Future operators look ahead of the current time and must be pastified.
    pub fn is_future(&self) -> bool {
        matches!(self, Self::Eventually | Self::Always)
    }

    /// Universal operators combine their window with `min`, existential ones with `max`.
    pub fn is_universal(&self) -> bool {
        matches!(self, Self::Always | Self::Historically)
    }
}

/// Closed time interval `[lower, upper]` with `0 <= lower <= upper`, in time units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    lower: NotNan<f64>,
    upper: NotNan<f64>,
}

impl Interval {
    /// Create an interval, returning `None` when the bounds are negative, NaN, or reversed.
    pub fn new(lower: f64, upper: f64) -> Option<Self> {
        let lower = NotNan::new(lower).ok()?;
        let upper = NotNan::new(upper).ok()?;

        if lower.into_inner() < 0.0 || lower > upper || upper.is_infinite() {
            return None;
        }

        Some(Self { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower.into_inner()
    }

    pub fn upper(&self) -> f64 {
        self.upper.into_inner()
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}]", self.lower, self.upper)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(NotNan<f64>),
    Truth(bool),
    Variable(VarId),
    Output(OutputId),
    Negate(Box<Expr>),
    Abs(Box<Expr>),
    Arithmetic(ArithOp, Box<Expr>, Box<Expr>),
    Comparison(CmpOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Connective(Connective, Box<NonEmpty<Expr>>),
    Implies(Box<Expr>, Box<Expr>),
    Temporal(TemporalOp, Interval, Box<Expr>),
}

impl Expr {
    /// The type of value this node produces. Boolean-typed variables produce robustness values
    /// when used as formulas.
    pub fn value_type(&self, declarations: &Declarations) -> ValueType {
        match self {
            Self::Literal(_) | Self::Negate(_) | Self::Abs(_) | Self::Arithmetic(..) => ValueType::Numeric,
            Self::Variable(id) => match declarations.variable(*id).ty {
                VarType::Bool => ValueType::Boolean,
                VarType::Float | VarType::Int => ValueType::Numeric,
            },
            Self::Truth(_)
            | Self::Output(_)
            | Self::Comparison(..)
            | Self::Not(_)
            | Self::Connective(..)
            | Self::Implies(..)
            | Self::Temporal(..) => ValueType::Boolean,
        }
    }

    /// Largest distance into the future, in time units, that this formula looks at.
    ///
    /// References to other outputs are not followed.
    pub fn horizon(&self) -> f64 {
        match self {
            Self::Literal(_) | Self::Truth(_) | Self::Variable(_) | Self::Output(_) => 0.0,
            Self::Negate(e) | Self::Abs(e) | Self::Not(e) => e.horizon(),
            Self::Arithmetic(_, l, r) | Self::Comparison(_, l, r) | Self::Implies(l, r) => l.horizon().max(r.horizon()),
            Self::Connective(_, operands) => operands.iter().map(Expr::horizon).fold(0.0, f64::max),
            Self::Temporal(op, interval, e) if op.is_future() => e.horizon() + interval.upper(),
            Self::Temporal(_, _, e) => e.horizon(),
        }
    }

    /// True if the formula contains no temporal operator.
    pub fn is_atemporal(&self) -> bool {
        match self {
            Self::Literal(_) | Self::Truth(_) | Self::Variable(_) | Self::Output(_) => true,
            Self::Negate(e) | Self::Abs(e) | Self::Not(e) => e.is_atemporal(),
            Self::Arithmetic(_, l, r) | Self::Comparison(_, l, r) | Self::Implies(l, r) => {
                l.is_atemporal() && r.is_atemporal()
            }
            Self::Connective(_, operands) => operands.iter().all(Expr::is_atemporal),
            Self::Temporal(..) => false,
        }
    }
}
