//! Resolution of names and value types in a parsed syntax tree.
use std::collections::{HashMap, HashSet};

use nonempty::NonEmpty;
use ordered_float::NotNan;

use super::errors::ParseError;
use super::formula::{Bound, Kind, Node};
use crate::declarations::{Declarations, Symbol, VarType};
use crate::expr::{Expr, Interval, OutputId, ValueType};

/// Identifiers visible to a statement.
pub(crate) struct Scope<'a> {
    pub declarations: &'a Declarations,
    /// Outputs bound by earlier statements.
    pub outputs: &'a HashMap<String, OutputId>,
    /// Every name bound by some statement, including ones that are not visible yet.
    pub bound: &'a HashSet<String>,
}

pub(crate) struct Resolver<'a> {
    scope: &'a Scope<'a>,
    length: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(scope: &'a Scope<'a>, text: &str) -> Self {
        Self {
            scope,
            length: text.len(),
        }
    }

    fn position(&self, node: &Node) -> usize {
        self.length - node.remaining
    }

    /// Resolve `node` and check that it produces a value of type `expected`.
    pub fn expect(&self, node: &Node, expected: ValueType) -> Result<Expr, ParseError> {
        let expr = self.resolve(node)?;
        let found = expr.value_type(self.scope.declarations);

        if found != expected {
            return Err(ParseError::TypeMismatch {
                position: self.position(node),
                expected,
                found,
            });
        }

        Ok(expr)
    }

    fn numeric(&self, node: &Node) -> Result<Box<Expr>, ParseError> {
        self.expect(node, ValueType::Numeric).map(Box::new)
    }

    fn boolean(&self, node: &Node) -> Result<Box<Expr>, ParseError> {
        self.expect(node, ValueType::Boolean).map(Box::new)
    }

    fn resolve(&self, node: &Node) -> Result<Expr, ParseError> {
        let expr = match &node.kind {
            Kind::Number(value) => self.literal(node, *value)?,
            Kind::Truth(value) => Expr::Truth(*value),
            Kind::Ident(name) => self.identifier(node, name)?,
            Kind::Negate(operand) => Expr::Negate(self.numeric(operand)?),
            Kind::Abs(operand) => Expr::Abs(self.numeric(operand)?),
            Kind::Arithmetic(op, left, right) => Expr::Arithmetic(*op, self.numeric(left)?, self.numeric(right)?),
            Kind::Comparison(op, left, right) => Expr::Comparison(*op, self.numeric(left)?, self.numeric(right)?),
            Kind::Not(operand) => Expr::Not(self.boolean(operand)?),
            Kind::Connective(connective, operands) => {
                let head = self.expect(&operands.head, ValueType::Boolean)?;
                let tail = operands
                    .tail
                    .iter()
                    .map(|operand| self.expect(operand, ValueType::Boolean))
                    .collect::<Result<Vec<_>, _>>()?;

                Expr::Connective(*connective, Box::new(NonEmpty { head, tail }))
            }
            Kind::Implies(antecedent, consequent) => Expr::Implies(self.boolean(antecedent)?, self.boolean(consequent)?),
            Kind::Temporal(op, lower, upper, operand) => {
                let interval = self.interval(node, lower, upper)?;
                Expr::Temporal(*op, interval, self.boolean(operand)?)
            }
        };

        Ok(expr)
    }

    fn literal(&self, node: &Node, value: f64) -> Result<Expr, ParseError> {
        NotNan::new(value).map(Expr::Literal).map_err(|_| ParseError::Syntax {
            position: self.position(node),
            found: "NaN".to_string(),
        })
    }

    fn identifier(&self, node: &Node, name: &str) -> Result<Expr, ParseError> {
        if let Some(id) = self.scope.outputs.get(name) {
            return Ok(Expr::Output(*id));
        }

        let unknown = || ParseError::UnknownIdentifier {
            name: name.to_string(),
            position: self.position(node),
        };

        // A name bound by a later statement is not visible yet, even if it was also declared.
        if self.scope.bound.contains(name) {
            return Err(unknown());
        }

        match self.scope.declarations.lookup(name) {
            Some(Symbol::Variable(id)) => Ok(Expr::Variable(id)),
            Some(Symbol::Constant(index)) => {
                let constant = self.scope.declarations.constant(index);

                match constant.ty {
                    VarType::Bool => Ok(Expr::Truth(constant.value != 0.0)),
                    VarType::Float | VarType::Int => self.literal(node, constant.value),
                }
            }
            None => Err(unknown()),
        }
    }

    fn bound(&self, node: &Node, bound: &Bound, malformed: &dyn Fn() -> ParseError) -> Result<f64, ParseError> {
        match bound {
            Bound::Number(value) => Ok(*value),
            Bound::Name(name) => match self.scope.declarations.lookup(name) {
                Some(Symbol::Constant(index)) => {
                    let constant = self.scope.declarations.constant(index);

                    match constant.ty {
                        VarType::Bool => Err(malformed()),
                        VarType::Float | VarType::Int => Ok(constant.value),
                    }
                }
                Some(Symbol::Variable(_)) => Err(malformed()),
                None => Err(ParseError::UnknownIdentifier {
                    name: name.clone(),
                    position: self.position(node),
                }),
            },
        }
    }

    fn interval(&self, node: &Node, lower: &Bound, upper: &Bound) -> Result<Interval, ParseError> {
        let malformed = || ParseError::MalformedBound {
            position: self.position(node),
            lower: lower.to_string(),
            upper: upper.to_string(),
        };

        let start = self.bound(node, lower, &malformed)?;
        let end = self.bound(node, upper, &malformed)?;

        Interval::new(start, end).ok_or_else(malformed)
    }
}
