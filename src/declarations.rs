//! Variables and constants that a specification may reference.
//!
//! Every identifier is declared exactly once. Variables are resolved to a [`VarId`] when the
//! specification is parsed, so the evaluator never looks a variable up by name.
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic type of a variable or constant.
///
/// Integer and Boolean values are stored as `f64` like floating point values. Integer values must
/// be integral and Boolean values must be either `0.0` or `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    #[serde(alias = "double")]
    Float,
    Int,
    Bool,
}

impl VarType {
    /// Check that a sample value is representable by this type.
    pub fn admits(&self, value: f64) -> bool {
        match self {
            Self::Float => !value.is_nan(),
            Self::Int => value.is_finite() && value.fract() == 0.0,
            Self::Bool => value == 0.0 || value == 1.0,
        }
    }

    /// Parse the textual value of a constant of this type.
    pub fn parse_value(&self, text: &str) -> Option<f64> {
        let text = text.trim();

        match self {
            Self::Float => f64::from_str(text).ok().filter(|value| !value.is_nan()),
            Self::Int => i64::from_str(text).ok().map(|value| value as f64),
            Self::Bool => match text {
                "true" | "1" => Some(1.0),
                "false" | "0" => Some(0.0),
                _ => None,
            },
        }
    }
}

impl Display for VarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float => write!(f, "float"),
            Self::Int => write!(f, "int"),
            Self::Bool => write!(f, "bool"),
        }
    }
}

/// Declared I/O role of a variable.
///
/// An `Input` is read from samples and no statement may bind it. An `Output` must be bound by a
/// statement. An `Unconstrained` variable is an output if a statement binds it and an input
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoRole {
    Input,
    Output,
    #[default]
    Unconstrained,
}

/// Handle to a declared variable, valid for the specification that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: VarType,
    pub role: IoRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub name: String,
    pub ty: VarType,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeclarationError {
    #[error("identifier \"{0}\" is already declared")]
    Duplicate(String),

    #[error("identifier \"{0}\" is not declared")]
    Undeclared(String),

    #[error("\"{value}\" is not a valid {ty} value for constant \"{name}\"")]
    InvalidConstant { name: String, ty: VarType, value: String },

    #[error("input variable \"{0}\" is bound by a statement")]
    BoundInput(String),

    #[error("output variable \"{0}\" is not bound by any statement")]
    UnboundOutput(String),

    #[error("invalid identifier \"{0}\"")]
    InvalidName(String),

    #[error("the specification has no top-level formula")]
    MissingFormula,

    #[error("sub-specification \"{0}\" is not bound to a name")]
    Unnamed(String),
}

/// Table of every variable and constant declared for a specification.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    variables: Vec<Variable>,
    constants: Vec<Constant>,
    names: HashMap<String, Symbol>,
}

/// What an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Symbol {
    Variable(VarId),
    Constant(usize),
}

const KEYWORDS: [&str; 11] = [
    "and", "or", "not", "implies", "eventually", "always", "once", "historically", "true", "false", "abs",
];

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');

    valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !KEYWORDS.contains(&name)
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&mut self, name: &str, symbol: Symbol) -> Result<(), DeclarationError> {
        if !is_identifier(name) {
            return Err(DeclarationError::InvalidName(name.to_string()));
        }

        if self.names.contains_key(name) {
            return Err(DeclarationError::Duplicate(name.to_string()));
        }

        self.names.insert(name.to_string(), symbol);
        Ok(())
    }

    pub fn declare_var(&mut self, name: &str, ty: VarType) -> Result<VarId, DeclarationError> {
        let id = VarId(self.variables.len());
        self.claim(name, Symbol::Variable(id))?;
        self.variables.push(Variable {
            name: name.to_string(),
            ty,
            role: IoRole::default(),
        });

        Ok(id)
    }

    pub fn declare_const(&mut self, name: &str, ty: VarType, value: &str) -> Result<(), DeclarationError> {
        let parsed = ty.parse_value(value).ok_or_else(|| DeclarationError::InvalidConstant {
            name: name.to_string(),
            ty,
            value: value.to_string(),
        })?;

        self.claim(name, Symbol::Constant(self.constants.len()))?;
        self.constants.push(Constant {
            name: name.to_string(),
            ty,
            value: parsed,
        });

        Ok(())
    }

    pub fn set_io_role(&mut self, name: &str, role: IoRole) -> Result<(), DeclarationError> {
        match self.names.get(name) {
            Some(Symbol::Variable(id)) => {
                self.variables[id.0].role = role;
                Ok(())
            }
            _ => Err(DeclarationError::Undeclared(name.to_string())),
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Symbol> {
        self.names.get(name).copied()
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn constant(&self, index: usize) -> &Constant {
        &self.constants[index]
    }

    /// Find the handle of a declared variable.
    pub fn resolve(&self, name: &str) -> Option<VarId> {
        match self.names.get(name) {
            Some(Symbol::Variable(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn variables(&self) -> impl Iterator<Item = (VarId, &Variable)> + '_ {
        self.variables
            .iter()
            .enumerate()
            .map(|(index, variable)| (VarId(index), variable))
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
