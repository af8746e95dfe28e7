//! Construction of specifications.
//!
//! A specification is built in a fixed order: declare variables and constants on a
//! [`SpecificationBuilder`], then [`parse`](SpecificationBuilder::parse) it into a
//! [`ParsedSpecification`], then [`pastify`](ParsedSpecification::pastify) it. Each stage consumes
//! or borrows the previous one, so declarations cannot change after parsing.
//!
//! ```
//! use pastiche::declarations::VarType;
//! use pastiche::specification::SpecificationBuilder;
//!
//! let mut builder = SpecificationBuilder::new();
//! builder.declare_var("surface", VarType::Float).unwrap();
//! builder.declare_var("kart1_speed", VarType::Float).unwrap();
//! builder.declare_const("water", VarType::Float, "3").unwrap();
//! builder.add_sub_spec("response = eventually[0:5](kart1_speed <= 10)");
//! builder.formula("out = (surface == water) implies response");
//!
//! let spec = builder.parse().unwrap();
//! assert_eq!(spec.outputs().len(), 2);
//! ```
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::declarations::{DeclarationError, Declarations, IoRole, Symbol, VarId, VarType};
use crate::expr::{Expr, OutputId};
use crate::parser::{self, ParseError, Scope};
use crate::pastify::{PastifiedSpecification, PastifyConfig, PastifyError};

/// Name of the top-level output when its statement does not bind one.
pub const DEFAULT_OUTPUT: &str = "out";

#[derive(Debug, Clone, Default)]
pub struct SpecificationBuilder {
    declarations: Declarations,
    sub_specs: Vec<String>,
    formula: Option<String>,
}

impl SpecificationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_var(&mut self, name: &str, ty: VarType) -> Result<VarId, DeclarationError> {
        self.declarations.declare_var(name, ty)
    }

    /// Declare a constant. The value is given as text and parsed according to `ty`.
    pub fn declare_const(&mut self, name: &str, ty: VarType, value: &str) -> Result<(), DeclarationError> {
        self.declarations.declare_const(name, ty, value)
    }

    pub fn set_var_io_type(&mut self, name: &str, role: IoRole) -> Result<(), DeclarationError> {
        self.declarations.set_io_role(name, role)
    }

    /// Add a named sub-specification (`name = formula`). Sub-specifications may reference the
    /// ones added before them.
    pub fn add_sub_spec(&mut self, text: impl Into<String>) -> &mut Self {
        self.sub_specs.push(text.into());
        self
    }

    /// Set the top-level formula, replacing any previous one.
    pub fn formula(&mut self, text: impl Into<String>) -> &mut Self {
        self.formula = Some(text.into());
        self
    }

    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    /// Parse every statement of the specification.
    ///
    /// A statement whose name matches a declared variable binds that variable: later statements
    /// that reference the name read the statement's output instead of an input signal. Variables
    /// declared as [`IoRole::Input`] cannot be bound, and every [`IoRole::Output`] must be.
    pub fn parse(self) -> Result<ParsedSpecification, ParseError> {
        let top = self.formula.ok_or(DeclarationError::MissingFormula)?;
        let texts: Vec<String> = self.sub_specs.into_iter().chain(std::iter::once(top)).collect();
        let last = texts.len() - 1;

        let mut statements = Vec::with_capacity(texts.len());
        let mut bound = HashSet::new();

        for (index, text) in texts.iter().enumerate() {
            let statement = parser::statement(text)?;
            let name = match (&statement.name, index == last) {
                (Some(name), _) => name.clone(),
                (None, true) => DEFAULT_OUTPUT.to_string(),
                (None, false) => return Err(DeclarationError::Unnamed(text.clone()).into()),
            };

            match self.declarations.lookup(&name) {
                Some(Symbol::Constant(_)) => return Err(DeclarationError::Duplicate(name).into()),
                Some(Symbol::Variable(id)) if self.declarations.variable(id).role == IoRole::Input => {
                    return Err(DeclarationError::BoundInput(name).into());
                }
                _ => {}
            }

            if !bound.insert(name.clone()) {
                return Err(DeclarationError::Duplicate(name).into());
            }

            statements.push((name, statement));
        }

        let unbound = self
            .declarations
            .variables()
            .find(|(_, variable)| variable.role == IoRole::Output && !bound.contains(&variable.name));

        if let Some((_, variable)) = unbound {
            return Err(DeclarationError::UnboundOutput(variable.name.clone()).into());
        }

        let mut visible = HashMap::new();
        let mut outputs = Vec::with_capacity(statements.len());

        for (index, ((name, statement), text)) in statements.into_iter().zip(texts).enumerate() {
            let scope = Scope {
                declarations: &self.declarations,
                outputs: &visible,
                bound: &bound,
            };

            let formula = parser::resolve(&text, &statement, &scope)?;
            visible.insert(name.clone(), OutputId(index));
            outputs.push(Output { name, text, formula });
        }

        Ok(ParsedSpecification {
            declarations: self.declarations,
            outputs,
        })
    }
}

/// A named formula whose robustness is reported by the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub text: String,
    pub formula: Expr,
}

/// A specification whose statements have all been parsed and resolved.
///
/// Outputs are numbered in declaration order: sub-specifications first, then the top-level
/// formula.
#[derive(Debug, Clone)]
pub struct ParsedSpecification {
    declarations: Declarations,
    outputs: Vec<Output>,
}

impl ParsedSpecification {
    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn output(&self, id: OutputId) -> &Output {
        &self.outputs[id.0]
    }

    /// Handle of the top-level formula.
    pub fn top(&self) -> OutputId {
        OutputId(self.outputs.len() - 1)
    }

    pub fn output_id(&self, name: &str) -> Option<OutputId> {
        self.outputs.iter().position(|output| output.name == name).map(OutputId)
    }

    pub fn pastify(&self, config: &PastifyConfig) -> Result<PastifiedSpecification, PastifyError> {
        PastifiedSpecification::new(self, config)
    }
}

/// Value of a constant in a [`SpecificationDef`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Display for ConstValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Number(value) => write!(f, "{}", value),
            Self::Text(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: VarType,
    pub value: ConstValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: VarType,
    #[serde(default)]
    pub role: IoRole,
}

/// A specification described as data.
///
/// ```
/// use pastiche::specification::SpecificationDef;
///
/// let def: SpecificationDef = serde_json::from_str(r#"{
///     "variables": [{ "name": "collision_detection", "type": "float" }],
///     "formula": "collision_detection <= 0"
/// }"#).unwrap();
///
/// let spec = def.build().unwrap();
/// assert_eq!(spec.output(spec.top()).name, "out");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationDef {
    #[serde(default)]
    pub constants: Vec<ConstantDef>,
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub sub_specs: Vec<String>,
    pub formula: String,
}

impl SpecificationDef {
    pub fn builder(&self) -> Result<SpecificationBuilder, DeclarationError> {
        let mut builder = SpecificationBuilder::new();

        for constant in &self.constants {
            builder.declare_const(&constant.name, constant.ty, &constant.value.to_string())?;
        }

        for variable in &self.variables {
            builder.declare_var(&variable.name, variable.ty)?;
            builder.set_var_io_type(&variable.name, variable.role)?;
        }

        for sub_spec in &self.sub_specs {
            builder.add_sub_spec(sub_spec.as_str());
        }

        builder.formula(self.formula.as_str());
        Ok(builder)
    }

    pub fn build(&self) -> Result<ParsedSpecification, ParseError> {
        self.builder()?.parse()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{ConstValue, ConstantDef, SpecificationBuilder, SpecificationDef, VariableDef, DEFAULT_OUTPUT};
    use crate::declarations::{DeclarationError, IoRole, VarType};
    use crate::expr::{Expr, OutputId};
    use crate::parser::ParseError;

    fn builder() -> Result<SpecificationBuilder, Box<dyn Error>> {
        let mut builder = SpecificationBuilder::new();
        builder.declare_var("surface", VarType::Float)?;
        builder.declare_var("kart1_speed", VarType::Float)?;
        builder.declare_var("response", VarType::Float)?;
        builder.declare_const("threshold", VarType::Float, "92")?;

        Ok(builder)
    }

    #[test]
    fn bind_sub_specification() -> Result<(), Box<dyn Error>> {
        let mut builder = builder()?;
        builder.add_sub_spec("response = eventually[0:2](kart1_speed <= 10)");
        builder.formula("out = ((surface == threshold) implies response)");

        let spec = builder.parse()?;

        assert_eq!(spec.outputs().len(), 2);
        assert_eq!(spec.output_id("response"), Some(OutputId(0)));
        assert_eq!(spec.top(), OutputId(1));

        match &spec.output(spec.top()).formula {
            Expr::Implies(_, consequent) => assert_eq!(**consequent, Expr::Output(OutputId(0))),
            other => panic!("unexpected formula {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn default_output_name() -> Result<(), Box<dyn Error>> {
        let mut builder = builder()?;
        builder.formula("kart1_speed <= threshold;");

        let spec = builder.parse()?;
        assert_eq!(spec.output(spec.top()).name, DEFAULT_OUTPUT);

        Ok(())
    }

    #[test]
    fn reject_forward_reference() -> Result<(), Box<dyn Error>> {
        let mut builder = builder()?;
        builder.add_sub_spec("early = response");
        builder.add_sub_spec("response = kart1_speed <= 10");
        builder.formula("early");

        assert!(matches!(
            builder.parse(),
            Err(ParseError::UnknownIdentifier { ref name, .. }) if name == "response"
        ));

        Ok(())
    }

    #[test]
    fn reject_invalid_statements() -> Result<(), Box<dyn Error>> {
        assert_eq!(
            builder()?.parse().err(),
            Some(ParseError::Declaration(DeclarationError::MissingFormula))
        );

        let mut unnamed = builder()?;
        unnamed.add_sub_spec("kart1_speed <= 10");
        unnamed.formula("surface > 0");
        assert!(matches!(
            unnamed.parse(),
            Err(ParseError::Declaration(DeclarationError::Unnamed(_)))
        ));

        let mut duplicate = builder()?;
        duplicate.add_sub_spec("a = kart1_speed <= 10");
        duplicate.formula("a = surface > 0");
        assert_eq!(
            duplicate.parse().err(),
            Some(ParseError::Declaration(DeclarationError::Duplicate("a".to_string())))
        );

        let mut constant = builder()?;
        constant.formula("threshold = surface > 0");
        assert!(matches!(
            constant.parse(),
            Err(ParseError::Declaration(DeclarationError::Duplicate(_)))
        ));

        Ok(())
    }

    #[test]
    fn enforce_io_roles() -> Result<(), Box<dyn Error>> {
        let mut bound_input = builder()?;
        bound_input.set_var_io_type("response", IoRole::Input)?;
        bound_input.add_sub_spec("response = eventually[0:2](kart1_speed <= 10)");
        bound_input.formula("surface > 0 implies response");
        assert_eq!(
            bound_input.parse().err(),
            Some(ParseError::Declaration(DeclarationError::BoundInput("response".to_string())))
        );

        let mut unbound_output = builder()?;
        unbound_output.set_var_io_type("response", IoRole::Output)?;
        unbound_output.formula("surface > 0 implies response");
        assert_eq!(
            unbound_output.parse().err(),
            Some(ParseError::Declaration(DeclarationError::UnboundOutput("response".to_string())))
        );

        let mut valid = builder()?;
        valid.set_var_io_type("kart1_speed", IoRole::Input)?;
        valid.set_var_io_type("response", IoRole::Output)?;
        valid.add_sub_spec("response = eventually[0:2](kart1_speed <= 10)");
        valid.formula("surface > 0 implies response");
        assert_eq!(valid.parse()?.outputs().len(), 2);

        Ok(())
    }

    #[test]
    fn read_type_aliases() -> Result<(), Box<dyn Error>> {
        let variable: VariableDef = serde_json::from_str(r#"{ "name": "x", "type": "double", "role": "output" }"#)?;

        assert_eq!(variable.ty, VarType::Float);
        assert_eq!(variable.role, IoRole::Output);
        assert!(serde_json::from_str::<VariableDef>(r#"{ "name": "x", "type": "string" }"#).is_err());
        assert!(serde_json::from_str::<VariableDef>(r#"{ "name": "x", "type": "int", "role": "both" }"#).is_err());

        Ok(())
    }

    #[test]
    fn build_from_definition() -> Result<(), Box<dyn Error>> {
        let def = SpecificationDef {
            constants: vec![ConstantDef {
                name: "limit".to_string(),
                ty: VarType::Int,
                value: ConstValue::Number(5.0),
            }],
            variables: vec![VariableDef {
                name: "speed".to_string(),
                ty: VarType::Float,
                role: IoRole::Input,
            }],
            sub_specs: vec![],
            formula: "always[0:limit](speed <= 10)".to_string(),
        };

        let spec = def.build()?;

        assert_eq!(spec.output(spec.top()).formula.horizon(), 5.0);
        assert_eq!(spec.declarations().variables().next().map(|(_, v)| v.role), Some(IoRole::Input));

        Ok(())
    }
}
