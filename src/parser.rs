//! Parser for the formula language.
//!
//! Parsing happens in two passes. The [`formula`] grammar turns text into a syntax tree whose
//! identifiers are still names, then the resolver replaces every name with a variable handle, an
//! output handle, or the value of a constant, and checks the value type of every node.
//!
//! ```
//! use pastiche::declarations::{Declarations, VarType};
//! use pastiche::parser::parse;
//!
//! let mut declarations = Declarations::new();
//! declarations.declare_var("req", VarType::Float).unwrap();
//! declarations.declare_var("gnt", VarType::Float).unwrap();
//!
//! let formula = parse("(req >= 3) implies eventually[0:1](gnt >= 3)", &declarations).unwrap();
//! assert_eq!(formula.horizon(), 1.0);
//! ```
mod common;
mod errors;
mod formula;
mod resolve;

use std::collections::{HashMap, HashSet};

use crate::declarations::Declarations;
use crate::expr::{Expr, ValueType};

pub use self::errors::ParseError;
pub(crate) use self::formula::RawStatement;
pub(crate) use self::resolve::Scope;

fn failure(text: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => ParseError::syntax(text, e.input),
        nom::Err::Incomplete(_) => ParseError::syntax(text, ""),
    }
}

/// Parse the syntax of a single statement without resolving any identifier.
pub(crate) fn statement(text: &str) -> Result<RawStatement, ParseError> {
    let (rest, parsed) = formula::statement(text).map_err(|e| failure(text, e))?;

    if !rest.is_empty() {
        return Err(ParseError::syntax(text, rest));
    }

    Ok(parsed)
}

/// Resolve the body of a statement previously parsed from `text`.
pub(crate) fn resolve(text: &str, statement: &RawStatement, scope: &Scope<'_>) -> Result<Expr, ParseError> {
    resolve::Resolver::new(scope, text).expect(&statement.body, ValueType::Boolean)
}

/// Parse a standalone formula over the given declarations.
///
/// The formula may be written as a named statement (`name = formula;`), in which case the name is
/// ignored. References to sub-specifications are only available through a
/// [`SpecificationBuilder`](crate::specification::SpecificationBuilder).
pub fn parse(text: &str, declarations: &Declarations) -> Result<Expr, ParseError> {
    let parsed = statement(text)?;
    let outputs = HashMap::new();
    let bound = HashSet::new();
    let scope = Scope {
        declarations,
        outputs: &outputs,
        bound: &bound,
    };

    resolve(text, &parsed, &scope)
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{parse, ParseError};
    use crate::declarations::{Declarations, VarType};
    use crate::expr::{CmpOp, Expr};

    fn declarations() -> Result<Declarations, Box<dyn Error>> {
        let mut declarations = Declarations::new();
        declarations.declare_var("collision_detection", VarType::Float)?;
        declarations.declare_var("x", VarType::Float)?;

        Ok(declarations)
    }

    #[test]
    fn parse_atomic() -> Result<(), Box<dyn Error>> {
        let declarations = declarations()?;
        let formula = parse("collision_detection <= 0;", &declarations)?;

        assert!(matches!(formula, Expr::Comparison(CmpOp::Le, _, _)));
        assert!(formula.is_atemporal());

        Ok(())
    }

    #[test]
    fn report_syntax_errors() -> Result<(), Box<dyn Error>> {
        let declarations = declarations()?;

        assert_eq!(
            parse("x <= 1 x", &declarations),
            Err(ParseError::Syntax {
                position: 7,
                found: "\"x\"".to_string()
            })
        );
        assert!(matches!(parse("x <= ", &declarations), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse("(x <= 1", &declarations), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse("always[0:1 x > 0", &declarations), Err(ParseError::Syntax { .. })));

        Ok(())
    }
}
