use thiserror::Error;

use crate::declarations::DeclarationError;
use crate::expr::ValueType;

/// Error produced while turning formula text into an [`Expr`](crate::expr::Expr).
///
/// Positions are byte offsets into the statement text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("syntax error at position {position}: unexpected {found}")]
    Syntax { position: usize, found: String },

    #[error("unknown identifier \"{name}\" at position {position}")]
    UnknownIdentifier { name: String, position: usize },

    #[error("malformed bound [{lower}:{upper}] at position {position}")]
    MalformedBound { position: usize, lower: String, upper: String },

    #[error("type mismatch at position {position}: expected {expected} expression, found {found}")]
    TypeMismatch {
        position: usize,
        expected: ValueType,
        found: ValueType,
    },

    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

impl ParseError {
    pub(crate) fn syntax(text: &str, rest: &str) -> Self {
        let found = match rest.trim_start().split_whitespace().next() {
            Some(token) => format!("\"{}\"", token),
            None => "end of input".to_string(),
        };

        Self::Syntax {
            position: text.len() - rest.trim_start().len(),
            found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ParseError;

    #[test]
    fn syntax_error_position() {
        let text = "x <= ) 3";
        let error = ParseError::syntax(text, &text[4..]);

        assert_eq!(
            error,
            ParseError::Syntax {
                position: 5,
                found: "\")\"".to_string()
            }
        );
        assert_eq!(ParseError::syntax(text, "").to_string(), "syntax error at position 8: unexpected end of input");
    }
}
