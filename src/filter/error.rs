use thiserror::Error;

/// Errors that can occur when compiling filter expressions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("Unexpected end of filter expression: expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("Mismatched parentheses: expected ')' but found {0}")]
    MismatchedParentheses(String),

    #[error("Expected '=' after '{0}' in condition")]
    MissingEquals(String),

    #[error("Missing value for '{0}' in condition")]
    MissingValue(String),

    #[error("Expected a property name, found '{0}'")]
    ExpectedKey(String),

    #[error("Unexpected token '{0}' after end of expression")]
    UnexpectedToken(String),
}
