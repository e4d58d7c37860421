use super::error::FilterParseError;
use super::tokenizer::{Token, tokenize};
use std::collections::VecDeque;
use std::fmt;

/// A parsed filter expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `Key = Value`; the value has its outer whitespace and quotes stripped
    Condition { key: String, value: String },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn condition(key: impl Into<String>, value: impl Into<String>) -> Self {
        Expr::Condition {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    /// Parse a filter string into an expression tree
    ///
    /// Grammar:
    ///
    /// ```text
    /// Or      := And ('OR' And)*
    /// And     := Primary ('AND' Primary)*
    /// Primary := '(' Or ')' | Key '=' Value
    /// ```
    pub fn parse(input: &str) -> Result<Self, FilterParseError> {
        let mut tokens = tokenize(input);
        let expr = parse_or(&mut tokens)?;

        match tokens.pop_front() {
            None => Ok(expr),
            Some(token) => Err(FilterParseError::UnexpectedToken(token.to_string())),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Condition { key, value } => {
                let quote = if value.contains('\'') { '"' } else { '\'' };
                write!(f, "{} = {}{}{}", key, quote, value, quote)
            }
            Expr::And(left, right) => write!(f, "({} AND {})", left, right),
            Expr::Or(left, right) => write!(f, "({} OR {})", left, right),
        }
    }
}

fn parse_or(tokens: &mut VecDeque<Token>) -> Result<Expr, FilterParseError> {
    let mut left = parse_and(tokens)?;

    while tokens.front() == Some(&Token::Or) {
        tokens.pop_front();
        let right = parse_and(tokens)?;
        left = Expr::or(left, right);
    }

    Ok(left)
}

fn parse_and(tokens: &mut VecDeque<Token>) -> Result<Expr, FilterParseError> {
    let mut left = parse_primary(tokens)?;

    while tokens.front() == Some(&Token::And) {
        tokens.pop_front();
        let right = parse_primary(tokens)?;
        left = Expr::and(left, right);
    }

    Ok(left)
}

fn parse_primary(tokens: &mut VecDeque<Token>) -> Result<Expr, FilterParseError> {
    let token = tokens
        .pop_front()
        .ok_or(FilterParseError::UnexpectedEnd("a condition or '('"))?;

    if token == Token::LParen {
        let expr = parse_or(tokens)?;
        return match tokens.pop_front() {
            Some(Token::RParen) => Ok(expr),
            Some(other) => Err(FilterParseError::MismatchedParentheses(format!(
                "'{}'",
                other
            ))),
            None => Err(FilterParseError::MismatchedParentheses(
                "end of input".to_string(),
            )),
        };
    }

    let key = match &token {
        Token::Word(word) => word.clone(),
        other => return Err(FilterParseError::ExpectedKey(other.to_string())),
    };

    match tokens.pop_front() {
        Some(Token::Equals) => {}
        _ => return Err(FilterParseError::MissingEquals(key)),
    }

    let value = tokens
        .pop_front()
        .as_ref()
        .and_then(Token::value_text)
        .map(str::to_string)
        .ok_or_else(|| FilterParseError::MissingValue(key.clone()))?;

    Ok(Expr::Condition { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_condition() {
        let expr = Expr::parse("Level = 'Error'").unwrap();
        assert_eq!(expr, Expr::condition("Level", "Error"));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = Expr::parse("a = 1 OR b = 2 AND c = 3").unwrap();
        assert_eq!(
            expr,
            Expr::or(
                Expr::condition("a", "1"),
                Expr::and(Expr::condition("b", "2"), Expr::condition("c", "3"))
            )
        );
    }

    #[test]
    fn test_operators_are_left_associative() {
        let expr = Expr::parse("a = 1 OR b = 2 OR c = 3").unwrap();
        assert_eq!(
            expr,
            Expr::or(
                Expr::or(Expr::condition("a", "1"), Expr::condition("b", "2")),
                Expr::condition("c", "3")
            )
        );
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let expr = Expr::parse("(a = 1 OR b = 2) AND c = 3").unwrap();
        assert_eq!(
            expr,
            Expr::and(
                Expr::or(Expr::condition("a", "1"), Expr::condition("b", "2")),
                Expr::condition("c", "3")
            )
        );
    }

    #[test]
    fn test_value_quotes_are_stripped_but_inner_whitespace_kept() {
        let expr = Expr::parse("Host = \" api.test.local \"").unwrap();
        assert_eq!(expr, Expr::condition("Host", " api.test.local "));
    }

    #[test]
    fn test_display_quotes_values_containing_apostrophes() {
        let expr = Expr::parse("Name = \"it's\" OR Name = 'plain'").unwrap();
        let rendered = expr.to_string();
        assert_eq!(rendered, "(Name = \"it's\" OR Name = 'plain')");
        assert_eq!(Expr::parse(&rendered).unwrap(), expr);
    }

    #[test]
    fn test_missing_value_is_an_error() {
        assert_eq!(
            Expr::parse("Level = "),
            Err(FilterParseError::MissingValue("Level".to_string()))
        );
        assert_eq!(
            Expr::parse("Level = )"),
            Err(FilterParseError::MissingValue("Level".to_string()))
        );
    }

    #[test]
    fn test_missing_equals_is_an_error() {
        assert_eq!(
            Expr::parse("Level 'Error'"),
            Err(FilterParseError::MissingEquals("Level".to_string()))
        );
    }

    #[test]
    fn test_mismatched_parentheses() {
        assert!(matches!(
            Expr::parse("(Level = Error"),
            Err(FilterParseError::MismatchedParentheses(_))
        ));
        assert!(matches!(
            Expr::parse("(Level = Error Host = x"),
            Err(FilterParseError::MismatchedParentheses(_))
        ));
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(matches!(
            Expr::parse(""),
            Err(FilterParseError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            Expr::parse("a = 1 AND"),
            Err(FilterParseError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_trailing_tokens_are_rejected() {
        assert_eq!(
            Expr::parse("a = 1 )"),
            Err(FilterParseError::UnexpectedToken(")".to_string()))
        );
    }

    #[test]
    fn test_key_must_be_a_word() {
        assert!(matches!(
            Expr::parse("'Level' = Error"),
            Err(FilterParseError::ExpectedKey(_))
        ));
    }
}
