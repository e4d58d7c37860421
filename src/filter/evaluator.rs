use super::error::FilterParseError;
use super::parser::Expr;
use crate::event::LogEvent;

/// Keys that address the event severity rather than a property
pub const LEVEL_KEYS: [&str; 3] = ["Level", "@Level", "@l"];

/// Whether `key` names the event severity (case-insensitive)
pub fn is_level_key(key: &str) -> bool {
    LEVEL_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Evaluate an expression tree against one event
///
/// Values are compared as case-insensitive text, numeric and structured
/// properties included.
pub fn evaluate(expr: &Expr, event: &LogEvent) -> bool {
    match expr {
        Expr::Condition { key, value } => evaluate_condition(key, value, event),
        Expr::And(left, right) => {
            let l = evaluate(left, event);
            let r = evaluate(right, event);
            l && r
        }
        Expr::Or(left, right) => {
            let l = evaluate(left, event);
            let r = evaluate(right, event);
            l || r
        }
    }
}

fn evaluate_condition(key: &str, expected: &str, event: &LogEvent) -> bool {
    if is_level_key(key) {
        return event.level.as_str().eq_ignore_ascii_case(expected);
    }

    match event.property_text(key) {
        Some(actual) => actual.to_lowercase() == expected.to_lowercase(),
        None => false,
    }
}

/// A filter compiled once from its source text and evaluated per event.
///
/// Immutable after construction, so it can be shared across threads and
/// evaluated concurrently.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    source: String,
    expr: Expr,
}

impl CompiledFilter {
    pub fn compile(source: &str) -> Result<Self, FilterParseError> {
        let expr = Expr::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn matches(&self, event: &LogEvent) -> bool {
        evaluate(&self.expr, event)
    }
}
