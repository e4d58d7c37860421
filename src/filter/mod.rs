//! Filter expression parsing and evaluation
//!
//! Each metric carries a boolean filter deciding which events it counts.
//! Filters are compiled once when the configuration loads and evaluated for
//! every incoming event.
//!
//! # Syntax
//!
//! ```text
//! Key = Value              Property equals value (case-insensitive)
//! Level = Value            Event severity equals value
//! a = 1 AND b = 2          Both conditions hold
//! a = 1 OR b = 2           Either condition holds
//! (a = 1 OR b = 2) AND c   Parentheses group; AND binds tighter than OR
//! ```
//!
//! Values may be bare words or quoted with `'` or `"`; quoted text is taken
//! literally, spaces, parentheses and keywords included.
//!
//! # Examples
//!
//! ```text
//! Level = 'Error'
//! (Level = 'Error') AND (Host = 'api.test.local')
//! StatusCode = 500 OR StatusCode = 503
//! ```

pub mod error;
pub mod evaluator;
pub mod parser;
pub mod tokenizer;

pub use error::FilterParseError;
pub use evaluator::{CompiledFilter, LEVEL_KEYS, evaluate, is_level_key};
pub use parser::Expr;
pub use tokenizer::{Token, Tokenizer, tokenize};

pub(crate) use tokenizer::QUOTE_CHARS;
