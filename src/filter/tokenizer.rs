use std::collections::VecDeque;
use std::fmt;

/// Characters that open and close a quoted literal
pub(crate) const QUOTE_CHARS: [char; 2] = ['"', '\''];

/// A single lexical token of a filter expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A bare word: a property name, the reserved level key or an unquoted value
    Word(String),
    /// A quoted literal including its boundary quotes (the closing quote may be
    /// missing when the input ended inside the literal)
    Quoted(String),
    LParen,
    RParen,
    Equals,
    And,
    Or,
}

impl Token {
    fn from_text(text: &str) -> Self {
        if text.eq_ignore_ascii_case("and") {
            Token::And
        } else if text.eq_ignore_ascii_case("or") {
            Token::Or
        } else if text.starts_with(QUOTE_CHARS) {
            Token::Quoted(text.to_string())
        } else {
            Token::Word(text.to_string())
        }
    }

    /// The literal text of a word or quoted token with surrounding whitespace
    /// and quote characters stripped. Structural tokens have no value.
    pub fn value_text(&self) -> Option<&str> {
        match self {
            Token::Word(text) | Token::Quoted(text) => {
                Some(text.trim().trim_matches(QUOTE_CHARS))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(text) | Token::Quoted(text) => write!(f, "{}", text),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Equals => write!(f, "="),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
        }
    }
}

/// Lexes a filter string into tokens.
///
/// Lexing never fails: an unterminated quote or trailing text is flushed as a
/// final token and grammar problems are left to the parser. The tokenizer is
/// `Clone`, so a copy taken before iterating restarts the sequence.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let base = self.pos;
        let mut start: Option<usize> = None;
        let mut quote: Option<char> = None;

        for (offset, c) in self.input[base..].char_indices() {
            let at = base + offset;

            if let Some(q) = quote {
                if c == q {
                    let end = at + c.len_utf8();
                    self.pos = end;
                    return Some(Token::from_text(&self.input[start.unwrap_or(at)..end]));
                }
                continue;
            }

            match c {
                '"' | '\'' => {
                    quote = Some(c);
                    start.get_or_insert(at);
                }
                c if c.is_whitespace() => {
                    if let Some(s) = start {
                        self.pos = at + c.len_utf8();
                        return Some(Token::from_text(&self.input[s..at]));
                    }
                }
                '(' | ')' | '=' => {
                    // Flush buffered text first; the punctuation is picked up
                    // by the next call.
                    if let Some(s) = start {
                        self.pos = at;
                        return Some(Token::from_text(&self.input[s..at]));
                    }
                    self.pos = at + 1;
                    return Some(match c {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        _ => Token::Equals,
                    });
                }
                _ => {
                    start.get_or_insert(at);
                }
            }
        }

        self.pos = self.input.len();
        start.map(|s| Token::from_text(&self.input[s..]))
    }
}

/// Tokenize a whole filter string into a queue for the parser
pub fn tokenize(input: &str) -> VecDeque<Token> {
    Tokenizer::new(input).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(input: &str) -> Vec<String> {
        Tokenizer::new(input).map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_whitespace_separates_tokens() {
        assert_eq!(words("  Level   =  Error "), vec!["Level", "=", "Error"]);
    }

    #[test]
    fn test_punctuation_is_its_own_token() {
        assert_eq!(
            words("(Level='Error')AND(Host=x)"),
            vec!["(", "Level", "=", "'Error'", ")", "AND", "(", "Host", "=", "x", ")"]
        );
    }

    #[test]
    fn test_quoted_literal_is_not_retokenized() {
        let tokens: Vec<Token> = Tokenizer::new("Name = \"a (b) = c OR d\"").collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2], Token::Quoted("\"a (b) = c OR d\"".to_string()));
        assert_eq!(tokens[2].value_text(), Some("a (b) = c OR d"));
    }

    #[test]
    fn test_mixed_quote_kinds() {
        let tokens: Vec<Token> = Tokenizer::new(r#"A = 'it"s'"#).collect();
        assert_eq!(tokens[2].value_text(), Some("it\"s"));
    }

    #[test]
    fn test_unterminated_quote_is_flushed() {
        let tokens: Vec<Token> = Tokenizer::new("Host = 'api.local").collect();
        assert_eq!(tokens.last(), Some(&Token::Quoted("'api.local".to_string())));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let tokens: Vec<Token> = Tokenizer::new("a=b and c=d Or e=f").collect();
        assert_eq!(tokens[3], Token::And);
        assert_eq!(tokens[7], Token::Or);
    }

    #[test]
    fn test_tokenizer_is_restartable() {
        let tokenizer = Tokenizer::new("Level = 'Error'");
        let first: Vec<Token> = tokenizer.clone().collect();
        let second: Vec<Token> = tokenizer.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_retokenizing_rendered_tokens_is_stable() {
        let input = "(Level='Error')and(Host = \"api test\")OR x=1";
        let first = tokenize(input);
        let rendered = first
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let second = tokenize(&rendered);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input_has_no_tokens() {
        assert!(tokenize("   ").is_empty());
    }
}
