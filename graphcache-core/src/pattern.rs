//! Key patterns for bulk removal.
//!
//! Pattern syntax: `%` matches any run of characters (including none), `_`
//! matches exactly one character, and `\` escapes a following `%`, `_` or `\`.
//! Any other escape is rejected. Patterns always match the whole key.

use regex::Regex;

use crate::error::PatternError;

/// One parsed pattern element.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyRun,
    AnyOne,
}

/// A validated key pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    tokens: Vec<Token>,
    regex: Regex,
}

impl KeyPattern {
    /// Parse and validate `pattern`.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let mut tokens = Vec::with_capacity(pattern.len());
        let mut chars = pattern.chars().enumerate();
        while let Some((position, c)) = chars.next() {
            match c {
                '%' => tokens.push(Token::AnyRun),
                '_' => tokens.push(Token::AnyOne),
                '\\' => match chars.next() {
                    Some((_, escaped @ ('%' | '_' | '\\'))) => tokens.push(Token::Literal(escaped)),
                    Some((_, escaped)) => {
                        return Err(PatternError::InvalidEscape {
                            pattern: pattern.to_string(),
                            position,
                            escaped,
                        })
                    }
                    None => {
                        return Err(PatternError::DanglingEscape {
                            pattern: pattern.to_string(),
                        })
                    }
                },
                other => tokens.push(Token::Literal(other)),
            }
        }

        let regex = Self::compile(pattern, &tokens)?;
        Ok(Self {
            source: pattern.to_string(),
            tokens,
            regex,
        })
    }

    fn compile(pattern: &str, tokens: &[Token]) -> Result<Regex, PatternError> {
        let mut expr = String::from("(?s)^");
        let mut buf = [0u8; 4];
        for token in tokens {
            match token {
                Token::AnyRun => expr.push_str(".*"),
                Token::AnyOne => expr.push('.'),
                Token::Literal(c) => expr.push_str(&regex::escape(c.encode_utf8(&mut buf))),
            }
        }
        expr.push('$');
        Regex::new(&expr).map_err(|e| PatternError::Compile {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `key` matches the whole pattern.
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    /// Whether the pattern matches every key.
    pub fn matches_everything(&self) -> bool {
        !self.tokens.is_empty() && self.tokens.iter().all(|t| *t == Token::AnyRun)
    }

    /// Render as a case-sensitive SQLite `GLOB` expression.
    pub fn to_sql_glob(&self) -> String {
        let mut glob = String::with_capacity(self.tokens.len() + 8);
        for token in &self.tokens {
            match token {
                Token::AnyRun => glob.push('*'),
                Token::AnyOne => glob.push('?'),
                Token::Literal('*') => glob.push_str("[*]"),
                Token::Literal('?') => glob.push_str("[?]"),
                Token::Literal('[') => glob.push_str("[[]"),
                Token::Literal(c) => glob.push(*c),
            }
        }
        glob
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_matches_everything() {
        let pattern = KeyPattern::parse("%").expect("valid");
        assert!(pattern.matches(""));
        assert!(pattern.matches("User:1"));
        assert!(pattern.matches("line\nbreak"));
        assert!(pattern.matches_everything());
    }

    #[test]
    fn test_escaped_percent_is_literal() {
        let pattern = KeyPattern::parse("\\%").expect("valid");
        assert!(pattern.matches("%"));
        assert!(!pattern.matches("a"));
        assert!(!pattern.matches("%%"));
        assert!(!pattern.matches_everything());
    }

    #[test]
    fn test_prefix_pattern() {
        let pattern = KeyPattern::parse("User:%").expect("valid");
        assert!(pattern.matches("User:1"));
        assert!(pattern.matches("User:"));
        assert!(!pattern.matches("user:1"));
        assert!(!pattern.matches("Post:User:1"));
    }

    #[test]
    fn test_underscore_matches_one_char() {
        let pattern = KeyPattern::parse("a_c").expect("valid");
        assert!(pattern.matches("abc"));
        assert!(pattern.matches("aéc"));
        assert!(!pattern.matches("ac"));
        assert!(!pattern.matches("abbc"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let pattern = KeyPattern::parse("a.b(c)%").expect("valid");
        assert!(pattern.matches("a.b(c)d"));
        assert!(!pattern.matches("aXb(c)d"));
    }

    #[test]
    fn test_invalid_escape_is_rejected() {
        let err = KeyPattern::parse("abc\\d").expect_err("bad escape");
        assert_eq!(
            err,
            PatternError::InvalidEscape {
                pattern: "abc\\d".to_string(),
                position: 3,
                escaped: 'd',
            }
        );
        assert!(matches!(
            KeyPattern::parse("abc\\"),
            Err(PatternError::DanglingEscape { .. })
        ));
    }

    #[test]
    fn test_sql_glob_translation() {
        let pattern = KeyPattern::parse("a*b?[c]%_\\%").expect("valid");
        assert_eq!(pattern.to_sql_glob(), "a[*]b[?][[]c]*?%");
    }
}
