//! User-supplied wildcard patterns.
//!
//! `%` matches any run of characters, `_` matches exactly one, and `\`
//! makes the next character literal. The same pattern is used for SQL
//! (`LIKE ... ESCAPE '\'`) and for in-process matching; both compare
//! case-insensitively.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Any,
    One,
    Literal(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Wildcard {
    raw: String,
    tokens: Vec<Token>,
}

impl Wildcard {
    pub fn new(raw: &str) -> Self {
        let mut tokens = Vec::new();
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '%' => tokens.push(Token::Any),
                '_' => tokens.push(Token::One),
                // A trailing backslash stands for itself.
                '\\' => tokens.push(Token::Literal(chars.next().unwrap_or('\\'))),
                other => tokens.push(Token::Literal(other)),
            }
        }
        Self {
            raw: raw.to_string(),
            tokens,
        }
    }

    /// A pattern matching `text` exactly.
    pub fn literal(text: &str) -> Self {
        let mut raw = String::with_capacity(text.len());
        for c in text.chars() {
            if matches!(c, '%' | '_' | '\\') {
                raw.push('\\');
            }
            raw.push(c);
        }
        Self::new(&raw)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn has_wildcards(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, Token::Any | Token::One))
    }

    /// The pattern rewritten for `LIKE ?n ESCAPE '\'`.
    pub fn to_like(&self) -> String {
        let mut out = String::with_capacity(self.raw.len());
        for token in &self.tokens {
            match token {
                Token::Any => out.push('%'),
                Token::One => out.push('_'),
                Token::Literal(c) => {
                    if matches!(c, '%' | '_' | '\\') {
                        out.push('\\');
                    }
                    out.push(*c);
                }
            }
        }
        out
    }

    pub fn is_match(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();
        let tokens: Vec<Token> = self
            .tokens
            .iter()
            .flat_map(|t| match t {
                Token::Literal(c) => c.to_lowercase().map(Token::Literal).collect::<Vec<_>>(),
                other => vec![*other],
            })
            .collect();

        // Iterative matcher with single backtrack point for the last `%`.
        let (mut ti, mut pi) = (0usize, 0usize);
        let mut star: Option<(usize, usize)> = None;
        while ti < text.len() {
            match tokens.get(pi) {
                Some(Token::One) => {
                    ti += 1;
                    pi += 1;
                }
                Some(Token::Literal(c)) if *c == text[ti] => {
                    ti += 1;
                    pi += 1;
                }
                Some(Token::Any) => {
                    star = Some((pi, ti));
                    pi += 1;
                }
                _ => match star {
                    Some((sp, st)) => {
                        pi = sp + 1;
                        ti = st + 1;
                        star = Some((sp, st + 1));
                    }
                    None => return false,
                },
            }
        }
        tokens[pi..].iter().all(|t| matches!(t, Token::Any))
    }
}

impl From<String> for Wildcard {
    fn from(raw: String) -> Self {
        Wildcard::new(&raw)
    }
}

impl From<Wildcard> for String {
    fn from(w: Wildcard) -> Self {
        w.raw
    }
}

impl fmt::Display for Wildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
