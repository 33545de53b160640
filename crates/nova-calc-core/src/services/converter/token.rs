//! Token alphabet shared by the tokenizer, the modules and the evaluator

use std::fmt;

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Plain numbers (100, 3.14)
    Number,
    /// Value-bearing words and unit names (100usd, 9am est, eur)
    Identifier,
    /// Arithmetic and grouping characters
    Operator,
    /// `in`, `to`, `as`, `=?`
    ConversionDirective,
    EndOfStream,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Number => "Number",
            TokenKind::Identifier => "Identifier",
            TokenKind::Operator => "Operator",
            TokenKind::ConversionDirective => "ConversionDirective",
            TokenKind::EndOfStream => "EndOfStream",
        };
        f.write_str(name)
    }
}

/// One token of a query. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Parsed value, only set for `Number` tokens
    pub value: Option<Decimal>,
    /// Original text as matched
    pub text: String,
    /// Module whose pattern produced the token
    pub module: Option<String>,
    /// Byte offset into the original input
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            value: None,
            text: text.into(),
            module: None,
            offset,
        }
    }

    pub fn end_of_stream(offset: usize) -> Self {
        Self::new(TokenKind::EndOfStream, "", offset)
    }

    pub fn with_module(mut self, module: Option<String>) -> Self {
        self.module = module;
        self
    }

    pub fn with_value(mut self, value: Decimal) -> Self {
        self.value = Some(value);
        self
    }

    pub fn is_end(&self) -> bool {
        self.kind == TokenKind::EndOfStream
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A module-contributed rule for recognizing vocabulary in raw input
#[derive(Debug, Clone)]
pub struct TokenPattern {
    /// Regex source, unanchored; the tokenizer anchors it
    pub pattern: String,
    pub kind: TokenKind,
    /// Higher priority patterns are tried first
    pub priority: i32,
    /// Only tried against the entire trimmed input
    pub full_match: bool,
    pub module: Option<String>,
}

impl TokenPattern {
    pub fn new(pattern: impl Into<String>, kind: TokenKind, priority: i32) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
            priority,
            full_match: false,
            module: None,
        }
    }

    pub fn full_match(mut self) -> Self {
        self.full_match = true;
        self
    }

    pub fn owned_by(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}
