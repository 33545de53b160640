//! Error types for the Nova calculator engine
//!
//! Every failure on the query path is terminal for that query. Hosts render
//! failures as "no result" and fall back to other providers.

use thiserror::Error;

use crate::services::converter::sources::SourceError;

/// Tokenization failed at a byte offset of the original input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid token at position {position}")]
pub struct TokenizeError {
    /// The text that was being tokenized
    pub input: String,
    /// Byte offset of the first character no pattern could claim
    pub position: usize,
}

impl TokenizeError {
    pub fn new(input: impl Into<String>, position: usize) -> Self {
        Self {
            input: input.into(),
            position,
        }
    }

    /// Render the input with a caret under the offending character:
    ///
    /// ```text
    /// 1 + @
    ///     ^
    /// ```
    pub fn caret_message(&self) -> String {
        let prefix = self.input.get(..self.position).unwrap_or(&self.input);
        let padding = " ".repeat(prefix.chars().count());
        format!("{}\n{}^", self.input, padding)
    }
}

/// Errors that can occur while tokenizing, evaluating or converting
#[derive(Debug, Error)]
pub enum ConverterError {
    /// No pattern matched the input at some position
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    /// No registered module claimed a value token
    #[error("no module can handle token: {token}")]
    UnhandledToken { token: String },

    /// A conversion directive was not followed by a known unit
    #[error("failed to parse target unit: {token}")]
    UnresolvedTargetUnit { token: String },

    /// Operators and operands do not line up
    #[error("malformed expression: {0}")]
    MalformedExpression(String),

    /// The registry found no one- or two-hop route between the units
    #[error("no conversion path from {from} to {to}")]
    NoConversionPath { from: String, to: String },

    /// The rate cache is cold, stale, or lacks the unit
    #[error("rate unavailable for {unit}")]
    RateUnavailable { unit: String },

    /// Addition or subtraction across unit families
    #[error("cannot combine {left} with {right}")]
    IncompatibleUnits { left: String, right: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// Module-internal conversion failure
    #[error("conversion error: {0}")]
    Conversion(String),

    /// A rate source could not be set up at startup
    #[error("rate source: {0}")]
    RateSource(#[from] SourceError),

    /// A module contributed a pattern the regex engine rejected
    #[error("invalid token pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type alias for engine operations
pub type ConverterResult<T> = Result<T, ConverterError>;
