//! Priority-ordered, regex-driven tokenizer
//!
//! Patterns come from every registered module. They are sorted once by
//! descending priority with a stable sort, so ties keep registration order:
//! the module registered first owns ambiguous vocabulary.
//!
//! Tokenizing runs in two passes:
//! 1. Every full-match pattern is tried against the whole trimmed input. A
//!    hit yields `[token, EndOfStream]`, letting a module claim a sentence
//!    like "what time is it in tokyo" as one token.
//! 2. Otherwise the input is consumed left to right. At each position the
//!    first non-full pattern (in priority order) that matches wins. Unclaimed
//!    arithmetic or grouping characters become `Operator` tokens.

use std::str::FromStr;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use super::token::{Token, TokenKind, TokenPattern};
use crate::error::{ConverterError, ConverterResult, TokenizeError};

/// Characters emitted as operators when no pattern claims them
pub const OPERATOR_CHARS: [char; 6] = ['+', '-', '*', '/', '(', ')'];

struct CompiledPattern {
    pattern: TokenPattern,
    regex: Regex,
}

impl CompiledPattern {
    fn compile(pattern: TokenPattern) -> ConverterResult<Self> {
        let anchored = if pattern.full_match {
            format!("^(?:{})$", pattern.pattern)
        } else {
            format!("^(?:{})", pattern.pattern)
        };
        let regex = Regex::new(&anchored).map_err(|source| ConverterError::InvalidPattern {
            pattern: pattern.pattern.clone(),
            source,
        })?;
        Ok(Self { pattern, regex })
    }
}

pub struct Tokenizer {
    patterns: Vec<CompiledPattern>,
}

impl Tokenizer {
    /// Sort and compile the given patterns
    pub fn new(mut patterns: Vec<TokenPattern>) -> ConverterResult<Self> {
        // Vec::sort_by is stable: equal priorities keep registration order
        patterns.sort_by(|a, b| b.priority.cmp(&a.priority));

        let patterns = patterns
            .into_iter()
            .map(CompiledPattern::compile)
            .collect::<ConverterResult<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Number of compiled patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Turn raw query text into tokens, always terminated by `EndOfStream`.
    ///
    /// Offsets in tokens and errors are byte offsets into `input` as given,
    /// including any leading whitespace.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, TokenizeError> {
        let start = input.len() - input.trim_start().len();
        let trimmed = input.trim();
        let end = start + trimmed.len();

        if trimmed.is_empty() {
            return Ok(vec![Token::end_of_stream(end)]);
        }

        for compiled in self.patterns.iter().filter(|p| p.pattern.full_match) {
            if compiled.regex.is_match(trimmed) {
                debug!(pattern = %compiled.pattern.pattern, "full-match pattern claimed input");
                let token = make_token(input, &compiled.pattern, trimmed, start)?;
                return Ok(vec![token, Token::end_of_stream(end)]);
            }
        }

        let mut tokens = Vec::new();
        let mut cursor = start;

        loop {
            let rest = &input[cursor..end];
            cursor += rest.len() - rest.trim_start().len();
            if cursor >= end {
                break;
            }
            let rest = &input[cursor..end];

            let claimed = self
                .patterns
                .iter()
                .filter(|p| !p.pattern.full_match)
                .find_map(|p| {
                    p.regex
                        .find(rest)
                        .filter(|m| !m.as_str().is_empty())
                        .map(|m| (p, m.as_str()))
                });

            if let Some((compiled, text)) = claimed {
                tokens.push(make_token(input, &compiled.pattern, text, cursor)?);
                cursor += text.len();
                continue;
            }

            match rest.chars().next() {
                Some(c) if OPERATOR_CHARS.contains(&c) => {
                    tokens.push(Token::new(TokenKind::Operator, c.to_string(), cursor));
                    cursor += c.len_utf8();
                }
                _ => return Err(TokenizeError::new(input, cursor)),
            }
        }

        tokens.push(Token::end_of_stream(end));
        debug!(
            tokens = %tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(", "),
            "tokenized query"
        );
        Ok(tokens)
    }
}

fn make_token(
    input: &str,
    pattern: &TokenPattern,
    text: &str,
    offset: usize,
) -> Result<Token, TokenizeError> {
    let token = Token::new(pattern.kind, text, offset).with_module(pattern.module.clone());
    if pattern.kind != TokenKind::Number {
        return Ok(token);
    }
    let value = Decimal::from_str(text).map_err(|_| TokenizeError::new(input, offset))?;
    Ok(token.with_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn patterns() -> Vec<TokenPattern> {
        vec![
            TokenPattern::new(r"[0-9]+(?:\.[0-9]+)?", TokenKind::Number, 0).owned_by("math"),
            TokenPattern::new(r"(?i)(?:in|to)\b", TokenKind::ConversionDirective, 500)
                .owned_by("math"),
            TokenPattern::new(r"(?i)[0-9]+\s*usd\b", TokenKind::Identifier, 1000)
                .owned_by("currency"),
            TokenPattern::new(r"(?i)[a-z]+", TokenKind::Identifier, -100).owned_by("math"),
        ]
    }

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_arithmetic() {
        let tokenizer = Tokenizer::new(patterns()).unwrap();
        let tokens = tokenizer.tokenize("1+2*3").unwrap();
        assert_eq!(texts(&tokens), vec!["1", "+", "2", "*", "3", ""]);
        assert_eq!(tokens[0].value, Some(Decimal::from(1)));
        assert_eq!(tokens[1].kind, TokenKind::Operator);
        assert!(tokens[5].is_end());
    }

    #[test]
    fn test_priority_beats_position_in_list() {
        let tokenizer = Tokenizer::new(patterns()).unwrap();
        let tokens = tokenizer.tokenize("100 usd in eur").unwrap();
        assert_eq!(texts(&tokens), vec!["100 usd", "in", "eur", ""]);
        assert_eq!(tokens[0].module.as_deref(), Some("currency"));
        assert_eq!(tokens[1].kind, TokenKind::ConversionDirective);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_empty_input() {
        let tokenizer = Tokenizer::new(patterns()).unwrap();
        let tokens = tokenizer.tokenize("   ").unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_end());
    }

    #[test]
    fn test_invalid_character_offset() {
        let tokenizer = Tokenizer::new(patterns()).unwrap();
        let err = tokenizer.tokenize("1 + @").unwrap_err();
        assert_eq!(err.position, 4);
        assert_eq!(err.input, "1 + @");
    }

    #[test]
    fn test_offsets_include_leading_whitespace() {
        let tokenizer = Tokenizer::new(patterns()).unwrap();
        let err = tokenizer.tokenize("  2 # 3").unwrap_err();
        assert_eq!(err.position, 4);

        let tokens = tokenizer.tokenize("  2 + 3").unwrap();
        assert_eq!(tokens[0].offset, 2);
        assert_eq!(tokens[2].offset, 6);
    }

    #[test]
    fn test_full_match_claims_whole_input() {
        let mut all = patterns();
        all.push(
            TokenPattern::new(r"(?i)time\s+in\s+[a-z]+", TokenKind::Identifier, 10)
                .full_match()
                .owned_by("time"),
        );
        let tokenizer = Tokenizer::new(all).unwrap();

        let tokens = tokenizer.tokenize("  time in tokyo ").unwrap();
        assert_eq!(texts(&tokens), vec!["time in tokyo", ""]);
        assert_eq!(tokens[0].module.as_deref(), Some("time"));

        // Not a whole-input match: falls back to incremental tokenization
        let tokens = tokenizer.tokenize("time in tokyo + 1").unwrap();
        assert_eq!(texts(&tokens), vec!["time", "in", "tokyo", "+", "1", ""]);
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let first = TokenPattern::new(r"m", TokenKind::Identifier, 10).owned_by("length");
        let second = TokenPattern::new(r"m", TokenKind::Identifier, 10).owned_by("time");

        for _ in 0..10 {
            let tokenizer = Tokenizer::new(vec![first.clone(), second.clone()]).unwrap();
            let tokens = tokenizer.tokenize("m").unwrap();
            assert_eq!(tokens[0].module.as_deref(), Some("length"));
        }
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let bad = TokenPattern::new(r"([0-9]+", TokenKind::Number, 0);
        let err = Tokenizer::new(vec![bad]).err().unwrap();
        assert!(matches!(err, ConverterError::InvalidPattern { .. }));
    }
}
