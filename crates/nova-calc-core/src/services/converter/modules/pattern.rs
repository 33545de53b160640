//! Regex-dispatched token handling shared by the concrete modules

use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{ConverterError, ConverterResult};
use crate::services::converter::token::{Token, TokenPattern};
use crate::services::converter::unit::CalcResult;

/// Turns the captures of a matched token into a value
pub type Handler<M> = fn(&M, &Captures<'_>) -> ConverterResult<CalcResult>;

/// A token pattern plus the handler that evaluates tokens it produced
pub struct PatternRule<M> {
    pub pattern: TokenPattern,
    regex: Regex,
    handler: Handler<M>,
}

impl<M> PatternRule<M> {
    pub fn new(pattern: TokenPattern, handler: Handler<M>) -> ConverterResult<Self> {
        let anchored = format!("^(?:{})$", pattern.pattern);
        let regex = Regex::new(&anchored).map_err(|source| ConverterError::InvalidPattern {
            pattern: pattern.pattern.clone(),
            source,
        })?;
        Ok(Self {
            pattern,
            regex,
            handler,
        })
    }
}

/// A module's rules, ordered like the tokenizer orders them
pub struct PatternSet<M> {
    module: String,
    rules: Vec<PatternRule<M>>,
}

impl<M> PatternSet<M> {
    pub fn new(module: impl Into<String>, mut rules: Vec<PatternRule<M>>) -> Self {
        rules.sort_by(|a, b| b.pattern.priority.cmp(&a.pattern.priority));
        Self {
            module: module.into(),
            rules,
        }
    }

    pub fn token_patterns(&self) -> Vec<TokenPattern> {
        self.rules.iter().map(|r| r.pattern.clone()).collect()
    }

    /// Evaluate `token` with the first rule whose pattern matches its text.
    ///
    /// Tokens produced by another module's patterns are not ours.
    pub fn dispatch(&self, module: &M, token: &Token) -> ConverterResult<Option<CalcResult>> {
        if token.module.as_deref() != Some(self.module.as_str()) {
            return Ok(None);
        }

        for rule in &self.rules {
            if let Some(caps) = rule.regex.captures(&token.text) {
                let result = (rule.handler)(module, &caps)?;
                debug!(
                    module = %self.module,
                    token = %token.text,
                    raw = %result.raw_value,
                    unit = %result.unit,
                    "token evaluated"
                );
                return Ok(Some(result));
            }
        }

        Ok(None)
    }
}

/// Text of capture group `i`, or empty
pub fn group<'t>(caps: &Captures<'t>, i: usize) -> &'t str {
    caps.get(i).map(|m| m.as_str()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::converter::token::TokenKind;
    use crate::services::converter::unit::Unit;
    use rust_decimal::Decimal;

    struct Doubler;

    fn double(_: &Doubler, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let n: Decimal = group(caps, 1)
            .parse()
            .map_err(|_| ConverterError::Conversion("bad number".to_string()))?;
        let raw = n * Decimal::from(2);
        Ok(CalcResult::new(raw.to_string(), raw, Unit::number(), "doubler"))
    }

    fn set() -> PatternSet<Doubler> {
        let rule = PatternRule::new(
            TokenPattern::new(r"(\d+)x", TokenKind::Identifier, 5).owned_by("doubler"),
            double,
        )
        .unwrap();
        PatternSet::new("doubler", vec![rule])
    }

    #[test]
    fn test_dispatch_own_token() {
        let token = Token::new(TokenKind::Identifier, "21x", 0).with_module(Some("doubler".into()));
        let result = set().dispatch(&Doubler, &token).unwrap().unwrap();
        assert_eq!(result.raw_value, Decimal::from(42));
    }

    #[test]
    fn test_foreign_token_not_handled() {
        let token = Token::new(TokenKind::Identifier, "21x", 0).with_module(Some("other".into()));
        assert!(set().dispatch(&Doubler, &token).unwrap().is_none());
    }

    #[test]
    fn test_unmatched_text_not_handled() {
        let token = Token::new(TokenKind::Identifier, "21y", 0).with_module(Some("doubler".into()));
        assert!(set().dispatch(&Doubler, &token).unwrap().is_none());
    }
}
