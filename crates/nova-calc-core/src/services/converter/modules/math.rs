//! Plain numbers, percentages and the generic vocabulary
//!
//! Registered first, so it owns the patterns every other module relies on:
//! numbers, conversion directives and bare words used as unit names.

use std::str::FromStr;

use regex::Captures;
use rust_decimal::Decimal;

use super::pattern::{group, Handler, PatternRule, PatternSet};
use super::{crypto, currency};
use crate::error::{ConverterError, ConverterResult};
use crate::services::converter::module::Module;
use crate::services::converter::token::{Token, TokenKind, TokenPattern};
use crate::services::converter::unit::{CalcResult, Unit, UnitType, NUMBER};
use crate::services::format::format_number;

pub const NAME: &str = "math";

const NUMBER_PATTERN: &str = r"[0-9]+(?:\.[0-9]+)?";

/// `in`, `to`, `as`, `=?`
const DIRECTIVE_PATTERN: &str = r"(?i)(?:in|to|as)\b|=\s*\?";

/// Bare words and IANA-style paths used as conversion targets
const WORD_PATTERN: &str = r"[a-zA-Z][a-zA-Z_]*(?:/[a-zA-Z_]+)*";

const PRIORITY_PERCENT_OF_SYMBOL: i32 = 1300;
const PRIORITY_PERCENT_OF_MONEY: i32 = 1250;
const PRIORITY_PERCENT_OF: i32 = 1100;
const PRIORITY_PERCENT: i32 = 1050;
const PRIORITY_DIRECTIVE: i32 = 500;
const PRIORITY_NUMBER: i32 = 0;
const PRIORITY_WORD: i32 = -10;

pub struct MathModule {
    patterns: PatternSet<Self>,
}

impl MathModule {
    pub fn new() -> ConverterResult<Self> {
        let rule = |pattern: String, kind, priority, handler: Handler<Self>| {
            PatternRule::new(TokenPattern::new(pattern, kind, priority).owned_by(NAME), handler)
        };

        let codes = currency::CODES
            .iter()
            .chain(crypto::ASSETS.iter().map(|(code, _)| code))
            .copied()
            .collect::<Vec<_>>()
            .join("|");

        let rules = vec![
            rule(
                format!(r"({NUMBER_PATTERN})\s*%\s*of\s+([$€£¥])\s*({NUMBER_PATTERN})"),
                TokenKind::Identifier,
                PRIORITY_PERCENT_OF_SYMBOL,
                Self::percent_of_symbol,
            )?,
            rule(
                format!(r"(?i)({NUMBER_PATTERN})\s*%\s*of\s+({NUMBER_PATTERN})\s*({codes})\b"),
                TokenKind::Identifier,
                PRIORITY_PERCENT_OF_MONEY,
                Self::percent_of_money,
            )?,
            rule(
                format!(r"(?i)({NUMBER_PATTERN})\s*%\s*of\s+({NUMBER_PATTERN})"),
                TokenKind::Identifier,
                PRIORITY_PERCENT_OF,
                Self::percent_of,
            )?,
            rule(
                format!(r"({NUMBER_PATTERN})\s*%"),
                TokenKind::Identifier,
                PRIORITY_PERCENT,
                Self::percent,
            )?,
            rule(
                NUMBER_PATTERN.to_string(),
                TokenKind::Number,
                PRIORITY_NUMBER,
                Self::number,
            )?,
        ];

        Ok(Self {
            patterns: PatternSet::new(NAME, rules),
        })
    }

    fn result(&self, raw: Decimal) -> CalcResult {
        CalcResult::new(format_number(raw), raw, Unit::number(), NAME)
    }

    fn number(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        Ok(self.result(parse(group(caps, 0))?))
    }

    /// `12%` is 0.12, shown as typed
    fn percent(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let pct = parse(group(caps, 1))?;
        Ok(CalcResult::new(
            format!("{}%", format_number(pct)),
            pct / Decimal::ONE_HUNDRED,
            Unit::number(),
            NAME,
        ))
    }

    fn percent_of(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        Ok(self.result(share(group(caps, 1), group(caps, 2))?))
    }

    /// `12% of $321`
    fn percent_of_symbol(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let code = currency::code_for_symbol(group(caps, 2)).ok_or_else(|| {
            ConverterError::Conversion(format!("unknown currency symbol: {}", group(caps, 2)))
        })?;
        money(share(group(caps, 1), group(caps, 3))?, code)
    }

    /// `12% of 100 usd`, `12% of 1 btc`
    fn percent_of_money(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        money(share(group(caps, 1), group(caps, 2))?, group(caps, 3))
    }
}

/// `pct` percent of `base`
fn share(pct: &str, base: &str) -> ConverterResult<Decimal> {
    let raw = parse(pct)?
        .checked_mul(parse(base)?)
        .ok_or(ConverterError::ArithmeticOverflow)?;
    Ok(raw / Decimal::ONE_HUNDRED)
}

/// An amount of money, owned by the module that prices `code` so that
/// normalization and conversion go through its rates
fn money(amount: Decimal, code: &str) -> ConverterResult<CalcResult> {
    if let Some(code) = currency::canonical_code(code) {
        return Ok(CalcResult::new(
            currency::format_money(amount, code),
            amount,
            Unit::currency(code),
            currency::NAME,
        ));
    }
    let code = crypto::canonical_code(code)
        .ok_or_else(|| ConverterError::Conversion(format!("unknown currency: {code}")))?;
    Ok(CalcResult::new(
        crypto::format_amount(amount, code),
        amount,
        Unit::new(code, UnitType::Crypto),
        crypto::NAME,
    ))
}

fn parse(text: &str) -> ConverterResult<Decimal> {
    Decimal::from_str(text).map_err(|e| ConverterError::Conversion(format!("{text}: {e}")))
}

impl Module for MathModule {
    fn name(&self) -> &str {
        NAME
    }

    fn token_patterns(&self) -> Vec<TokenPattern> {
        let mut patterns = self.patterns.token_patterns();
        patterns.push(
            TokenPattern::new(
                DIRECTIVE_PATTERN,
                TokenKind::ConversionDirective,
                PRIORITY_DIRECTIVE,
            )
            .owned_by(NAME),
        );
        patterns.push(
            TokenPattern::new(WORD_PATTERN, TokenKind::Identifier, PRIORITY_WORD).owned_by(NAME),
        );
        patterns
    }

    fn calculate(&self, token: &Token) -> ConverterResult<Option<CalcResult>> {
        self.patterns.dispatch(self, token)
    }

    fn convert(&self, value: &CalcResult, to: &Unit) -> ConverterResult<CalcResult> {
        if !value.unit.is_number() || !to.is_number() {
            return Err(ConverterError::NoConversionPath {
                from: value.unit.name.clone(),
                to: to.name.clone(),
            });
        }
        Ok(self.result(value.raw_value))
    }

    fn can_convert_to(&self, unit: &str) -> bool {
        unit == NUMBER
    }

    fn resolve_unit(&self, text: &str) -> Option<Unit> {
        matches!(text.to_lowercase().as_str(), "number" | "num" | "decimal").then(Unit::number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: TokenKind, text: &str) -> Token {
        Token::new(kind, text, 0).with_module(Some(NAME.to_string()))
    }

    fn eval(kind: TokenKind, text: &str) -> CalcResult {
        MathModule::new()
            .unwrap()
            .calculate(&token(kind, text))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_number() {
        let result = eval(TokenKind::Number, "3.50");
        assert_eq!(result.raw_value, Decimal::from_str("3.5").unwrap());
        assert_eq!(result.display_value, "3.5");
        assert!(result.unit.is_number());
    }

    #[test]
    fn test_percent() {
        let result = eval(TokenKind::Identifier, "12%");
        assert_eq!(result.raw_value, Decimal::from_str("0.12").unwrap());
        assert_eq!(result.display_value, "12%");
        assert!(result.unit.is_number());
    }

    #[test]
    fn test_percent_of_symbol_amount() {
        let result = eval(TokenKind::Identifier, "12% of $321");
        assert_eq!(result.raw_value, Decimal::from_str("38.52").unwrap());
        assert_eq!(result.unit, Unit::usd());
        assert_eq!(result.module, currency::NAME);
        assert_eq!(result.display_value, "$38.52");
    }

    #[test]
    fn test_percent_of_currency_and_crypto() {
        let result = eval(TokenKind::Identifier, "12% of 100 eur");
        assert_eq!(result.unit, Unit::currency("EUR"));
        assert_eq!(result.display_value, "€12.00");

        let result = eval(TokenKind::Identifier, "12% of 1 BTC");
        assert_eq!(result.unit, Unit::new("BTC", UnitType::Crypto));
        assert_eq!(result.module, crypto::NAME);
        assert_eq!(result.display_value, "0.12 BTC");
    }

    #[test]
    fn test_percent_of() {
        let result = eval(TokenKind::Identifier, "12% of 321");
        assert_eq!(result.display_value, "38.52");
    }

    #[test]
    fn test_bare_word_is_not_a_value() {
        let math = MathModule::new().unwrap();
        let word = token(TokenKind::Identifier, "eur");
        assert!(math.calculate(&word).unwrap().is_none());
    }

    #[test]
    fn test_resolve_unit() {
        let math = MathModule::new().unwrap();
        assert_eq!(math.resolve_unit("Number"), Some(Unit::number()));
        assert_eq!(math.resolve_unit("eur"), None);
    }
}
