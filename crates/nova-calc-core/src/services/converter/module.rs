//! The contract every conversion module implements

use super::rates::RateRefresher;
use super::token::{Token, TokenPattern};
use super::unit::{CalcResult, Unit};
use crate::error::ConverterResult;

/// A pluggable family of units (math, time, currency, crypto, ...).
///
/// Modules are shared across query threads, so everything here takes `&self`.
/// Modules with mutable state (rate caches) synchronize internally.
pub trait Module: Send + Sync {
    /// Unique name, stored in every `CalcResult` the module produces
    fn name(&self) -> &str;

    /// Vocabulary this module contributes to the tokenizer
    fn token_patterns(&self) -> Vec<TokenPattern>;

    /// Try to evaluate a single token.
    ///
    /// `Ok(None)` means "not mine"; the evaluator moves on to the next module.
    fn calculate(&self, token: &Token) -> ConverterResult<Option<CalcResult>>;

    /// Convert a value (produced by this module, or a bridge value) to `to`
    fn convert(&self, value: &CalcResult, to: &Unit) -> ConverterResult<CalcResult>;

    /// Whether this module can produce values in the named unit
    fn can_convert_to(&self, unit: &str) -> bool;

    /// Resolve a conversion target token (`eur`, `tokyo`, `hours`) to a unit
    fn resolve_unit(&self, text: &str) -> Option<Unit>;

    /// Unit operands are brought to before arithmetic, if not their own
    fn arithmetic_unit(&self, _unit: &Unit) -> Option<Unit> {
        None
    }

    /// Background rate refresher, for modules backed by a rate cache
    fn refresher(&self) -> Option<&RateRefresher> {
        None
    }
}
