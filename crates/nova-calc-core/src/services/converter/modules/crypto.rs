//! Crypto assets, priced in USD from the rate cache

use std::str::FromStr;
use std::sync::Arc;

use regex::Captures;
use rust_decimal::Decimal;

use super::currency::format_money;
use super::pattern::{group, Handler, PatternRule, PatternSet};
use crate::error::{ConverterError, ConverterResult};
use crate::services::converter::module::Module;
use crate::services::converter::rates::{RateCache, RateRefresher};
use crate::services::converter::token::{Token, TokenKind, TokenPattern};
use crate::services::converter::unit::{CalcResult, Unit, UnitType, BRIDGE_CURRENCY};
use crate::services::format::format_trimmed;

pub const NAME: &str = "crypto";

/// Asset code and CoinGecko id
pub const ASSETS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
    ("BNB", "binancecoin"),
    ("SOL", "solana"),
    ("XRP", "ripple"),
    ("DOGE", "dogecoin"),
    ("ADA", "cardano"),
];

const PRECISION: u32 = 8;

pub fn canonical_code(text: &str) -> Option<&'static str> {
    let upper = text.to_uppercase();
    ASSETS.iter().map(|(code, _)| *code).find(|c| *c == upper)
}

/// `0.5 BTC`
pub fn format_amount(amount: Decimal, code: &str) -> String {
    format!("{} {code}", format_trimmed(amount, PRECISION))
}

pub struct CryptoModule {
    patterns: PatternSet<Self>,
    cache: Arc<RateCache>,
    refresher: Option<RateRefresher>,
}

impl CryptoModule {
    pub fn new(cache: Arc<RateCache>) -> ConverterResult<Self> {
        let codes = ASSETS
            .iter()
            .map(|(code, _)| *code)
            .collect::<Vec<_>>()
            .join("|");
        let rule = |pattern: String, priority, full: bool, handler: Handler<Self>| {
            let mut pattern =
                TokenPattern::new(pattern, TokenKind::Identifier, priority).owned_by(NAME);
            if full {
                pattern = pattern.full_match();
            }
            PatternRule::new(pattern, handler)
        };

        let rules = vec![
            rule(
                format!(r"(?i)({codes})(?:\s+(?:to|in)\s+|\s*/\s*)({codes}|usd)"),
                1000,
                true,
                Self::pair,
            )?,
            rule(
                format!(r"(?i)([0-9]+(?:\.[0-9]+)?)\s*({codes})\b"),
                1000,
                false,
                Self::amount,
            )?,
            rule(format!(r"(?i)({codes})\b"), 950, false, Self::bare)?,
        ];

        Ok(Self {
            patterns: PatternSet::new(NAME, rules),
            cache,
            refresher: None,
        })
    }

    pub fn with_refresher(mut self, refresher: RateRefresher) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    /// USD price of one `unit`; the bridge itself is always 1
    fn price(&self, unit: &str) -> ConverterResult<Decimal> {
        if unit == BRIDGE_CURRENCY {
            return Ok(Decimal::ONE);
        }
        self.cache.price(unit)
    }

    fn result(&self, amount: Decimal, unit: &str) -> CalcResult {
        if unit == BRIDGE_CURRENCY {
            return CalcResult::new(format_money(amount, unit), amount, Unit::usd(), NAME);
        }
        CalcResult::new(
            format_amount(amount, unit),
            amount,
            Unit::new(unit, UnitType::Crypto),
            NAME,
        )
    }

    fn priced(&self, amount: Decimal, code_text: &str) -> ConverterResult<CalcResult> {
        let code = canonical_code(code_text)
            .ok_or_else(|| ConverterError::Conversion(format!("unknown asset: {code_text}")))?;
        self.price(code)?;
        Ok(self.result(amount, code))
    }

    fn amount(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let amount = Decimal::from_str(group(caps, 1))
            .map_err(|e| ConverterError::Conversion(format!("{}: {e}", group(caps, 1))))?;
        self.priced(amount, group(caps, 2))
    }

    /// A bare code is one unit of the asset
    fn bare(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        self.priced(Decimal::ONE, group(caps, 1))
    }

    fn pair(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let one = self.bare(caps)?;
        let to = group(caps, 2).to_uppercase();
        let unit = if to == BRIDGE_CURRENCY {
            Unit::usd()
        } else {
            Unit::new(to, UnitType::Crypto)
        };
        self.convert(&one, &unit)
    }
}

impl Module for CryptoModule {
    fn name(&self) -> &str {
        NAME
    }

    fn token_patterns(&self) -> Vec<TokenPattern> {
        self.patterns.token_patterns()
    }

    fn calculate(&self, token: &Token) -> ConverterResult<Option<CalcResult>> {
        self.patterns.dispatch(self, token)
    }

    /// Between assets and USD: `amount * price(from) / price(to)`
    fn convert(&self, value: &CalcResult, to: &Unit) -> ConverterResult<CalcResult> {
        if !self.can_convert_to(&value.unit.name) || !self.can_convert_to(&to.name) {
            return Err(ConverterError::NoConversionPath {
                from: value.unit.name.clone(),
                to: to.name.clone(),
            });
        }

        let from_price = self.price(&value.unit.name)?;
        let to_price = self.price(&to.name)?;
        if to_price.is_zero() {
            return Err(ConverterError::Conversion(format!("zero price for {}", to.name)));
        }

        let amount = value
            .raw_value
            .checked_mul(from_price)
            .and_then(|usd| usd.checked_div(to_price))
            .ok_or(ConverterError::ArithmeticOverflow)?;
        Ok(self.result(amount, &to.name))
    }

    fn can_convert_to(&self, unit: &str) -> bool {
        unit == BRIDGE_CURRENCY || ASSETS.iter().any(|(code, _)| *code == unit)
    }

    fn resolve_unit(&self, text: &str) -> Option<Unit> {
        canonical_code(text).map(|code| Unit::new(code, UnitType::Crypto))
    }

    fn arithmetic_unit(&self, unit: &Unit) -> Option<Unit> {
        (unit.unit_type == UnitType::Crypto).then(Unit::usd)
    }

    fn refresher(&self) -> Option<&RateRefresher> {
        self.refresher.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::converter::sources::Prices;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn warm_module() -> CryptoModule {
        let cache = Arc::new(RateCache::new(NAME, Duration::from_secs(3600)));
        cache.update(Prices::from([
            ("BTC".to_string(), d("50000")),
            ("ETH".to_string(), d("2500")),
            ("USDT".to_string(), d("1")),
        ]));
        CryptoModule::new(cache).unwrap()
    }

    fn eval(module: &CryptoModule, text: &str) -> ConverterResult<Option<CalcResult>> {
        let token = Token::new(TokenKind::Identifier, text, 0).with_module(Some(NAME.to_string()));
        module.calculate(&token)
    }

    #[test]
    fn test_amount() {
        let module = warm_module();
        let result = eval(&module, "0.5 eth").unwrap().unwrap();
        assert_eq!(result.unit, Unit::new("ETH", UnitType::Crypto));
        assert_eq!(result.display_value, "0.5 ETH");
    }

    #[test]
    fn test_convert_to_usd_and_between_assets() {
        let module = warm_module();
        let btc = eval(&module, "1btc").unwrap().unwrap();

        let usd = module.convert(&btc, &Unit::usd()).unwrap();
        assert_eq!(usd.raw_value, d("50000"));
        assert_eq!(usd.display_value, "$50000.00");

        let eth = module
            .convert(&btc, &Unit::new("ETH", UnitType::Crypto))
            .unwrap();
        assert_eq!(eth.raw_value, d("20"));
        assert_eq!(eth.display_value, "20 ETH");
    }

    #[test]
    fn test_usd_value_converts_to_asset() {
        let module = warm_module();
        let usd = CalcResult::new("$100.00", d("100"), Unit::usd(), "currency");
        let btc = module
            .convert(&usd, &Unit::new("BTC", UnitType::Crypto))
            .unwrap();
        assert_eq!(btc.raw_value, d("0.002"));
        assert_eq!(btc.display_value, "0.002 BTC");
    }

    #[test]
    fn test_pair_lookup() {
        let module = warm_module();
        let result = eval(&module, "eth in btc").unwrap().unwrap();
        assert_eq!(result.raw_value, d("0.05"));
    }

    #[test]
    fn test_cold_cache() {
        let cache = Arc::new(RateCache::new(NAME, Duration::from_secs(3600)));
        let module = CryptoModule::new(cache).unwrap();
        assert!(matches!(
            eval(&module, "1 btc"),
            Err(ConverterError::RateUnavailable { .. })
        ));
    }

    #[test]
    fn test_display_precision() {
        let module = warm_module();
        let usd = CalcResult::new("$1.00", d("1"), Unit::usd(), "currency");
        let btc = module
            .convert(&usd, &Unit::new("BTC", UnitType::Crypto))
            .unwrap();
        // 1 / 50000 = 0.00002
        assert_eq!(btc.display_value, "0.00002 BTC");

        let tiny = module.result(d("0.123456789123"), "ETH");
        assert_eq!(tiny.display_value, "0.12345679 ETH");
    }
}
