//! Fiat currencies, priced from the rate cache

use std::str::FromStr;
use std::sync::Arc;

use regex::Captures;
use rust_decimal::Decimal;

use super::pattern::{group, Handler, PatternRule, PatternSet};
use crate::error::{ConverterError, ConverterResult};
use crate::services::converter::module::Module;
use crate::services::converter::rates::{RateCache, RateRefresher};
use crate::services::converter::token::{Token, TokenKind, TokenPattern};
use crate::services::converter::unit::{CalcResult, Unit, UnitType, BRIDGE_CURRENCY};
use crate::services::format::format_fixed;

pub const NAME: &str = "currency";

/// ISO 4217 codes this module recognizes
pub const CODES: &[&str] = &[
    "USD", "EUR", "JPY", "BGN", "CZK", "DKK", "GBP", "HUF", "PLN", "RON", "SEK", "CHF", "ISK",
    "NOK", "TRY", "AUD", "BRL", "CAD", "CNY", "HKD", "IDR", "ILS", "INR", "KRW", "MXN", "MYR",
    "NZD", "PHP", "SGD", "THB", "ZAR",
];

/// Display prefix per code
const SYMBOLS: &[(&str, &str)] = &[
    ("USD", "$"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("JPY", "¥"),
    ("AUD", "A$"),
    ("CAD", "C$"),
    ("INR", "₹"),
    ("KRW", "₩"),
];

/// Prefix symbols accepted in input
pub fn code_for_symbol(symbol: &str) -> Option<&'static str> {
    match symbol {
        "$" => Some("USD"),
        "€" => Some("EUR"),
        "£" => Some("GBP"),
        "¥" => Some("JPY"),
        _ => None,
    }
}

/// The listed code spelled by `text`, any case
pub fn canonical_code(text: &str) -> Option<&'static str> {
    let upper = text.to_uppercase();
    CODES.iter().copied().find(|c| *c == upper)
}

/// `$1234.50`, `-€3.00`, `100.00 CHF`
pub fn format_money(amount: Decimal, code: &str) -> String {
    let fixed = format_fixed(amount.abs(), 2);
    let sign = if amount.is_sign_negative() && !amount.round_dp(2).is_zero() {
        "-"
    } else {
        ""
    };
    match SYMBOLS.iter().find(|(c, _)| *c == code) {
        Some((_, symbol)) => format!("{sign}{symbol}{fixed}"),
        None => format!("{sign}{fixed} {code}"),
    }
}

pub struct CurrencyModule {
    patterns: PatternSet<Self>,
    cache: Arc<RateCache>,
    refresher: Option<RateRefresher>,
}

impl CurrencyModule {
    /// A module reading `cache`, with nothing refreshing it
    pub fn new(cache: Arc<RateCache>) -> ConverterResult<Self> {
        let codes = CODES.join("|");
        let amount = r"[0-9]+(?:\.[0-9]+)?";
        let rule = |pattern: String, full: bool, handler: Handler<Self>| {
            let mut pattern =
                TokenPattern::new(pattern, TokenKind::Identifier, 1000).owned_by(NAME);
            if full {
                pattern = pattern.full_match();
            }
            PatternRule::new(pattern, handler)
        };

        let rules = vec![
            rule(
                format!(r"(?i)({codes})(?:\s+(?:to|in)\s+|\s*/\s*)({codes})"),
                true,
                Self::pair,
            )?,
            rule(format!(r"(?i)({amount})\s*({codes})\b"), false, Self::amount)?,
            rule(format!(r"([$€£¥])\s*({amount})"), false, Self::symbol_amount)?,
        ];

        Ok(Self {
            patterns: PatternSet::new(NAME, rules),
            cache,
            refresher: None,
        })
    }

    /// Attach the task that keeps the cache current
    pub fn with_refresher(mut self, refresher: RateRefresher) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    fn money(&self, amount: Decimal, code: &str) -> CalcResult {
        CalcResult::new(
            format_money(amount, code),
            amount,
            Unit::currency(code),
            NAME,
        )
    }

    /// A value in `code`, provided the cache can price it
    fn priced(&self, amount: &str, code: &str) -> ConverterResult<CalcResult> {
        let amount = Decimal::from_str(amount)
            .map_err(|e| ConverterError::Conversion(format!("{amount}: {e}")))?;
        self.cache.price(code)?;
        Ok(self.money(amount, code))
    }

    fn amount(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let code = canonical_code(group(caps, 2)).ok_or_else(|| {
            ConverterError::Conversion(format!("unknown currency: {}", group(caps, 2)))
        })?;
        self.priced(group(caps, 1), code)
    }

    fn symbol_amount(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let code = code_for_symbol(group(caps, 1)).ok_or_else(|| {
            ConverterError::Conversion(format!("unknown currency symbol: {}", group(caps, 1)))
        })?;
        self.priced(group(caps, 2), code)
    }

    /// Value of one unit of the first currency in the second
    fn pair(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let unknown = |text: &str| ConverterError::Conversion(format!("unknown currency: {text}"));
        let from = canonical_code(group(caps, 1)).ok_or_else(|| unknown(group(caps, 1)))?;
        let to = canonical_code(group(caps, 2)).ok_or_else(|| unknown(group(caps, 2)))?;
        let one = self.money(Decimal::ONE, from);
        self.convert(&one, &Unit::currency(to))
    }
}

impl Module for CurrencyModule {
    fn name(&self) -> &str {
        NAME
    }

    fn token_patterns(&self) -> Vec<TokenPattern> {
        self.patterns.token_patterns()
    }

    fn calculate(&self, token: &Token) -> ConverterResult<Option<CalcResult>> {
        self.patterns.dispatch(self, token)
    }

    /// `amount * price(from) / price(to)`, prices in USD per unit
    fn convert(&self, value: &CalcResult, to: &Unit) -> ConverterResult<CalcResult> {
        if !self.can_convert_to(&value.unit.name) || !self.can_convert_to(&to.name) {
            return Err(ConverterError::NoConversionPath {
                from: value.unit.name.clone(),
                to: to.name.clone(),
            });
        }

        let from_price = self.cache.price(&value.unit.name)?;
        let to_price = self.cache.price(&to.name)?;
        if to_price.is_zero() {
            return Err(ConverterError::Conversion(format!("zero rate for {}", to.name)));
        }

        let amount = value
            .raw_value
            .checked_mul(from_price)
            .and_then(|usd| usd.checked_div(to_price))
            .ok_or(ConverterError::ArithmeticOverflow)?;
        Ok(self.money(amount, &to.name))
    }

    fn can_convert_to(&self, unit: &str) -> bool {
        CODES.contains(&unit)
    }

    fn resolve_unit(&self, text: &str) -> Option<Unit> {
        canonical_code(text).map(Unit::currency)
    }

    fn arithmetic_unit(&self, unit: &Unit) -> Option<Unit> {
        (unit.unit_type == UnitType::Currency && unit.name != BRIDGE_CURRENCY).then(Unit::usd)
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

    fn warm_module() -> CurrencyModule {
        let cache = Arc::new(RateCache::new(NAME, Duration::from_secs(3600)));
        cache.update(Prices::from([
            ("USD".to_string(), Decimal::ONE),
            ("EUR".to_string(), d("1.25")),
            ("GBP".to_string(), d("1.5")),
            ("CHF".to_string(), d("1.1")),
        ]));
        CurrencyModule::new(cache).unwrap()
    }

    fn eval(module: &CurrencyModule, text: &str) -> ConverterResult<Option<CalcResult>> {
        let token = Token::new(TokenKind::Identifier, text, 0).with_module(Some(NAME.to_string()));
        module.calculate(&token)
    }

    #[test]
    fn test_amount_forms() {
        let module = warm_module();
        for text in ["100usd", "100 USD", "$100", "$ 100"] {
            let result = eval(&module, text).unwrap().unwrap();
            assert_eq!(result.unit, Unit::usd(), "{text}");
            assert_eq!(result.raw_value, Decimal::from(100), "{text}");
            assert_eq!(result.display_value, "$100.00", "{text}");
        }
        let pounds = eval(&module, "£20").unwrap().unwrap();
        assert_eq!(pounds.unit.name, "GBP");
    }

    #[test]
    fn test_convert() {
        let module = warm_module();
        let usd = eval(&module, "100usd").unwrap().unwrap();
        let eur = module.convert(&usd, &Unit::currency("EUR")).unwrap();
        assert_eq!(eur.raw_value, d("80"));
        assert_eq!(eur.display_value, "€80.00");

        let chf = module.convert(&eur, &Unit::currency("CHF")).unwrap();
        assert_eq!(chf.display_value, "90.91 CHF");
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let module = warm_module();
        let usd = eval(&module, "123.45 usd").unwrap().unwrap();
        let chf = module.convert(&usd, &Unit::currency("CHF")).unwrap();
        let back = module.convert(&chf, &usd.unit).unwrap();
        assert!((back.raw_value - usd.raw_value).abs() < d("0.0000000001"));
    }

    #[test]
    fn test_pair_lookup() {
        let module = warm_module();
        let result = eval(&module, "gbp to eur").unwrap().unwrap();
        assert_eq!(result.raw_value, d("1.2"));
        assert_eq!(result.unit.name, "EUR");
    }

    #[test]
    fn test_cold_cache() {
        let cache = Arc::new(RateCache::new(NAME, Duration::from_secs(3600)));
        let module = CurrencyModule::new(cache).unwrap();
        assert!(matches!(
            eval(&module, "100usd"),
            Err(ConverterError::RateUnavailable { .. })
        ));
        // Static code list: the module still claims the unit
        assert!(module.can_convert_to("EUR"));
    }

    #[test]
    fn test_unpriced_code_is_unavailable() {
        let module = warm_module();
        assert!(matches!(
            eval(&module, "5 jpy"),
            Err(ConverterError::RateUnavailable { ref unit }) if unit == "JPY"
        ));
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(d("92"), "EUR"), "€92.00");
        assert_eq!(format_money(d("100"), "CHF"), "100.00 CHF");
        assert_eq!(format_money(d("-3"), "USD"), "-$3.00");
        assert_eq!(format_money(d("-0.001"), "USD"), "$0.00");
    }

    #[test]
    fn test_arithmetic_unit() {
        let module = warm_module();
        assert_eq!(
            module.arithmetic_unit(&Unit::currency("EUR")),
            Some(Unit::usd())
        );
        assert_eq!(module.arithmetic_unit(&Unit::usd()), None);
    }
}
