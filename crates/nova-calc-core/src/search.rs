use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::{Config, CurrencyConfig};
use crate::error::{ConverterError, ConverterResult};
use crate::executor::ExecutionAction;
use crate::services::converter::modules::{crypto, currency};
use crate::services::converter::*;

/// Icon name hosts show next to converter results
pub const ICON: &str = "accessories-calculator";

/// A result row handed to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub title: String,
    pub subtitle: String,
    pub icon: String,
    pub actions: Vec<ExecutionAction>,
}

impl QueryResult {
    fn from_calc(expression: &str, result: &CalcResult) -> Self {
        Self {
            title: result.display_value.clone(),
            subtitle: expression.to_string(),
            icon: ICON.to_string(),
            actions: vec![
                ExecutionAction::CopyToClipboard {
                    content: result.display_value.clone(),
                    notification: format!("{} = {}", expression, result.display_value),
                },
                ExecutionAction::AddToFavorite {
                    expression: expression.to_string(),
                    result: result.display_value.clone(),
                },
            ],
        }
    }
}

/// How network-backed modules get their first rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Refresh tasks fetch as soon as they start
    Background,
    /// Refresh tasks wait for `refresh_all` or their interval
    OnDemand,
    /// No refresh tasks; caches stay cold
    Offline,
}

impl Startup {
    fn refresher(
        self,
        runtime: &Handle,
        cache: Arc<RateCache>,
        source: Arc<dyn RateSource>,
        interval: Duration,
    ) -> Option<RateRefresher> {
        match self {
            Startup::Background => Some(RateRefresher::spawn(runtime, cache, source, interval)),
            Startup::OnDemand => Some(RateRefresher::spawn_idle(runtime, cache, source, interval)),
            Startup::Offline => None,
        }
    }
}

/// The converter as a launcher plugin: one registry, one tokenizer
pub struct ConverterPlugin {
    registry: ModuleRegistry,
    tokenizer: Tokenizer,
    display_currency: Unit,
}

impl ConverterPlugin {
    /// Register the modules enabled in `config`, starting their refresh tasks on
    /// `runtime` as `startup` says
    pub fn init(config: &Config, runtime: &Handle, startup: Startup) -> ConverterResult<Self> {
        let mut registry = ModuleRegistry::new();
        registry.register(Box::new(MathModule::new()?));
        registry.register(Box::new(TimeModule::new()?));

        if config.currency.enabled {
            let cache = Arc::new(RateCache::new(currency::NAME, config.currency.stale_after()));
            let mut module = CurrencyModule::new(Arc::clone(&cache))?;
            if let Some(refresher) = startup.refresher(
                runtime,
                cache,
                Arc::new(fiat_sources(&config.currency)?),
                config.currency.refresh_interval(),
            ) {
                module = module.with_refresher(refresher);
            }
            registry.register(Box::new(module));
        }

        if config.crypto.enabled {
            let cache = Arc::new(RateCache::new(crypto::NAME, config.crypto.stale_after()));
            let mut module = CryptoModule::new(Arc::clone(&cache))?;
            if let Some(refresher) = startup.refresher(
                runtime,
                cache,
                Arc::new(CoinGeckoSource::new(crypto::ASSETS.to_vec())?),
                config.crypto.refresh_interval(),
            ) {
                module = module.with_refresher(refresher);
            }
            registry.register(Box::new(module));
        }

        let display_currency = registry
            .resolve_unit(&config.general.display_currency)
            .filter(|unit| unit.unit_type.is_monetary())
            .unwrap_or_else(|| {
                warn!(
                    currency = %config.general.display_currency,
                    "unknown display currency, using USD"
                );
                Unit::usd()
            });

        info!(modules = registry.len(), ?startup, "converter initialized");
        Ok(Self::from_registry(registry)?.with_display_currency(display_currency))
    }

    /// Build a plugin around an already populated registry
    pub fn from_registry(registry: ModuleRegistry) -> ConverterResult<Self> {
        let tokenizer = Tokenizer::new(registry.get_token_patterns())?;
        Ok(Self {
            registry,
            tokenizer,
            display_currency: Unit::usd(),
        })
    }

    pub fn with_display_currency(mut self, unit: Unit) -> Self {
        self.display_currency = unit;
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Results for `text`. Failures are logged and produce no results.
    pub fn query(&self, text: &str) -> Vec<QueryResult> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        match self.evaluate(text) {
            Ok(result) => vec![QueryResult::from_calc(text, &result)],
            Err(ConverterError::Tokenize(e)) => {
                debug!("no result, invalid token:\n{}", e.caret_message());
                Vec::new()
            }
            Err(e) => {
                debug!(query = text, error = %e, "no result");
                Vec::new()
            }
        }
    }

    /// Tokenize and evaluate `text`, keeping the error
    pub fn evaluate(&self, text: &str) -> ConverterResult<CalcResult> {
        let tokens = self.tokenizer.tokenize(text)?;
        debug!(
            tokens = ?tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(),
            "tokenized"
        );
        Evaluator::new(&self.registry)
            .with_display_currency(self.display_currency.clone())
            .evaluate(&tokens)
    }

    /// Ask every network-backed module to refresh now.
    ///
    /// Returns the outcome per cache. Failures leave the caches as they were.
    pub async fn refresh_all(&self) -> Vec<(String, Result<usize, SourceError>)> {
        let mut outcomes = Vec::new();
        for refresher in self.registry.refreshers() {
            let outcome = refresher.refresh_now().await;
            if let Err(ref e) = outcome {
                warn!(cache = refresher.name(), error = %e, "refresh failed");
            }
            outcomes.push((refresher.name().to_string(), outcome));
        }
        outcomes
    }

    /// Stop every refresh task
    pub async fn shutdown(&self) {
        for refresher in self.registry.refreshers() {
            refresher.shutdown().await;
        }
    }
}

/// Fiat sources named in the config, in order
fn fiat_sources(config: &CurrencyConfig) -> ConverterResult<SourceChain> {
    let mut sources: Vec<Box<dyn RateSource>> = Vec::new();
    for name in &config.sources {
        match name.trim().to_lowercase().as_str() {
            "er-api" => sources.push(Box::new(ErApiSource::new()?)),
            "ecb" => sources.push(Box::new(EcbSource::new()?)),
            other => warn!(source = other, "unknown rate source, skipping"),
        }
    }
    if sources.is_empty() {
        sources.push(Box::new(ErApiSource::new()?));
    }
    Ok(SourceChain::new(sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn plugin() -> ConverterPlugin {
        let fiat = Arc::new(RateCache::new(currency::NAME, Duration::from_secs(3600)));
        fiat.update(Prices::from([
            ("USD".to_string(), Decimal::ONE),
            ("EUR".to_string(), Decimal::new(125, 2)),
        ]));
        let coins = Arc::new(RateCache::new(crypto::NAME, Duration::from_secs(3600)));
        coins.update(Prices::from([("BTC".to_string(), Decimal::from(50_000))]));

        let mut registry = ModuleRegistry::new();
        registry.register(Box::new(MathModule::new().unwrap()));
        registry.register(Box::new(TimeModule::new().unwrap()));
        registry.register(Box::new(CurrencyModule::new(fiat).unwrap()));
        registry.register(Box::new(CryptoModule::new(coins).unwrap()));
        ConverterPlugin::from_registry(registry).unwrap()
    }

    #[test]
    fn test_empty_query() {
        assert!(plugin().query("").is_empty());
        assert!(plugin().query("   ").is_empty());
    }

    #[test]
    fn test_failures_are_quiet() {
        let plugin = plugin();
        assert!(plugin.query("1 + @").is_empty());
        assert!(plugin.query("1 +").is_empty());
        assert!(plugin.query("5 usd in parsecs").is_empty());
    }

    #[test]
    fn test_query_result_shape() {
        let results = plugin().query("100usd in eur");
        assert_eq!(results.len(), 1);

        let result = &results[0];
        assert_eq!(result.title, "€80.00");
        assert_eq!(result.subtitle, "100usd in eur");
        assert_eq!(result.icon, ICON);
        assert_eq!(
            result.actions,
            vec![
                ExecutionAction::CopyToClipboard {
                    content: "€80.00".to_string(),
                    notification: "100usd in eur = €80.00".to_string(),
                },
                ExecutionAction::AddToFavorite {
                    expression: "100usd in eur".to_string(),
                    result: "€80.00".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_evaluate_keeps_error() {
        let err = plugin().evaluate("1 + @").unwrap_err();
        match err {
            ConverterError::Tokenize(e) => assert_eq!(e.position, 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_display_currency() {
        let plugin = plugin().with_display_currency(Unit::currency("EUR"));
        let result = plugin.evaluate("1btc + 100usd").unwrap();
        assert_eq!(result.unit.name, "EUR");
        assert_eq!(result.raw_value, Decimal::from(40_080));
    }

    #[tokio::test]
    async fn test_init_without_network_modules() {
        let mut config = Config::default();
        config.currency.enabled = false;
        config.crypto.enabled = false;

        let plugin =
            ConverterPlugin::init(&config, &Handle::current(), Startup::Background).unwrap();
        assert_eq!(plugin.registry().len(), 2);
        assert!(plugin.refresh_all().await.is_empty());
        assert_eq!(plugin.query("1+2*3")[0].title, "9");
    }

    #[tokio::test]
    async fn test_offline_init_leaves_caches_cold() {
        let plugin =
            ConverterPlugin::init(&Config::default(), &Handle::current(), Startup::Offline)
                .unwrap();
        assert_eq!(plugin.registry().len(), 4);
        assert_eq!(plugin.registry().refreshers().count(), 0);
        assert!(plugin.refresh_all().await.is_empty());

        for expression in ["100 usd in eur", "1 btc"] {
            assert!(
                matches!(
                    plugin.evaluate(expression),
                    Err(ConverterError::RateUnavailable { .. })
                ),
                "{expression}"
            );
        }
        assert_eq!(plugin.query("2 + 2")[0].title, "4");
    }
}
