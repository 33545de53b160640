//! Network rate sources
//!
//! Sources are only ever called from refresh tasks, never from the query
//! path. Each one returns a price table: unit code to the price of one unit
//! in USD. Payload parsing lives in plain functions so it can be tested
//! without the network.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::unit::BRIDGE_CURRENCY;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub const ER_API_URL: &str = "https://open.er-api.com/v6/latest/USD";
pub const ECB_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-daily.xml";
pub const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Unit code to price of one unit in USD
pub type Prices = HashMap<String, Decimal>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("payload has no {0} rate")]
    MissingRate(String),

    #[error("all sources failed: {0}")]
    Exhausted(String),

    #[error("refresh task is not running")]
    Stopped,
}

/// Something that can produce a fresh price table
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Prices, SourceError>;
}

fn http_client() -> Result<Client, SourceError> {
    Ok(Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("nova-calc/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn decimal_from_f64(value: f64, code: &str) -> Result<Decimal, SourceError> {
    Decimal::try_from(value)
        .map_err(|_| SourceError::Malformed(format!("{code} rate {value} is not a finite decimal")))
}

// ============================================================================
// open.er-api.com
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErApiResponse {
    result: String,
    base_code: String,
    rates: HashMap<String, f64>,
}

/// Parse an er-api payload. Rates there are units per one USD.
pub fn parse_er_api(body: &str) -> Result<Prices, SourceError> {
    let response: ErApiResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    if response.result != "success" {
        return Err(SourceError::Malformed(format!("result is {}", response.result)));
    }
    if response.base_code != BRIDGE_CURRENCY {
        return Err(SourceError::Malformed(format!("base is {}", response.base_code)));
    }

    let mut prices = Prices::new();
    for (code, rate) in response.rates {
        let rate = decimal_from_f64(rate, &code)?;
        match Decimal::ONE.checked_div(rate) {
            Some(price) if !rate.is_zero() => {
                prices.insert(code.to_uppercase(), price);
            }
            _ => debug!(code = %code, "skipping zero rate"),
        }
    }
    prices.insert(BRIDGE_CURRENCY.to_string(), Decimal::ONE);
    Ok(prices)
}

pub struct ErApiSource {
    client: Client,
    url: String,
}

impl ErApiSource {
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client()?,
            url: ER_API_URL.to_string(),
        })
    }
}

#[async_trait]
impl RateSource for ErApiSource {
    fn name(&self) -> &str {
        "er-api"
    }

    async fn fetch(&self) -> Result<Prices, SourceError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_er_api(&body)
    }
}

// ============================================================================
// European Central Bank
// ============================================================================

const ECB_CUBE: &str = r#"currency=['"]([A-Z]{3})['"]\s+rate=['"]([0-9.]+)['"]"#;

/// Parse the ECB daily reference XML. Rates there are units per one EUR.
pub fn parse_ecb(body: &str) -> Result<Prices, SourceError> {
    let cube = Regex::new(ECB_CUBE).map_err(|e| SourceError::Malformed(e.to_string()))?;
    let mut per_eur = HashMap::new();
    for cap in cube.captures_iter(body) {
        let rate = Decimal::from_str(&cap[2])
            .map_err(|e| SourceError::Malformed(format!("{}: {e}", &cap[1])))?;
        if !rate.is_zero() {
            per_eur.insert(cap[1].to_string(), rate);
        }
    }

    let usd_per_eur = *per_eur
        .get(BRIDGE_CURRENCY)
        .ok_or_else(|| SourceError::MissingRate(BRIDGE_CURRENCY.to_string()))?;

    let mut prices: Prices = per_eur
        .into_iter()
        .filter_map(|(code, rate)| usd_per_eur.checked_div(rate).map(|price| (code, price)))
        .collect();
    prices.insert("EUR".to_string(), usd_per_eur);
    prices.insert(BRIDGE_CURRENCY.to_string(), Decimal::ONE);
    Ok(prices)
}

pub struct EcbSource {
    client: Client,
    url: String,
}

impl EcbSource {
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client()?,
            url: ECB_URL.to_string(),
        })
    }
}

#[async_trait]
impl RateSource for EcbSource {
    fn name(&self) -> &str {
        "ecb"
    }

    async fn fetch(&self) -> Result<Prices, SourceError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_ecb(&body)
    }
}

// ============================================================================
// CoinGecko
// ============================================================================

/// Parse a CoinGecko simple-price payload (`{"bitcoin": {"usd": 1.0}}`).
///
/// `ids` maps asset codes to CoinGecko ids; assets missing from the payload
/// are left out of the table.
pub fn parse_coingecko(body: &str, ids: &[(&str, &str)]) -> Result<Prices, SourceError> {
    let response: HashMap<String, HashMap<String, f64>> =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    let mut prices = Prices::new();
    for (code, id) in ids {
        match response.get(*id).and_then(|quote| quote.get("usd")) {
            Some(usd) => {
                prices.insert(code.to_string(), decimal_from_f64(*usd, code)?);
            }
            None => debug!(code = %code, id = %id, "no price in payload"),
        }
    }

    if prices.is_empty() {
        return Err(SourceError::Malformed("no known assets in payload".to_string()));
    }
    Ok(prices)
}

pub struct CoinGeckoSource {
    client: Client,
    url: String,
    ids: Vec<(&'static str, &'static str)>,
}

impl CoinGeckoSource {
    pub fn new(ids: Vec<(&'static str, &'static str)>) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client()?,
            url: COINGECKO_URL.to_string(),
            ids,
        })
    }
}

#[async_trait]
impl RateSource for CoinGeckoSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch(&self) -> Result<Prices, SourceError> {
        let ids = self
            .ids
            .iter()
            .map(|(_, id)| *id)
            .collect::<Vec<_>>()
            .join(",");
        let body = self
            .client
            .get(&self.url)
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_coingecko(&body, &self.ids)
    }
}

// ============================================================================
// Fallback chain
// ============================================================================

/// Tries each source in order; the first success wins
pub struct SourceChain {
    name: String,
    sources: Vec<Box<dyn RateSource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn RateSource>>) -> Self {
        let name = sources
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join("+");
        Self { name, sources }
    }
}

#[async_trait]
impl RateSource for SourceChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Prices, SourceError> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.fetch().await {
                Ok(prices) => return Ok(prices),
                Err(e) => {
                    warn!(source = source.name(), error = %e, "rate source failed, trying next");
                    failures.push(format!("{}: {e}", source.name()));
                }
            }
        }
        Err(SourceError::Exhausted(failures.join("; ")))
    }
}
