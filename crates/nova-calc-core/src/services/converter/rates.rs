//! Rate cache and its background refresh task.
//!
//! The cache is read by every query and written by one refresh task. Each
//! successful refresh swaps in a whole new `RateTable`; readers clone an
//! `Arc` under a short read lock and never see a half-written table.
//!
//! The refresh task runs on the host's tokio runtime:
//! - refreshes once at start (or, when spawned idle, first waits to be
//!   asked or for the interval), then every interval
//! - `refresh_now` triggers an immediate refresh and waits for its outcome
//! - failures leave the last good table in place and are counted

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::sources::{Prices, RateSource, SourceError};
use crate::error::{ConverterError, ConverterResult};

/// An immutable snapshot of prices, in USD per unit
#[derive(Debug, Clone)]
pub struct RateTable {
    prices: Prices,
    refreshed_at: DateTime<Utc>,
}

impl RateTable {
    pub fn new(prices: Prices, refreshed_at: DateTime<Utc>) -> Self {
        Self {
            prices,
            refreshed_at,
        }
    }

    pub fn price(&self, unit: &str) -> Option<Decimal> {
        self.prices.get(unit).copied()
    }

    pub fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Latest known prices for one module
pub struct RateCache {
    name: String,
    stale_after: Duration,
    table: RwLock<Option<Arc<RateTable>>>,
}

impl RateCache {
    /// An empty (cold) cache
    pub fn new(name: impl Into<String>, stale_after: Duration) -> Self {
        Self {
            name: name.into(),
            stale_after,
            table: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current table, whatever its age
    pub fn snapshot(&self) -> Option<Arc<RateTable>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a table younger than the staleness limit is loaded
    pub fn is_ready(&self) -> bool {
        self.fresh_table().is_some()
    }

    fn fresh_table(&self) -> Option<Arc<RateTable>> {
        let table = self.snapshot()?;
        let age = Utc::now()
            .signed_duration_since(table.refreshed_at)
            .to_std()
            .unwrap_or_default();
        if age > self.stale_after {
            debug!(cache = %self.name, age_secs = age.as_secs(), "rate table is stale");
            return None;
        }
        Some(table)
    }

    /// Price of one `unit` in USD.
    ///
    /// Fails with `RateUnavailable` when the cache is cold, stale, or has no
    /// price for `unit`.
    pub fn price(&self, unit: &str) -> ConverterResult<Decimal> {
        self.fresh_table()
            .and_then(|table| table.price(unit))
            .ok_or_else(|| ConverterError::RateUnavailable {
                unit: unit.to_string(),
            })
    }

    /// Swap in a new table
    pub fn replace(&self, table: RateTable) {
        let count = table.len();
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(table));
        debug!(cache = %self.name, count, "rate table replaced");
    }

    /// Swap in `prices`, stamped now
    pub fn update(&self, prices: Prices) {
        self.replace(RateTable::new(prices, Utc::now()));
    }

    /// Fetch from `source` and replace the table on success.
    ///
    /// An empty price table counts as a failure and leaves the cache as is.
    pub async fn refresh_from(&self, source: &dyn RateSource) -> Result<usize, SourceError> {
        let prices = source.fetch().await?;
        if prices.is_empty() {
            return Err(SourceError::Malformed(format!(
                "{} returned no prices",
                source.name()
            )));
        }
        let count = prices.len();
        self.update(prices);
        Ok(count)
    }
}

/// Messages understood by the refresh task
#[derive(Debug)]
pub enum RefreshMessage {
    /// Refresh immediately and report the outcome
    RefreshNow(oneshot::Sender<Result<usize, SourceError>>),
    Shutdown,
}

/// Handle to a running refresh task.
///
/// Dropping the handle aborts the task; `shutdown` stops it gracefully.
pub struct RateRefresher {
    name: String,
    tx: mpsc::Sender<RefreshMessage>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
    failures: Arc<AtomicU32>,
}

impl RateRefresher {
    /// Start refreshing `cache` from `source` on `runtime`, fetching right away
    pub fn spawn(
        runtime: &Handle,
        cache: Arc<RateCache>,
        source: Arc<dyn RateSource>,
        interval: Duration,
    ) -> Self {
        Self::start(runtime, cache, source, interval, true)
    }

    /// Like `spawn`, but the first fetch waits for `refresh_now` or the interval
    pub fn spawn_idle(
        runtime: &Handle,
        cache: Arc<RateCache>,
        source: Arc<dyn RateSource>,
        interval: Duration,
    ) -> Self {
        Self::start(runtime, cache, source, interval, false)
    }

    fn start(
        runtime: &Handle,
        cache: Arc<RateCache>,
        source: Arc<dyn RateSource>,
        interval: Duration,
        refresh_at_start: bool,
    ) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let failures = Arc::new(AtomicU32::new(0));
        let name = cache.name().to_string();

        let failures_clone = Arc::clone(&failures);
        let task_handle = runtime.spawn(async move {
            if refresh_at_start {
                // Outcome is logged by refresh_once
                let _ = refresh_once(&cache, source.as_ref(), &failures_clone).await;
            }
            refresh_loop(rx, cache, source, interval, failures_clone).await;
        });

        Self {
            name,
            tx,
            task_handle: Mutex::new(Some(task_handle)),
            failures,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consecutive failed refreshes since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Refresh now and wait for the outcome
    pub async fn refresh_now(&self) -> Result<usize, SourceError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(RefreshMessage::RefreshNow(reply))
            .await
            .map_err(|_| SourceError::Stopped)?;
        outcome.await.map_err(|_| SourceError::Stopped)?
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(&self) {
        let _ = self.tx.send(RefreshMessage::Shutdown).await;

        let handle = self
            .task_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(cache = %self.name, error = %e, "refresh task ended abnormally");
            }
        }
    }
}

impl Drop for RateRefresher {
    fn drop(&mut self) {
        let handle = self
            .task_handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

async fn refresh_loop(
    mut rx: mpsc::Receiver<RefreshMessage>,
    cache: Arc<RateCache>,
    source: Arc<dyn RateSource>,
    interval: Duration,
    failures: Arc<AtomicU32>,
) {
    loop {
        match tokio::time::timeout(interval, rx.recv()).await {
            Ok(Some(RefreshMessage::RefreshNow(reply))) => {
                let outcome = refresh_once(&cache, source.as_ref(), &failures).await;
                let _ = reply.send(outcome);
            }
            Ok(Some(RefreshMessage::Shutdown)) | Ok(None) => break,
            Err(_) => {
                // Interval elapsed
                let _ = refresh_once(&cache, source.as_ref(), &failures).await;
            }
        }
    }

    debug!(cache = %cache.name(), "refresh task stopped");
}

async fn refresh_once(
    cache: &RateCache,
    source: &dyn RateSource,
    failures: &AtomicU32,
) -> Result<usize, SourceError> {
    match cache.refresh_from(source).await {
        Ok(count) => {
            failures.store(0, Ordering::SeqCst);
            info!(cache = %cache.name(), source = source.name(), count, "rates refreshed");
            Ok(count)
        }
        Err(e) => {
            let failure_count = failures.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(
                cache = %cache.name(),
                source = source.name(),
                failure_count,
                error = %e,
                "rate refresh failed, keeping previous rates"
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl RateSource for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch(&self) -> Result<Prices, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(SourceError::Malformed("offline".to_string()));
            }
            Ok(Prices::from([
                ("USD".to_string(), Decimal::ONE),
                ("EUR".to_string(), Decimal::from(n as u64)),
            ]))
        }
    }

    fn prices(eur: i64) -> Prices {
        Prices::from([
            ("USD".to_string(), Decimal::ONE),
            ("EUR".to_string(), Decimal::from(eur)),
        ])
    }

    #[test]
    fn test_cold_cache_is_unavailable() {
        let cache = RateCache::new("currency", Duration::from_secs(60));
        assert!(!cache.is_ready());
        assert!(matches!(
            cache.price("EUR"),
            Err(ConverterError::RateUnavailable { ref unit }) if unit == "EUR"
        ));
    }

    #[test]
    fn test_update_and_lookup() {
        let cache = RateCache::new("currency", Duration::from_secs(60));
        cache.update(prices(2));
        assert!(cache.is_ready());
        assert_eq!(cache.price("EUR").unwrap(), Decimal::from(2));
        assert!(matches!(
            cache.price("GBP"),
            Err(ConverterError::RateUnavailable { .. })
        ));
    }

    #[test]
    fn test_stale_table_is_unavailable() {
        let cache = RateCache::new("currency", Duration::from_secs(60));
        let old = Utc::now() - chrono::Duration::seconds(120);
        cache.replace(RateTable::new(prices(2), old));
        assert!(!cache.is_ready());
        assert!(cache.price("EUR").is_err());
        // Still visible to callers that accept old data
        assert!(cache.snapshot().is_some());
    }

    #[tokio::test]
    async fn test_refresh_from_failure_keeps_table() {
        let cache = RateCache::new("currency", Duration::from_secs(60));
        cache.update(prices(3));

        let source = Counting::new(true);
        assert!(cache.refresh_from(source.as_ref()).await.is_err());
        assert_eq!(cache.price("EUR").unwrap(), Decimal::from(3));
    }

    #[tokio::test]
    async fn test_refresher_populates_and_refreshes_on_demand() {
        let cache = Arc::new(RateCache::new("currency", Duration::from_secs(60)));
        let source = Counting::new(false);
        let refresher = RateRefresher::spawn(
            &Handle::current(),
            Arc::clone(&cache),
            source.clone(),
            Duration::from_secs(3600),
        );

        let count = refresher.refresh_now().await.unwrap();
        assert_eq!(count, 2);
        assert!(cache.is_ready());
        // Start-up refresh plus the explicit one
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.price("EUR").unwrap(), Decimal::from(2));
        assert_eq!(refresher.consecutive_failures(), 0);

        refresher.shutdown().await;
        assert!(matches!(
            refresher.refresh_now().await,
            Err(SourceError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_idle_refresher_waits_to_be_asked() {
        let cache = Arc::new(RateCache::new("currency", Duration::from_secs(60)));
        let source = Counting::new(false);
        let refresher = RateRefresher::spawn_idle(
            &Handle::current(),
            Arc::clone(&cache),
            source.clone(),
            Duration::from_secs(3600),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(!cache.is_ready());

        assert_eq!(refresher.refresh_now().await.unwrap(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.price("EUR").unwrap(), Decimal::from(1));
        refresher.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresher_counts_failures() {
        let cache = Arc::new(RateCache::new("crypto", Duration::from_secs(60)));
        let refresher = RateRefresher::spawn(
            &Handle::current(),
            Arc::clone(&cache),
            Counting::new(true),
            Duration::from_secs(3600),
        );

        assert!(refresher.refresh_now().await.is_err());
        assert_eq!(refresher.consecutive_failures(), 2);
        assert!(!cache.is_ready());
        refresher.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresher_ticks_on_interval() {
        let cache = Arc::new(RateCache::new("crypto", Duration::from_secs(60)));
        let source = Counting::new(false);
        let refresher = RateRefresher::spawn(
            &Handle::current(),
            Arc::clone(&cache),
            source.clone(),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(source.calls.load(Ordering::SeqCst) >= 3);
        refresher.shutdown().await;
    }
}
