//! Token Price Oracle - ranked sources with tiered staleness
//!
//! Sources are tried in priority order: primary live feed (CoinGecko),
//! secondary live feed (DefiLlama), then the static fallback table. A
//! failing or hanging source is logged and skipped.
//!
//! Prices are cached in two tiers (in-process map + shared cache). An entry
//! is only served while `now - cached_at` is below its confidence tier's
//! threshold; past that it is treated as missing and refetched.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use eyre::{eyre, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::cache::{get_json, set_json, SharedCache};
use crate::clock::Clock;
use crate::error::RouterError;
use crate::tokens::{Asset, Chain};

// ============================================
// CONSTANTS
// ============================================

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

const DEFILLAMA_API_URL: &str = "https://coins.llama.fi/prices/current";

/// Client-level timeout; the oracle applies its own per-fetch timeout on top
const HTTP_TIMEOUT_SECS: u64 = 10;

// ============================================
// PRICE TYPES
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Maximum age of a cached observation of this tier
    pub fn staleness_threshold(&self) -> ChronoDuration {
        match self {
            Confidence::High => ChronoDuration::seconds(60),
            Confidence::Medium => ChronoDuration::seconds(300),
            Confidence::Low => ChronoDuration::seconds(900),
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrice {
    /// USD per whole token
    pub price: f64,
    pub source: String,
    /// When the source last updated the figure
    pub timestamp: DateTime<Utc>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPrice {
    pub price: TokenPrice,
    pub cached_at: DateTime<Utc>,
}

impl CachedPrice {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.cached_at < self.price.confidence.staleness_threshold()
    }
}

/// Raw observation returned by a source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcePrice {
    pub price: f64,
    pub updated_at: DateTime<Utc>,
}

// ============================================
// SOURCES
// ============================================

#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    fn confidence(&self) -> Confidence;

    async fn fetch_price(&self, asset: Asset) -> Result<SourcePrice>;

    /// Batch lookup used by the periodic refresh; sources override when they can batch
    async fn fetch_prices(&self, assets: &[Asset]) -> Result<Vec<(Asset, SourcePrice)>> {
        let mut out = Vec::with_capacity(assets.len());
        for &asset in assets {
            match self.fetch_price(asset).await {
                Ok(p) => out.push((asset, p)),
                Err(e) => debug!("{} has no price for {}: {}", self.name(), asset, e),
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct CoinGeckoQuote {
    usd: Option<f64>,
    last_updated_at: Option<i64>,
}

/// Primary live feed
pub struct CoinGeckoSource {
    http_client: Client,
    api_key: Option<String>,
}

impl CoinGeckoSource {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http_client, api_key })
    }

    async fn query(&self, ids: &[&str]) -> Result<HashMap<String, CoinGeckoQuote>> {
        let url = format!(
            "{}?ids={}&vs_currencies=usd&include_last_updated_at=true",
            COINGECKO_API_URL,
            ids.join(",")
        );
        let mut request = self.http_client.get(&url);
        if let Some(ref key) = self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    async fn fetch_price(&self, asset: Asset) -> Result<SourcePrice> {
        let id = asset
            .coingecko_id()
            .ok_or_else(|| eyre!("no CoinGecko listing for {}", asset))?;
        let quotes = self.query(&[id]).await?;
        let quote = quotes.get(id).ok_or_else(|| eyre!("CoinGecko omitted {}", id))?;
        coingecko_observation(quote)
    }

    async fn fetch_prices(&self, assets: &[Asset]) -> Result<Vec<(Asset, SourcePrice)>> {
        let mut ids: Vec<&str> = assets.iter().filter_map(|a| a.coingecko_id()).collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let quotes = self.query(&ids).await?;
        Ok(assets
            .iter()
            .filter_map(|&asset| {
                let quote = quotes.get(asset.coingecko_id()?)?;
                coingecko_observation(quote).ok().map(|p| (asset, p))
            })
            .collect())
    }
}

fn coingecko_observation(quote: &CoinGeckoQuote) -> Result<SourcePrice> {
    let price = quote.usd.ok_or_else(|| eyre!("CoinGecko quote has no usd field"))?;
    let updated_at = quote
        .last_updated_at
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);
    Ok(SourcePrice { price, updated_at })
}

#[derive(Debug, Deserialize)]
struct DefiLlamaResponse {
    coins: HashMap<String, DefiLlamaCoin>,
}

#[derive(Debug, Deserialize)]
struct DefiLlamaCoin {
    price: f64,
    timestamp: Option<i64>,
}

/// Secondary live feed
pub struct DefiLlamaSource {
    http_client: Client,
}

impl DefiLlamaSource {
    pub fn new() -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl PriceSource for DefiLlamaSource {
    fn name(&self) -> &str {
        "defillama"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn fetch_price(&self, asset: Asset) -> Result<SourcePrice> {
        let id = asset
            .coingecko_id()
            .ok_or_else(|| eyre!("no DefiLlama key for {}", asset))?;
        let key = format!("coingecko:{}", id);
        let url = format!("{}/{}", DEFILLAMA_API_URL, key);

        let response: DefiLlamaResponse = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let coin = response
            .coins
            .get(&key)
            .ok_or_else(|| eyre!("DefiLlama omitted {}", key))?;
        let updated_at = coin
            .timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);
        Ok(SourcePrice { price: coin.price, updated_at })
    }
}

/// Last-resort table; never fails for listed assets
#[derive(Debug, Clone)]
pub struct StaticPriceTable {
    prices: HashMap<Asset, f64>,
}

impl StaticPriceTable {
    pub fn new(prices: HashMap<Asset, f64>) -> Self {
        Self { prices }
    }

    pub fn contains(&self, asset: Asset) -> bool {
        self.prices.contains_key(&asset)
    }
}

impl Default for StaticPriceTable {
    fn default() -> Self {
        use Asset::*;
        let prices = [
            (Eth, 3_000.0),
            (Weth, 3_000.0),
            (Usdc, 1.0),
            (Usdt, 1.0),
            (Dai, 1.0),
            (Usdh, 1.0),
            (Wbtc, 60_000.0),
            (Pol, 0.5),
            (Wpol, 0.5),
            (Bnb, 550.0),
            (Wbnb, 550.0),
            (Sol, 150.0),
            (Wsol, 150.0),
        ];
        Self::new(prices.into_iter().collect())
    }
}

#[async_trait]
impl PriceSource for StaticPriceTable {
    fn name(&self) -> &str {
        "static"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Low
    }

    async fn fetch_price(&self, asset: Asset) -> Result<SourcePrice> {
        let price = self
            .prices
            .get(&asset)
            .copied()
            .ok_or_else(|| eyre!("{} missing from static table", asset))?;
        Ok(SourcePrice { price, updated_at: Utc::now() })
    }
}

// ============================================
// ORACLE
// ============================================

pub struct PriceOracle {
    /// Priority order, first is primary
    sources: Vec<Arc<dyn PriceSource>>,
    local: RwLock<HashMap<Asset, CachedPrice>>,
    shared: Arc<dyn SharedCache>,
    clock: Arc<dyn Clock>,
    shared_ttl: Duration,
    fetch_timeout: Duration,
    /// Assets covered by the periodic refresh
    tracked: Vec<Asset>,
}

impl PriceOracle {
    pub fn new(
        sources: Vec<Arc<dyn PriceSource>>,
        shared: Arc<dyn SharedCache>,
        clock: Arc<dyn Clock>,
        shared_ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            local: RwLock::new(HashMap::new()),
            shared,
            clock,
            shared_ttl,
            fetch_timeout,
            tracked: Asset::ALL.to_vec(),
        }
    }

    pub fn with_tracked(mut self, tracked: Vec<Asset>) -> Self {
        self.tracked = tracked;
        self
    }

    fn cache_key(asset: Asset) -> String {
        format!("price:{}", asset.symbol())
    }

    /// USD price of one whole token
    pub async fn get_price(&self, asset: Asset) -> Result<TokenPrice, RouterError> {
        let now = self.clock.now();

        {
            let local = self.local.read().await;
            if let Some(cached) = local.get(&asset) {
                if cached.is_fresh(now) {
                    trace!("Local price hit for {}: ${:.4}", asset, cached.price.price);
                    return Ok(cached.price.clone());
                }
            }
        }

        if let Some(cached) = get_json::<CachedPrice>(self.shared.as_ref(), &Self::cache_key(asset)).await {
            if cached.is_fresh(now) {
                trace!("Shared price hit for {}: ${:.4}", asset, cached.price.price);
                let price = cached.price.clone();
                self.local.write().await.insert(asset, cached);
                return Ok(price);
            }
        }

        for source in &self.sources {
            match tokio::time::timeout(self.fetch_timeout, source.fetch_price(asset)).await {
                Ok(Ok(observed)) if observed.price.is_finite() && observed.price > 0.0 => {
                    let price = TokenPrice {
                        price: observed.price,
                        source: source.name().to_string(),
                        timestamp: observed.updated_at,
                        confidence: source.confidence(),
                    };
                    debug!(
                        "💲 {} = ${:.4} from {} ({})",
                        asset, price.price, price.source, price.confidence
                    );
                    self.store(asset, price.clone()).await;
                    return Ok(price);
                }
                Ok(Ok(observed)) => {
                    warn!("{} returned unusable price {} for {}", source.name(), observed.price, asset);
                }
                Ok(Err(e)) => {
                    warn!("{} price fetch failed for {}: {}", source.name(), asset, e);
                }
                Err(_) => {
                    warn!("{} price fetch timed out for {}", source.name(), asset);
                }
            }
        }

        Err(RouterError::PriceUnavailable { asset })
    }

    pub async fn get_native_token_price(&self, chain: Chain) -> Result<TokenPrice, RouterError> {
        self.get_price(chain.native_asset()).await
    }

    /// Whole-token amount to USD
    pub async fn convert_to_usd(&self, asset: Asset, amount: f64) -> Result<f64, RouterError> {
        Ok(amount * self.get_price(asset).await?.price)
    }

    /// USD to whole-token amount
    pub async fn convert_from_usd(&self, asset: Asset, usd_amount: f64) -> Result<f64, RouterError> {
        Ok(usd_amount / self.get_price(asset).await?.price)
    }

    /// Drop both cache tiers for one asset
    pub async fn invalidate(&self, asset: Asset) {
        self.local.write().await.remove(&asset);
        if let Err(e) = self.shared.delete(&Self::cache_key(asset)).await {
            warn!("Failed to drop shared price for {}: {}", asset, e);
        }
    }

    async fn store(&self, asset: Asset, price: TokenPrice) {
        let cached = CachedPrice {
            price,
            cached_at: self.clock.now(),
        };
        set_json(self.shared.as_ref(), &Self::cache_key(asset), &cached, self.shared_ttl).await;
        self.local.write().await.insert(asset, cached);
    }

    /// Refresh every tracked asset from the primary source. Returns how many were stored.
    pub async fn refresh_all(&self) -> usize {
        let Some(primary) = self.sources.first() else {
            return 0;
        };

        let batch = match tokio::time::timeout(self.fetch_timeout, primary.fetch_prices(&self.tracked)).await {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => {
                warn!("Batch price refresh from {} failed: {}", primary.name(), e);
                return 0;
            }
            Err(_) => {
                warn!("Batch price refresh from {} timed out", primary.name());
                return 0;
            }
        };

        let mut stored = 0;
        for (asset, observed) in batch {
            if !(observed.price.is_finite() && observed.price > 0.0) {
                continue;
            }
            let price = TokenPrice {
                price: observed.price,
                source: primary.name().to_string(),
                timestamp: observed.updated_at,
                confidence: primary.confidence(),
            };
            self.store(asset, price).await;
            stored += 1;
        }
        info!("Refreshed {} prices from {}", stored, primary.name());
        stored
    }

    /// Run [`refresh_all`](Self::refresh_all) on an interval until the handle is aborted
    pub fn spawn_refresh(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.refresh_all().await;
            }
        })
    }
}

// ============================================
// UNIT CONVERSION
// ============================================

/// Base units to whole tokens
pub fn to_whole_units(raw: u128, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Whole tokens to base units, rounded to the nearest unit
pub fn to_base_units(amount: f64, decimals: u8) -> u128 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    (amount * 10f64.powi(decimals as i32)).round() as u128
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::ManualClock;
    use crate::testing::FixedPriceSource;

    struct Harness {
        oracle: PriceOracle,
        clock: Arc<ManualClock>,
        primary: Arc<FixedPriceSource>,
        secondary: Arc<FixedPriceSource>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(MemoryCache::new(clock.clone()));
        let primary = Arc::new(FixedPriceSource::new(
            "primary",
            Confidence::High,
            &[(Asset::Eth, 3_100.0), (Asset::Usdc, 1.0)],
        ));
        let secondary = Arc::new(FixedPriceSource::new(
            "secondary",
            Confidence::Medium,
            &[(Asset::Eth, 3_050.0), (Asset::Usdc, 0.999)],
        ));
        let oracle = PriceOracle::new(
            vec![
                primary.clone() as Arc<dyn PriceSource>,
                secondary.clone() as Arc<dyn PriceSource>,
                Arc::new(StaticPriceTable::default()) as Arc<dyn PriceSource>,
            ],
            cache,
            clock.clone(),
            Duration::from_secs(300),
            Duration::from_secs(10),
        )
        .with_tracked(vec![Asset::Eth, Asset::Usdc]);
        Harness { oracle, clock, primary, secondary }
    }

    #[tokio::test]
    async fn test_primary_wins() {
        let h = harness();
        let price = h.oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(price.price, 3_100.0);
        assert_eq!(price.source, "primary");
        assert_eq!(price.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn test_failing_primary_falls_through() {
        let h = harness();
        h.primary.set_failing(true);
        let price = h.oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(price.source, "secondary");
        assert_eq!(price.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_fallback_never_fails_for_listed_assets() {
        let h = harness();
        h.primary.set_failing(true);
        h.secondary.set_failing(true);
        for asset in Asset::ALL {
            let price = h.oracle.get_price(asset).await.unwrap();
            assert_eq!(price.confidence, Confidence::Low, "{} should use the table", asset);
        }
    }

    #[tokio::test]
    async fn test_unknown_everywhere_is_unavailable() {
        let clock = Arc::new(ManualClock::default());
        let oracle = PriceOracle::new(
            vec![Arc::new(StaticPriceTable::new(HashMap::new())) as Arc<dyn PriceSource>],
            Arc::new(MemoryCache::new(clock.clone())),
            clock,
            Duration::from_secs(300),
            Duration::from_secs(10),
        );
        let err = oracle.get_price(Asset::Wbtc).await.unwrap_err();
        assert!(matches!(err, RouterError::PriceUnavailable { asset: Asset::Wbtc }));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_sources() {
        let h = harness();
        h.oracle.get_price(Asset::Eth).await.unwrap();
        h.oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(h.primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_high_confidence_price_is_refetched() {
        let h = harness();
        h.oracle.get_price(Asset::Eth).await.unwrap();

        h.clock.advance_secs(59);
        h.oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(h.primary.calls(), 1);

        h.clock.advance_secs(2);
        h.primary.set_price(Asset::Eth, 3_200.0);
        let price = h.oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(h.primary.calls(), 2);
        assert_eq!(price.price, 3_200.0);
    }

    #[tokio::test]
    async fn test_medium_confidence_expires_at_300s() {
        let h = harness();
        h.primary.set_failing(true);
        let price = h.oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(price.confidence, Confidence::Medium);
        assert_eq!(h.secondary.calls(), 1);

        h.clock.advance_secs(299);
        h.secondary.set_price(Asset::Eth, 3_075.0);
        let price = h.oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(price.price, 3_050.0);
        assert_eq!(h.secondary.calls(), 1);

        h.clock.advance_secs(2);
        let price = h.oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(price.price, 3_075.0);
        assert_eq!(h.secondary.calls(), 2);
    }

    #[tokio::test]
    async fn test_low_confidence_lives_longer() {
        let h = harness();
        h.primary.set_failing(true);
        h.secondary.set_failing(true);
        h.oracle.get_price(Asset::Dai).await.unwrap();

        h.clock.advance_secs(600);
        h.primary.set_failing(false);
        h.primary.set_price(Asset::Dai, 1.001);
        let price = h.oracle.get_price(Asset::Dai).await.unwrap();
        assert_eq!(price.confidence, Confidence::Low);

        h.clock.advance_secs(301);
        let price = h.oracle.get_price(Asset::Dai).await.unwrap();
        assert_eq!(price.confidence, Confidence::High);
        assert_eq!(price.price, 1.001);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let h = harness();
        h.primary.set_delay(Duration::from_secs(60));
        let oracle = PriceOracle {
            fetch_timeout: Duration::from_millis(20),
            ..h.oracle
        };
        let price = oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(price.source, "secondary");
    }

    #[tokio::test]
    async fn test_refresh_populates_cache() {
        let h = harness();
        assert_eq!(h.oracle.refresh_all().await, 2);
        h.primary.set_failing(true);
        let price = h.oracle.get_price(Asset::Usdc).await.unwrap();
        assert_eq!(price.source, "primary");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let h = harness();
        h.oracle.get_price(Asset::Eth).await.unwrap();
        h.oracle.invalidate(Asset::Eth).await;
        h.oracle.get_price(Asset::Eth).await.unwrap();
        assert_eq!(h.primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_conversions() {
        let h = harness();
        let usd = h.oracle.convert_to_usd(Asset::Eth, 2.0).await.unwrap();
        assert!((usd - 6_200.0).abs() < 1e-9);
        let eth = h.oracle.convert_from_usd(Asset::Eth, 1_550.0).await.unwrap();
        assert!((eth - 0.5).abs() < 1e-9);
        let native = h.oracle.get_native_token_price(Chain::Base).await.unwrap();
        assert_eq!(native.price, 3_100.0);
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(to_whole_units(100_000_000, 6), 100.0);
        assert_eq!(to_base_units(100.0, 6), 100_000_000);
        assert_eq!(to_base_units(-1.0, 6), 0);
    }

    #[test]
    fn test_static_table_in_blocking_context() {
        let table = StaticPriceTable::default();
        let price = tokio_test::block_on(table.fetch_price(Asset::Usdh)).unwrap();
        assert_eq!(price.price, 1.0);
    }
}
