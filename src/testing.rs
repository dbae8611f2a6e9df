//! Deterministic collaborators for unit tests

use async_trait::async_trait;
use chrono::Utc;
use eyre::{eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::brain::RouteScorer;
use crate::cache::MemoryCache;
use crate::cartographer::{
    edge_id, BridgeLiquidity, ConfiguredLiquidity, GraphEdge, GraphNode, LiquidityGraphBuilder,
    LiquidityProvider, NodeKey, PoolLiquidity,
};
use crate::clock::ManualClock;
use crate::config::Config;
use crate::gas_oracle::{FeeDataProvider, GasEstimator};
use crate::price_oracle::{Confidence, PriceOracle, PriceSource, SourcePrice, StaticPriceTable};
use crate::router::RoutingEngine;
use crate::tokens::{Asset, Chain, TokenRegistry};
use crate::types::TxType;

pub const REFERENCE_PRICES: [(Asset, f64); 13] = [
    (Asset::Eth, 3_000.0),
    (Asset::Weth, 3_000.0),
    (Asset::Usdc, 1.0),
    (Asset::Usdt, 1.0),
    (Asset::Dai, 1.0),
    (Asset::Usdh, 1.0),
    (Asset::Wbtc, 60_000.0),
    (Asset::Pol, 0.5),
    (Asset::Wpol, 0.5),
    (Asset::Bnb, 550.0),
    (Asset::Wbnb, 550.0),
    (Asset::Sol, 150.0),
    (Asset::Wsol, 150.0),
];

// ============================================
// PRICE SOURCE
// ============================================

pub struct FixedPriceSource {
    name: String,
    confidence: Confidence,
    prices: Mutex<HashMap<Asset, f64>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FixedPriceSource {
    pub fn new(name: &str, confidence: Confidence, prices: &[(Asset, f64)]) -> Self {
        Self {
            name: name.to_string(),
            confidence,
            prices: Mutex::new(prices.iter().copied().collect()),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_price(&self, asset: Asset, price: f64) {
        self.prices.lock().unwrap().insert(asset, price);
    }

    pub fn remove_price(&self, asset: Asset) {
        self.prices.lock().unwrap().remove(&asset);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FixedPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn confidence(&self) -> Confidence {
        self.confidence
    }

    async fn fetch_price(&self, asset: Asset) -> Result<SourcePrice> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(eyre!("{} is down", self.name));
        }
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(&asset)
            .copied()
            .ok_or_else(|| eyre!("{} has no {}", self.name, asset))?;
        Ok(SourcePrice {
            price,
            updated_at: Utc::now(),
        })
    }
}

// ============================================
// FEE DATA
// ============================================

pub struct FixedFeeData {
    wei: u128,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FixedFeeData {
    pub fn new(wei: u128) -> Self {
        Self {
            wei,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeeDataProvider for FixedFeeData {
    async fn get_fee_data(&self, chain: Chain) -> Result<u128> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(eyre!("rpc for {} unreachable", chain));
        }
        Ok(self.wei)
    }
}

// ============================================
// LIQUIDITY
// ============================================

/// Configured liquidity that counts lookups and can fail chosen providers
pub struct CountingLiquidity {
    inner: ConfiguredLiquidity,
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl CountingLiquidity {
    pub fn new(config: &Config) -> Self {
        Self {
            inner: ConfiguredLiquidity::from_config(config),
            calls: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_provider(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    fn check(&self, provider: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(provider) {
            return Err(eyre!("{} lookup failed", provider));
        }
        Ok(())
    }
}

#[async_trait]
impl LiquidityProvider for CountingLiquidity {
    async fn pool_liquidity(&self, chain: Chain, a: Asset, b: Asset, dex: &str) -> Result<PoolLiquidity> {
        self.check(dex)?;
        self.inner.pool_liquidity(chain, a, b, dex).await
    }

    async fn bridge_liquidity(&self, from: Chain, to: Chain, asset: Asset, bridge: &str) -> Result<BridgeLiquidity> {
        self.check(bridge)?;
        self.inner.bridge_liquidity(from, to, asset, bridge).await
    }
}

// ============================================
// GRAPH HELPERS
// ============================================

pub fn node(chain: Chain, asset: Asset, price: f64) -> GraphNode {
    let registry = TokenRegistry::default();
    let token = registry.get(chain, asset);
    GraphNode {
        key: NodeKey::new(chain, asset),
        token_address: token.and_then(|t| t.address).map(str::to_string),
        decimals: token.map(|t| t.decimals).unwrap_or(18),
        price_usd: price,
        price_source: "test".into(),
        price_confidence: Confidence::High,
    }
}

/// Edge with no slippage and no gas; bridges take 600s, swaps 2s
pub fn edge(from: NodeKey, to: NodeKey, kind: TxType, provider: &str, fee: f64) -> GraphEdge {
    GraphEdge {
        id: edge_id(&from, &to, provider),
        from,
        to,
        edge_type: kind,
        provider: provider.to_string(),
        cost_usd: fee * 1_000.0,
        liquidity_usd: 1e9,
        gas_estimate_usd: 0.0,
        slippage: 0.0,
        fee_fraction: fee,
        eta_seconds: if kind == TxType::Bridge { 600 } else { 2 },
        confidence: Confidence::High,
        last_updated: Utc::now(),
    }
}

// ============================================
// FIXTURE
// ============================================

/// Fully wired engine over deterministic collaborators.
/// Live feed is `primary` (high confidence, every asset); gas is 20 gwei everywhere.
pub struct Fixture {
    pub config: Config,
    pub registry: Arc<TokenRegistry>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<MemoryCache>,
    pub primary: Arc<FixedPriceSource>,
    pub prices: Arc<PriceOracle>,
    pub fee_data: Arc<FixedFeeData>,
    pub gas: Arc<GasEstimator>,
    pub liquidity: Arc<CountingLiquidity>,
}

impl Fixture {
    pub fn new(config: Config) -> Self {
        Self::assemble(config, true)
    }

    /// No static table behind the live feed
    pub fn without_fallback(config: Config) -> Self {
        Self::assemble(config, false)
    }

    fn assemble(config: Config, fallback: bool) -> Self {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(MemoryCache::new(clock.clone()));
        let primary = Arc::new(FixedPriceSource::new("primary", Confidence::High, &REFERENCE_PRICES));

        let mut sources: Vec<Arc<dyn PriceSource>> = vec![primary.clone() as Arc<dyn PriceSource>];
        if fallback {
            sources.push(Arc::new(StaticPriceTable::default()) as Arc<dyn PriceSource>);
        }
        let prices = Arc::new(PriceOracle::new(
            sources,
            cache.clone(),
            clock.clone(),
            config.policy.price_cache_ttl(),
            config.policy.fetch_timeout(),
        ));

        let fee_data = Arc::new(FixedFeeData::new(20_000_000_000));
        let gas = Arc::new(GasEstimator::new(
            Some(fee_data.clone() as Arc<dyn FeeDataProvider>),
            prices.clone(),
            clock.clone(),
            Duration::from_secs(config.policy.gas_cache_secs),
            config.policy.fetch_timeout(),
        ));

        Self {
            registry: Arc::new(TokenRegistry::default()),
            liquidity: Arc::new(CountingLiquidity::new(&config)),
            config,
            clock,
            cache,
            primary,
            prices,
            fee_data,
            gas,
        }
    }

    pub fn builder(&self) -> LiquidityGraphBuilder {
        LiquidityGraphBuilder::new(
            &self.config,
            self.registry.clone(),
            self.liquidity.clone(),
            self.gas.clone(),
            self.prices.clone(),
            self.cache.clone(),
            self.clock.clone(),
        )
    }

    pub fn scorer(&self) -> RouteScorer {
        RouteScorer::new(self.gas.clone())
    }

    pub fn engine(&self) -> RoutingEngine {
        RoutingEngine::new(&self.config, self.builder(), self.scorer(), self.clock.clone())
    }
}
