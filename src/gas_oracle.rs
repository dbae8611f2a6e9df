//! Gas Estimator - RPC fee data with static fallbacks
//!
//! Resolves the USD cost of one transfer/swap/bridge on a chain. EVM chains
//! read live fee data from their RPC endpoint (EIP-1559 max fee first, legacy
//! gas price second) and cache it per chain. Any failure degrades to the
//! chain's static constant; estimation itself never fails on fee data.
//!
//! gas_units  = base_units[tx] * chain multiplier
//! native     = gas_price * gas_units / 1e18
//! usd        = native * native token price

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::RouterError;
use crate::price_oracle::PriceOracle;
use crate::tokens::Chain;
use crate::types::TxType;

// ============================================
// CONSTANTS
// ============================================

/// Minimum sane fee (0.001 gwei)
const MIN_FEE_WEI: f64 = 1e6;

/// Maximum sane fee (10,000 gwei - extreme congestion)
const MAX_FEE_WEI: f64 = 1e13;

// ============================================
// FEE DATA
// ============================================

/// Live fee-market lookup, native fee per gas unit in wei
#[async_trait]
pub trait FeeDataProvider: Send + Sync {
    async fn get_fee_data(&self, chain: Chain) -> Result<u128>;
}

/// [`FeeDataProvider`] backed by each chain's JSON-RPC endpoint
pub struct RpcFeeData {
    endpoints: HashMap<Chain, String>,
}

impl RpcFeeData {
    pub fn new(endpoints: HashMap<Chain, String>) -> Self {
        Self { endpoints }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config
                .rpc_endpoints
                .iter()
                .map(|e| (e.chain, e.url.clone()))
                .collect(),
        )
    }
}

#[async_trait]
impl FeeDataProvider for RpcFeeData {
    async fn get_fee_data(&self, chain: Chain) -> Result<u128> {
        use alloy_provider::{Provider, ProviderBuilder};

        let url = self
            .endpoints
            .get(&chain)
            .ok_or_else(|| eyre!("no rpc endpoint for {}", chain))?;

        let provider = ProviderBuilder::new().connect_http(url.parse()?);

        match provider.estimate_eip1559_fees().await {
            Ok(fees) => Ok(fees.max_fee_per_gas),
            Err(e) => {
                debug!("EIP-1559 fee estimate unavailable on {}: {}", chain, e);
                Ok(provider.get_gas_price().await?)
            }
        }
    }
}

// ============================================
// GAS PRICE INFO
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSource {
    Rpc,
    Fallback,
    /// Chain without a programmable fee market
    Fixed,
}

impl std::fmt::Display for GasSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GasSource::Rpc => write!(f, "RPC"),
            GasSource::Fallback => write!(f, "Fallback"),
            GasSource::Fixed => write!(f, "Fixed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GasPriceInfo {
    pub chain: Chain,

    /// Native fee per gas unit, in 1e-18 native units
    pub price_per_unit: f64,

    pub fetched_at: DateTime<Utc>,

    pub source: GasSource,
}

impl GasPriceInfo {
    fn fallback(chain: Chain, now: DateTime<Utc>) -> Self {
        Self {
            chain,
            price_per_unit: chain.fallback_gas_price(),
            fetched_at: now,
            source: if chain.is_evm() { GasSource::Fallback } else { GasSource::Fixed },
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: ChronoDuration) -> bool {
        now - self.fetched_at >= max_age
    }

    /// Native token cost of `gas_units`
    pub fn native_cost(&self, gas_units: u64) -> f64 {
        self.price_per_unit * gas_units as f64 / 1e18
    }
}

/// Cost of one operation
#[derive(Debug, Clone)]
pub struct GasEstimate {
    pub chain: Chain,
    pub tx_type: TxType,
    pub gas_units: u64,
    pub gas_price: GasPriceInfo,
    pub native_cost: f64,
    pub cost_usd: f64,
}

/// Gas units for `tx_type` after the chain discount
pub fn gas_units(chain: Chain, tx_type: TxType) -> u64 {
    (tx_type.base_gas_units() as f64 * chain.gas_multiplier()).round() as u64
}

// ============================================
// GAS ESTIMATOR
// ============================================

pub struct GasEstimator {
    fee_data: Option<Arc<dyn FeeDataProvider>>,
    prices: Arc<PriceOracle>,
    clock: Arc<dyn Clock>,
    cache: RwLock<HashMap<Chain, GasPriceInfo>>,
    cache_duration: ChronoDuration,
    fetch_timeout: Duration,
}

impl GasEstimator {
    pub fn new(
        fee_data: Option<Arc<dyn FeeDataProvider>>,
        prices: Arc<PriceOracle>,
        clock: Arc<dyn Clock>,
        cache_duration: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fee_data,
            prices,
            clock,
            cache: RwLock::new(HashMap::new()),
            cache_duration: ChronoDuration::from_std(cache_duration)
                .unwrap_or_else(|_| ChronoDuration::seconds(30)),
            fetch_timeout,
        }
    }

    /// USD cost of one `tx_type` on `chain`. Fails only if the native token has no price.
    pub async fn estimate(&self, chain: Chain, tx_type: TxType, amount: &str) -> Result<GasEstimate, RouterError> {
        trace!("Estimating {} on {} for amount {}", tx_type, chain, amount);

        let gas_price = self.gas_price(chain).await;
        let units = gas_units(chain, tx_type);
        let native_cost = gas_price.native_cost(units);

        let cost_usd = if native_cost == 0.0 {
            0.0
        } else {
            native_cost * self.prices.get_native_token_price(chain).await?.price
        };

        Ok(GasEstimate {
            chain,
            tx_type,
            gas_units: units,
            gas_price,
            native_cost,
            cost_usd,
        })
    }

    /// Fee per unit for `chain` (with caching). Never fails.
    pub async fn gas_price(&self, chain: Chain) -> GasPriceInfo {
        let now = self.clock.now();

        if !chain.is_evm() {
            return GasPriceInfo::fallback(chain, now);
        }

        {
            let cache = self.cache.read().await;
            if let Some(info) = cache.get(&chain) {
                if !info.is_stale(now, self.cache_duration) {
                    trace!("Using cached gas price for {}: {:.4} gwei", chain, info.price_per_unit / 1e9);
                    return info.clone();
                }
            }
        }

        let info = self.fetch_gas_price(chain, now).await;
        self.cache.write().await.insert(chain, info.clone());
        info
    }

    async fn fetch_gas_price(&self, chain: Chain, now: DateTime<Utc>) -> GasPriceInfo {
        let Some(ref fee_data) = self.fee_data else {
            return GasPriceInfo::fallback(chain, now);
        };

        match tokio::time::timeout(self.fetch_timeout, fee_data.get_fee_data(chain)).await {
            Ok(Ok(wei)) => {
                let price = (wei as f64).clamp(MIN_FEE_WEI, MAX_FEE_WEI);
                debug!("⛽ Gas on {} from RPC: {:.4} gwei", chain, price / 1e9);
                return GasPriceInfo {
                    chain,
                    price_per_unit: price,
                    fetched_at: now,
                    source: GasSource::Rpc,
                };
            }
            Ok(Err(e)) => warn!("RPC gas fetch failed on {}: {}", chain, e),
            Err(_) => warn!("RPC gas fetch timed out on {}", chain),
        }

        let info = GasPriceInfo::fallback(chain, now);
        warn!("Using fallback gas price on {}: {:.4} gwei", chain, info.price_per_unit / 1e9);
        info
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::ManualClock;
    use crate::price_oracle::StaticPriceTable;
    use crate::testing::FixedFeeData;

    fn estimator(fee_data: Option<Arc<FixedFeeData>>) -> (GasEstimator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let prices = Arc::new(PriceOracle::new(
            vec![Arc::new(StaticPriceTable::default()) as Arc<dyn crate::price_oracle::PriceSource>],
            Arc::new(MemoryCache::new(clock.clone())),
            clock.clone(),
            Duration::from_secs(300),
            Duration::from_secs(10),
        ));
        let estimator = GasEstimator::new(
            fee_data.map(|f| f as Arc<dyn FeeDataProvider>),
            prices,
            clock.clone(),
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        (estimator, clock)
    }

    #[test]
    fn test_gas_units() {
        assert_eq!(gas_units(Chain::Ethereum, TxType::Swap), 150_000);
        assert_eq!(gas_units(Chain::Arbitrum, TxType::Bridge), 200_000);
        assert_eq!(gas_units(Chain::Base, TxType::Transfer), 16_800);
    }

    #[tokio::test]
    async fn test_estimate_cost() {
        // 150,000 gas at 20 gwei = 0.003 ETH; at $3000 = $9
        let fee = Arc::new(FixedFeeData::new(20_000_000_000));
        let (estimator, _) = estimator(Some(fee));
        let est = estimator.estimate(Chain::Ethereum, TxType::Swap, "1000000").await.unwrap();
        assert_eq!(est.gas_price.source, GasSource::Rpc);
        assert!((est.native_cost - 0.003).abs() < 1e-12);
        assert!((est.cost_usd - 9.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rpc_failure_falls_back() {
        let fee = Arc::new(FixedFeeData::new(20_000_000_000));
        fee.set_failing(true);
        let (estimator, _) = estimator(Some(fee));
        let est = estimator.estimate(Chain::Polygon, TxType::Transfer, "1").await.unwrap();
        assert_eq!(est.gas_price.source, GasSource::Fallback);
        assert_eq!(est.gas_price.price_per_unit, Chain::Polygon.fallback_gas_price());
    }

    #[tokio::test]
    async fn test_no_provider_uses_fallback() {
        let (estimator, _) = estimator(None);
        let info = estimator.gas_price(Chain::Ethereum).await;
        assert_eq!(info.source, GasSource::Fallback);
    }

    #[tokio::test]
    async fn test_price_cached_per_chain() {
        let fee = Arc::new(FixedFeeData::new(1_000_000_000));
        let (estimator, clock) = estimator(Some(fee.clone()));

        estimator.gas_price(Chain::Base).await;
        estimator.gas_price(Chain::Base).await;
        assert_eq!(fee.calls(), 1);

        estimator.gas_price(Chain::Optimism).await;
        assert_eq!(fee.calls(), 2);

        clock.advance_secs(31);
        estimator.gas_price(Chain::Base).await;
        assert_eq!(fee.calls(), 3);
    }

    #[tokio::test]
    async fn test_settlement_chain_is_free() {
        let fee = Arc::new(FixedFeeData::new(1_000_000_000));
        let (estimator, _) = estimator(Some(fee.clone()));
        let est = estimator.estimate(Chain::Settlement, TxType::Swap, "1").await.unwrap();
        assert_eq!(est.gas_price.source, GasSource::Fixed);
        assert_eq!(est.cost_usd, 0.0);
        assert_eq!(fee.calls(), 0);
    }

    #[tokio::test]
    async fn test_absurd_fee_is_clamped() {
        let fee = Arc::new(FixedFeeData::new(1));
        let (estimator, _) = estimator(Some(fee));
        let info = estimator.gas_price(Chain::Arbitrum).await;
        assert_eq!(info.price_per_unit, MIN_FEE_WEI);
    }
}
