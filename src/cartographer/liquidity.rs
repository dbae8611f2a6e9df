//! Provider liquidity lookups
//!
//! Best-effort depth and fee figures for a DEX pair or a bridge lane. The
//! graph builder wraps every call in its own timeout and drops the edge on
//! failure.

use async_trait::async_trait;
use eyre::{eyre, Result};

use crate::config::{BridgeConfig, Config, DexConfig};
use crate::tokens::{Asset, Chain, TokenCategory};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolLiquidity {
    pub tvl_usd: f64,
    pub fee_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BridgeLiquidity {
    pub liquidity_usd: f64,
    pub fee_fraction: f64,
    pub eta_seconds: u64,
}

#[async_trait]
pub trait LiquidityProvider: Send + Sync {
    async fn pool_liquidity(&self, chain: Chain, a: Asset, b: Asset, dex: &str) -> Result<PoolLiquidity>;

    async fn bridge_liquidity(&self, from: Chain, to: Chain, asset: Asset, bridge: &str) -> Result<BridgeLiquidity>;
}

/// Answers from the configured dex and bridge tables
#[derive(Debug, Clone)]
pub struct ConfiguredLiquidity {
    dexes: Vec<DexConfig>,
    bridges: Vec<BridgeConfig>,
}

impl ConfiguredLiquidity {
    pub fn new(dexes: Vec<DexConfig>, bridges: Vec<BridgeConfig>) -> Self {
        Self { dexes, bridges }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.dexes.clone(), config.bridges.clone())
    }
}

/// Pools pairing two stables are the deepest; anything touching a volatile asset is thinner
fn pair_depth_factor(a: Asset, b: Asset) -> f64 {
    match (a.category(), b.category()) {
        (TokenCategory::Stable, TokenCategory::Stable) => 1.0,
        (TokenCategory::Volatile, _) | (_, TokenCategory::Volatile) => 0.25,
        _ => 0.5,
    }
}

#[async_trait]
impl LiquidityProvider for ConfiguredLiquidity {
    async fn pool_liquidity(&self, chain: Chain, a: Asset, b: Asset, dex: &str) -> Result<PoolLiquidity> {
        let config = self
            .dexes
            .iter()
            .find(|d| d.name == dex && d.chains.contains(&chain))
            .ok_or_else(|| eyre!("{} is not configured on {}", dex, chain))?;

        Ok(PoolLiquidity {
            tvl_usd: config.default_tvl_usd * pair_depth_factor(a, b),
            fee_fraction: config.fee_fraction,
        })
    }

    async fn bridge_liquidity(&self, from: Chain, to: Chain, asset: Asset, bridge: &str) -> Result<BridgeLiquidity> {
        let config = self
            .bridges
            .iter()
            .find(|b| b.name == bridge)
            .ok_or_else(|| eyre!("unknown bridge {}", bridge))?;

        if !config.connects(from, to) {
            return Err(eyre!("{} does not connect {} and {}", bridge, from, to));
        }
        if !config.assets.contains(&asset) {
            return Err(eyre!("{} does not carry {}", bridge, asset));
        }

        Ok(BridgeLiquidity {
            liquidity_usd: config.liquidity_usd,
            fee_fraction: config.fee_fraction,
            eta_seconds: config.eta_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ConfiguredLiquidity {
        ConfiguredLiquidity::from_config(&Config::default())
    }

    #[tokio::test]
    async fn test_pool_lookup() {
        let p = provider();
        let pool = p.pool_liquidity(Chain::Ethereum, Asset::Usdc, Asset::Usdt, "curve").await.unwrap();
        assert_eq!(pool.fee_fraction, 0.0004);
        assert_eq!(pool.tvl_usd, 40_000_000.0);

        let thin = p.pool_liquidity(Chain::Ethereum, Asset::Usdc, Asset::Wbtc, "curve").await.unwrap();
        assert!(thin.tvl_usd < pool.tvl_usd);

        assert!(p.pool_liquidity(Chain::Bsc, Asset::Usdc, Asset::Usdt, "curve").await.is_err());
    }

    #[tokio::test]
    async fn test_bridge_lookup() {
        let p = provider();
        let lane = p
            .bridge_liquidity(Chain::Ethereum, Chain::Settlement, Asset::Usdc, "cctp")
            .await
            .unwrap();
        assert_eq!(lane.eta_seconds, 900);

        assert!(p.bridge_liquidity(Chain::Ethereum, Chain::Settlement, Asset::Usdt, "cctp").await.is_err());
        assert!(p.bridge_liquidity(Chain::Ethereum, Chain::Bsc, Asset::Usdc, "cctp").await.is_err());
    }
}
