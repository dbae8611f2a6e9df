//! Router Configuration
//!
//! Everything the engine needs at startup: RPC endpoints, routing policy
//! knobs and the provider tables (DEXes per chain, bridges per chain/asset).
//! Loaded once from the environment or a TOML file and validated against the
//! token registry before any route is computed.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RouterError;
use crate::tokens::{Asset, Chain, TokenRegistry};

// ============================================
// ROUTING POLICY
// ============================================

/// Tunable heuristics. Defaults are the production values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingPolicy {
    /// Maximum edges in a route
    pub max_hops: usize,

    /// Upper bound on modelled slippage per edge (0.10 = 10%)
    pub slippage_cap: f64,

    /// Trade size used for edge fee and slippage estimates
    pub reference_notional_usd: f64,

    /// Timeout applied to every external fetch
    pub fetch_timeout_secs: u64,

    /// A cached graph younger than this is reused verbatim
    pub graph_max_age_secs: u64,

    /// TTL of a published graph in the shared cache
    pub graph_cache_ttl_secs: u64,

    /// TTL of a published price in the shared cache
    pub price_cache_ttl_secs: u64,

    /// How long a chain's live gas price is reused
    pub gas_cache_secs: u64,

    /// Lifetime of a quote handed to the payment flow
    pub quote_validity_secs: u64,

    /// Interval of the background price refresh
    pub price_refresh_interval_secs: u64,
}

impl RoutingPolicy {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn graph_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.graph_cache_ttl_secs)
    }

    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl_secs)
    }

    pub fn price_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.price_refresh_interval_secs)
    }

    fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_hops: env_or("MAX_HOPS", d.max_hops),
            slippage_cap: env_or("SLIPPAGE_CAP", d.slippage_cap),
            reference_notional_usd: env_or("REFERENCE_NOTIONAL_USD", d.reference_notional_usd),
            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", d.fetch_timeout_secs),
            graph_max_age_secs: env_or("GRAPH_MAX_AGE_SECS", d.graph_max_age_secs),
            graph_cache_ttl_secs: env_or("GRAPH_CACHE_TTL_SECS", d.graph_cache_ttl_secs),
            price_cache_ttl_secs: env_or("PRICE_CACHE_TTL_SECS", d.price_cache_ttl_secs),
            gas_cache_secs: env_or("GAS_CACHE_SECS", d.gas_cache_secs),
            quote_validity_secs: env_or("QUOTE_VALIDITY_SECS", d.quote_validity_secs),
            price_refresh_interval_secs: env_or(
                "PRICE_REFRESH_INTERVAL_SECS",
                d.price_refresh_interval_secs,
            ),
        }
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            max_hops: 4,
            slippage_cap: 0.10,
            reference_notional_usd: 1_000.0,
            fetch_timeout_secs: 10,
            graph_max_age_secs: 60,
            graph_cache_ttl_secs: 120,
            price_cache_ttl_secs: 300,
            gas_cache_secs: 30,
            quote_validity_secs: 30,
            price_refresh_interval_secs: 60,
        }
    }
}

// ============================================
// PROVIDER TABLES
// ============================================

/// A DEX and the chains it quotes on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexConfig {
    pub name: String,
    pub chains: Vec<Chain>,
    /// Pool depth assumed when no live figure is available
    pub default_tvl_usd: f64,
    pub fee_fraction: f64,
}

/// A bridge, the chains it connects and the assets it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    pub chains: Vec<Chain>,
    pub assets: Vec<Asset>,
    pub liquidity_usd: f64,
    pub fee_fraction: f64,
    pub eta_secs: u64,
}

impl BridgeConfig {
    pub fn connects(&self, from: Chain, to: Chain) -> bool {
        from != to && self.chains.contains(&from) && self.chains.contains(&to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEndpoint {
    pub chain: Chain,
    pub url: String,
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// JSON-RPC endpoints for live fee data (EVM chains only)
    pub rpc_endpoints: Vec<RpcEndpoint>,

    /// CoinGecko API key; the public tier is used when absent
    pub coingecko_api_key: Option<String>,

    /// Query DefiLlama as the secondary price feed
    pub defillama_enabled: bool,

    // ========== Destination ==========
    pub settlement_chain: Chain,
    pub destination_token: Asset,

    // ========== Routing ==========
    pub policy: RoutingPolicy,

    // ========== Providers ==========
    pub dexes: Vec<DexConfig>,
    pub bridges: Vec<BridgeConfig>,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut rpc_endpoints = Vec::new();
        for chain in Chain::ALL.into_iter().filter(|c| c.is_evm()) {
            let key = format!("{}_RPC_URL", chain.as_str().to_uppercase());
            if let Ok(url) = env::var(&key) {
                if !url.trim().is_empty() {
                    rpc_endpoints.push(RpcEndpoint { chain, url });
                }
            }
        }

        let settlement_chain = match env::var("SETTLEMENT_CHAIN") {
            Ok(s) => Chain::from_str(&s).map_err(|e| eyre::eyre!(e))?,
            Err(_) => Chain::Settlement,
        };
        let destination_token = match env::var("DESTINATION_TOKEN") {
            Ok(s) => Asset::from_str(&s).map_err(|e| eyre::eyre!(e))?,
            Err(_) => Asset::Usdh,
        };

        Ok(Self {
            rpc_endpoints,
            coingecko_api_key: env::var("COINGECKO_API_KEY").ok(),
            defillama_enabled: env_or("DEFILLAMA_ENABLED", true),
            settlement_chain,
            destination_token,
            policy: RoutingPolicy::from_env(),
            dexes: default_dexes(),
            bridges: default_bridges(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn rpc_url(&self, chain: Chain) -> Option<&str> {
        self.rpc_endpoints
            .iter()
            .find(|e| e.chain == chain)
            .map(|e| e.url.as_str())
    }

    pub fn dexes_on(&self, chain: Chain) -> impl Iterator<Item = &DexConfig> {
        self.dexes.iter().filter(move |d| d.chains.contains(&chain))
    }

    /// Reject anything the router could only discover at lookup time
    pub fn validate(&self, registry: &TokenRegistry) -> std::result::Result<(), RouterError> {
        let p = &self.policy;
        if p.max_hops == 0 || p.max_hops > 6 {
            return Err(RouterError::Config(format!(
                "max_hops must be 1..=6 (currently {})",
                p.max_hops
            )));
        }
        if !(p.slippage_cap > 0.0 && p.slippage_cap <= 1.0) {
            return Err(RouterError::Config(format!(
                "slippage_cap must be in (0, 1] (currently {})",
                p.slippage_cap
            )));
        }
        if p.reference_notional_usd <= 0.0 {
            return Err(RouterError::Config("reference_notional_usd must be positive".into()));
        }
        if p.fetch_timeout_secs == 0 {
            return Err(RouterError::Config("fetch_timeout_secs must be positive".into()));
        }

        if !registry.contains(self.settlement_chain, self.destination_token) {
            return Err(RouterError::Config(format!(
                "destination token {} is not registered on {}",
                self.destination_token, self.settlement_chain
            )));
        }

        for token in registry.iter() {
            if let Some(Err(e)) = token.evm_address() {
                return Err(RouterError::Config(format!("malformed token address: {}", e)));
            }
        }

        for endpoint in &self.rpc_endpoints {
            if !endpoint.chain.is_evm() {
                return Err(RouterError::Config(format!(
                    "{} has no JSON-RPC fee market; remove its rpc endpoint",
                    endpoint.chain
                )));
            }
            if endpoint.url.contains("YOUR_API_KEY") {
                return Err(RouterError::Config(format!(
                    "rpc endpoint for {} still has a placeholder key",
                    endpoint.chain
                )));
            }
        }

        for dex in &self.dexes {
            if !(0.0..1.0).contains(&dex.fee_fraction) {
                return Err(RouterError::Config(format!(
                    "dex {} has fee_fraction {} outside [0, 1)",
                    dex.name, dex.fee_fraction
                )));
            }
            for chain in &dex.chains {
                if registry.tokens_on(*chain).len() < 2 {
                    return Err(RouterError::Config(format!(
                        "dex {} lists {} which has fewer than two registered tokens",
                        dex.name, chain
                    )));
                }
            }
        }

        for bridge in &self.bridges {
            if !(0.0..1.0).contains(&bridge.fee_fraction) {
                return Err(RouterError::Config(format!(
                    "bridge {} has fee_fraction {} outside [0, 1)",
                    bridge.name, bridge.fee_fraction
                )));
            }
            for asset in &bridge.assets {
                if !asset.is_bridgeable() {
                    return Err(RouterError::Config(format!(
                        "bridge {} carries {} which is not bridgeable",
                        bridge.name, asset
                    )));
                }
                let present = bridge
                    .chains
                    .iter()
                    .filter(|c| registry.contains(**c, *asset))
                    .count();
                if present < 2 {
                    return Err(RouterError::Config(format!(
                        "bridge {} carries {} but it is registered on fewer than two of its chains",
                        bridge.name, asset
                    )));
                }
            }
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║                 PAYROUTE - CONFIGURATION                   ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Destination:       {:^40} ║",
            format!("{} on {}", self.destination_token, self.settlement_chain)
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ ROUTING POLICY                                             ║");
        println!("║ • Max Hops:        {:^40} ║", self.policy.max_hops);
        println!("║ • Slippage Cap:    {:>38.2}% ║", self.policy.slippage_cap * 100.0);
        println!("║ • Reference Size:  ${:<38.0} ║", self.policy.reference_notional_usd);
        println!("║ • Fetch Timeout:   {:>38}s ║", self.policy.fetch_timeout_secs);
        println!("║ • Quote Validity:  {:>38}s ║", self.policy.quote_validity_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ PROVIDERS                                                  ║");
        println!("║ • DEXes:           {:^40} ║", self.dexes.len());
        println!("║ • Bridges:         {:^40} ║", self.bridges.len());
        println!("║ • RPC Endpoints:   {:^40} ║", self.rpc_endpoints.len());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ PRICE FEEDS                                                ║");
        println!("║ • CoinGecko Key:   {:^40} ║",
            if self.coingecko_api_key.is_some() { "✓ Configured" } else { "✗ Public tier" }
        );
        println!("║ • DefiLlama:       {:^40} ║",
            if self.defillama_enabled { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_endpoints: vec![],
            coingecko_api_key: None,
            defillama_enabled: true,
            settlement_chain: Chain::Settlement,
            destination_token: Asset::Usdh,
            policy: RoutingPolicy::default(),
            dexes: default_dexes(),
            bridges: default_bridges(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Default DEX table
pub fn default_dexes() -> Vec<DexConfig> {
    use Chain::*;
    vec![
        DexConfig {
            name: "uniswap_v3".into(),
            chains: vec![Ethereum, Arbitrum, Optimism, Base, Polygon],
            default_tvl_usd: 25_000_000.0,
            fee_fraction: 0.003,
        },
        DexConfig {
            name: "curve".into(),
            chains: vec![Ethereum, Arbitrum, Optimism, Polygon],
            default_tvl_usd: 40_000_000.0,
            fee_fraction: 0.0004,
        },
        DexConfig {
            name: "aerodrome".into(),
            chains: vec![Base],
            default_tvl_usd: 15_000_000.0,
            fee_fraction: 0.003,
        },
        DexConfig {
            name: "pancakeswap_v3".into(),
            chains: vec![Bsc],
            default_tvl_usd: 20_000_000.0,
            fee_fraction: 0.0025,
        },
        DexConfig {
            name: "jupiter".into(),
            chains: vec![Solana],
            default_tvl_usd: 30_000_000.0,
            fee_fraction: 0.003,
        },
        DexConfig {
            name: "settlement_amm".into(),
            chains: vec![Settlement],
            default_tvl_usd: 10_000_000.0,
            fee_fraction: 0.0005,
        },
    ]
}

/// Default bridge table
pub fn default_bridges() -> Vec<BridgeConfig> {
    use Chain::*;
    vec![
        BridgeConfig {
            name: "cctp".into(),
            chains: vec![Ethereum, Arbitrum, Optimism, Base, Polygon, Solana, Settlement],
            assets: vec![Asset::Usdc],
            liquidity_usd: 100_000_000.0,
            fee_fraction: 0.0001,
            eta_secs: 900,
        },
        BridgeConfig {
            name: "across".into(),
            chains: vec![Ethereum, Arbitrum, Optimism, Base, Polygon, Settlement],
            assets: vec![Asset::Usdc, Asset::Usdt, Asset::Weth],
            liquidity_usd: 20_000_000.0,
            fee_fraction: 0.0006,
            eta_secs: 120,
        },
        BridgeConfig {
            name: "wormhole".into(),
            chains: vec![Ethereum, Bsc, Polygon, Solana, Settlement],
            assets: vec![Asset::Usdc, Asset::Usdt],
            liquidity_usd: 10_000_000.0,
            fee_fraction: 0.001,
            eta_secs: 1_200,
        },
    ]
}

// ============================================
// TESTS
// ============================================
