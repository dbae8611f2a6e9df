//! Chain and token registry
//!
//! Chains and assets are closed enums. Per-chain token tables (address +
//! decimals) live here and are loaded once into a [`TokenRegistry`].

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================
// CHAINS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Arbitrum,
    Optimism,
    Base,
    Polygon,
    Bsc,
    Solana,
    /// Chain the destination stable token settles on
    Settlement,
}

impl Chain {
    pub const ALL: [Chain; 8] = [
        Chain::Ethereum,
        Chain::Arbitrum,
        Chain::Optimism,
        Chain::Base,
        Chain::Polygon,
        Chain::Bsc,
        Chain::Solana,
        Chain::Settlement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Polygon => "polygon",
            Chain::Bsc => "bsc",
            Chain::Solana => "solana",
            Chain::Settlement => "settlement",
        }
    }

    /// EVM chains expose fee data over JSON-RPC
    pub fn is_evm(&self) -> bool {
        !matches!(self, Chain::Solana | Chain::Settlement)
    }

    /// Gas unit multiplier relative to a base-layer chain
    pub fn gas_multiplier(&self) -> f64 {
        match self {
            Chain::Arbitrum | Chain::Optimism | Chain::Base => 0.8,
            _ => 1.0,
        }
    }

    /// Asset the chain charges gas in
    pub fn native_asset(&self) -> Asset {
        match self {
            Chain::Ethereum | Chain::Arbitrum | Chain::Optimism | Chain::Base => Asset::Eth,
            Chain::Polygon => Asset::Pol,
            Chain::Bsc => Asset::Bnb,
            Chain::Solana => Asset::Sol,
            Chain::Settlement => Asset::Usdh,
        }
    }

    /// Static fee per gas unit (in 1e-18 native units) used when no live data is available
    pub fn fallback_gas_price(&self) -> f64 {
        match self {
            Chain::Ethereum => 20e9,
            Chain::Arbitrum => 0.1e9,
            Chain::Optimism => 0.05e9,
            Chain::Base => 0.05e9,
            Chain::Polygon => 50e9,
            Chain::Bsc => 3e9,
            // ~5000 lamports per signature spread over a transfer's units
            Chain::Solana => 0.25e6,
            Chain::Settlement => 0.0,
        }
    }

    /// Rough time for one on-chain swap to land
    pub fn block_time_secs(&self) -> u64 {
        match self {
            Chain::Ethereum => 12,
            Chain::Polygon | Chain::Optimism | Chain::Base => 2,
            Chain::Bsc => 3,
            Chain::Arbitrum | Chain::Solana | Chain::Settlement => 1,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Chain::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| format!("unknown chain '{}'", s))
    }
}

// ============================================
// ASSETS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Asset {
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "WETH")]
    Weth,
    #[serde(rename = "USDC")]
    Usdc,
    #[serde(rename = "USDT")]
    Usdt,
    #[serde(rename = "DAI")]
    Dai,
    #[serde(rename = "WBTC")]
    Wbtc,
    #[serde(rename = "POL")]
    Pol,
    #[serde(rename = "WPOL")]
    Wpol,
    #[serde(rename = "BNB")]
    Bnb,
    #[serde(rename = "WBNB")]
    Wbnb,
    #[serde(rename = "SOL")]
    Sol,
    #[serde(rename = "WSOL")]
    Wsol,
    #[serde(rename = "USDh")]
    Usdh,
}

/// Asset categories drive bridgeability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    Native,
    WrappedNative,
    Stable,
    Volatile,
}

impl Asset {
    pub const ALL: [Asset; 13] = [
        Asset::Eth,
        Asset::Weth,
        Asset::Usdc,
        Asset::Usdt,
        Asset::Dai,
        Asset::Wbtc,
        Asset::Pol,
        Asset::Wpol,
        Asset::Bnb,
        Asset::Wbnb,
        Asset::Sol,
        Asset::Wsol,
        Asset::Usdh,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Eth => "ETH",
            Asset::Weth => "WETH",
            Asset::Usdc => "USDC",
            Asset::Usdt => "USDT",
            Asset::Dai => "DAI",
            Asset::Wbtc => "WBTC",
            Asset::Pol => "POL",
            Asset::Wpol => "WPOL",
            Asset::Bnb => "BNB",
            Asset::Wbnb => "WBNB",
            Asset::Sol => "SOL",
            Asset::Wsol => "WSOL",
            Asset::Usdh => "USDh",
        }
    }

    pub fn category(&self) -> TokenCategory {
        match self {
            Asset::Eth | Asset::Pol | Asset::Bnb | Asset::Sol => TokenCategory::Native,
            Asset::Weth | Asset::Wpol | Asset::Wbnb | Asset::Wsol => TokenCategory::WrappedNative,
            Asset::Usdc | Asset::Usdt | Asset::Dai | Asset::Usdh => TokenCategory::Stable,
            Asset::Wbtc => TokenCategory::Volatile,
        }
    }

    /// Only stablecoins and wrapped native assets move across bridges
    pub fn is_bridgeable(&self) -> bool {
        matches!(
            self.category(),
            TokenCategory::Stable | TokenCategory::WrappedNative
        )
    }

    /// CoinGecko id; wrapped assets price as their underlying
    pub fn coingecko_id(&self) -> Option<&'static str> {
        match self {
            Asset::Eth | Asset::Weth => Some("ethereum"),
            Asset::Usdc => Some("usd-coin"),
            Asset::Usdt => Some("tether"),
            Asset::Dai => Some("dai"),
            Asset::Wbtc => Some("wrapped-bitcoin"),
            Asset::Pol | Asset::Wpol => Some("polygon-ecosystem-token"),
            Asset::Bnb | Asset::Wbnb => Some("binancecoin"),
            Asset::Sol | Asset::Wsol => Some("solana"),
            Asset::Usdh => None,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Asset::ALL
            .into_iter()
            .find(|a| a.symbol().to_uppercase() == upper)
            .ok_or_else(|| format!("unknown token '{}'", s))
    }
}

// ============================================
// PER-CHAIN TOKENS
// ============================================

/// A token as deployed on one chain
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub chain: Chain,
    pub asset: Asset,
    /// Contract/mint address; `None` for native assets
    pub address: Option<&'static str>,
    pub decimals: u8,
}

impl Token {
    pub const fn new(chain: Chain, asset: Asset, address: Option<&'static str>, decimals: u8) -> Self {
        Self { chain, asset, address, decimals }
    }

    /// Parsed EVM address, when this is an EVM contract token
    pub fn evm_address(&self) -> Option<Result<Address, String>> {
        if !self.chain.is_evm() {
            return None;
        }
        self.address.map(|a| {
            Address::from_str(a).map_err(|e| format!("{} on {}: {}", self.asset, self.chain, e))
        })
    }
}

pub fn ethereum_tokens() -> Vec<Token> {
    use Asset::*;
    let c = Chain::Ethereum;
    vec![
        Token::new(c, Eth, None, 18),
        Token::new(c, Weth, Some("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"), 18),
        Token::new(c, Usdc, Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), 6),
        Token::new(c, Usdt, Some("0xdAC17F958D2ee523a2206206994597C13D831ec7"), 6),
        Token::new(c, Dai, Some("0x6B175474E89094C44Da98b954EedcdeCB5BE3830"), 18),
        Token::new(c, Wbtc, Some("0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"), 8),
    ]
}

pub fn arbitrum_tokens() -> Vec<Token> {
    use Asset::*;
    let c = Chain::Arbitrum;
    vec![
        Token::new(c, Eth, None, 18),
        Token::new(c, Weth, Some("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"), 18),
        Token::new(c, Usdc, Some("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"), 6),
        Token::new(c, Usdt, Some("0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"), 6),
        Token::new(c, Dai, Some("0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1"), 18),
        Token::new(c, Wbtc, Some("0x2f2a2543B76A4166549F7aaB2e75Bef0aefC5B0f"), 8),
    ]
}

pub fn optimism_tokens() -> Vec<Token> {
    use Asset::*;
    let c = Chain::Optimism;
    vec![
        Token::new(c, Eth, None, 18),
        Token::new(c, Weth, Some("0x4200000000000000000000000000000000000006"), 18),
        Token::new(c, Usdc, Some("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"), 6),
        Token::new(c, Usdt, Some("0x94b008aA00579c1307B0EF2c499aD98a8ce58e58"), 6),
        Token::new(c, Dai, Some("0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1"), 18),
    ]
}

pub fn base_tokens() -> Vec<Token> {
    use Asset::*;
    let c = Chain::Base;
    vec![
        Token::new(c, Eth, None, 18),
        Token::new(c, Weth, Some("0x4200000000000000000000000000000000000006"), 18),
        Token::new(c, Usdc, Some("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"), 6),
        Token::new(c, Dai, Some("0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb"), 18),
    ]
}

pub fn polygon_tokens() -> Vec<Token> {
    use Asset::*;
    let c = Chain::Polygon;
    vec![
        Token::new(c, Pol, None, 18),
        Token::new(c, Wpol, Some("0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270"), 18),
        Token::new(c, Usdc, Some("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"), 6),
        Token::new(c, Usdt, Some("0xc2132D05D31c914a87C6611C10748AEb04B58e8F"), 6),
        Token::new(c, Weth, Some("0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"), 18),
    ]
}

pub fn bsc_tokens() -> Vec<Token> {
    use Asset::*;
    let c = Chain::Bsc;
    vec![
        Token::new(c, Bnb, None, 18),
        Token::new(c, Wbnb, Some("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"), 18),
        Token::new(c, Usdc, Some("0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"), 18),
        Token::new(c, Usdt, Some("0x55d398326f99059fF775485246999027B3197955"), 18),
    ]
}

pub fn solana_tokens() -> Vec<Token> {
    use Asset::*;
    let c = Chain::Solana;
    vec![
        Token::new(c, Sol, None, 9),
        Token::new(c, Wsol, Some("So11111111111111111111111111111111111111112"), 9),
        Token::new(c, Usdc, Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"), 6),
        Token::new(c, Usdt, Some("Es9vMFrzaCERmJfrF4H2FYD4KgoNkY11McCe8BenwNYB"), 6),
    ]
}

pub fn settlement_tokens() -> Vec<Token> {
    use Asset::*;
    let c = Chain::Settlement;
    vec![
        Token::new(c, Usdh, None, 6),
        Token::new(c, Usdc, None, 6),
        Token::new(c, Usdt, None, 6),
    ]
}

// ============================================
// REGISTRY
// ============================================

/// All tokens the router knows about, keyed by (chain, asset)
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: Vec<Token>,
}

impl TokenRegistry {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn get(&self, chain: Chain, asset: Asset) -> Option<&Token> {
        self.tokens.iter().find(|t| t.chain == chain && t.asset == asset)
    }

    pub fn contains(&self, chain: Chain, asset: Asset) -> bool {
        self.get(chain, asset).is_some()
    }

    /// Tokens on one chain in registry order
    pub fn tokens_on(&self, chain: Chain) -> Vec<&Token> {
        self.tokens.iter().filter(|t| t.chain == chain).collect()
    }

    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.tokens.iter().map(|t| t.chain).collect();
        chains.sort();
        chains.dedup();
        chains
    }

    /// Distinct assets across all chains
    pub fn assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.tokens.iter().map(|t| t.asset).collect();
        assets.sort();
        assets.dedup();
        assets
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        let mut tokens = ethereum_tokens();
        tokens.extend(arbitrum_tokens());
        tokens.extend(optimism_tokens());
        tokens.extend(base_tokens());
        tokens.extend(polygon_tokens());
        tokens.extend(bsc_tokens());
        tokens.extend(solana_tokens());
        tokens.extend(settlement_tokens());
        Self::new(tokens)
    }
}
