//! Router error taxonomy
//!
//! Only failures that make the whole route computation meaningless surface
//! here. Per-source and per-edge failures are absorbed (and logged) by the
//! oracles and the graph builder.

use thiserror::Error;

use crate::tokens::{Asset, Chain};

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Debug, Error)]
pub enum RouterError {
    /// Every price source, including the static fallback, failed
    #[error("price unavailable for {asset}")]
    PriceUnavailable { asset: Asset },

    /// The graph has no path from source to destination within the hop bound
    #[error("no route from {from_token} on {from_chain} to {to_token} on {to_chain} within {max_hops} hops")]
    NoRouteFound {
        from_chain: Chain,
        from_token: Asset,
        to_chain: Chain,
        to_token: Asset,
        max_hops: usize,
    },

    /// Mandatory structural edges could not be built
    #[error("graph build failed: {0}")]
    GraphBuildFailure(String),

    #[error("{asset} is not registered on {chain}")]
    UnsupportedAsset { chain: Chain, asset: Asset },

    #[error("invalid amount '{0}': expected a base-unit integer")]
    InvalidAmount(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RouterError {
    /// Errors a caller may show to the payer ("cannot quote this payment right now").
    /// Anything else is an internal failure worth alerting on.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            RouterError::PriceUnavailable { .. } | RouterError::NoRouteFound { .. }
        )
    }
}
