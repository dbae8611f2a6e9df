//! Payroute - cross-chain payment routing
//!
//! Given a payment intent (source chain, token and amount, plus the token
//! the merchant settles in), find the cheapest way to move the funds onto
//! the settlement chain.
//!
//! - `cartographer`: liquidity graph of swap and bridge edges
//! - `brain`: bounded route search and scoring
//! - `price_oracle` / `gas_oracle`: cost inputs with fallbacks
//! - `router`: the `RoutingEngine` entry point

pub mod brain;
pub mod cache;
pub mod cartographer;
pub mod clock;
pub mod config;
pub mod error;
pub mod gas_oracle;
pub mod price_oracle;
pub mod router;
pub mod tokens;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{Result, RouterError};
pub use router::RoutingEngine;
pub use types::{PaymentIntent, Quote, Route, RouteStep};
