//! Phase 2: The Brain
//!
//! Responsible for:
//! - Enumerating bounded simple paths through the liquidity graph
//! - Pricing each candidate and ranking them deterministically

mod pathfinder;
mod scorer;

pub use pathfinder::{classify, RouteOptimizer, NOOP_PROVIDER};
pub use scorer::{compare_routes, rank, RouteScorer};
