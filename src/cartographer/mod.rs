//! Phase 1: The Cartographer (Liquidity Graph)
//!
//! Maps swap and bridge liquidity reachable from a payment's source token.

mod builder;
mod graph;
mod liquidity;

pub use builder::LiquidityGraphBuilder;
pub use graph::{edge_id, model_slippage, GraphEdge, GraphNode, GraphSnapshot, LiquidityGraph, NodeKey};
pub use liquidity::{BridgeLiquidity, ConfiguredLiquidity, LiquidityProvider, PoolLiquidity};
