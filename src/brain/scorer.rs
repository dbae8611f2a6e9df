//! Route Scorer
//!
//! Step 2.2: The Filter
//!
//! Prices every candidate in USD: gas per step (re-estimated with the
//! step's own amount), provider fees, and modelled slippage on swap steps.
//! Step inputs are valued at the prices the graph was built with, so a hop
//! token whose live price has since lapsed does not sink the candidate.
//! Ranking is total cost, then fewer hops, then faster, then the route
//! signature, so equal inputs always produce the same order.

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::cartographer::{LiquidityGraph, NodeKey};
use crate::error::{Result, RouterError};
use crate::gas_oracle::GasEstimator;
use crate::price_oracle::to_whole_units;
use crate::types::{parse_base_units, Route, RouteStatus, RouteStep, TxType};

pub struct RouteScorer {
    gas: Arc<GasEstimator>,
}

impl RouteScorer {
    pub fn new(gas: Arc<GasEstimator>) -> Self {
        Self { gas }
    }

    /// USD value of a step's input amount at the graph's node price
    pub fn step_amount_usd(&self, graph: &LiquidityGraph, step: &RouteStep) -> Result<f64> {
        let node = graph
            .node(&NodeKey::new(step.from_chain, step.from_token))
            .ok_or(RouterError::UnsupportedAsset {
                chain: step.from_chain,
                asset: step.from_token,
            })?;
        let raw = parse_base_units(&step.amount)?;
        Ok(to_whole_units(raw, node.decimals) * node.price_usd)
    }

    pub async fn score(&self, graph: &LiquidityGraph, mut route: Route) -> Result<Route> {
        let mut gas_usd = 0.0;
        let mut fees_usd = 0.0;
        let mut slippage_usd = 0.0;
        let mut input_usd = None;

        for step in route.steps.iter_mut() {
            if step.is_noop() {
                continue;
            }
            let amount_usd = self.step_amount_usd(graph, step)?;
            input_usd.get_or_insert(amount_usd);

            let gas = self.gas.estimate(step.from_chain, step.step_type, &step.amount).await?;
            step.gas_estimate = gas.cost_usd;
            gas_usd += gas.cost_usd;
            fees_usd += step.fee;

            if step.step_type == TxType::Swap {
                slippage_usd += amount_usd * step.estimated_slippage.unwrap_or(0.0);
            }
        }

        let input_usd = input_usd.unwrap_or(0.0);
        route.estimated_gas_cost_usd = gas_usd;
        route.estimated_fees_usd = fees_usd;
        route.estimated_slippage = if input_usd > 0.0 { slippage_usd / input_usd } else { 0.0 };
        route.total_cost_usd = gas_usd + fees_usd + slippage_usd;
        route.status = RouteStatus::Scored;

        debug!(
            "Scored {} | Gas: ${:.4} | Fees: ${:.4} | Slippage: ${:.4} | Total: ${:.4}",
            route.describe(),
            gas_usd,
            fees_usd,
            slippage_usd,
            route.total_cost_usd
        );
        Ok(route)
    }
}

/// Total cost, then hop count, then time, then signature
pub fn compare_routes(a: &Route, b: &Route) -> Ordering {
    a.total_cost_usd
        .total_cmp(&b.total_cost_usd)
        .then_with(|| a.hop_count().cmp(&b.hop_count()))
        .then_with(|| a.estimated_time_seconds.cmp(&b.estimated_time_seconds))
        .then_with(|| a.signature().cmp(&b.signature()))
}

pub fn rank(routes: &mut [Route]) {
    routes.sort_by(compare_routes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{node, Fixture};
    use crate::config::Config;
    use crate::tokens::{Asset, Chain};
    use crate::types::RouteType;
    use chrono::Utc;

    fn priced(nodes: &[(Chain, Asset)]) -> LiquidityGraph {
        let mut g = LiquidityGraph::new(Utc::now());
        for &(chain, asset) in nodes {
            g.add_node(node(chain, asset, 1.0));
        }
        g
    }

    fn step(kind: TxType, from: (Chain, Asset), to: (Chain, Asset), amount: &str, fee: f64, slippage: Option<f64>) -> RouteStep {
        RouteStep {
            step_type: kind,
            from_chain: from.0,
            to_chain: to.0,
            from_token: from.1,
            to_token: to.1,
            from_token_address: None,
            to_token_address: None,
            amount: amount.into(),
            provider: "test".into(),
            gas_estimate: 0.0,
            fee,
            estimated_slippage: slippage,
        }
    }

    fn route(steps: Vec<RouteStep>, total: f64, time: u64) -> Route {
        Route {
            steps,
            route_type: RouteType::MultiHop,
            estimated_gas_cost_usd: 0.0,
            estimated_fees_usd: 0.0,
            estimated_slippage: 0.0,
            estimated_time_seconds: time,
            total_cost_usd: total,
            status: RouteStatus::Scored,
        }
    }

    #[tokio::test]
    async fn test_score_accumulates_components() {
        let fx = Fixture::new(Config::default());
        let eth_usdc = (Chain::Ethereum, Asset::Usdc);
        let hub_usdc = (Chain::Settlement, Asset::Usdc);
        let hub_usdh = (Chain::Settlement, Asset::Usdh);
        let candidate = route(
            vec![
                step(TxType::Bridge, eth_usdc, hub_usdc, "100000000", 0.1, None),
                step(TxType::Swap, hub_usdc, hub_usdh, "99900000", 0.2997, Some(0.001)),
            ],
            0.0,
            0,
        );

        let graph = priced(&[eth_usdc, hub_usdc, hub_usdh]);
        let scored = fx.scorer().score(&graph, candidate).await.unwrap();
        // 250,000 gas at 20 gwei, ETH $3000 = $15; settlement gas is free
        assert!((scored.estimated_gas_cost_usd - 15.0).abs() < 1e-6);
        assert!((scored.estimated_fees_usd - 0.3997).abs() < 1e-9);
        let slippage_usd = 99.9 * 0.001;
        assert!((scored.total_cost_usd - (15.0 + 0.3997 + slippage_usd)).abs() < 1e-6);
        assert!((scored.estimated_slippage - slippage_usd / 100.0).abs() < 1e-9);
        assert!((scored.steps[0].gas_estimate - 15.0).abs() < 1e-9);
        assert_eq!(scored.status, RouteStatus::Scored);
    }

    #[tokio::test]
    async fn test_noop_scores_zero() {
        let fx = Fixture::new(Config::default());
        let node = (Chain::Settlement, Asset::Usdh);
        let scored = fx
            .scorer()
            .score(&priced(&[]), route(vec![step(TxType::Transfer, node, node, "1000000", 0.0, None)], 0.0, 0))
            .await
            .unwrap();
        assert_eq!(scored.total_cost_usd, 0.0);
    }

    #[tokio::test]
    async fn test_bad_amount_is_rejected() {
        let fx = Fixture::new(Config::default());
        let bad = route(
            vec![step(TxType::Swap, (Chain::Ethereum, Asset::Usdc), (Chain::Ethereum, Asset::Usdt), "abc", 0.0, Some(0.0))],
            0.0,
            0,
        );
        let graph = priced(&[(Chain::Ethereum, Asset::Usdc), (Chain::Ethereum, Asset::Usdt)]);
        assert!(matches!(fx.scorer().score(&graph, bad).await, Err(RouterError::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn test_step_valued_at_graph_price() {
        let fx = Fixture::without_fallback(Config::default());
        // the live feed no longer knows WBTC; the graph still carries its price
        fx.primary.remove_price(Asset::Wbtc);
        let mut graph = LiquidityGraph::new(Utc::now());
        graph.add_node(node(Chain::Ethereum, Asset::Wbtc, 60_000.0));
        let wbtc = (Chain::Ethereum, Asset::Wbtc);
        let s = step(TxType::Swap, wbtc, (Chain::Ethereum, Asset::Usdc), "100000000", 0.0, Some(0.0));
        let usd = fx.scorer().step_amount_usd(&graph, &s).unwrap();
        assert!((usd - 60_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_ranking_tie_breaks() {
        let a = (Chain::Ethereum, Asset::Usdc);
        let b = (Chain::Ethereum, Asset::Usdt);
        let c = (Chain::Ethereum, Asset::Dai);

        let cheap = route(vec![step(TxType::Swap, a, b, "1", 0.0, None), step(TxType::Swap, b, c, "1", 0.0, None)], 1.0, 10);
        let short = route(vec![step(TxType::Swap, a, c, "1", 0.0, None)], 2.0, 10);
        let short_slow = route(vec![step(TxType::Swap, a, c, "1", 0.0, None)], 2.0, 20);
        let long = route(vec![step(TxType::Swap, a, b, "1", 0.0, None), step(TxType::Swap, b, c, "1", 0.0, None)], 2.0, 1);

        let mut routes = vec![long.clone(), short_slow.clone(), short.clone(), cheap.clone()];
        rank(&mut routes);
        assert_eq!(routes, vec![cheap.clone(), short.clone(), short_slow.clone(), long.clone()]);

        let mut again = vec![short_slow, cheap, long, short];
        rank(&mut again);
        assert_eq!(again, routes);
    }
}
