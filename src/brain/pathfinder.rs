//! Bounded Route Search
//!
//! Step 2.1: The Pathfinder
//!
//! Depth-first enumeration of simple paths from the source node to the
//! destination node, at most `max_hops` edges long. A node already on the
//! current path is never entered again, so no route contains a cycle.
//! Each path becomes a candidate [`Route`] with one step per edge; amounts
//! carry forward from step to step net of fee and modelled slippage.

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashSet;
use tracing::debug;

use crate::cartographer::{GraphNode, LiquidityGraph, NodeKey};
use crate::price_oracle::{to_base_units, to_whole_units};
use crate::types::{Route, RouteStatus, RouteStep, RouteType, TxType};

/// Provider tag of the single step returned when source and destination coincide
pub const NOOP_PROVIDER: &str = "none";

pub struct RouteOptimizer {
    max_hops: usize,
}

impl RouteOptimizer {
    pub fn new(max_hops: usize) -> Self {
        Self { max_hops }
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Every simple path from `source` to `dest` within the hop bound.
    /// An empty list means no route; it is not an error here.
    pub fn find_all_routes(&self, graph: &LiquidityGraph, source: NodeKey, dest: NodeKey, amount_in: u128) -> Vec<Route> {
        let (Some(start), Some(goal)) = (graph.index_of(&source), graph.index_of(&dest)) else {
            return vec![];
        };

        if start == goal {
            return vec![noop_route(&graph.graph[start], amount_in)];
        }

        let mut paths = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut path = Vec::new();
        self.dfs(graph, start, goal, &mut visited, &mut path, &mut paths);

        let routes: Vec<Route> = paths
            .iter()
            .filter_map(|p| materialize(graph, p, amount_in))
            .collect();

        debug!(
            "Found {} candidate routes {} -> {} (max {} hops)",
            routes.len(),
            source,
            dest,
            self.max_hops
        );
        routes
    }

    fn dfs(
        &self,
        graph: &LiquidityGraph,
        current: NodeIndex,
        goal: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<EdgeIndex>,
        paths: &mut Vec<Vec<EdgeIndex>>,
    ) {
        if path.len() >= self.max_hops {
            return;
        }

        for edge in graph.graph.edges(current) {
            let target = edge.target();
            if visited.contains(&target) {
                continue;
            }

            path.push(edge.id());
            if target == goal {
                paths.push(path.clone());
            } else {
                visited.insert(target);
                self.dfs(graph, target, goal, visited, path, paths);
                visited.remove(&target);
            }
            path.pop();
        }
    }
}

/// direct: a single swap; bridge: exactly one bridge edge; multi_hop otherwise.
/// A same-node payment (only a noop transfer) moves nothing and counts as direct.
pub fn classify(steps: &[RouteStep]) -> RouteType {
    if !steps.is_empty() && steps.iter().all(RouteStep::is_noop) {
        return RouteType::Direct;
    }
    let bridges = steps.iter().filter(|s| s.step_type == TxType::Bridge).count();
    match (steps.len(), bridges) {
        (1, 0) => RouteType::Direct,
        (_, 1) => RouteType::Bridge,
        _ => RouteType::MultiHop,
    }
}

fn noop_route(node: &GraphNode, amount: u128) -> Route {
    let step = RouteStep {
        step_type: TxType::Transfer,
        from_chain: node.key.chain,
        to_chain: node.key.chain,
        from_token: node.key.token,
        to_token: node.key.token,
        from_token_address: node.token_address.clone(),
        to_token_address: node.token_address.clone(),
        amount: amount.to_string(),
        provider: NOOP_PROVIDER.to_string(),
        gas_estimate: 0.0,
        fee: 0.0,
        estimated_slippage: None,
    };
    let steps = vec![step];
    Route {
        route_type: classify(&steps),
        steps,
        estimated_gas_cost_usd: 0.0,
        estimated_fees_usd: 0.0,
        estimated_slippage: 0.0,
        estimated_time_seconds: 0,
        total_cost_usd: 0.0,
        status: RouteStatus::Candidate,
    }
}

fn materialize(graph: &LiquidityGraph, path: &[EdgeIndex], amount_in: u128) -> Option<Route> {
    let mut steps = Vec::with_capacity(path.len());
    let mut amount = amount_in;
    let mut time = 0;

    for &idx in path {
        let edge = graph.graph.edge_weight(idx)?;
        let from = graph.node(&edge.from)?;
        let to = graph.node(&edge.to)?;

        let in_usd = to_whole_units(amount, from.decimals) * from.price_usd;
        let slippage = (edge.edge_type == TxType::Swap).then_some(edge.slippage);

        steps.push(RouteStep {
            step_type: edge.edge_type,
            from_chain: edge.from.chain,
            to_chain: edge.to.chain,
            from_token: edge.from.token,
            to_token: edge.to.token,
            from_token_address: from.token_address.clone(),
            to_token_address: to.token_address.clone(),
            amount: amount.to_string(),
            provider: edge.provider.clone(),
            gas_estimate: edge.gas_estimate_usd,
            fee: in_usd * edge.fee_fraction,
            estimated_slippage: slippage,
        });

        let out_usd = in_usd * (1.0 - edge.fee_fraction - slippage.unwrap_or(0.0));
        amount = to_base_units(out_usd / to.price_usd, to.decimals);
        time += edge.eta_seconds;
    }

    Some(Route {
        route_type: classify(&steps),
        steps,
        estimated_gas_cost_usd: 0.0,
        estimated_fees_usd: 0.0,
        estimated_slippage: 0.0,
        estimated_time_seconds: time,
        total_cost_usd: 0.0,
        status: RouteStatus::Candidate,
    })
}
