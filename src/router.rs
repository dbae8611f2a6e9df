//! Routing Engine
//!
//! Ties the pieces together for one payment intent:
//! graph build -> bounded path search -> per-route scoring -> ranking.

use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::brain::{rank, RouteOptimizer, RouteScorer};
use crate::cartographer::{LiquidityGraph, LiquidityGraphBuilder, NodeKey};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Result, RouterError};
use crate::types::{PaymentIntent, Quote, Route, RouteStatus};
use crate::tokens::Chain;

pub struct RoutingEngine {
    builder: LiquidityGraphBuilder,
    optimizer: RouteOptimizer,
    scorer: RouteScorer,
    clock: Arc<dyn Clock>,
    settlement_chain: Chain,
    quote_validity: ChronoDuration,
}

impl RoutingEngine {
    pub fn new(
        config: &Config,
        builder: LiquidityGraphBuilder,
        scorer: RouteScorer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            builder,
            optimizer: RouteOptimizer::new(config.policy.max_hops),
            scorer,
            clock,
            settlement_chain: config.settlement_chain,
            quote_validity: ChronoDuration::seconds(config.policy.quote_validity_secs as i64),
        }
    }

    pub fn builder(&self) -> &LiquidityGraphBuilder {
        &self.builder
    }

    fn endpoints(&self, intent: &PaymentIntent) -> (NodeKey, NodeKey) {
        (
            NodeKey::new(intent.source_chain, intent.source_token),
            NodeKey::new(self.settlement_chain, intent.destination_token),
        )
    }

    /// Cheapest route for the intent
    pub async fn find_optimal_route(&self, intent: &PaymentIntent) -> Result<Route> {
        let mut best = self
            .rank_routes(intent)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.no_route(intent))?;
        best.status = RouteStatus::Selected;

        info!(
            "Selected {:?} route {} | Total: ${:.4} | {} hops | ~{}s",
            best.route_type,
            best.describe(),
            best.total_cost_usd,
            best.hop_count(),
            best.estimated_time_seconds
        );
        Ok(best)
    }

    /// Every candidate, scored, best first
    pub async fn rank_routes(&self, intent: &PaymentIntent) -> Result<Vec<Route>> {
        let amount = intent.amount_base_units()?;
        if amount == 0 {
            return Err(RouterError::InvalidAmount(intent.amount.clone()));
        }
        let graph = self.builder.build(intent).await?;
        self.route_on_graph(&graph, intent).await
    }

    /// Search and rank on an already built graph
    pub async fn route_on_graph(&self, graph: &LiquidityGraph, intent: &PaymentIntent) -> Result<Vec<Route>> {
        let amount = intent.amount_base_units()?;
        let (source, dest) = self.endpoints(intent);

        let candidates = self.optimizer.find_all_routes(graph, source, dest, amount);
        if candidates.is_empty() {
            return Err(self.no_route(intent));
        }

        let results = join_all(candidates.into_iter().map(|route| self.scorer.score(graph, route))).await;

        // A candidate that cannot be priced is dropped; only an all-failed set is an error
        let mut scored = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(route) => scored.push(route),
                Err(e) => {
                    warn!("Dropping candidate route: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if scored.is_empty() {
            return Err(first_error.unwrap_or_else(|| self.no_route(intent)));
        }

        rank(&mut scored);
        Ok(scored)
    }

    /// Optimal route with its validity window
    pub async fn quote(&self, intent: &PaymentIntent) -> Result<Quote> {
        let route = self.find_optimal_route(intent).await?;
        let issued_at = self.clock.now();
        Ok(Quote {
            intent: intent.clone(),
            route,
            issued_at,
            expires_at: issued_at + self.quote_validity,
        })
    }

    fn no_route(&self, intent: &PaymentIntent) -> RouterError {
        RouterError::NoRouteFound {
            from_chain: intent.source_chain,
            from_token: intent.source_token,
            to_chain: self.settlement_chain,
            to_token: intent.destination_token,
            max_hops: self.optimizer.max_hops(),
        }
    }
}
