//! Graph Builder
//!
//! Builds the liquidity graph for one payment intent:
//! 1. Reuse the cached graph for the source (chain, token) if it is young enough
//! 2. Price every token that can appear in the graph
//! 3. Swap edges on the source and destination chains, bridge edges from the
//!    source chain to every chain a configured bridge reaches
//! 4. Publish to the shared cache
//!
//! Provider lookups for independent edges run concurrently. Each carries its
//! own timeout; a failed lookup drops that edge and nothing else.

use chrono::{DateTime, Utc};
use eyre::eyre;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::graph::{edge_id, model_slippage, GraphEdge, GraphNode, GraphSnapshot, LiquidityGraph, NodeKey};
use super::liquidity::LiquidityProvider;
use crate::cache::{get_json, set_json, SharedCache};
use crate::clock::{age_secs, Clock};
use crate::config::{BridgeConfig, Config, DexConfig, RoutingPolicy};
use crate::error::{Result, RouterError};
use crate::gas_oracle::GasEstimator;
use crate::price_oracle::{to_base_units, PriceOracle, TokenPrice};
use crate::tokens::{Asset, Chain, TokenRegistry};
use crate::types::{PaymentIntent, TxType};

#[derive(Debug, Clone)]
enum EdgeJob {
    /// Both directions of one pool
    Swap { chain: Chain, a: Asset, b: Asset, dex: String },
    Bridge { from: Chain, to: Chain, asset: Asset, bridge: String },
}

impl EdgeJob {
    fn describe(&self) -> String {
        match self {
            EdgeJob::Swap { chain, a, b, dex } => format!("{} {}/{} on {}", dex, a, b, chain),
            EdgeJob::Bridge { from, to, asset, bridge } => format!("{} {} {}->{}", bridge, asset, from, to),
        }
    }
}

pub struct LiquidityGraphBuilder {
    registry: Arc<TokenRegistry>,
    dexes: Vec<DexConfig>,
    bridges: Vec<BridgeConfig>,
    settlement_chain: Chain,
    policy: RoutingPolicy,
    liquidity: Arc<dyn LiquidityProvider>,
    gas: Arc<GasEstimator>,
    prices: Arc<PriceOracle>,
    cache: Arc<dyn SharedCache>,
    clock: Arc<dyn Clock>,
}

impl LiquidityGraphBuilder {
    pub fn new(
        config: &Config,
        registry: Arc<TokenRegistry>,
        liquidity: Arc<dyn LiquidityProvider>,
        gas: Arc<GasEstimator>,
        prices: Arc<PriceOracle>,
        cache: Arc<dyn SharedCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            dexes: config.dexes.clone(),
            bridges: config.bridges.clone(),
            settlement_chain: config.settlement_chain,
            policy: config.policy.clone(),
            liquidity,
            gas,
            prices,
            cache,
            clock,
        }
    }

    pub fn cache_key(source: &NodeKey) -> String {
        format!("graph:{}:{}", source.chain, source.token.symbol())
    }

    fn require_registered(&self, key: &NodeKey) -> Result<()> {
        if self.registry.contains(key.chain, key.token) {
            Ok(())
        } else {
            Err(RouterError::UnsupportedAsset {
                chain: key.chain,
                asset: key.token,
            })
        }
    }

    /// Graph reachable from the intent's source toward the settlement chain
    pub async fn build(&self, intent: &PaymentIntent) -> Result<LiquidityGraph> {
        let source = NodeKey::new(intent.source_chain, intent.source_token);
        let dest = NodeKey::new(self.settlement_chain, intent.destination_token);
        self.require_registered(&source)?;
        self.require_registered(&dest)?;

        let key = Self::cache_key(&source);
        if let Some(graph) = self.cached(&key, &source, &dest).await {
            return Ok(graph);
        }

        let graph = self.build_fresh(source, dest).await?;
        set_json(self.cache.as_ref(), &key, &graph.to_snapshot(), self.policy.graph_cache_ttl()).await;
        Ok(graph)
    }

    /// Drop the cached graph for a source so the next build starts over
    pub async fn invalidate(&self, chain: Chain, token: Asset) {
        let key = Self::cache_key(&NodeKey::new(chain, token));
        if let Err(e) = self.cache.delete(&key).await {
            warn!("Failed to drop cached graph {}: {}", key, e);
        }
    }

    async fn cached(&self, key: &str, source: &NodeKey, dest: &NodeKey) -> Option<LiquidityGraph> {
        let snapshot: GraphSnapshot = get_json(self.cache.as_ref(), key).await?;
        if age_secs(self.clock.now(), snapshot.built_at) >= self.policy.graph_max_age_secs as i64 {
            debug!("Cached graph {} is too old", key);
            return None;
        }

        let graph = LiquidityGraph::from_snapshot(snapshot);
        // Graphs are keyed by source only; make sure this one serves the destination too
        let reachable = graph.contains_node(dest) && (source == dest || graph.incoming_count(dest) > 0);
        if !reachable {
            debug!("Cached graph {} does not reach {}", key, dest);
            return None;
        }
        debug!("Reusing cached graph {} ({} edges)", key, graph.edge_count());
        Some(graph)
    }

    async fn build_fresh(&self, source: NodeKey, dest: NodeKey) -> Result<LiquidityGraph> {
        let now = self.clock.now();
        let cross_chain = source.chain != dest.chain;

        let mut swap_chains = vec![source.chain];
        if cross_chain {
            swap_chains.push(dest.chain);
        }

        let lanes = if cross_chain { self.bridge_lanes(source.chain) } else { vec![] };

        // Every node that may appear
        let mut keys: BTreeSet<NodeKey> = BTreeSet::new();
        keys.insert(source);
        keys.insert(dest);
        for &chain in &swap_chains {
            for token in self.registry.tokens_on(chain) {
                keys.insert(NodeKey::new(chain, token.asset));
            }
        }
        for (to, asset, _) in &lanes {
            keys.insert(NodeKey::new(source.chain, *asset));
            keys.insert(NodeKey::new(*to, *asset));
        }

        let prices = self.price_assets(&keys, &source, &dest).await?;

        let mut graph = LiquidityGraph::new(now);
        for key in &keys {
            let (Some(token), Some(price)) = (self.registry.get(key.chain, key.token), prices.get(&key.token)) else {
                continue;
            };
            graph.add_node(GraphNode {
                key: *key,
                token_address: token.address.map(str::to_string),
                decimals: token.decimals,
                price_usd: price.price,
                price_source: price.source.clone(),
                price_confidence: price.confidence,
            });
        }

        let mut jobs = Vec::new();
        for &chain in &swap_chains {
            let on_chain: Vec<Asset> = graph
                .nodes()
                .filter(|n| n.key.chain == chain)
                .map(|n| n.key.token)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            for dex in self.dexes.iter().filter(|d| d.chains.contains(&chain)) {
                for (i, &a) in on_chain.iter().enumerate() {
                    for &b in &on_chain[i + 1..] {
                        jobs.push(EdgeJob::Swap { chain, a, b, dex: dex.name.clone() });
                    }
                }
            }
        }
        for (to, asset, bridge) in &lanes {
            let from_key = NodeKey::new(source.chain, *asset);
            let to_key = NodeKey::new(*to, *asset);
            if graph.contains_node(&from_key) && graph.contains_node(&to_key) {
                jobs.push(EdgeJob::Bridge {
                    from: source.chain,
                    to: *to,
                    asset: *asset,
                    bridge: bridge.clone(),
                });
            }
        }

        let results = join_all(jobs.iter().map(|job| self.run_job(job, &graph, now))).await;

        let mut failed = 0;
        let mut built = Vec::new();
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(edges) => built.extend(edges),
                Err(e) => {
                    failed += 1;
                    warn!("Dropping edge {}: {}", job.describe(), e);
                }
            }
        }
        for edge in built {
            graph.add_edge(edge);
        }

        info!(
            "Graph built: {} Nodes, {} Edges ({} -> {})",
            graph.node_count(),
            graph.edge_count(),
            source,
            dest
        );
        if failed > 0 {
            warn!("  Skipped {} provider lookups", failed);
        }
        for (provider, count) in graph.edge_counts_by_provider() {
            debug!("    {}: {}", provider, count);
        }

        let bridged_in = !cross_chain
            || graph
                .edges()
                .any(|e| e.edge_type == TxType::Bridge && e.to.chain == dest.chain);
        if source != dest && (graph.incoming_count(&dest) == 0 || !bridged_in) {
            return Err(RouterError::GraphBuildFailure(format!(
                "no edge reaches {} from {}",
                dest, source
            )));
        }

        Ok(graph)
    }

    /// (target chain, asset, bridge) for every lane leaving `from`
    fn bridge_lanes(&self, from: Chain) -> Vec<(Chain, Asset, String)> {
        let mut lanes = Vec::new();
        for bridge in &self.bridges {
            for &to in &bridge.chains {
                if !bridge.connects(from, to) {
                    continue;
                }
                for &asset in &bridge.assets {
                    if asset.is_bridgeable() && self.registry.contains(from, asset) && self.registry.contains(to, asset) {
                        lanes.push((to, asset, bridge.name.clone()));
                    }
                }
            }
        }
        lanes
    }

    /// Price each distinct asset once. Only the source and destination tokens are mandatory.
    async fn price_assets(
        &self,
        keys: &BTreeSet<NodeKey>,
        source: &NodeKey,
        dest: &NodeKey,
    ) -> Result<HashMap<Asset, TokenPrice>> {
        let assets: BTreeSet<Asset> = keys.iter().map(|k| k.token).collect();
        let fetched = join_all(assets.iter().map(|&asset| async move {
            (asset, self.prices.get_price(asset).await)
        }))
        .await;

        let mut prices = HashMap::new();
        for (asset, result) in fetched {
            match result {
                Ok(price) => {
                    prices.insert(asset, price);
                }
                Err(e) if asset == source.token || asset == dest.token => return Err(e),
                Err(e) => warn!("Omitting {} nodes: {}", asset, e),
            }
        }
        Ok(prices)
    }

    async fn with_timeout<T>(&self, what: &str, fut: impl Future<Output = eyre::Result<T>>) -> eyre::Result<T> {
        tokio::time::timeout(self.policy.fetch_timeout(), fut)
            .await
            .map_err(|_| eyre!("{} timed out", what))?
    }

    async fn run_job(&self, job: &EdgeJob, graph: &LiquidityGraph, now: DateTime<Utc>) -> eyre::Result<Vec<GraphEdge>> {
        match job {
            EdgeJob::Swap { chain, a, b, dex } => {
                let pool = self
                    .with_timeout("pool lookup", self.liquidity.pool_liquidity(*chain, *a, *b, dex))
                    .await?;
                let from = NodeKey::new(*chain, *a);
                let to = NodeKey::new(*chain, *b);
                let gas_usd = self.reference_gas(graph, &from, TxType::Swap).await?;
                let eta = chain.block_time_secs();
                Ok(vec![
                    self.make_edge(graph, from, to, TxType::Swap, dex, pool.fee_fraction, pool.tvl_usd, eta, gas_usd, now)?,
                    self.make_edge(graph, to, from, TxType::Swap, dex, pool.fee_fraction, pool.tvl_usd, eta, gas_usd, now)?,
                ])
            }
            EdgeJob::Bridge { from, to, asset, bridge } => {
                let lane = self
                    .with_timeout("bridge lookup", self.liquidity.bridge_liquidity(*from, *to, *asset, bridge))
                    .await?;
                let from = NodeKey::new(*from, *asset);
                let to = NodeKey::new(*to, *asset);
                let gas_usd = self.reference_gas(graph, &from, TxType::Bridge).await?;
                Ok(vec![self.make_edge(
                    graph,
                    from,
                    to,
                    TxType::Bridge,
                    bridge,
                    lane.fee_fraction,
                    lane.liquidity_usd,
                    lane.eta_seconds,
                    gas_usd,
                    now,
                )?])
            }
        }
    }

    /// Gas for one operation sized at the reference notional
    async fn reference_gas(&self, graph: &LiquidityGraph, from: &NodeKey, tx_type: TxType) -> eyre::Result<f64> {
        let node = graph.node(from).ok_or_else(|| eyre!("{} missing from graph", from))?;
        let amount = to_base_units(self.policy.reference_notional_usd / node.price_usd, node.decimals);
        let estimate = self.gas.estimate(from.chain, tx_type, &amount.to_string()).await?;
        Ok(estimate.cost_usd)
    }

    #[allow(clippy::too_many_arguments)]
    fn make_edge(
        &self,
        graph: &LiquidityGraph,
        from: NodeKey,
        to: NodeKey,
        edge_type: TxType,
        provider: &str,
        fee_fraction: f64,
        liquidity_usd: f64,
        eta_seconds: u64,
        gas_estimate_usd: f64,
        now: DateTime<Utc>,
    ) -> eyre::Result<GraphEdge> {
        let input = graph.node(&from).ok_or_else(|| eyre!("{} missing from graph", from))?;
        let reference = self.policy.reference_notional_usd;
        Ok(GraphEdge {
            id: edge_id(&from, &to, provider),
            from,
            to,
            edge_type,
            provider: provider.to_string(),
            cost_usd: fee_fraction * reference,
            liquidity_usd,
            gas_estimate_usd,
            slippage: model_slippage(reference, liquidity_usd, self.policy.slippage_cap),
            fee_fraction,
            eta_seconds,
            confidence: input.price_confidence,
            last_updated: now,
        })
    }
}
