//! Liquidity Graph
//!
//! Directed graph of (chain, token) nodes joined by provider-specific swap
//! and bridge edges. Parallel providers between the same node pair are kept
//! as distinct edges; an edge is identified by `from -> to : provider` and a
//! second insert under the same id is ignored.

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::price_oracle::Confidence;
use crate::tokens::{Asset, Chain};
use crate::types::TxType;

/// Composite node identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub chain: Chain,
    pub token: Asset,
}

impl NodeKey {
    pub fn new(chain: Chain, token: Asset) -> Self {
        Self { chain, token }
    }

    pub fn id(&self) -> String {
        format!("{}:{}", self.chain, self.token)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.token)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub key: NodeKey,
    /// Absent for native assets and non-EVM chains
    pub token_address: Option<String>,
    pub decimals: u8,
    pub price_usd: f64,
    pub price_source: String,
    pub price_confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub from: NodeKey,
    pub to: NodeKey,
    #[serde(rename = "type")]
    pub edge_type: TxType,
    pub provider: String,
    /// Provider fee at the reference notional
    pub cost_usd: f64,
    /// Depth; feeds slippage only, never a capacity limit
    pub liquidity_usd: f64,
    pub gas_estimate_usd: f64,
    pub slippage: f64,
    pub fee_fraction: f64,
    pub eta_seconds: u64,
    /// Confidence of the input token's price
    pub confidence: Confidence,
    pub last_updated: DateTime<Utc>,
}

pub fn edge_id(from: &NodeKey, to: &NodeKey, provider: &str) -> String {
    format!("{}->{}:{}", from.id(), to.id(), provider)
}

/// Modelled slippage for a trade of `reference_usd` against `liquidity_usd`
pub fn model_slippage(reference_usd: f64, liquidity_usd: f64, cap: f64) -> f64 {
    if liquidity_usd <= 0.0 || !liquidity_usd.is_finite() {
        return cap;
    }
    (reference_usd / liquidity_usd * 2.0).min(cap)
}

/// Serialized form published to the shared cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LiquidityGraph {
    pub graph: DiGraph<GraphNode, GraphEdge>,
    node_index: HashMap<NodeKey, NodeIndex>,
    edge_ids: HashSet<String>,
    pub built_at: DateTime<Utc>,
}

impl LiquidityGraph {
    pub fn new(built_at: DateTime<Utc>) -> Self {
        Self {
            graph: DiGraph::new(),
            node_index: HashMap::new(),
            edge_ids: HashSet::new(),
            built_at,
        }
    }

    /// Insert a node; an existing node with the same key is kept as is
    pub fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&node.key) {
            return idx;
        }
        let key = node.key;
        let idx = self.graph.add_node(node);
        self.node_index.insert(key, idx);
        idx
    }

    /// Insert an edge. Returns false if the id exists or an endpoint is missing.
    pub fn add_edge(&mut self, edge: GraphEdge) -> bool {
        if self.edge_ids.contains(&edge.id) {
            return false;
        }
        let (Some(&from), Some(&to)) = (self.node_index.get(&edge.from), self.node_index.get(&edge.to)) else {
            return false;
        };
        self.edge_ids.insert(edge.id.clone());
        self.graph.add_edge(from, to, edge);
        true
    }

    pub fn index_of(&self, key: &NodeKey) -> Option<NodeIndex> {
        self.node_index.get(key).copied()
    }

    pub fn node(&self, key: &NodeKey) -> Option<&GraphNode> {
        self.index_of(key).map(|idx| &self.graph[idx])
    }

    pub fn contains_node(&self, key: &NodeKey) -> bool {
        self.node_index.contains_key(key)
    }

    pub fn contains_edge(&self, id: &str) -> bool {
        self.edge_ids.contains(id)
    }

    pub fn edge(&self, id: &str) -> Option<&GraphEdge> {
        self.graph.edge_weights().find(|e| e.id == id)
    }

    pub fn edges_from(&self, key: &NodeKey) -> Vec<&GraphEdge> {
        match self.index_of(key) {
            Some(idx) => self.graph.edges(idx).map(|e| e.weight()).collect(),
            None => vec![],
        }
    }

    pub fn incoming_count(&self, key: &NodeKey) -> usize {
        self.index_of(key)
            .map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .unwrap_or(0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_weights()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.graph.edge_weights()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edge_counts_by_provider(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for edge in self.graph.edge_weights() {
            *counts.entry(edge.provider.as_str()).or_insert(0) += 1;
        }
        let mut counts: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(p, c)| (p.to_string(), c))
            .collect();
        counts.sort();
        counts
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.graph.node_weights().cloned().collect(),
            edges: self.graph.edge_weights().cloned().collect(),
            built_at: self.built_at,
        }
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = Self::new(snapshot.built_at);
        for node in snapshot.nodes {
            graph.add_node(node);
        }
        for edge in snapshot.edges {
            graph.add_edge(edge);
        }
        graph
    }
}
