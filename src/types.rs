//! Payment intents, routes and quotes
//!
//! These are the types the payment flow hands in and gets back. Routes
//! serialize as camelCase JSON for quote persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{Result, RouterError};
use crate::tokens::{Asset, Chain};

/// One on-chain operation kind; doubles as the graph edge type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Transfer,
    Swap,
    Bridge,
}

impl TxType {
    /// Gas units on a base-layer chain
    pub fn base_gas_units(&self) -> u64 {
        match self {
            TxType::Transfer => 21_000,
            TxType::Swap => 150_000,
            TxType::Bridge => 250_000,
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxType::Transfer => write!(f, "transfer"),
            TxType::Swap => write!(f, "swap"),
            TxType::Bridge => write!(f, "bridge"),
        }
    }
}

// ============================================
// INTENT
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub source_chain: Chain,
    pub source_token: Asset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_token_address: Option<String>,
    /// Base-unit integer of the source token
    pub amount: String,
    pub destination_token: Asset,
}

impl PaymentIntent {
    pub fn new(source_chain: Chain, source_token: Asset, amount: impl Into<String>, destination_token: Asset) -> Self {
        Self {
            source_chain,
            source_token,
            source_token_address: None,
            amount: amount.into(),
            destination_token,
        }
    }

    pub fn amount_base_units(&self) -> Result<u128> {
        parse_base_units(&self.amount)
    }
}

pub fn parse_base_units(raw: &str) -> Result<u128> {
    raw.trim()
        .parse::<u128>()
        .map_err(|_| RouterError::InvalidAmount(raw.to_string()))
}

// ============================================
// ROUTES
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    Direct,
    Bridge,
    MultiHop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    /// Materialized from a graph path, not yet costed
    Candidate,
    Scored,
    Selected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStep {
    #[serde(rename = "type")]
    pub step_type: TxType,
    pub from_chain: Chain,
    pub to_chain: Chain,
    pub from_token: Asset,
    pub to_token: Asset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_token_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_token_address: Option<String>,
    /// Input amount in the step's input token base units
    pub amount: String,
    pub provider: String,
    /// USD
    pub gas_estimate: f64,
    /// USD
    pub fee: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_slippage: Option<f64>,
}

impl RouteStep {
    /// A transfer that starts and ends on the same node moves nothing
    pub fn is_noop(&self) -> bool {
        self.step_type == TxType::Transfer
            && self.from_chain == self.to_chain
            && self.from_token == self.to_token
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub steps: Vec<RouteStep>,
    pub route_type: RouteType,
    pub estimated_gas_cost_usd: f64,
    pub estimated_fees_usd: f64,
    /// Fraction of input value
    pub estimated_slippage: f64,
    pub estimated_time_seconds: u64,
    pub total_cost_usd: f64,
    pub status: RouteStatus,
}

impl Route {
    pub fn hop_count(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_noop()).count()
    }

    /// Visited (chain, token) nodes in path order
    pub fn node_path(&self) -> Vec<(Chain, Asset)> {
        let mut path = Vec::with_capacity(self.steps.len() + 1);
        if let Some(first) = self.steps.first() {
            path.push((first.from_chain, first.from_token));
        }
        for step in self.steps.iter().filter(|s| !s.is_noop()) {
            path.push((step.to_chain, step.to_token));
        }
        path
    }

    pub fn has_repeated_node(&self) -> bool {
        let path = self.node_path();
        let unique: HashSet<_> = path.iter().collect();
        unique.len() != path.len()
    }

    /// Endpoints match and consecutive steps chain
    pub fn is_well_formed(&self, from: (Chain, Asset), to: (Chain, Asset)) -> bool {
        let (Some(first), Some(last)) = (self.steps.first(), self.steps.last()) else {
            return false;
        };
        if (first.from_chain, first.from_token) != from || (last.to_chain, last.to_token) != to {
            return false;
        }
        self.steps.windows(2).all(|w| {
            (w[0].to_chain, w[0].to_token) == (w[1].from_chain, w[1].from_token)
        })
    }

    /// Stable textual identity used as the last tie-breaker
    pub fn signature(&self) -> String {
        self.steps
            .iter()
            .map(|s| {
                format!(
                    "{}:{}>{}:{}@{}",
                    s.from_chain, s.from_token, s.to_chain, s.to_token, s.provider
                )
            })
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            if i == 0 {
                parts.push(format!("{}:{}", step.from_chain, step.from_token));
            }
            parts.push(format!("-[{}]-> {}:{}", step.provider, step.to_chain, step.to_token));
        }
        parts.join(" ")
    }
}

// ============================================
// QUOTES
// ============================================

/// A selected route together with its validity window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub intent: PaymentIntent,
    pub route: Route,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Quote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
