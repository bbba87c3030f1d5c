//! Boundary to the external reasoning service: a free-form text-in,
//! JSON-array-text-out endpoint. Never returns an error to its callers —
//! timeouts and malformed output both fold to an empty result, per the
//! degrade-don't-halt policy for this collaborator.

pub mod http;

pub use http::HttpReasoningService;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::Insight;

/// Raw proposal shape returned by the reasoning service, before any of the
/// StrategyProposer's sanity checks are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalCandidate {
    pub coin: String,
    pub direction: String,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub pattern_id: Option<String>,
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// One call per StrategyProposer cycle. `deadline` is the hard cutoff;
    /// exceeding it, or receiving output that doesn't parse, both yield an
    /// empty vec.
    async fn propose(&self, prompt: String, deadline: Duration) -> Vec<ProposalCandidate>;

    /// One call per ReflectionEngine cycle.
    async fn reflect(&self, prompt: String, deadline: Duration) -> Vec<Insight>;
}
