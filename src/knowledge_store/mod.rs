//! Sole authority on [`CoinScore`], [`TradingPattern`], [`RegimeRule`], and
//! [`Adaptation`] records. Every mutation is a single critical section that
//! writes through to durable storage before returning; readers always see a
//! consistent record.

mod sqlite;

pub use sqlite::SqliteKnowledgeStore;

use crate::config::ThresholdsConfig;
use crate::domain::adaptation::{AdaptationMetrics, Effectiveness};
use crate::domain::errors::KnowledgeError;
use crate::domain::{Adaptation, Coin, CoinScore, CoinStatus, RegimeRule, TradeEvent, TradingPattern};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct CoinSummary {
    pub status: CoinStatus,
    pub win_rate: f64,
    pub total_trades: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RecentPerformance {
    pub total_trades: u64,
    pub wins: u64,
    pub total_pnl: Decimal,
}

/// Packaged view handed to the StrategyProposer.
#[derive(Debug, Clone)]
pub struct KnowledgeContext {
    pub coin_summaries: std::collections::HashMap<Coin, CoinSummary>,
    pub blacklist: Vec<Coin>,
    pub favored: Vec<Coin>,
    pub active_patterns: Vec<TradingPattern>,
    pub active_rules: Vec<RegimeRule>,
    pub recent_performance: RecentPerformance,
}

/// Outcome of folding one closed trade's counting-and-confidence math into
/// the knowledge base.
#[derive(Debug, Clone, Default)]
pub struct QuickUpdateResult {
    pub coin_adaptation: Option<Adaptation>,
    pub pattern_deactivated: bool,
    pub pattern_adaptation: Option<Adaptation>,
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn coin_score(&self, coin: &Coin) -> Option<CoinScore>;
    async fn all_coin_scores(&self) -> Vec<CoinScore>;
    async fn context(&self) -> KnowledgeContext;
    async fn pattern(&self, id: &str) -> Option<TradingPattern>;
    async fn active_patterns(&self) -> Vec<TradingPattern>;
    async fn active_rules(&self) -> Vec<RegimeRule>;
    async fn adaptations_since(&self, t: DateTime<Utc>) -> Vec<Adaptation>;

    async fn apply_quick_update(
        &self,
        event: &TradeEvent,
        thresholds: &ThresholdsConfig,
        now: DateTime<Utc>,
    ) -> Result<QuickUpdateResult, KnowledgeError>;

    async fn apply_adaptation(&self, adaptation: Adaptation) -> Result<(), KnowledgeError>;
    async fn force_blacklist(&self, coin: &Coin, reason: String, now: DateTime<Utc>) -> Result<(), KnowledgeError>;
    async fn unblacklist(&self, coin: &Coin, now: DateTime<Utc>) -> Result<(), KnowledgeError>;

    /// Rolls an adaptation back: inverts its knowledge mutation and marks it
    /// `rolled_back`. Used after a HARMFUL effectiveness rating.
    async fn rollback_adaptation(&self, adaptation_id: uuid::Uuid) -> Result<(), KnowledgeError>;

    /// Snapshot of (win_rate, pnl, trade_count) for a target over the given
    /// lookback window, used both as `metrics_before` and `metrics_after`.
    async fn target_metrics(&self, target: &str, since: DateTime<Utc>) -> AdaptationMetrics;

    /// Records the outcome of an effectiveness measurement against an
    /// already-applied adaptation. Does not itself decide rollback — the
    /// caller invokes `rollback_adaptation` separately when warranted.
    async fn record_effectiveness(
        &self,
        adaptation_id: uuid::Uuid,
        metrics_after: AdaptationMetrics,
        effectiveness: Effectiveness,
    ) -> Result<(), KnowledgeError>;

    /// Bumps `post_trade_count` on every pending adaptation targeting
    /// `coin`, so the applier can notice "N_POST_TRADES elapsed" without a
    /// second trade-history scan.
    async fn note_trade_for_pending_adaptations(&self, coin: &Coin) -> Result<(), KnowledgeError>;
}

pub(crate) fn adaptation_kind_for_status(status: CoinStatus) -> Option<crate::domain::AdaptationKind> {
    use crate::domain::AdaptationKind::*;
    match status {
        CoinStatus::Blacklisted => Some(Blacklist),
        CoinStatus::Favored => Some(Favor),
        CoinStatus::Reduced => Some(Reduce),
        CoinStatus::Normal | CoinStatus::Unknown => None,
    }
}
