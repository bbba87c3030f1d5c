use super::coin::Coin;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Fearful,
    Neutral,
    Greedy,
}

/// Per-coin slice of a [`MarketState`] snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinMarketView {
    pub price: Decimal,
    pub change_24h_pct: f64,
    pub rolling_volatility: f64,
    /// Stale entries are marked rather than silently mixed in with fresh ones.
    pub stale: bool,
}

/// A coherent, point-in-time read across the tradeable universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub taken_at: DateTime<Utc>,
    pub coins: HashMap<Coin, CoinMarketView>,
    pub btc_change_1h_pct: f64,
    pub btc_change_24h_pct: f64,
    pub sentiment: SentimentLabel,
}

impl MarketState {
    /// Derives the sentiment label from BTC's short/medium-term momentum.
    /// Coarse by design: this is a label for the reasoning-service prompt,
    /// not a trading signal on its own.
    pub fn derive_sentiment(change_1h_pct: f64, change_24h_pct: f64) -> SentimentLabel {
        let blended = 0.4 * change_1h_pct + 0.6 * change_24h_pct;
        if blended <= -2.0 {
            SentimentLabel::Fearful
        } else if blended >= 2.0 {
            SentimentLabel::Greedy
        } else {
            SentimentLabel::Neutral
        }
    }
}
