use super::coin::{Coin, Direction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transient record emitted by the proposer and consumed by the executor.
/// Holds until triggered or expired — never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeCondition {
    pub condition_id: Uuid,
    pub coin: Coin,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub size_usd: Decimal,
    pub expires_at: DateTime<Utc>,
    pub pattern_id: Option<String>,
}

impl TradeCondition {
    /// Whether `price` crosses this condition's trigger: for LONG,
    /// price <= entry_price; for SHORT, price >= entry_price.
    pub fn is_triggered(&self, price: Decimal) -> bool {
        match self.direction {
            Direction::Long => price <= self.entry_price,
            Direction::Short => price >= self.entry_price,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
