use super::coin::{Coin, Direction};
use super::position::Position;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Expired,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::Expired => "EXPIRED",
            ExitReason::Manual => "MANUAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "STOP_LOSS" => Some(ExitReason::StopLoss),
            "TAKE_PROFIT" => Some(ExitReason::TakeProfit),
            "EXPIRED" => Some(ExitReason::Expired),
            "MANUAL" => Some(ExitReason::Manual),
            _ => None,
        }
    }
}

/// Immutable closed-trade record — the unit of learning. Once written to
/// the [`crate::journal::Journal`] it is never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub trade_id: Uuid,
    pub coin: Coin,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub size_usd: Decimal,
    pub pnl_usd: Decimal,
    pub won: bool,
    pub exit_reason: ExitReason,
    pub pattern_id: Option<String>,
}

impl TradeEvent {
    pub fn close(position: &Position, exit_price: Decimal, exit_time: DateTime<Utc>, reason: ExitReason) -> Self {
        let pnl_usd = position.pnl_usd(exit_price);
        Self {
            trade_id: Uuid::new_v4(),
            coin: position.coin.clone(),
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            entry_time: position.entry_time,
            exit_time,
            size_usd: position.size_usd,
            pnl_usd,
            won: pnl_usd > Decimal::ZERO,
            exit_reason: reason,
            pattern_id: position.pattern_id.clone(),
        }
    }
}
