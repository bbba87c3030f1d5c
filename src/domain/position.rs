use super::coin::{Coin, Direction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An open, simulated trade. Exists only while unresolved; owned
/// exclusively by [`crate::executor::ConditionExecutor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub condition_id: Uuid,
    pub coin: Coin,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub size_usd: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub pattern_id: Option<String>,
}

impl Position {
    /// (exit - entry) * size_usd / entry for LONG, negated for SHORT.
    pub fn pnl_usd(&self, exit_price: Decimal) -> Decimal {
        let raw = (exit_price - self.entry_price) * self.size_usd / self.entry_price;
        match self.direction {
            Direction::Long => raw,
            Direction::Short => -raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(direction: Direction) -> Position {
        Position {
            position_id: Uuid::new_v4(),
            condition_id: Uuid::new_v4(),
            coin: Coin::new("BTC"),
            direction,
            entry_price: dec!(100),
            entry_time: DateTime::from_timestamp(0, 0).unwrap(),
            size_usd: dec!(100),
            stop_loss: dec!(95),
            take_profit: dec!(105),
            pattern_id: None,
        }
    }

    #[test]
    fn long_stop_loss_pnl_is_entry_to_exit_delta() {
        let p = position(Direction::Long);
        assert_eq!(p.pnl_usd(dec!(94)), dec!(-6));
    }

    #[test]
    fn short_pnl_is_negated() {
        let p = position(Direction::Short);
        assert_eq!(p.pnl_usd(dec!(94)), dec!(6));
    }
}
