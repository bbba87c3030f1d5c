//! Evaluates every live [`TradeCondition`] against price ticks and manages
//! open [`Position`]s. The latency-critical component: `on_price` never
//! awaits I/O, touches only the one coin's bucket, and is O(k) in the
//! number of conditions/positions for that coin.
//!
//! Per-coin ordering is provided by the caller: the runtime drains a single
//! bounded price channel and calls `on_price` once per tick in arrival
//! order, which trivially serializes each coin (and, as a side effect, the
//! whole executor) without a dedicated lane-per-coin fan-out. Simpler than
//! the topology sketch and sufficient for every ordering property tested
//! here.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SizingConfig;
use crate::domain::{Coin, Direction, ExitReason, Position, TradeCondition, TradeEvent};

struct ExecutorState {
    conditions: HashMap<Coin, Vec<TradeCondition>>,
    positions: HashMap<Coin, Vec<Position>>,
    last_price: HashMap<Coin, Decimal>,
}

pub struct ConditionExecutor {
    state: RwLock<ExecutorState>,
    max_concurrent_positions: usize,
    max_size_usd: Decimal,
}

impl ConditionExecutor {
    pub fn new(sizing: &SizingConfig) -> Self {
        Self {
            state: RwLock::new(ExecutorState {
                conditions: HashMap::new(),
                positions: HashMap::new(),
                last_price: HashMap::new(),
            }),
            max_concurrent_positions: sizing.max_concurrent_positions,
            max_size_usd: sizing.max_size_usd,
        }
    }

    /// Atomic replace of the active condition set, grouped by coin. Any
    /// condition_id not present in `new_set` is dropped immediately —
    /// there is no partial carry-over.
    pub fn set_conditions(&self, new_set: Vec<TradeCondition>) {
        let mut grouped: HashMap<Coin, Vec<TradeCondition>> = HashMap::new();
        for condition in new_set {
            grouped.entry(condition.coin.clone()).or_default().push(condition);
        }
        let mut state = self.state.write().expect("executor state poisoned");
        state.conditions = grouped;
    }

    fn open_position_count_locked(state: &ExecutorState) -> usize {
        state.positions.values().map(Vec::len).sum()
    }

    /// Processes one price tick for `coin`: triggers conditions into new
    /// positions, then evaluates exits (stop before target) on every open
    /// position for that coin. Returns the TradeEvents closed this tick, for
    /// the caller to dispatch onto the event bus and journal.
    pub fn on_price(&self, coin: &Coin, price: Decimal, now: DateTime<Utc>) -> Vec<TradeEvent> {
        let mut state = self.state.write().expect("executor state poisoned");
        state.last_price.insert(coin.clone(), price);

        if let Some(conditions) = state.conditions.get(coin).cloned() {
            let mut still_pending = Vec::with_capacity(conditions.len());
            for condition in conditions {
                if condition.is_triggered(price) {
                    if Self::open_position_count_locked(&state) >= self.max_concurrent_positions {
                        warn!("dropping triggered condition {}: at max concurrent positions", condition.condition_id);
                        continue;
                    }
                    let position = Position {
                        position_id: Uuid::new_v4(),
                        condition_id: condition.condition_id,
                        coin: condition.coin.clone(),
                        direction: condition.direction,
                        entry_price: price,
                        entry_time: now,
                        size_usd: condition.size_usd.min(self.max_size_usd),
                        stop_loss: condition.stop_loss,
                        take_profit: condition.take_profit,
                        pattern_id: condition.pattern_id.clone(),
                    };
                    info!("opened position {} for {} at {}", position.position_id, coin, price);
                    state.positions.entry(coin.clone()).or_default().push(position);
                } else {
                    still_pending.push(condition);
                }
            }
            if still_pending.is_empty() {
                state.conditions.remove(coin);
            } else {
                state.conditions.insert(coin.clone(), still_pending);
            }
        }

        let mut events = Vec::new();
        if let Some(positions) = state.positions.get(coin).cloned() {
            let mut still_open = Vec::with_capacity(positions.len());
            for position in positions {
                match exit_reason(&position, price) {
                    Some(reason) => {
                        events.push(TradeEvent::close(&position, price, now, reason));
                    }
                    None => still_open.push(position),
                }
            }
            if still_open.is_empty() {
                state.positions.remove(coin);
            } else {
                state.positions.insert(coin.clone(), still_open);
            }
        }

        events
    }

    /// Force-closes an open position at its coin's last known price.
    pub fn close_manual(&self, position_id: Uuid, now: DateTime<Utc>) -> Option<TradeEvent> {
        let mut state = self.state.write().expect("executor state poisoned");
        let coin = state
            .positions
            .iter()
            .find(|(_, ps)| ps.iter().any(|p| p.position_id == position_id))
            .map(|(c, _)| c.clone())?;
        let price = *state.last_price.get(&coin)?;
        let positions = state.positions.get_mut(&coin)?;
        let idx = positions.iter().position(|p| p.position_id == position_id)?;
        let position = positions.remove(idx);
        if positions.is_empty() {
            state.positions.remove(&coin);
        }
        Some(TradeEvent::close(&position, price, now, ExitReason::Manual))
    }

    /// Drops every condition whose `expires_at` has passed. Called at least
    /// once per second. Returns the number removed.
    pub fn expire_tick(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write().expect("executor state poisoned");
        let mut removed = 0;
        let coins: Vec<Coin> = state.conditions.keys().cloned().collect();
        for coin in coins {
            if let Some(conditions) = state.conditions.get_mut(&coin) {
                let before = conditions.len();
                conditions.retain(|c| !c.is_expired(now));
                removed += before - conditions.len();
                if conditions.is_empty() {
                    state.conditions.remove(&coin);
                }
            }
        }
        if removed > 0 {
            info!("expired {removed} condition(s)");
        }
        removed
    }

    pub fn open_position_count(&self) -> usize {
        let state = self.state.read().expect("executor state poisoned");
        Self::open_position_count_locked(&state)
    }

    pub fn open_notional(&self) -> Decimal {
        let state = self.state.read().expect("executor state poisoned");
        state.positions.values().flatten().map(|p| p.size_usd).sum()
    }

    pub fn condition_count(&self) -> usize {
        let state = self.state.read().expect("executor state poisoned");
        state.conditions.values().map(Vec::len).sum()
    }
}

/// Stop-loss takes priority over take-profit if a single tick could
/// trigger both (e.g. a gap). Returns `None` if the position stays open.
fn exit_reason(position: &Position, price: Decimal) -> Option<ExitReason> {
    let stop_hit = match position.direction {
        Direction::Long => price <= position.stop_loss,
        Direction::Short => price >= position.stop_loss,
    };
    if stop_hit {
        return Some(ExitReason::StopLoss);
    }
    let target_hit = match position.direction {
        Direction::Long => price >= position.take_profit,
        Direction::Short => price <= position.take_profit,
    };
    if target_hit {
        return Some(ExitReason::TakeProfit);
    }
    None
}

#[allow(dead_code)]
fn log_panic_guard<T>(label: &str, result: Result<T, Box<dyn std::any::Any + Send>>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(_) => {
            error!("condition evaluation panicked in {label}; dropping it");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sizing() -> SizingConfig {
        SizingConfig {
            base_size_usd: dec!(100),
            min_size_usd: dec!(10),
            max_size_usd: dec!(200),
            max_concurrent_positions: 5,
            max_entry_drift: 0.02,
        }
    }

    fn long_condition() -> TradeCondition {
        TradeCondition {
            condition_id: Uuid::new_v4(),
            coin: Coin::new("BTC"),
            direction: Direction::Long,
            entry_price: dec!(100),
            stop_loss: dec!(95),
            take_profit: dec!(105),
            size_usd: dec!(100),
            expires_at: Utc::now() + chrono::Duration::seconds(60),
            pattern_id: None,
        }
    }

    #[test]
    fn untouched_condition_stays_pending_until_triggered() {
        let executor = ConditionExecutor::new(&sizing());
        executor.set_conditions(vec![long_condition()]);
        let events = executor.on_price(&Coin::new("BTC"), dec!(102), Utc::now());
        assert!(events.is_empty());
        assert_eq!(executor.condition_count(), 1);
        assert_eq!(executor.open_position_count(), 0);
    }

    #[test]
    fn trigger_then_gap_through_stop_closes_stop_loss_wins() {
        let executor = ConditionExecutor::new(&sizing());
        executor.set_conditions(vec![long_condition()]);
        // First tick opens the position at 100 (trigger: price <= entry_price).
        let events = executor.on_price(&Coin::new("BTC"), dec!(100), Utc::now());
        assert!(events.is_empty());
        assert_eq!(executor.open_position_count(), 1);

        // Gap tick below stop_loss: stop wins even though this single tick
        // would also satisfy take_profit on the reverse side of a bad entry.
        let events = executor.on_price(&Coin::new("BTC"), dec!(94), Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(events[0].pnl_usd, dec!(-6));
        assert_eq!(executor.open_position_count(), 0);
    }

    #[test]
    fn price_exactly_at_stop_loss_closes_stop_loss() {
        let executor = ConditionExecutor::new(&sizing());
        executor.set_conditions(vec![long_condition()]);
        executor.on_price(&Coin::new("BTC"), dec!(100), Utc::now());
        let events = executor.on_price(&Coin::new("BTC"), dec!(95), Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn expired_condition_is_removed_without_opening_a_position() {
        let executor = ConditionExecutor::new(&sizing());
        let mut condition = long_condition();
        condition.expires_at = DateTime::from_timestamp(1_000, 0).unwrap();
        executor.set_conditions(vec![condition]);
        let now = DateTime::from_timestamp(1_000, 0).unwrap();
        let removed = executor.expire_tick(now);
        assert_eq!(removed, 1);
        assert_eq!(executor.condition_count(), 0);
        assert_eq!(executor.open_position_count(), 0);
    }

    #[test]
    fn max_concurrent_positions_caps_new_opens() {
        let mut sizing = sizing();
        sizing.max_concurrent_positions = 1;
        let executor = ConditionExecutor::new(&sizing);
        let mut first = long_condition();
        first.coin = Coin::new("BTC");
        let mut second = long_condition();
        second.coin = Coin::new("ETH");
        executor.set_conditions(vec![first, second]);
        executor.on_price(&Coin::new("BTC"), dec!(100), Utc::now());
        executor.on_price(&Coin::new("ETH"), dec!(100), Utc::now());
        assert_eq!(executor.open_position_count(), 1);
    }

    #[test]
    fn close_manual_uses_last_known_price() {
        let executor = ConditionExecutor::new(&sizing());
        executor.set_conditions(vec![long_condition()]);
        executor.on_price(&Coin::new("BTC"), dec!(100), Utc::now());
        let position_id = {
            let state = executor.state.read().unwrap();
            state.positions.get(&Coin::new("BTC")).unwrap()[0].position_id
        };
        let event = executor.close_manual(position_id, Utc::now()).unwrap();
        assert_eq!(event.exit_reason, ExitReason::Manual);
        assert_eq!(executor.open_position_count(), 0);
    }
}
