use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::Coin;

/// Predicate over (time-of-day, volatility, market-wide metrics) — kept as a
/// structured JSON value, same rationale as [`crate::domain::pattern::Predicate`].
pub type RegimePredicate = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeAction {
    ReduceSize,
    Skip,
    Favor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeRule {
    pub rule_id: String,
    pub predicate: RegimePredicate,
    pub action: RegimeAction,
    /// The pair this rule gates. `None` means market-wide — it applies to
    /// every coin in the universe.
    pub target: Option<Coin>,
    pub is_active: bool,
    pub trigger_count: u64,
    /// Size multiplier applied when this rule is active and its action is
    /// `ReduceSize` or `Favor`. The regime modifier is the product of all
    /// active rules' size factors.
    pub size_factor: Decimal,
}

impl RegimeRule {
    pub fn new(rule_id: impl Into<String>, predicate: RegimePredicate, action: RegimeAction, target: Option<Coin>) -> Self {
        let size_factor = match action {
            RegimeAction::ReduceSize => dec!(0.5),
            RegimeAction::Favor => dec!(1.25),
            RegimeAction::Skip => dec!(1.0),
        };
        Self {
            rule_id: rule_id.into(),
            predicate,
            action,
            target,
            is_active: true,
            trigger_count: 0,
            size_factor,
        }
    }

    /// True if this rule's SKIP gates `coin` — either scoped to it directly
    /// or market-wide.
    pub fn skips(&self, coin: &Coin) -> bool {
        self.is_active && matches!(self.action, RegimeAction::Skip) && self.target.as_ref().is_none_or(|t| t == coin)
    }

    pub fn trigger(&mut self) {
        self.trigger_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_rule_scoped_to_one_coin_does_not_gate_others() {
        let rule = RegimeRule::new("r1", serde_json::json!({}), RegimeAction::Skip, Some(Coin::new("BTC")));
        assert!(rule.skips(&Coin::new("BTC")));
        assert!(!rule.skips(&Coin::new("ETH")));
    }

    #[test]
    fn market_wide_skip_rule_gates_every_coin() {
        let rule = RegimeRule::new("r1", serde_json::json!({}), RegimeAction::Skip, None);
        assert!(rule.skips(&Coin::new("BTC")));
        assert!(rule.skips(&Coin::new("ETH")));
    }

    #[test]
    fn inactive_rule_gates_nothing() {
        let mut rule = RegimeRule::new("r1", serde_json::json!({}), RegimeAction::Skip, None);
        rule.is_active = false;
        assert!(!rule.skips(&Coin::new("BTC")));
    }

    #[test]
    fn non_skip_action_never_gates() {
        let rule = RegimeRule::new("r1", serde_json::json!({}), RegimeAction::ReduceSize, None);
        assert!(!rule.skips(&Coin::new("BTC")));
    }
}
