use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptationKind {
    Blacklist,
    Favor,
    Reduce,
    Unblacklist,
    DeactivatePattern,
    CreateRule,
    AdjustParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effectiveness {
    Pending,
    HighlyEffective,
    Effective,
    Neutral,
    Ineffective,
    Harmful,
}

/// A `target` identifies what the adaptation acted on — a coin symbol, a
/// pattern_id, or a rule_id, which are all plain strings in this domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adaptation {
    pub id: Uuid,
    pub kind: AdaptationKind,
    pub target: String,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
    pub metrics_before: AdaptationMetrics,
    pub metrics_after: Option<AdaptationMetrics>,
    pub effectiveness: Effectiveness,
    pub rolled_back: bool,
    /// Deadline at which effectiveness measurement is attempted, whichever
    /// comes first with `measure_after_trades`.
    pub measure_at: DateTime<Utc>,
    pub measure_after_trades: u32,
    pub post_trade_count: u32,
}

/// Rolling win rate & pnl snapshot for an adaptation's target, taken
/// immediately before the adaptation is applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptationMetrics {
    pub win_rate: f64,
    pub pnl: rust_decimal::Decimal,
    pub trade_count: u64,
}

impl Adaptation {
    pub fn new(
        kind: AdaptationKind,
        target: impl Into<String>,
        reason: impl Into<String>,
        metrics_before: AdaptationMetrics,
        now: DateTime<Utc>,
        measure_window: chrono::Duration,
        measure_after_trades: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target: target.into(),
            reason: reason.into(),
            applied_at: now,
            metrics_before,
            metrics_after: None,
            effectiveness: Effectiveness::Pending,
            rolled_back: false,
            measure_at: now + measure_window,
            measure_after_trades,
            post_trade_count: 0,
        }
    }

    /// Inverse kind for rollback: Blacklist ↔ Unblacklist, Favor ↔
    /// revert-to-Normal. `None` for kinds with no defined inverse.
    pub fn inverse_kind(&self) -> Option<AdaptationKind> {
        match self.kind {
            AdaptationKind::Blacklist => Some(AdaptationKind::Unblacklist),
            AdaptationKind::Unblacklist => Some(AdaptationKind::Blacklist),
            AdaptationKind::Favor => Some(AdaptationKind::AdjustParams), // revert-to-NORMAL
            AdaptationKind::CreateRule => None,
            AdaptationKind::DeactivatePattern => None,
            AdaptationKind::Reduce => Some(AdaptationKind::AdjustParams),
            AdaptationKind::AdjustParams => None,
        }
    }

    /// Rates effectiveness from the win-rate delta between `metrics_before`
    /// and `metrics_after`. Absence of post-adaptation trade data always
    /// rates Neutral, never Harmful — an adaptation with nothing to measure
    /// yet must not look like it backfired.
    pub fn rate_effectiveness(&self) -> Effectiveness {
        let Some(after) = &self.metrics_after else {
            return Effectiveness::Neutral;
        };
        if after.trade_count == 0 {
            return Effectiveness::Neutral;
        }
        let delta = after.win_rate - self.metrics_before.win_rate;
        if delta > 0.20 {
            Effectiveness::HighlyEffective
        } else if delta >= 0.05 {
            Effectiveness::Effective
        } else if delta >= -0.05 {
            Effectiveness::Neutral
        } else if delta >= -0.10 {
            Effectiveness::Ineffective
        } else {
            Effectiveness::Harmful
        }
    }

    pub fn should_rollback(&self) -> bool {
        matches!(self.effectiveness, Effectiveness::Harmful)
            && matches!(
                self.kind,
                AdaptationKind::Blacklist
                    | AdaptationKind::Favor
                    | AdaptationKind::CreateRule
                    | AdaptationKind::DeactivatePattern
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn no_post_data_rates_neutral_not_harmful() {
        let a = Adaptation::new(
            AdaptationKind::Blacklist,
            "X",
            "manual",
            AdaptationMetrics {
                win_rate: 0.55,
                pnl: Decimal::ZERO,
                trade_count: 20,
            },
            now(),
            chrono::Duration::hours(24),
            10,
        );
        assert_eq!(a.rate_effectiveness(), Effectiveness::Neutral);
        assert!(!a.should_rollback());
    }

    #[test]
    fn harmful_blacklist_triggers_rollback() {
        let mut a = Adaptation::new(
            AdaptationKind::Blacklist,
            "X",
            "auto",
            AdaptationMetrics {
                win_rate: 0.55,
                pnl: Decimal::ZERO,
                trade_count: 20,
            },
            now(),
            chrono::Duration::hours(24),
            10,
        );
        a.metrics_after = Some(AdaptationMetrics {
            win_rate: 0.40,
            pnl: Decimal::ZERO,
            trade_count: 10,
        });
        a.effectiveness = a.rate_effectiveness();
        assert_eq!(a.effectiveness, Effectiveness::Harmful);
        assert!(a.should_rollback());
    }
}
