use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Recency window for the confidence formula.
pub const RECENT_WINDOW: usize = 10;
/// Below this, `is_active` is forced false.
pub const DEACTIVATE_THRESHOLD: f64 = 0.2;
/// Pattern confidence stays at this prior until enough trades accrue.
pub const PRIOR_CONFIDENCE: f64 = 0.5;

/// Opaque structured entry/exit condition, kept as a JSON value so the
/// predicate DSL can evolve without touching storage or the learning loop
/// that only reads `pattern_id`.
pub type Predicate = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingPattern {
    pub pattern_id: String,
    pub description: String,
    pub entry_predicate: Predicate,
    pub exit_predicate: Predicate,
    pub times_used: u64,
    pub wins: u64,
    pub losses: u64,
    pub confidence: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub recent_outcomes: VecDeque<bool>,
    pub total_pnl: rust_decimal::Decimal,
    pub consecutive_losses: u32,
}

impl TradingPattern {
    pub fn new(
        pattern_id: impl Into<String>,
        description: impl Into<String>,
        entry_predicate: Predicate,
        exit_predicate: Predicate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            description: description.into(),
            entry_predicate,
            exit_predicate,
            times_used: 0,
            wins: 0,
            losses: 0,
            confidence: PRIOR_CONFIDENCE,
            is_active: true,
            created_at: now,
            last_used_at: None,
            recent_outcomes: VecDeque::with_capacity(RECENT_WINDOW),
            total_pnl: rust_decimal::Decimal::ZERO,
            consecutive_losses: 0,
        }
    }

    /// Record one outcome, recompute confidence, and decide activation.
    /// Returns true if `is_active` transitioned true→false.
    pub fn record_outcome(
        &mut self,
        won: bool,
        pnl: rust_decimal::Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        self.times_used += 1;
        if won {
            self.wins += 1;
            self.consecutive_losses = 0;
        } else {
            self.losses += 1;
            self.consecutive_losses += 1;
        }
        self.total_pnl += pnl;
        self.recent_outcomes.push_back(won);
        while self.recent_outcomes.len() > RECENT_WINDOW {
            self.recent_outcomes.pop_front();
        }
        self.last_used_at = Some(now);

        self.confidence = self.compute_confidence();

        let was_active = self.is_active;
        if self.confidence < DEACTIVATE_THRESHOLD
            || self.consecutive_losses >= 5
            || self.total_pnl < rust_decimal::Decimal::from(-100)
        {
            self.is_active = false;
        }
        was_active && !self.is_active
    }

    fn compute_confidence(&self) -> f64 {
        if self.times_used < 3 {
            return PRIOR_CONFIDENCE;
        }
        let base = self.wins as f64 / self.times_used as f64;
        let recent_perf = if self.recent_outcomes.is_empty() {
            base
        } else {
            self.recent_outcomes.iter().filter(|w| **w).count() as f64
                / self.recent_outcomes.len() as f64
        };
        (0.7 * base + 0.3 * recent_perf).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    fn pattern() -> TradingPattern {
        TradingPattern::new(
            "p1",
            "test pattern",
            serde_json::json!({}),
            serde_json::json!({}),
            now(),
        )
    }

    #[test]
    fn confidence_stays_at_prior_below_three_uses() {
        let mut p = pattern();
        p.record_outcome(true, dec!(10), now());
        p.record_outcome(true, dec!(10), now());
        assert_eq!(p.confidence, PRIOR_CONFIDENCE);
    }

    #[test]
    fn confidence_bounded_in_unit_interval() {
        let mut p = pattern();
        for _ in 0..20 {
            p.record_outcome(true, dec!(10), now());
        }
        assert!(p.confidence >= 0.0 && p.confidence <= 1.0);
    }

    #[test]
    fn five_consecutive_losses_deactivate() {
        let mut p = pattern();
        // Clear the < 3 uses prior floor first.
        p.record_outcome(true, dec!(10), now());
        p.record_outcome(true, dec!(10), now());
        p.record_outcome(true, dec!(10), now());
        let mut deactivated = false;
        for _ in 0..5 {
            deactivated = p.record_outcome(false, dec!(-1), now()) || deactivated;
        }
        assert!(!p.is_active);
        assert!(deactivated);
    }

    #[test]
    fn total_pnl_floor_deactivates() {
        let mut p = pattern();
        p.record_outcome(true, dec!(1), now());
        p.record_outcome(true, dec!(1), now());
        p.record_outcome(true, dec!(1), now());
        p.record_outcome(false, dec!(-150), now());
        assert!(!p.is_active);
    }
}
