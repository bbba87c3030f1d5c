use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bound on `last_trades_outcomes`: a bounded sequence of at most 20 booleans.
pub const MAX_OUTCOME_HISTORY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoinStatus {
    Unknown,
    Normal,
    Favored,
    Reduced,
    Blacklisted,
}

impl CoinStatus {
    /// Position-sizing multiplier for this status. `Unknown` and
    /// `Blacklisted` both fold to zero — a coin with no track record is
    /// sized like one that has been blacklisted: not at all, until it has
    /// earned a status.
    pub fn size_modifier(&self) -> Decimal {
        match self {
            CoinStatus::Favored => dec!(1.5),
            CoinStatus::Normal => dec!(1.0),
            CoinStatus::Reduced => dec!(0.5),
            CoinStatus::Unknown | CoinStatus::Blacklisted => dec!(0.0),
        }
    }
}

/// Mutable per-coin performance record.
///
/// Invariants enforced by construction, never by a caller-supplied setter:
/// `total_trades == wins + losses`; `last_trades_outcomes.len() <= 20`;
/// `status` is a pure function of history unless `force_status` was used
/// (an explicit BLACKLIST/UNBLACKLIST [`crate::domain::Adaptation`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinScore {
    pub coin: super::Coin,
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_pnl: Decimal,
    pub current_streak: i64,
    pub last_trades_outcomes: VecDeque<bool>,
    pub status: CoinStatus,
    pub blacklist_reason: Option<String>,
    /// Set once an explicit BLACKLIST/UNBLACKLIST adaptation has been
    /// applied; while set, `recompute_status` is a no-op. A blacklisted coin
    /// may only transition out via an explicit adaptation.
    pub status_forced: bool,
    pub updated_at: DateTime<Utc>,
}

impl CoinScore {
    pub fn new(coin: super::Coin, now: DateTime<Utc>) -> Self {
        Self {
            coin,
            total_trades: 0,
            wins: 0,
            losses: 0,
            total_pnl: Decimal::ZERO,
            current_streak: 0,
            last_trades_outcomes: VecDeque::with_capacity(MAX_OUTCOME_HISTORY),
            status: CoinStatus::Unknown,
            blacklist_reason: None,
            status_forced: false,
            updated_at: now,
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_trades as f64
        }
    }

    /// Append one trade outcome, updating counts, streak, and history.
    /// Caller (QuickUpdater) is responsible for recomputing status afterwards.
    pub fn push_outcome(&mut self, won: bool, pnl: Decimal, now: DateTime<Utc>) {
        self.total_trades += 1;
        if won {
            self.wins += 1;
            self.current_streak = if self.current_streak > 0 {
                self.current_streak + 1
            } else {
                1
            };
        } else {
            self.losses += 1;
            self.current_streak = if self.current_streak < 0 {
                self.current_streak - 1
            } else {
                -1
            };
        }
        self.total_pnl += pnl;
        self.last_trades_outcomes.push_back(won);
        while self.last_trades_outcomes.len() > MAX_OUTCOME_HISTORY {
            self.last_trades_outcomes.pop_front();
        }
        self.updated_at = now;
    }

    /// Pure function of (total_trades, win_rate). Does nothing if
    /// `status_forced` — recovery from `Blacklisted` requires an explicit
    /// [`crate::domain::Adaptation`]. A transition into `Blacklisted` sets
    /// `status_forced` itself, the same as an explicit BLACKLIST adaptation
    /// would: BLACKLISTED coins never auto-recover, whether the blacklist
    /// originated from a threshold breach or a manual call.
    pub fn recompute_status(
        &mut self,
        min_trades: u64,
        blacklist_wr: f64,
        reduce_wr: f64,
        favor_wr: f64,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status_forced {
            return false;
        }
        let new_status = derive_status(
            self.total_trades,
            self.win_rate(),
            min_trades,
            blacklist_wr,
            reduce_wr,
            favor_wr,
        );
        if new_status != self.status {
            self.status = new_status;
            self.status_forced = matches!(new_status, CoinStatus::Blacklisted);
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    pub fn force_status(&mut self, status: CoinStatus, reason: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.status_forced = matches!(status, CoinStatus::Blacklisted);
        self.blacklist_reason = reason;
        self.updated_at = now;
    }
}

/// Pure status-derivation function.
pub fn derive_status(
    total_trades: u64,
    win_rate: f64,
    min_trades: u64,
    blacklist_wr: f64,
    reduce_wr: f64,
    favor_wr: f64,
) -> CoinStatus {
    if total_trades < min_trades {
        return CoinStatus::Unknown;
    }
    if win_rate < blacklist_wr {
        CoinStatus::Blacklisted
    } else if win_rate < reduce_wr {
        CoinStatus::Reduced
    } else if win_rate > favor_wr {
        CoinStatus::Favored
    } else {
        CoinStatus::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coin;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn total_trades_equals_wins_plus_losses() {
        let mut score = CoinScore::new(Coin::new("BTC"), now());
        score.push_outcome(true, dec!(10), now());
        score.push_outcome(false, dec!(-5), now());
        score.push_outcome(false, dec!(-5), now());
        assert_eq!(score.total_trades, score.wins + score.losses);
        assert_eq!(score.wins, 1);
        assert_eq!(score.losses, 2);
    }

    #[test]
    fn five_losses_blacklists() {
        let mut score = CoinScore::new(Coin::new("BTC"), now());
        for pnl in [dec!(-10), dec!(-5), dec!(-8), dec!(-3), dec!(-4)] {
            score.push_outcome(false, pnl, now());
        }
        score.recompute_status(5, 0.30, 0.45, 0.60, now());
        assert_eq!(score.status, CoinStatus::Blacklisted);
        assert_eq!(score.total_trades, 5);
    }

    #[test]
    fn favored_at_70_percent() {
        let mut score = CoinScore::new(Coin::new("BTC"), now());
        for _ in 0..7 {
            score.push_outcome(true, dec!(5), now());
        }
        for _ in 0..3 {
            score.push_outcome(false, dec!(-5), now());
        }
        score.recompute_status(5, 0.30, 0.45, 0.60, now());
        assert_eq!(score.status, CoinStatus::Favored);
        assert_eq!(score.size_modifier(), dec!(1.5));
    }

    #[test]
    fn forced_blacklist_resists_recompute() {
        let mut score = CoinScore::new(Coin::new("ETH"), now());
        for _ in 0..10 {
            score.push_outcome(true, dec!(1), now());
        }
        score.force_status(CoinStatus::Blacklisted, Some("manual".into()), now());
        let changed = score.recompute_status(5, 0.30, 0.45, 0.60, now());
        assert!(!changed);
        assert_eq!(score.status, CoinStatus::Blacklisted);
    }

    #[test]
    fn auto_blacklist_does_not_auto_recover_on_a_win_streak() {
        let mut score = CoinScore::new(Coin::new("BTC"), now());
        for pnl in [dec!(-10), dec!(-5), dec!(-8), dec!(-3), dec!(-4)] {
            score.push_outcome(false, pnl, now());
        }
        score.recompute_status(5, 0.30, 0.45, 0.60, now());
        assert_eq!(score.status, CoinStatus::Blacklisted);
        assert!(score.status_forced);

        for _ in 0..20 {
            score.push_outcome(true, dec!(10), now());
        }
        let changed = score.recompute_status(5, 0.30, 0.45, 0.60, now());
        assert!(score.win_rate() > 0.60);
        assert!(!changed);
        assert_eq!(score.status, CoinStatus::Blacklisted);
    }

    #[test]
    fn outcome_history_bounded_at_twenty() {
        let mut score = CoinScore::new(Coin::new("SOL"), now());
        for _ in 0..30 {
            score.push_outcome(true, dec!(1), now());
        }
        assert_eq!(score.last_trades_outcomes.len(), MAX_OUTCOME_HISTORY);
    }
}
