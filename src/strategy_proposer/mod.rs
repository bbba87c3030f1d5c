//! Turns a market snapshot and the current knowledge context into new
//! [`TradeCondition`]s, via the external reasoning service. Never blocks the
//! execution hot path: a slow or down reasoning service degrades to "no new
//! conditions this cycle", not an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{SizingConfig, TimingConfig};
use crate::domain::{Coin, Direction, MarketState, TradeCondition};
use crate::knowledge_store::KnowledgeContext;
use crate::reasoning::{ProposalCandidate, ReasoningService};

/// Hard cap on conditions emitted per `propose` call, independent of how
/// many candidates the reasoning service returns.
pub const MAX_NEW_CONDITIONS: usize = 10;

pub struct StrategyProposer<R: ReasoningService> {
    reasoning: Arc<R>,
    sizing: SizingConfig,
}

impl<R: ReasoningService> StrategyProposer<R> {
    pub fn new(reasoning: Arc<R>, sizing: SizingConfig) -> Self {
        Self { reasoning, sizing }
    }

    pub async fn propose(
        &self,
        snapshot: &MarketState,
        context: &KnowledgeContext,
        timing: &TimingConfig,
        now: DateTime<Utc>,
    ) -> Vec<TradeCondition> {
        let prompt = build_prompt(snapshot, context);
        let candidates = self.reasoning.propose(prompt, timing.proposer_deadline).await;
        if candidates.is_empty() {
            return Vec::new();
        }

        let regime_modifier = context
            .active_rules
            .iter()
            .fold(Decimal::ONE, |acc, rule| acc * rule.size_factor);

        let mut conditions = Vec::with_capacity(candidates.len().min(MAX_NEW_CONDITIONS));
        for candidate in candidates {
            if conditions.len() >= MAX_NEW_CONDITIONS {
                break;
            }
            match validate(candidate, snapshot, context, self.sizing.max_entry_drift) {
                Ok((coin, direction, entry_price, stop_loss, take_profit, pattern_id)) => {
                    let coin_modifier = context
                        .coin_summaries
                        .get(&coin)
                        .map(|s| s.status.size_modifier())
                        .unwrap_or(Decimal::ZERO);
                    if coin_modifier == Decimal::ZERO {
                        continue;
                    }
                    let size_usd = (self.sizing.base_size_usd * coin_modifier * regime_modifier)
                        .clamp(self.sizing.min_size_usd, self.sizing.max_size_usd);

                    conditions.push(TradeCondition {
                        condition_id: Uuid::new_v4(),
                        coin,
                        direction,
                        entry_price,
                        stop_loss,
                        take_profit,
                        size_usd,
                        expires_at: now + timing.condition_ttl,
                        pattern_id,
                    });
                }
                Err(reason) => warn!("rejected proposal: {reason}"),
            }
        }

        info!("proposer emitted {} condition(s)", conditions.len());
        conditions
    }
}

fn validate(
    candidate: ProposalCandidate,
    snapshot: &MarketState,
    context: &KnowledgeContext,
    max_entry_drift: f64,
) -> Result<(Coin, Direction, Decimal, Decimal, Decimal, Option<String>), String> {
    let coin = Coin::new(candidate.coin.clone());
    let Some(view) = snapshot.coins.get(&coin) else {
        return Err(format!("unknown coin {coin}"));
    };
    if context.blacklist.contains(&coin) {
        return Err(format!("{coin} is blacklisted"));
    }
    if context.active_rules.iter().any(|rule| rule.skips(&coin)) {
        return Err(format!("{coin} is gated by an active SKIP rule"));
    }

    let direction = match candidate.direction.to_uppercase().as_str() {
        "LONG" => Direction::Long,
        "SHORT" => Direction::Short,
        other => return Err(format!("unrecognized direction {other}")),
    };

    if view.price != Decimal::ZERO {
        let drift = ((candidate.entry_price - view.price) / view.price)
            .abs()
            .to_f64()
            .unwrap_or(f64::MAX);
        if drift > max_entry_drift {
            return Err(format!("{coin} entry drift {drift} exceeds {max_entry_drift}"));
        }
    }

    let stop_ok = match direction {
        Direction::Long => candidate.stop_loss < candidate.entry_price,
        Direction::Short => candidate.stop_loss > candidate.entry_price,
    };
    if !stop_ok {
        return Err(format!("{coin} stop_loss on the wrong side of entry"));
    }

    let target_ok = match direction {
        Direction::Long => candidate.take_profit > candidate.entry_price,
        Direction::Short => candidate.take_profit < candidate.entry_price,
    };
    if !target_ok {
        return Err(format!("{coin} take_profit no better than entry"));
    }

    Ok((
        coin,
        direction,
        candidate.entry_price,
        candidate.stop_loss,
        candidate.take_profit,
        candidate.pattern_id,
    ))
}

fn build_prompt(snapshot: &MarketState, context: &KnowledgeContext) -> String {
    let coin_lines: Vec<String> = snapshot
        .coins
        .iter()
        .map(|(coin, view)| {
            format!(
                "{coin}: price={} 24h_change={:.2}% vol={:.4} stale={}",
                view.price, view.change_24h_pct, view.rolling_volatility, view.stale
            )
        })
        .collect();

    let summary_lines: HashMap<_, _> = context
        .coin_summaries
        .iter()
        .map(|(coin, summary)| (coin.clone(), format!("{:?} wr={:.2}", summary.status, summary.win_rate)))
        .collect();

    format!(
        "market snapshot (sentiment={:?}, btc_1h={:.2}%, btc_24h={:.2}%):\n{}\n\
         coin status:\n{:?}\n\
         blacklist: {:?}\nfavored: {:?}\n\
         active patterns: {}\nactive rules: {}\n\
         recent performance: {} trades, {} wins, pnl={}\n\
         respond with a JSON array of proposals: \
         [{{coin, direction, entry_price, stop_loss, take_profit, pattern_id}}]",
        snapshot.sentiment,
        snapshot.btc_change_1h_pct,
        snapshot.btc_change_24h_pct,
        coin_lines.join("\n"),
        summary_lines,
        context.blacklist,
        context.favored,
        context.active_patterns.len(),
        context.active_rules.len(),
        context.recent_performance.total_trades,
        context.recent_performance.wins,
        context.recent_performance.total_pnl,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CoinMarketView, CoinStatus, SentimentLabel};
    use crate::knowledge_store::{CoinSummary, RecentPerformance};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubReasoning {
        proposals: Mutex<Vec<ProposalCandidate>>,
    }

    #[async_trait]
    impl ReasoningService for StubReasoning {
        async fn propose(&self, _prompt: String, _deadline: Duration) -> Vec<ProposalCandidate> {
            self.proposals.lock().unwrap().clone()
        }
        async fn reflect(&self, _prompt: String, _deadline: Duration) -> Vec<crate::domain::Insight> {
            Vec::new()
        }
    }

    fn snapshot_with(coin: &str, price: Decimal) -> MarketState {
        let mut coins = HashMap::new();
        coins.insert(
            Coin::new(coin),
            CoinMarketView {
                price,
                change_24h_pct: 0.0,
                rolling_volatility: 0.01,
                stale: false,
            },
        );
        MarketState {
            taken_at: Utc::now(),
            coins,
            btc_change_1h_pct: 0.0,
            btc_change_24h_pct: 0.0,
            sentiment: SentimentLabel::Neutral,
        }
    }

    fn context_with_status(coin: &str, status: CoinStatus) -> KnowledgeContext {
        let mut coin_summaries = HashMap::new();
        coin_summaries.insert(
            Coin::new(coin),
            CoinSummary {
                status,
                win_rate: 0.5,
                total_trades: 10,
            },
        );
        let blacklist = if status == CoinStatus::Blacklisted { vec![Coin::new(coin)] } else { vec![] };
        KnowledgeContext {
            coin_summaries,
            blacklist,
            favored: vec![],
            active_patterns: vec![],
            active_rules: vec![],
            recent_performance: RecentPerformance::default(),
        }
    }

    fn timing() -> TimingConfig {
        TimingConfig {
            condition_ttl: std::time::Duration::from_secs(900),
            propose_interval: std::time::Duration::from_secs(300),
            reflect_interval: std::time::Duration::from_secs(3600),
            reflect_max_queue: 50,
            measure_window: chrono::Duration::hours(24),
            measure_post_trades: 10,
            stale_price_threshold: std::time::Duration::from_secs(10),
            min_trades_to_reflect: 5,
            proposer_deadline: std::time::Duration::from_secs(30),
            reflection_deadline: std::time::Duration::from_secs(120),
        }
    }

    fn sizing() -> SizingConfig {
        SizingConfig {
            base_size_usd: dec!(100),
            min_size_usd: dec!(10),
            max_size_usd: dec!(200),
            max_concurrent_positions: 5,
            max_entry_drift: 0.02,
        }
    }

    #[tokio::test]
    async fn blacklisted_coin_is_rejected() {
        let reasoning = Arc::new(StubReasoning {
            proposals: Mutex::new(vec![ProposalCandidate {
                coin: "BTC".into(),
                direction: "LONG".into(),
                entry_price: dec!(100),
                stop_loss: dec!(95),
                take_profit: dec!(110),
                pattern_id: None,
            }]),
        });
        let proposer = StrategyProposer::new(reasoning, sizing());
        let snapshot = snapshot_with("BTC", dec!(100));
        let context = context_with_status("BTC", CoinStatus::Blacklisted);
        let out = proposer.propose(&snapshot, &context, &timing(), Utc::now()).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn favored_coin_sizes_at_one_point_five_times_base() {
        let reasoning = Arc::new(StubReasoning {
            proposals: Mutex::new(vec![ProposalCandidate {
                coin: "BTC".into(),
                direction: "LONG".into(),
                entry_price: dec!(100),
                stop_loss: dec!(95),
                take_profit: dec!(110),
                pattern_id: None,
            }]),
        });
        let proposer = StrategyProposer::new(reasoning, sizing());
        let snapshot = snapshot_with("BTC", dec!(100));
        let context = context_with_status("BTC", CoinStatus::Favored);
        let out = proposer.propose(&snapshot, &context, &timing(), Utc::now()).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].size_usd, dec!(150));
    }

    #[tokio::test]
    async fn stop_loss_on_wrong_side_is_rejected() {
        let reasoning = Arc::new(StubReasoning {
            proposals: Mutex::new(vec![ProposalCandidate {
                coin: "BTC".into(),
                direction: "LONG".into(),
                entry_price: dec!(100),
                stop_loss: dec!(105),
                take_profit: dec!(110),
                pattern_id: None,
            }]),
        });
        let proposer = StrategyProposer::new(reasoning, sizing());
        let snapshot = snapshot_with("BTC", dec!(100));
        let context = context_with_status("BTC", CoinStatus::Normal);
        let out = proposer.propose(&snapshot, &context, &timing(), Utc::now()).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn excessive_entry_drift_is_rejected() {
        let reasoning = Arc::new(StubReasoning {
            proposals: Mutex::new(vec![ProposalCandidate {
                coin: "BTC".into(),
                direction: "LONG".into(),
                entry_price: dec!(110),
                stop_loss: dec!(100),
                take_profit: dec!(120),
                pattern_id: None,
            }]),
        });
        let proposer = StrategyProposer::new(reasoning, sizing());
        let snapshot = snapshot_with("BTC", dec!(100));
        let context = context_with_status("BTC", CoinStatus::Normal);
        let out = proposer.propose(&snapshot, &context, &timing(), Utc::now()).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn coin_gated_by_active_skip_rule_is_rejected() {
        let reasoning = Arc::new(StubReasoning {
            proposals: Mutex::new(vec![ProposalCandidate {
                coin: "BTC".into(),
                direction: "LONG".into(),
                entry_price: dec!(100),
                stop_loss: dec!(95),
                take_profit: dec!(110),
                pattern_id: None,
            }]),
        });
        let proposer = StrategyProposer::new(reasoning, sizing());
        let snapshot = snapshot_with("BTC", dec!(100));
        let mut context = context_with_status("BTC", CoinStatus::Normal);
        context.active_rules = vec![crate::domain::RegimeRule::new(
            "skip-btc",
            serde_json::json!({}),
            crate::domain::RegimeAction::Skip,
            Some(Coin::new("BTC")),
        )];
        let out = proposer.propose(&snapshot, &context, &timing(), Utc::now()).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn market_wide_skip_rule_gates_every_coin() {
        let reasoning = Arc::new(StubReasoning {
            proposals: Mutex::new(vec![ProposalCandidate {
                coin: "ETH".into(),
                direction: "LONG".into(),
                entry_price: dec!(100),
                stop_loss: dec!(95),
                take_profit: dec!(110),
                pattern_id: None,
            }]),
        });
        let proposer = StrategyProposer::new(reasoning, sizing());
        let snapshot = snapshot_with("ETH", dec!(100));
        let mut context = context_with_status("ETH", CoinStatus::Normal);
        context.active_rules = vec![crate::domain::RegimeRule::new(
            "skip-everything",
            serde_json::json!({}),
            crate::domain::RegimeAction::Skip,
            None,
        )];
        let out = proposer.propose(&snapshot, &context, &timing(), Utc::now()).await;
        assert!(out.is_empty());
    }
}
