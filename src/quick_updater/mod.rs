//! Synchronous fold of one closed [`TradeEvent`] into the knowledge base.
//! Runs on the hot path between Executor and ReflectionEngine: pure
//! bookkeeping math, no external calls, target latency under 10ms.

pub mod dedupe;

use std::sync::Arc;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::config::ThresholdsConfig;
use crate::domain::errors::KnowledgeError;
use crate::domain::TradeEvent;
use crate::knowledge_store::{KnowledgeStore, QuickUpdateResult};
use dedupe::SeenTrades;

pub struct QuickUpdater<K: KnowledgeStore> {
    knowledge: Arc<K>,
    thresholds: ThresholdsConfig,
    seen: Mutex<SeenTrades>,
    reflection_tx: mpsc::Sender<TradeEvent>,
}

impl<K: KnowledgeStore> QuickUpdater<K> {
    pub fn new(knowledge: Arc<K>, thresholds: ThresholdsConfig, reflection_tx: mpsc::Sender<TradeEvent>) -> Self {
        Self {
            knowledge,
            thresholds,
            seen: Mutex::new(SeenTrades::default()),
            reflection_tx,
        }
    }

    /// Processes one TradeEvent exactly once. A KnowledgeError::Invariant
    /// is treated as fatal by the caller — this returns it rather than
    /// swallowing it, so the runtime can log and exit.
    pub async fn process(&self, event: TradeEvent) -> Result<Option<QuickUpdateResult>, KnowledgeError> {
        let first_sighting = self.seen.lock().expect("seen-trades lock poisoned").insert(event.trade_id);
        if !first_sighting {
            warn!("dropping replayed trade {}", event.trade_id);
            return Ok(None);
        }

        let result = self.knowledge.apply_quick_update(&event, &self.thresholds, Utc::now()).await?;
        self.knowledge.note_trade_for_pending_adaptations(&event.coin).await?;

        if let Err(e) = self.reflection_tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("reflection queue is full; this event will not reach ReflectionEngine until drained");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    error!("reflection queue is closed; reflection worker may have exited");
                }
            }
        }

        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coin, Direction, ExitReason};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct StubStore {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl KnowledgeStore for StubStore {
        async fn coin_score(&self, _coin: &Coin) -> Option<crate::domain::CoinScore> {
            None
        }
        async fn all_coin_scores(&self) -> Vec<crate::domain::CoinScore> {
            Vec::new()
        }
        async fn context(&self) -> crate::knowledge_store::KnowledgeContext {
            crate::knowledge_store::KnowledgeContext {
                coin_summaries: Default::default(),
                blacklist: Vec::new(),
                favored: Vec::new(),
                active_patterns: Vec::new(),
                active_rules: Vec::new(),
                recent_performance: Default::default(),
            }
        }
        async fn pattern(&self, _id: &str) -> Option<crate::domain::TradingPattern> {
            None
        }
        async fn active_patterns(&self) -> Vec<crate::domain::TradingPattern> {
            Vec::new()
        }
        async fn active_rules(&self) -> Vec<crate::domain::RegimeRule> {
            Vec::new()
        }
        async fn adaptations_since(&self, _t: DateTime<Utc>) -> Vec<crate::domain::Adaptation> {
            Vec::new()
        }
        async fn apply_quick_update(
            &self,
            _event: &TradeEvent,
            _thresholds: &ThresholdsConfig,
            _now: DateTime<Utc>,
        ) -> Result<QuickUpdateResult, KnowledgeError> {
            *self.calls.lock().unwrap() += 1;
            Ok(QuickUpdateResult::default())
        }
        async fn apply_adaptation(&self, _adaptation: crate::domain::Adaptation) -> Result<(), KnowledgeError> {
            Ok(())
        }
        async fn force_blacklist(&self, _coin: &Coin, _reason: String, _now: DateTime<Utc>) -> Result<(), KnowledgeError> {
            Ok(())
        }
        async fn unblacklist(&self, _coin: &Coin, _now: DateTime<Utc>) -> Result<(), KnowledgeError> {
            Ok(())
        }
        async fn rollback_adaptation(&self, _adaptation_id: Uuid) -> Result<(), KnowledgeError> {
            Ok(())
        }
        async fn target_metrics(&self, _target: &str, _since: DateTime<Utc>) -> crate::domain::adaptation::AdaptationMetrics {
            crate::domain::adaptation::AdaptationMetrics {
                win_rate: 0.0,
                pnl: rust_decimal::Decimal::ZERO,
                trade_count: 0,
            }
        }
        async fn record_effectiveness(
            &self,
            _adaptation_id: Uuid,
            _metrics_after: crate::domain::adaptation::AdaptationMetrics,
            _effectiveness: crate::domain::adaptation::Effectiveness,
        ) -> Result<(), KnowledgeError> {
            Ok(())
        }
        async fn note_trade_for_pending_adaptations(&self, _coin: &Coin) -> Result<(), KnowledgeError> {
            Ok(())
        }
    }

    fn event() -> TradeEvent {
        TradeEvent {
            trade_id: Uuid::new_v4(),
            coin: Coin::new("BTC"),
            direction: Direction::Long,
            entry_price: dec!(100),
            exit_price: dec!(105),
            entry_time: Utc::now(),
            exit_time: Utc::now(),
            size_usd: dec!(100),
            pnl_usd: dec!(5),
            won: true,
            exit_reason: ExitReason::TakeProfit,
            pattern_id: None,
        }
    }

    fn thresholds() -> ThresholdsConfig {
        ThresholdsConfig {
            blacklist_wr: 0.30,
            reduce_wr: 0.45,
            favor_wr: 0.60,
            min_trades_adaptation: 5,
            deactivate_pattern_conf: 0.20,
            insight_min_conf: 0.4,
        }
    }

    #[tokio::test]
    async fn replayed_trade_id_is_not_reprocessed() {
        let store = Arc::new(StubStore { calls: Mutex::new(0) });
        let (tx, _rx) = mpsc::channel(16);
        let updater = QuickUpdater::new(store.clone(), thresholds(), tx);
        let event = event();

        let first = updater.process(event.clone()).await.unwrap();
        let second = updater.process(event).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(*store.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn processed_event_is_forwarded_to_reflection_queue() {
        let store = Arc::new(StubStore { calls: Mutex::new(0) });
        let (tx, mut rx) = mpsc::channel(16);
        let updater = QuickUpdater::new(store, thresholds(), tx);
        updater.process(event()).await.unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
