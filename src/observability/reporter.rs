//! Periodically pushes a JSON snapshot of system health to stdout. No HTTP
//! server and no incoming connections — this process only emits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::executor::ConditionExecutor;
use crate::knowledge_store::KnowledgeStore;
use crate::observability::metrics::Metrics;

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub open_positions: usize,
    pub open_notional_usd: f64,
    pub pending_conditions: usize,
    pub win_rate: f64,
    pub blacklisted_coins: usize,
    pub favored_coins: usize,
}

pub struct MetricsReporter<K: KnowledgeStore> {
    executor: Arc<ConditionExecutor>,
    knowledge: Arc<K>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl<K: KnowledgeStore> MetricsReporter<K> {
    pub fn new(executor: Arc<ConditionExecutor>, knowledge: Arc<K>, metrics: Metrics, interval: Duration) -> Self {
        Self {
            executor,
            knowledge,
            metrics,
            start_time: Instant::now(),
            interval,
        }
    }

    pub async fn run(self) {
        info!("metrics reporter starting, interval={:?}", self.interval);
        loop {
            tokio::time::sleep(self.interval).await;
            let snapshot = self.collect_snapshot().await;
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    println!("METRICS_JSON:{json}");
                    info!(
                        "open_positions={} open_notional=${:.2} win_rate={:.2} uptime={}s",
                        snapshot.open_positions, snapshot.open_notional_usd, snapshot.win_rate, snapshot.uptime_seconds
                    );
                }
                Err(e) => warn!("failed to serialize metrics snapshot: {e}"),
            }
        }
    }

    async fn collect_snapshot(&self) -> MetricsSnapshot {
        use rust_decimal::prelude::ToPrimitive;

        let uptime = self.start_time.elapsed().as_secs();
        let open_positions = self.executor.open_position_count();
        let open_notional_usd = self.executor.open_notional().to_f64().unwrap_or(0.0);
        let pending_conditions = self.executor.condition_count();
        let context = self.knowledge.context().await;
        let win_rate = if context.recent_performance.total_trades == 0 {
            0.0
        } else {
            context.recent_performance.wins as f64 / context.recent_performance.total_trades as f64
        };

        self.metrics.open_positions.set(open_positions as f64);
        self.metrics.open_notional_usd.set(open_notional_usd);
        self.metrics.pending_conditions.set(pending_conditions as f64);
        self.metrics.win_rate_current.set(win_rate);
        self.metrics.uptime_seconds.set(uptime as f64);

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            open_positions,
            open_notional_usd,
            pending_conditions,
            win_rate,
            blacklisted_coins: context.blacklist.len(),
            favored_coins: context.favored.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizingConfig;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct EmptyStore;

    #[async_trait::async_trait]
    impl KnowledgeStore for EmptyStore {
        async fn coin_score(&self, _coin: &crate::domain::Coin) -> Option<crate::domain::CoinScore> {
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
        async fn adaptations_since(&self, _t: chrono::DateTime<chrono::Utc>) -> Vec<crate::domain::Adaptation> {
            Vec::new()
        }
        async fn apply_quick_update(
            &self,
            _event: &crate::domain::TradeEvent,
            _thresholds: &crate::config::ThresholdsConfig,
            _now: chrono::DateTime<chrono::Utc>,
        ) -> Result<crate::knowledge_store::QuickUpdateResult, crate::domain::errors::KnowledgeError> {
            unimplemented!()
        }
        async fn apply_adaptation(&self, _adaptation: crate::domain::Adaptation) -> Result<(), crate::domain::errors::KnowledgeError> {
            Ok(())
        }
        async fn force_blacklist(
            &self,
            _coin: &crate::domain::Coin,
            _reason: String,
            _now: chrono::DateTime<chrono::Utc>,
        ) -> Result<(), crate::domain::errors::KnowledgeError> {
            Ok(())
        }
        async fn unblacklist(&self, _coin: &crate::domain::Coin, _now: chrono::DateTime<chrono::Utc>) -> Result<(), crate::domain::errors::KnowledgeError> {
            Ok(())
        }
        async fn rollback_adaptation(&self, _adaptation_id: uuid::Uuid) -> Result<(), crate::domain::errors::KnowledgeError> {
            Ok(())
        }
        async fn target_metrics(&self, _target: &str, _since: chrono::DateTime<chrono::Utc>) -> crate::domain::adaptation::AdaptationMetrics {
            crate::domain::adaptation::AdaptationMetrics {
                win_rate: 0.0,
                pnl: dec!(0),
                trade_count: 0,
            }
        }
        async fn record_effectiveness(
            &self,
            _adaptation_id: uuid::Uuid,
            _metrics_after: crate::domain::adaptation::AdaptationMetrics,
            _effectiveness: crate::domain::adaptation::Effectiveness,
        ) -> Result<(), crate::domain::errors::KnowledgeError> {
            Ok(())
        }
        async fn note_trade_for_pending_adaptations(&self, _coin: &crate::domain::Coin) -> Result<(), crate::domain::errors::KnowledgeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn collect_snapshot_reads_live_executor_state() {
        let sizing = SizingConfig {
            base_size_usd: dec!(100),
            min_size_usd: dec!(10),
            max_size_usd: dec!(200),
            max_concurrent_positions: 5,
            max_entry_drift: 0.02,
        };
        let executor = Arc::new(ConditionExecutor::new(&sizing));
        let knowledge = Arc::new(EmptyStore);
        let reporter = MetricsReporter::new(executor, knowledge, Metrics::new().unwrap(), Duration::from_secs(60));
        let snapshot = reporter.collect_snapshot().await;
        assert_eq!(snapshot.open_positions, 0);
        assert!(!snapshot.timestamp.is_empty());
    }
}
