//! Wires every component into a running system: one `Application::build`
//! constructs the shared state, one `start` spawns the workers described in
//! the concurrency model (Feed, Executor tick-drain, QuickUpdate worker,
//! Reflection worker, Proposer worker, metrics reporter) and returns a
//! [`SystemHandle`] the caller can use to request a cooperative shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::config::Config;
use crate::domain::{ExitReason, TradeEvent};
use crate::exchange::binance_ws::BinanceExchangeFeed;
use crate::executor::ConditionExecutor;
use crate::journal::{Journal, SqliteJournal};
use crate::knowledge_store::{KnowledgeStore, SqliteKnowledgeStore};
use crate::market_feed::MarketFeed;
use crate::observability::{Metrics, MetricsReporter};
use crate::quick_updater::QuickUpdater;
use crate::reasoning::HttpReasoningService;
use crate::reflection::ReflectionEngine;
use crate::storage;
use crate::strategy_proposer::StrategyProposer;

/// Handle returned by [`Application::start`]. Dropping or signalling
/// `shutdown_tx` asks every worker to drain and exit; `wait` blocks until
/// they all have.
pub struct SystemHandle {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl SystemHandle {
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn wait(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("worker task panicked: {e}");
            }
        }
    }
}

/// Assembled, not-yet-running system. Every field is already independently
/// testable; `start` only adds the task topology around them.
pub struct Application {
    config: Config,
    feed: Arc<MarketFeed>,
    executor: Arc<ConditionExecutor>,
    journal: Arc<SqliteJournal>,
    knowledge: Arc<SqliteKnowledgeStore>,
    reasoning: Arc<HttpReasoningService>,
    metrics: Metrics,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!("building application for universe {:?}", config.universe.coins);

        let pool = storage::connect(&config.external.database_url).await?;
        let journal = Arc::new(SqliteJournal::new(pool.clone()).await.context("failed to open journal")?);
        let knowledge = Arc::new(
            SqliteKnowledgeStore::new(pool.clone())
                .await
                .context("failed to open knowledge store")?,
        );

        let exchange_feed = Arc::new(BinanceExchangeFeed::new(config.external.exchange_ws_url.clone()));
        let feed = Arc::new(MarketFeed::new(exchange_feed, config.timing.stale_price_threshold));

        let executor = Arc::new(ConditionExecutor::new(&config.sizing));
        let reasoning = Arc::new(HttpReasoningService::new(
            config.external.reasoning_endpoint.clone(),
            config.external.reasoning_model.clone(),
        ));
        let metrics = Metrics::new().context("failed to register prometheus metrics")?;

        Ok(Self {
            config,
            feed,
            executor,
            journal,
            knowledge,
            reasoning,
            metrics,
        })
    }

    pub async fn start(self) -> Result<SystemHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::new();

        self.feed.subscribe(self.config.universe.coins.clone()).await;
        let listener = self.feed.register_listener().await;

        // Tick-drain worker: the single caller that serializes `on_price`
        // calls into the Executor, per update, in arrival order.
        {
            let executor = self.executor.clone();
            let journal = self.journal.clone();
            let thresholds = self.config.thresholds.clone();
            let metrics = self.metrics.clone();
            let (reflection_tx, reflection_rx) = mpsc::channel::<TradeEvent>(self.config.timing.reflect_max_queue * 2);
            let quick_updater = Arc::new(QuickUpdater::new(self.knowledge.clone(), thresholds, reflection_tx));
            let mut shutdown = shutdown_rx.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(50)) => {
                            for update in listener.drain() {
                                let events = executor.on_price(&update.coin, update.price, update.timestamp);
                                for event in events {
                                    handle_closed_trade(&journal, &quick_updater, &metrics, event).await;
                                }
                            }
                            let expired = executor.expire_tick(Utc::now());
                            if expired > 0 {
                                info!("{expired} condition(s) expired this tick");
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!("tick-drain worker draining remaining price updates on shutdown");
                                for update in listener.drain() {
                                    let events = executor.on_price(&update.coin, update.price, update.timestamp);
                                    for event in events {
                                        handle_closed_trade(&journal, &quick_updater, &metrics, event).await;
                                    }
                                }
                                break;
                            }
                        }
                    }
                }
            }));

            workers.push(tokio::spawn(reflection_worker(
                self.reasoning.clone(),
                self.knowledge.clone(),
                self.config.timing.clone(),
                self.config.thresholds.clone(),
                reflection_rx,
                shutdown_rx.clone(),
            )));
        }

        // Proposer worker: timer-triggered, reads a fresh snapshot and the
        // latest KnowledgeStore context each cycle (the system's only pull
        // "back edge").
        {
            let feed = self.feed.clone();
            let executor = self.executor.clone();
            let knowledge = self.knowledge.clone();
            let proposer = StrategyProposer::new(self.reasoning.clone(), self.config.sizing.clone());
            let timing = self.config.timing.clone();
            let mut shutdown = shutdown_rx.clone();

            workers.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(timing.propose_interval);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            let now = Utc::now();
                            let snapshot = feed.snapshot(now).await;
                            let context = knowledge.context().await;
                            let conditions = proposer.propose(&snapshot, &context, &timing, now).await;
                            if !conditions.is_empty() {
                                info!("proposer cycle emitted {} new condition(s)", conditions.len());
                            }
                            executor.set_conditions(conditions);
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!("proposer worker exiting on shutdown");
                                break;
                            }
                        }
                    }
                }
            }));
        }

        if self.config.observability.enabled {
            let reporter = MetricsReporter::new(
                self.executor.clone(),
                self.knowledge.clone(),
                self.metrics.clone(),
                Duration::from_secs(self.config.observability.interval_seconds),
            );
            workers.push(tokio::spawn(reporter.run()));
        } else {
            info!("metrics reporting disabled");
        }

        Ok(SystemHandle { shutdown_tx, workers })
    }
}

async fn reflection_worker(
    reasoning: Arc<HttpReasoningService>,
    knowledge: Arc<SqliteKnowledgeStore>,
    timing: crate::config::TimingConfig,
    thresholds: crate::config::ThresholdsConfig,
    queue_rx: mpsc::Receiver<TradeEvent>,
    shutdown: watch::Receiver<bool>,
) {
    let engine = ReflectionEngine::new(reasoning, knowledge, timing, thresholds);
    engine.run(queue_rx, shutdown).await;
}

async fn handle_closed_trade<K: KnowledgeStore>(
    journal: &Arc<SqliteJournal>,
    quick_updater: &Arc<QuickUpdater<K>>,
    metrics: &Metrics,
    event: TradeEvent,
) {
    let outcome = if event.won { "win" } else { "loss" };
    metrics.inc_trade(outcome);
    if matches!(event.exit_reason, ExitReason::Manual) {
        info!("trade {} closed manually at shutdown", event.trade_id);
    }

    if let Err(e) = journal.record(event.clone()).await {
        error!("failed to journal trade {}: {e}", event.trade_id);
    }

    match quick_updater.process(event.clone()).await {
        Ok(_) => {}
        Err(e) if e.kind() == crate::domain::ErrorKind::StateViolation => {
            error!("invariant violated processing trade {}: {e}; halting", event.trade_id);
            std::process::exit(1);
        }
        Err(e) => {
            error!("quick update failed for trade {}: {e}", event.trade_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_succeeds_against_an_in_memory_database() {
        let mut config = test_config();
        config.external.database_url = "sqlite::memory:".to_string();
        let app = Application::build(config).await.unwrap();
        assert_eq!(app.executor.open_position_count(), 0);
    }

    fn test_config() -> Config {
        Config {
            universe: crate::config::UniverseConfig { coins: vec![crate::domain::Coin::new("BTC")] },
            sizing: crate::config::SizingConfig {
                base_size_usd: rust_decimal_macros::dec!(100),
                min_size_usd: rust_decimal_macros::dec!(10),
                max_size_usd: rust_decimal_macros::dec!(200),
                max_concurrent_positions: 5,
                max_entry_drift: 0.02,
            },
            thresholds: crate::config::ThresholdsConfig {
                blacklist_wr: 0.30,
                reduce_wr: 0.45,
                favor_wr: 0.60,
                min_trades_adaptation: 5,
                deactivate_pattern_conf: 0.20,
                insight_min_conf: 0.4,
            },
            timing: crate::config::TimingConfig {
                condition_ttl: Duration::from_secs(900),
                propose_interval: Duration::from_secs(300),
                reflect_interval: Duration::from_secs(3600),
                reflect_max_queue: 50,
                measure_window: chrono::Duration::hours(24),
                measure_post_trades: 10,
                stale_price_threshold: Duration::from_secs(10),
                min_trades_to_reflect: 5,
                proposer_deadline: Duration::from_secs(30),
                reflection_deadline: Duration::from_secs(120),
            },
            observability: crate::config::ObservabilityConfig {
                enabled: false,
                interval_seconds: 60,
            },
            external: crate::config::ExternalServicesConfig {
                exchange_ws_url: "wss://stream.binance.com:9443".to_string(),
                reasoning_endpoint: "http://127.0.0.1:11434/reason".to_string(),
                reasoning_model: "default".to_string(),
                database_url: "sqlite::memory:".to_string(),
            },
        }
    }
}
