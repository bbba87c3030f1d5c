//! End-to-end checks across Executor -> Journal -> QuickUpdater ->
//! KnowledgeStore, wired the way `runtime::Application` wires them, but
//! without the network-facing Feed/reasoning-service boundary.

use chrono::{DateTime, Utc};
use paperloop::config::ThresholdsConfig;
use paperloop::domain::{Coin, Direction, TradeCondition};
use paperloop::executor::ConditionExecutor;
use paperloop::journal::{Journal, SqliteJournal};
use paperloop::knowledge_store::{KnowledgeStore, SqliteKnowledgeStore};
use paperloop::quick_updater::QuickUpdater;
use rust_decimal_macros::dec;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use uuid::Uuid;

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

fn sizing() -> paperloop::config::SizingConfig {
    paperloop::config::SizingConfig {
        base_size_usd: dec!(100),
        min_size_usd: dec!(10),
        max_size_usd: dec!(200),
        max_concurrent_positions: 5,
        max_entry_drift: 0.02,
    }
}

fn long_condition(entry: rust_decimal::Decimal, stop: rust_decimal::Decimal, target: rust_decimal::Decimal, now: DateTime<Utc>) -> TradeCondition {
    TradeCondition {
        condition_id: Uuid::new_v4(),
        coin: Coin::new("BTC"),
        direction: Direction::Long,
        entry_price: entry,
        stop_loss: stop,
        take_profit: target,
        size_usd: dec!(100),
        expires_at: now + chrono::Duration::hours(1),
        pattern_id: None,
    }
}

/// Five consecutive losing trades on one coin should blacklist it, record
/// one BLACKLIST adaptation, and leave every trade journalled regardless.
#[tokio::test]
async fn five_straight_losses_blacklist_the_coin() {
    let journal_pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let journal = SqliteJournal::new(journal_pool).await.unwrap();
    let knowledge_pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let knowledge = std::sync::Arc::new(SqliteKnowledgeStore::new(knowledge_pool).await.unwrap());
    let (reflection_tx, mut reflection_rx) = mpsc::channel(32);
    let updater = QuickUpdater::new(knowledge.clone(), thresholds(), reflection_tx);
    let executor = ConditionExecutor::new(&sizing());

    let now = Utc::now();
    for i in 0..5 {
        let entry = dec!(100);
        let stop = dec!(95);
        let target = dec!(120);
        executor.set_conditions(vec![long_condition(entry, stop, target, now)]);

        // Trigger the entry, then slam through the stop to force a loss.
        let opened = executor.on_price(&Coin::new("BTC"), entry, now);
        assert!(opened.is_empty(), "entry tick should only open a position, iteration {i}");
        let events = executor.on_price(&Coin::new("BTC"), stop, now);
        assert_eq!(events.len(), 1);
        let event = events.into_iter().next().unwrap();
        assert!(!event.won);

        journal.record(event.clone()).await.unwrap();
        updater.process(event).await.unwrap();
        assert!(reflection_rx.try_recv().is_ok());
    }

    let score = knowledge.coin_score(&Coin::new("BTC")).await.unwrap();
    assert_eq!(score.total_trades, 5);
    assert_eq!(score.losses, 5);
    assert_eq!(score.status, paperloop::domain::CoinStatus::Blacklisted);

    let context = knowledge.context().await;
    assert!(context.blacklist.contains(&Coin::new("BTC")));

    let journalled = journal.recent(10).await.unwrap();
    assert_eq!(journalled.len(), 5);
}

/// A tick that gaps straight through both the stop and the target in one
/// update must close at the stop — the invariant that stop-loss always
/// wins ties (and gaps) over take-profit.
#[tokio::test]
async fn gap_through_both_levels_closes_at_the_stop() {
    let executor = ConditionExecutor::new(&sizing());
    let now = Utc::now();
    executor.set_conditions(vec![long_condition(dec!(100), dec!(95), dec!(110), now)]);

    executor.on_price(&Coin::new("BTC"), dec!(100), now);
    let events = executor.on_price(&Coin::new("BTC"), dec!(90), now);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].exit_reason, paperloop::domain::ExitReason::StopLoss);
}

/// A replayed TradeEvent (same trade_id twice) must not double-count in the
/// knowledge store or re-enter the reflection queue.
#[tokio::test]
async fn replayed_trade_event_is_idempotent_end_to_end() {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let knowledge = std::sync::Arc::new(SqliteKnowledgeStore::new(pool).await.unwrap());
    let (reflection_tx, mut reflection_rx) = mpsc::channel(32);
    let updater = QuickUpdater::new(knowledge.clone(), thresholds(), reflection_tx);

    let executor = ConditionExecutor::new(&sizing());
    let now = Utc::now();
    executor.set_conditions(vec![long_condition(dec!(100), dec!(95), dec!(110), now)]);
    executor.on_price(&Coin::new("BTC"), dec!(100), now);
    let events = executor.on_price(&Coin::new("BTC"), dec!(110), now);
    let event = events.into_iter().next().unwrap();

    updater.process(event.clone()).await.unwrap();
    updater.process(event).await.unwrap();

    let score = knowledge.coin_score(&Coin::new("BTC")).await.unwrap();
    assert_eq!(score.total_trades, 1);
    assert!(reflection_rx.try_recv().is_ok());
    assert!(reflection_rx.try_recv().is_err(), "second process() must not enqueue again");
}
