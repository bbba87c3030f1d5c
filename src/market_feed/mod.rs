//! Maintains a continuously updated view of the tradeable universe: latest
//! price per coin, recent klines, and a derived rolling volatility, fed by
//! an [`ExchangeFeed`] and fanned out to listeners.

pub mod listener;
pub mod volatility;

pub use listener::{PriceListener, PriceUpdate};

use crate::domain::errors::FeedError;
use crate::domain::{Coin, CoinMarketView, MarketState};
use crate::exchange::{ConnectionState, ExchangeFeed, RawTick, TickKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    OneMinute,
    OneHour,
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub open_time: DateTime<Utc>,
}

const MAX_KLINE_HISTORY: usize = 48;
const VOLATILITY_WINDOW: usize = volatility::DEFAULT_WINDOW;

struct CoinState {
    price: Decimal,
    updated_at: DateTime<Utc>,
    hourly_closes: VecDeque<f64>,
    klines: HashMap<Interval, VecDeque<Candle>>,
}

impl CoinState {
    fn new(price: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            price,
            updated_at: now,
            hourly_closes: VecDeque::with_capacity(VOLATILITY_WINDOW),
            klines: HashMap::new(),
        }
    }

    /// Percent change between the oldest and newest hourly close in the
    /// rolling window. Zero until at least two hourly samples exist.
    fn change_24h_pct(&self) -> f64 {
        match (self.hourly_closes.front(), self.hourly_closes.back()) {
            (Some(first), Some(last)) if *first != 0.0 && self.hourly_closes.len() >= 2 => {
                (last - first) / first * 100.0
            }
            _ => 0.0,
        }
    }
}

#[derive(Default)]
struct FeedState {
    coins: HashMap<Coin, CoinState>,
}

/// The market-data boundary the rest of the system reads through.
pub struct MarketFeed {
    feed: Arc<dyn ExchangeFeed>,
    state: Arc<RwLock<FeedState>>,
    subscribed: Arc<RwLock<Vec<Coin>>>,
    task_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    connection_state: Arc<RwLock<ConnectionState>>,
    listeners: Arc<RwLock<Vec<Arc<PriceListener>>>>,
    stale_threshold: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl MarketFeed {
    pub fn new(feed: Arc<dyn ExchangeFeed>, stale_threshold: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            feed,
            state: Arc::new(RwLock::new(FeedState::default())),
            subscribed: Arc::new(RwLock::new(Vec::new())),
            task_handles: Arc::new(Mutex::new(Vec::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            listeners: Arc::new(RwLock::new(Vec::new())),
            stale_threshold,
            shutdown_tx,
        }
    }

    /// Ensure the feed is receiving updates for each symbol. Idempotent:
    /// calling with the same set twice is a no-op restart of the same
    /// underlying connection.
    pub async fn subscribe(&self, symbols: Vec<Coin>) {
        {
            let mut subscribed = self.subscribed.write().await;
            *subscribed = symbols.clone();
        }

        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }

        if symbols.is_empty() {
            warn!("market feed subscribed to an empty symbol set; idling");
            return;
        }

        let (tick_tx, tick_rx) = mpsc::channel::<RawTick>(1024);
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let shutdown_rx = self.shutdown_tx.subscribe();

        let feed = self.feed.clone();
        let run_symbols = symbols.clone();
        let run_handle = tokio::spawn(async move {
            feed.run(run_symbols, tick_tx, status_tx, shutdown_rx).await;
        });

        let state = self.state.clone();
        let listeners = self.listeners.clone();
        let ingest_handle = tokio::spawn(Self::ingest_loop(state, listeners, tick_rx));

        let connection_state = self.connection_state.clone();
        let status_handle = tokio::spawn(Self::status_loop(connection_state, status_rx));

        *handles = vec![run_handle, ingest_handle, status_handle];
        info!("market feed subscribed to {} symbols", symbols.len());
    }

    async fn ingest_loop(
        state: Arc<RwLock<FeedState>>,
        listeners: Arc<RwLock<Vec<Arc<PriceListener>>>>,
        mut tick_rx: mpsc::Receiver<RawTick>,
    ) {
        while let Some(tick) = tick_rx.recv().await {
            let applied = {
                let mut guard = state.write().await;
                let is_new_entry = !guard.coins.contains_key(&tick.coin);
                let entry = guard
                    .coins
                    .entry(tick.coin.clone())
                    .or_insert_with(|| CoinState::new(tick.price, tick.timestamp));

                // Keep whichever update carries the largest timestamp per
                // symbol; a duplicate or out-of-order tick is dropped.
                if !is_new_entry && tick.timestamp <= entry.updated_at {
                    false
                } else {
                    entry.price = tick.price;
                    entry.updated_at = tick.timestamp;
                    if matches!(tick.kind, TickKind::Trade) {
                        Self::fold_into_candle(entry, Interval::OneMinute, tick.price, tick.timestamp);
                        if Self::fold_into_candle(entry, Interval::OneHour, tick.price, tick.timestamp) {
                            let close = tick.price.to_string().parse::<f64>().unwrap_or(0.0);
                            entry.hourly_closes.push_back(close);
                            while entry.hourly_closes.len() > VOLATILITY_WINDOW {
                                entry.hourly_closes.pop_front();
                            }
                        }
                    }
                    true
                }
            };
            if !applied {
                continue;
            }

            let listeners_guard = listeners.read().await;
            for listener in listeners_guard.iter() {
                listener.push(PriceUpdate {
                    coin: tick.coin.clone(),
                    price: tick.price,
                    timestamp: tick.timestamp,
                });
            }
        }
    }

    async fn status_loop(
        connection_state: Arc<RwLock<ConnectionState>>,
        mut status_rx: watch::Receiver<ConnectionState>,
    ) {
        loop {
            let state = *status_rx.borrow();
            *connection_state.write().await = state;
            if status_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Latest price and its age. Fails with `Stale` once the age exceeds the
    /// configured threshold.
    pub async fn price(&self, coin: &Coin, now: DateTime<Utc>) -> Result<(Decimal, Duration), FeedError> {
        let guard = self.state.read().await;
        let entry = guard
            .coins
            .get(coin)
            .ok_or_else(|| FeedError::UnknownCoin(coin.to_string()))?;
        let age = (now - entry.updated_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if age > self.stale_threshold {
            return Err(FeedError::Stale {
                coin: coin.to_string(),
                age_ms: age.as_millis() as u64,
                threshold_ms: self.stale_threshold.as_millis() as u64,
            });
        }
        Ok((entry.price, age))
    }

    /// Most recent `n` closed candles. Fails with `InsufficientHistory` if
    /// fewer are available. The in-progress bucket is never returned.
    pub async fn klines(&self, coin: &Coin, interval: Interval, n: usize) -> Result<Vec<Candle>, FeedError> {
        let guard = self.state.read().await;
        let entry = guard
            .coins
            .get(coin)
            .ok_or_else(|| FeedError::UnknownCoin(coin.to_string()))?;
        let series = entry.klines.get(&interval).cloned().unwrap_or_default();
        let closed_count = series.len().saturating_sub(1);
        if closed_count < n {
            return Err(FeedError::InsufficientHistory {
                coin: coin.to_string(),
                have: closed_count,
                need: n,
            });
        }
        let closed: Vec<Candle> = series.iter().take(closed_count).cloned().collect();
        Ok(closed.iter().rev().take(n).rev().cloned().collect())
    }

    /// A coherent, point-in-time read across the tradeable universe. Stale
    /// entries are marked rather than silently mixed in with fresh ones.
    pub async fn snapshot(&self, now: DateTime<Utc>) -> MarketState {
        let guard = self.state.read().await;
        let mut coins = HashMap::with_capacity(guard.coins.len());
        let mut btc_change_1h_pct = 0.0;
        let mut btc_change_24h_pct = 0.0;

        for (coin, entry) in guard.coins.iter() {
            let closes: Vec<f64> = entry.hourly_closes.iter().copied().collect();
            let change_24h_pct = entry.change_24h_pct();
            let rolling_volatility = volatility::rolling_volatility(&closes, change_24h_pct);
            let age = (now - entry.updated_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let stale = age > self.stale_threshold;

            if coin.as_str() == "BTC" {
                btc_change_24h_pct = change_24h_pct;
                btc_change_1h_pct = closes
                    .last()
                    .zip(closes.iter().rev().nth(1))
                    .map(|(latest, prev)| (latest - prev) / prev * 100.0)
                    .unwrap_or(0.0);
            }

            coins.insert(
                coin.clone(),
                CoinMarketView {
                    price: entry.price,
                    change_24h_pct,
                    rolling_volatility,
                    stale,
                },
            );
        }

        let sentiment = MarketState::derive_sentiment(btc_change_1h_pct, btc_change_24h_pct);

        MarketState {
            taken_at: now,
            coins,
            btc_change_1h_pct,
            btc_change_24h_pct,
            sentiment,
        }
    }

    /// Register a listener invoked on every price update. The returned
    /// handle's `drain` must be polled regularly; unread updates beyond the
    /// ring capacity are dropped oldest-first.
    pub async fn register_listener(&self) -> Arc<PriceListener> {
        let listener = PriceListener::new();
        self.listeners.write().await.push(listener.clone());
        listener
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Folds one trade print into the open candle for `interval`, opening a
    /// new bucket when the tick crosses a boundary. Returns true if doing so
    /// just closed a prior candle (used to drive the hourly-close series
    /// volatility reads from).
    fn fold_into_candle(entry: &mut CoinState, interval: Interval, price: Decimal, ts: DateTime<Utc>) -> bool {
        let bucket_start = match interval {
            Interval::OneMinute => truncate_to_minute(ts),
            Interval::OneHour => truncate_to_hour(ts),
        };
        let series = entry.klines.entry(interval).or_default();
        match series.back_mut() {
            Some(last) if last.open_time == bucket_start => {
                if price > last.high {
                    last.high = price;
                }
                if price < last.low {
                    last.low = price;
                }
                last.close = price;
                false
            }
            _ => {
                let closed_prior = !series.is_empty();
                series.push_back(Candle {
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    open_time: bucket_start,
                });
                while series.len() > MAX_KLINE_HISTORY {
                    series.pop_front();
                }
                closed_prior
            }
        }
    }
}

fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp() - ts.timestamp() % 60, 0).unwrap_or(ts)
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp() - ts.timestamp() % 3600, 0).unwrap_or(ts)
}
