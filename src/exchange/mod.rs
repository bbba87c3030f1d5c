//! Exchange WebSocket boundary.
//!
//! Treated as an opaque byte source producing `{symbol, price, timestamp_ms,
//! kind}` records. [`ExchangeFeed`] is the narrow contract the rest of the
//! system depends on, so a test double can stand in without touching
//! [`crate::market_feed`].

pub mod binance_ws;

use crate::domain::Coin;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

/// Connection state machine: `{Disconnected → Connecting → Connected →
/// Reconnecting}`. Reported by the [`ExchangeFeed`] implementation so
/// [`crate::market_feed::MarketFeed`] can reflect it without itself knowing
/// the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Trade,
    Kline1m,
    Kline1h,
}

#[derive(Debug, Clone)]
pub struct RawTick {
    pub coin: Coin,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub kind: TickKind,
}

/// A running connection to the exchange. `run` drives reconnection
/// internally — errors never propagate to the caller, they move the
/// connection to `Reconnecting` — and never returns except on cooperative
/// shutdown.
#[async_trait]
pub trait ExchangeFeed: Send + Sync {
    /// Start streaming ticks for `symbols` onto `tx`. Replaces any prior
    /// subscription; the exchange feed only ever sees the latest full
    /// symbol set.
    async fn run(
        &self,
        symbols: Vec<Coin>,
        tx: mpsc::Sender<RawTick>,
        status_tx: tokio::sync::watch::Sender<ConnectionState>,
        shutdown: tokio::sync::watch::Receiver<bool>,
    );
}
