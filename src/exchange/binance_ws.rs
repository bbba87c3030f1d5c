//! Binance combined-stream market-data feed.
//!
//! Connects via the `/stream?streams=...` combined-stream endpoint,
//! reconnects with exponential backoff plus full jitter on any error, and
//! never propagates the error to the caller.

use super::{ConnectionState, ExchangeFeed, RawTick, TickKind};
use crate::domain::Coin;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const BASE_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;

pub struct BinanceExchangeFeed {
    ws_base_url: String,
}

impl BinanceExchangeFeed {
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
        }
    }

    fn stream_name(coin: &Coin) -> String {
        format!("{}usdt@trade", coin.as_str().to_lowercase())
    }

    async fn connect_and_stream(
        &self,
        symbols: &[Coin],
        tx: &mpsc::Sender<RawTick>,
        status_tx: &watch::Sender<ConnectionState>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let streams: Vec<String> = symbols.iter().map(Self::stream_name).collect();
        let url = format!(
            "{}/stream?streams={}",
            self.ws_base_url.trim_end_matches('/'),
            streams.join("/")
        );

        info!("Connecting to exchange WebSocket: {}", url);
        let (ws_stream, _) = connect_async(&url).await?;
        info!("Exchange WebSocket connected");
        let _ = status_tx.send(ConnectionState::Connected);

        let (mut write, mut read) = ws_stream.split();
        let mut ping_interval = tokio::time::interval(Duration::from_secs(180));

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
                _ = ping_interval.tick() => {
                    if write.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return Err(anyhow::anyhow!("failed to send keepalive ping"));
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(tick) = parse_combined_stream_message(&text) {
                                if tx.send(tick).await.is_err() {
                                    return Ok(()); // receiver dropped: MarketFeed shutting down.
                                }
                            }
                        }
                        Some(Ok(Message::Ping(_))) => {}
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(anyhow::anyhow!("exchange WebSocket stream ended")),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ExchangeFeed for BinanceExchangeFeed {
    async fn run(
        &self,
        symbols: Vec<Coin>,
        tx: mpsc::Sender<RawTick>,
        status_tx: watch::Sender<ConnectionState>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if symbols.is_empty() {
            warn!("Exchange feed started with an empty symbol set; idling");
            return;
        }

        let mut backoff = BASE_BACKOFF_SECS;
        loop {
            if *shutdown.borrow() {
                let _ = status_tx.send(ConnectionState::Disconnected);
                return;
            }
            let _ = status_tx.send(if backoff == BASE_BACKOFF_SECS {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });
            match self
                .connect_and_stream(&symbols, &tx, &status_tx, &mut shutdown)
                .await
            {
                Ok(()) => {
                    if *shutdown.borrow() {
                        let _ = status_tx.send(ConnectionState::Disconnected);
                        return;
                    }
                    info!("Exchange WebSocket closed gracefully, reconnecting");
                    backoff = BASE_BACKOFF_SECS;
                }
                Err(e) => {
                    error!("Exchange WebSocket error: {e}");
                    let _ = status_tx.send(ConnectionState::Reconnecting);
                    backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                }
            }
            let jittered = jittered_backoff(backoff);
            debug!("Reconnecting in {:?}", jittered);
            tokio::time::sleep(jittered).await;
        }
    }
}

fn jittered_backoff(base_secs: u64) -> Duration {
    let mut rng = rand::rng();
    let jitter_ms = rng.random_range(0..base_secs.max(1) * 1000);
    Duration::from_millis(base_secs * 1000 / 2 + jitter_ms)
}

#[derive(Debug, Deserialize)]
struct CombinedStreamEnvelope {
    #[allow(dead_code)]
    stream: String,
    data: TradeData,
}

#[derive(Debug, Deserialize)]
struct TradeData {
    /// Symbol, e.g. "BTCUSDT".
    s: String,
    /// Price as a decimal string.
    p: String,
    /// Trade time, epoch milliseconds.
    #[serde(rename = "T")]
    t: i64,
}

fn parse_combined_stream_message(text: &str) -> Option<RawTick> {
    let envelope: CombinedStreamEnvelope = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return None,
    };
    let price = Decimal::from_str(&envelope.data.p).ok()?;
    let symbol = envelope.data.s.strip_suffix("USDT").unwrap_or(&envelope.data.s);
    let timestamp = Utc.timestamp_millis_opt(envelope.data.t).single()?;
    Some(RawTick {
        coin: Coin::new(symbol),
        price,
        timestamp,
        kind: TickKind::Trade,
    })
}
