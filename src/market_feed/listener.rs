use crate::domain::Coin;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One price-change update delivered to a listener.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub coin: Coin,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

const RING_CAPACITY: usize = 256;

/// A slow consumer must never hold up tick processing. Each listener gets a
/// bounded ring buffer; a listener that falls behind has its oldest queued
/// update dropped rather than stalling the feed.
pub struct PriceListener {
    buffer: std::sync::Mutex<VecDeque<PriceUpdate>>,
    dropped: AtomicU64,
}

impl PriceListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            buffer: std::sync::Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            dropped: AtomicU64::new(0),
        })
    }

    pub(crate) fn push(&self, update: PriceUpdate) {
        let mut buf = self.buffer.lock().unwrap();
        if buf.len() >= RING_CAPACITY {
            buf.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buf.push_back(update);
    }

    /// Drain all updates queued since the last call.
    pub fn drain(&self) -> Vec<PriceUpdate> {
        let mut buf = self.buffer.lock().unwrap();
        buf.drain(..).collect()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for PriceListener {
    fn default() -> Self {
        Self {
            buffer: std::sync::Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            dropped: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(price: i64) -> PriceUpdate {
        PriceUpdate {
            coin: Coin::new("BTC"),
            price: Decimal::from(price),
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
        }
    }

    #[test]
    fn drops_oldest_when_full() {
        let listener = PriceListener::new();
        for i in 0..(RING_CAPACITY + 10) {
            listener.push(update(i as i64));
        }
        assert_eq!(listener.dropped_count(), 10);
        let drained = listener.drain();
        assert_eq!(drained.len(), RING_CAPACITY);
        assert_eq!(drained[0].price, Decimal::from(10));
    }

    #[test]
    fn drain_empties_buffer() {
        let listener = PriceListener::new();
        listener.push(update(1));
        assert_eq!(listener.drain().len(), 1);
        assert_eq!(listener.drain().len(), 0);
    }
}
