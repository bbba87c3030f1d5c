use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

/// LRU-bounded idempotence set: remembers the last `capacity` trade_ids
/// seen so a replayed TradeEvent is rejected rather than double-counted.
pub struct SeenTrades {
    order: VecDeque<Uuid>,
    seen: HashSet<Uuid>,
    capacity: usize,
}

impl SeenTrades {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(1024)),
            seen: HashSet::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Returns `true` the first time `id` is seen, `false` on every replay.
    pub fn insert(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

impl Default for SeenTrades {
    fn default() -> Self {
        Self::new(10_000)
    }
}
