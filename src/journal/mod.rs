//! Append-only log of closed trades. Many readers, one writer; a write
//! commits atomically so readers never see a partial event.

mod sqlite;

pub use sqlite::SqliteJournal;

use crate::domain::errors::JournalError;
use crate::domain::{Coin, TradeEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait Journal: Send + Sync {
    /// Durable before returning — the in-memory truth is this ledger, so a
    /// write failure is surfaced but never un-does the caller's state change.
    async fn record(&self, event: TradeEvent) -> Result<(), JournalError>;
    async fn get(&self, trade_id: Uuid) -> Result<Option<TradeEvent>, JournalError>;
    async fn since(&self, t: DateTime<Utc>) -> Result<Vec<TradeEvent>, JournalError>;
    async fn recent(&self, n: usize) -> Result<Vec<TradeEvent>, JournalError>;
    async fn counts_by_coin(&self, since: DateTime<Utc>) -> Result<HashMap<Coin, u64>, JournalError>;
}
