use super::Journal;
use crate::domain::errors::JournalError;
use crate::domain::{Coin, Direction, ExitReason, TradeEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

pub struct SqliteJournal {
    pool: SqlitePool,
}

impl SqliteJournal {
    pub async fn new(pool: SqlitePool) -> Result<Self, JournalError> {
        let journal = Self { pool };
        journal.init().await?;
        Ok(journal)
    }

    async fn init(&self) -> Result<(), JournalError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_events (
                trade_id TEXT PRIMARY KEY,
                coin TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                entry_time INTEGER NOT NULL,
                exit_time INTEGER NOT NULL,
                size_usd TEXT NOT NULL,
                pnl_usd TEXT NOT NULL,
                won INTEGER NOT NULL,
                exit_reason TEXT NOT NULL,
                pattern_id TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| JournalError::WriteFailed(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trade_events_exit_time ON trade_events (exit_time);")
            .execute(&self.pool)
            .await
            .map_err(|e| JournalError::WriteFailed(e.to_string()))?;

        Ok(())
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<TradeEvent, JournalError> {
        let trade_id: String = row.try_get("trade_id").map_err(row_err)?;
        let direction: String = row.try_get("direction").map_err(row_err)?;
        let entry_price: String = row.try_get("entry_price").map_err(row_err)?;
        let exit_price: String = row.try_get("exit_price").map_err(row_err)?;
        let entry_time: i64 = row.try_get("entry_time").map_err(row_err)?;
        let exit_time: i64 = row.try_get("exit_time").map_err(row_err)?;
        let size_usd: String = row.try_get("size_usd").map_err(row_err)?;
        let pnl_usd: String = row.try_get("pnl_usd").map_err(row_err)?;
        let won: i64 = row.try_get("won").map_err(row_err)?;
        let exit_reason: String = row.try_get("exit_reason").map_err(row_err)?;
        let pattern_id: Option<String> = row.try_get("pattern_id").map_err(row_err)?;
        let coin: String = row.try_get("coin").map_err(row_err)?;

        Ok(TradeEvent {
            trade_id: Uuid::from_str(&trade_id).map_err(|e| JournalError::WriteFailed(e.to_string()))?,
            coin: Coin::new(coin),
            direction: if direction == "LONG" { Direction::Long } else { Direction::Short },
            entry_price: Decimal::from_str(&entry_price).unwrap_or(Decimal::ZERO),
            exit_price: Decimal::from_str(&exit_price).unwrap_or(Decimal::ZERO),
            entry_time: DateTime::from_timestamp(entry_time, 0).unwrap_or(Utc::now()),
            exit_time: DateTime::from_timestamp(exit_time, 0).unwrap_or(Utc::now()),
            size_usd: Decimal::from_str(&size_usd).unwrap_or(Decimal::ZERO),
            pnl_usd: Decimal::from_str(&pnl_usd).unwrap_or(Decimal::ZERO),
            won: won != 0,
            exit_reason: ExitReason::from_str(&exit_reason).unwrap_or(ExitReason::Manual),
            pattern_id,
        })
    }
}

fn row_err(e: sqlx::Error) -> JournalError {
    JournalError::WriteFailed(e.to_string())
}

#[async_trait]
impl Journal for SqliteJournal {
    async fn record(&self, event: TradeEvent) -> Result<(), JournalError> {
        sqlx::query(
            r#"
            INSERT INTO trade_events
                (trade_id, coin, direction, entry_price, exit_price, entry_time, exit_time,
                 size_usd, pnl_usd, won, exit_reason, pattern_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(trade_id) DO NOTHING
            "#,
        )
        .bind(event.trade_id.to_string())
        .bind(event.coin.to_string())
        .bind(if event.direction == Direction::Long { "LONG" } else { "SHORT" })
        .bind(event.entry_price.to_string())
        .bind(event.exit_price.to_string())
        .bind(event.entry_time.timestamp())
        .bind(event.exit_time.timestamp())
        .bind(event.size_usd.to_string())
        .bind(event.pnl_usd.to_string())
        .bind(event.won as i64)
        .bind(event.exit_reason.as_str())
        .bind(event.pattern_id.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| JournalError::WriteFailed(e.to_string()))?;

        info!("journalled trade {}", event.trade_id);
        Ok(())
    }

    async fn get(&self, trade_id: Uuid) -> Result<Option<TradeEvent>, JournalError> {
        let row = sqlx::query("SELECT * FROM trade_events WHERE trade_id = ?")
            .bind(trade_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(row_err)?;
        row.map(|r| Self::row_to_event(&r)).transpose()
    }

    async fn since(&self, t: DateTime<Utc>) -> Result<Vec<TradeEvent>, JournalError> {
        let rows = sqlx::query("SELECT * FROM trade_events WHERE exit_time >= ? ORDER BY exit_time ASC")
            .bind(t.timestamp())
            .fetch_all(&self.pool)
            .await
            .map_err(row_err)?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn recent(&self, n: usize) -> Result<Vec<TradeEvent>, JournalError> {
        let rows = sqlx::query("SELECT * FROM trade_events ORDER BY exit_time DESC LIMIT ?")
            .bind(n as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(row_err)?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn counts_by_coin(&self, since: DateTime<Utc>) -> Result<HashMap<Coin, u64>, JournalError> {
        let rows = sqlx::query(
            "SELECT coin, COUNT(*) as n FROM trade_events WHERE exit_time >= ? GROUP BY coin",
        )
        .bind(since.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(row_err)?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let coin: String = row.try_get("coin").map_err(row_err)?;
            let n: i64 = row.try_get("n").map_err(row_err)?;
            counts.insert(Coin::new(coin), n as u64);
        }
        Ok(counts)
    }
}
