//! Shared SQLite connection setup for the Journal and KnowledgeStore. Both
//! are durable, WAL-mode, many-readers/one-writer stores; they share a pool
//! but own disjoint tables.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    if let Some(path_part) = database_url.strip_prefix("sqlite://") {
        let path = Path::new(path_part);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .context("failed to create database directory")?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    // An in-memory database is private per-connection; a pool of more than
    // one would silently fragment it across unrelated empty databases.
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .context("failed to connect to SQLite database")?;

    info!("connected to database: {database_url}");
    Ok(pool)
}
