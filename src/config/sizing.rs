use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Position-sizing configuration: `base_size_usd`, `min_size_usd`,
/// `max_size_usd`, `max_concurrent_positions`.
#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub base_size_usd: Decimal,
    pub min_size_usd: Decimal,
    pub max_size_usd: Decimal,
    pub max_concurrent_positions: usize,
    pub max_entry_drift: f64,
}

impl SizingConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_size_usd: parse_decimal("BASE_SIZE_USD", "100")?,
            min_size_usd: parse_decimal("MIN_SIZE_USD", "10")?,
            max_size_usd: parse_decimal("MAX_SIZE_USD", "200")?,
            max_concurrent_positions: parse_env("MAX_CONCURRENT_POSITIONS", 5)?,
            max_entry_drift: parse_env("MAX_ENTRY_DRIFT", 0.02)?,
        })
    }
}

pub(crate) fn parse_decimal(key: &str, default: &str) -> Result<Decimal> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    Decimal::from_str(&raw).with_context(|| format!("failed to parse {key} as a decimal"))
}

pub(crate) fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
    T: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("failed to parse {key}={raw}: {e}")),
        Err(_) => Ok(default),
    }
}
