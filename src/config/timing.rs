use super::sizing::parse_env;
use anyhow::Result;
use std::time::Duration;

/// Interval and window configuration.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub condition_ttl: Duration,
    pub propose_interval: Duration,
    pub reflect_interval: Duration,
    pub reflect_max_queue: usize,
    pub measure_window: chrono::Duration,
    pub measure_post_trades: u32,
    pub stale_price_threshold: Duration,
    pub min_trades_to_reflect: usize,
    pub proposer_deadline: Duration,
    pub reflection_deadline: Duration,
}

impl TimingConfig {
    pub fn from_env() -> Result<Self> {
        let condition_ttl_seconds: u64 = parse_env("CONDITION_TTL_SECONDS", 900)?;
        let propose_interval_seconds: u64 = parse_env("PROPOSE_INTERVAL_SECONDS", 300)?;
        let reflect_interval_seconds: u64 = parse_env("REFLECT_INTERVAL_SECONDS", 3600)?;
        let measure_window_hours: i64 = parse_env("MEASURE_WINDOW_HOURS", 24)?;
        let stale_price_threshold_seconds: u64 = parse_env("STALE_PRICE_THRESHOLD_SECONDS", 10)?;

        Ok(Self {
            condition_ttl: Duration::from_secs(condition_ttl_seconds),
            propose_interval: Duration::from_secs(propose_interval_seconds),
            reflect_interval: Duration::from_secs(reflect_interval_seconds),
            reflect_max_queue: parse_env("REFLECT_MAX_QUEUE", 50)?,
            measure_window: chrono::Duration::hours(measure_window_hours),
            measure_post_trades: parse_env("MEASURE_POST_TRADES", 10)?,
            stale_price_threshold: Duration::from_secs(stale_price_threshold_seconds),
            min_trades_to_reflect: parse_env("MIN_TRADES_TO_REFLECT", 5)?,
            proposer_deadline: Duration::from_secs(30),
            reflection_deadline: Duration::from_secs(120),
        })
    }
}
