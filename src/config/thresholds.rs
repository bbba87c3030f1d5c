use super::sizing::parse_env;
use anyhow::Result;

/// Status and pattern thresholds.
#[derive(Debug, Clone)]
pub struct ThresholdsConfig {
    pub blacklist_wr: f64,
    pub reduce_wr: f64,
    pub favor_wr: f64,
    pub min_trades_adaptation: u64,
    pub deactivate_pattern_conf: f64,
    pub insight_min_conf: f64,
}

impl ThresholdsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            blacklist_wr: parse_env("BLACKLIST_WR", 0.30)?,
            reduce_wr: parse_env("REDUCE_WR", 0.45)?,
            favor_wr: parse_env("FAVOR_WR", 0.60)?,
            min_trades_adaptation: parse_env("MIN_TRADES_ADAPTATION", 5)?,
            deactivate_pattern_conf: parse_env("DEACTIVATE_PATTERN_CONF", 0.20)?,
            insight_min_conf: parse_env("INSIGHT_MIN_CONF", 0.4)?,
        })
    }
}
