use crate::domain::Coin;
use std::env;

/// The configured set of tradeable coins.
#[derive(Debug, Clone)]
pub struct UniverseConfig {
    pub coins: Vec<Coin>,
}

impl UniverseConfig {
    pub fn from_env() -> Self {
        let raw = env::var("UNIVERSE").unwrap_or_else(|_| "BTC,ETH,SOL".to_string());
        let coins = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Coin::new)
            .collect();
        Self { coins }
    }
}
