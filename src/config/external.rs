use std::env;

/// Connection details for the two out-of-core collaborators this system
/// talks to: the exchange WebSocket and the reasoning service.
#[derive(Debug, Clone)]
pub struct ExternalServicesConfig {
    pub exchange_ws_url: String,
    pub reasoning_endpoint: String,
    pub reasoning_model: String,
    pub database_url: String,
}

impl ExternalServicesConfig {
    pub fn from_env() -> Self {
        Self {
            exchange_ws_url: env::var("EXCHANGE_WS_URL")
                .unwrap_or_else(|_| "wss://stream.binance.com:9443".to_string()),
            reasoning_endpoint: env::var("REASONING_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:11434/reason".to_string()),
            reasoning_model: env::var("REASONING_MODEL").unwrap_or_else(|_| "default".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://paperloop.db".to_string()),
        }
    }
}
