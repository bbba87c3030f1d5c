use std::env;

/// Observability configuration for the push-based metrics reporter.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("OBSERVABILITY_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse::<bool>()
                .unwrap_or(true),
            interval_seconds: env::var("OBSERVABILITY_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }
}
