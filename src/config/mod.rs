//! Configuration module, organized by domain: Universe, Sizing, Thresholds,
//! Timing, Observability, External services.

mod external;
mod observability;
mod sizing;
mod thresholds;
mod timing;
mod universe;

pub use external::ExternalServicesConfig;
pub use observability::ObservabilityConfig;
pub use sizing::SizingConfig;
pub use thresholds::ThresholdsConfig;
pub use timing::TimingConfig;
pub use universe::UniverseConfig;

use anyhow::{Context, Result};

/// Aggregate application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub universe: UniverseConfig,
    pub sizing: SizingConfig,
    pub thresholds: ThresholdsConfig,
    pub timing: TimingConfig,
    pub observability: ObservabilityConfig,
    pub external: ExternalServicesConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            universe: UniverseConfig::from_env(),
            sizing: SizingConfig::from_env().context("failed to load sizing config")?,
            thresholds: ThresholdsConfig::from_env().context("failed to load thresholds config")?,
            timing: TimingConfig::from_env().context("failed to load timing config")?,
            observability: ObservabilityConfig::from_env(),
            external: ExternalServicesConfig::from_env(),
        })
    }
}
