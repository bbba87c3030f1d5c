use statrs::statistics::Statistics;

/// Default number of hourly samples the rolling-volatility window holds.
pub const DEFAULT_WINDOW: usize = 24;

/// Standard deviation of simple returns over the window. Falls back to
/// `|24h change| / sqrt(24)` when there are fewer than two samples to
/// compute a return series from.
pub fn rolling_volatility(hourly_closes: &[f64], change_24h_pct: f64) -> f64 {
    if hourly_closes.len() < 2 {
        return change_24h_pct.abs() / (DEFAULT_WINDOW as f64).sqrt();
    }
    let returns: Vec<f64> = hourly_closes
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < 2 {
        return change_24h_pct.abs() / (DEFAULT_WINDOW as f64).sqrt();
    }
    returns.std_dev()
}
