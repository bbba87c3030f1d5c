//! Prometheus metric definitions, all `paperloop_`-prefixed and read-only
//! from the outside — this process never runs an HTTP server, metrics are
//! pushed out by [`super::reporter::MetricsReporter`].

use prometheus::{
    core::{AtomicF64, GenericGauge},
    CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub open_positions: GenericGauge<AtomicF64>,
    pub open_notional_usd: GenericGauge<AtomicF64>,
    pub pending_conditions: GenericGauge<AtomicF64>,
    pub win_rate_current: GenericGauge<AtomicF64>,
    pub uptime_seconds: GenericGauge<AtomicF64>,
    pub trades_total: CounterVec,
    pub adaptations_total: CounterVec,
    pub rollbacks_total: CounterVec,
    pub feed_reconnects_total: CounterVec,
    pub reasoning_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let open_positions =
            GenericGauge::with_opts(Opts::new("paperloop_open_positions", "Number of open positions"))?;
        registry.register(Box::new(open_positions.clone()))?;

        let open_notional_usd = GenericGauge::with_opts(Opts::new(
            "paperloop_open_notional_usd",
            "Sum of size_usd across open positions",
        ))?;
        registry.register(Box::new(open_notional_usd.clone()))?;

        let pending_conditions = GenericGauge::with_opts(Opts::new(
            "paperloop_pending_conditions",
            "Number of conditions awaiting trigger or expiry",
        ))?;
        registry.register(Box::new(pending_conditions.clone()))?;

        let win_rate_current =
            GenericGauge::with_opts(Opts::new("paperloop_win_rate_current", "Aggregate win rate (0-1)"))?;
        registry.register(Box::new(win_rate_current.clone()))?;

        let uptime_seconds =
            GenericGauge::with_opts(Opts::new("paperloop_uptime_seconds", "Process uptime in seconds"))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let trades_total = CounterVec::new(
            Opts::new("paperloop_trades_total", "Closed trades by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(trades_total.clone()))?;

        let adaptations_total = CounterVec::new(
            Opts::new("paperloop_adaptations_total", "Adaptations applied by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(adaptations_total.clone()))?;

        let rollbacks_total = CounterVec::new(
            Opts::new("paperloop_rollbacks_total", "Adaptations rolled back by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(rollbacks_total.clone()))?;

        let feed_reconnects_total = CounterVec::new(
            Opts::new("paperloop_feed_reconnects_total", "Exchange feed reconnect attempts"),
            &["exchange"],
        )?;
        registry.register(Box::new(feed_reconnects_total.clone()))?;

        let reasoning_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "paperloop_reasoning_latency_seconds",
                "Reasoning service call latency in seconds",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["operation"],
        )?;
        registry.register(Box::new(reasoning_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            open_positions,
            open_notional_usd,
            pending_conditions,
            win_rate_current,
            uptime_seconds,
            trades_total,
            adaptations_total,
            rollbacks_total,
            feed_reconnects_total,
            reasoning_latency_seconds,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families).unwrap_or_default()
    }

    pub fn inc_trade(&self, outcome: &str) {
        self.trades_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_adaptation(&self, kind: &str) {
        self.adaptations_total.with_label_values(&[kind]).inc();
    }

    pub fn inc_rollback(&self, kind: &str) {
        self.rollbacks_total.with_label_values(&[kind]).inc();
    }

    pub fn inc_feed_reconnect(&self, exchange: &str) {
        self.feed_reconnects_total.with_label_values(&[exchange]).inc();
    }

    pub fn observe_reasoning_latency(&self, operation: &str, seconds: f64) {
        self.reasoning_latency_seconds.with_label_values(&[operation]).observe(seconds);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to construct default Metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_the_paperloop_prefix() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.render().contains("paperloop_"));
    }

    #[test]
    fn trade_counter_is_labeled_by_outcome() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_trade("win");
        metrics.inc_trade("loss");
        let rendered = metrics.render();
        assert!(rendered.contains("paperloop_trades_total"));
        assert!(rendered.contains("outcome=\"win\""));
    }
}
