//! Periodic deeper analysis over the recent trade history, surfaced as
//! [`Insight`]s and handed to the [`adaptation_applier::AdaptationApplier`].
//! Runs far off the hot path: timer- or queue-depth-triggered, with a
//! 120s reasoning-service deadline.

pub mod adaptation_applier;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::{ThresholdsConfig, TimingConfig};
use crate::domain::{Coin, TradeEvent};
use crate::knowledge_store::{KnowledgeContext, KnowledgeStore};
use crate::reasoning::ReasoningService;
use adaptation_applier::AdaptationApplier;

pub struct ReflectionEngine<R: ReasoningService, K: KnowledgeStore> {
    reasoning: Arc<R>,
    knowledge: Arc<K>,
    applier: AdaptationApplier<K>,
    timing: TimingConfig,
    thresholds: ThresholdsConfig,
}

impl<R: ReasoningService, K: KnowledgeStore> ReflectionEngine<R, K> {
    pub fn new(reasoning: Arc<R>, knowledge: Arc<K>, timing: TimingConfig, thresholds: ThresholdsConfig) -> Self {
        let applier = AdaptationApplier::new(knowledge.clone(), timing.clone());
        Self {
            reasoning,
            knowledge,
            applier,
            timing,
            thresholds,
        }
    }

    /// Drives the reflection loop until `shutdown` fires or the queue
    /// sender is dropped. Drains `queue_rx` into a buffer, triggering a
    /// reflection pass on an interval tick or once the buffer exceeds
    /// `reflect_max_queue`.
    pub async fn run(&self, mut queue_rx: mpsc::Receiver<TradeEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut buffer: Vec<TradeEvent> = Vec::new();
        let mut tick = tokio::time::interval(self.timing.reflect_interval);
        let mut measure_tick = tokio::time::interval(self.timing.reflect_interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.reflect_if_ready(&mut buffer).await;
                }
                _ = measure_tick.tick() => {
                    if let Err(e) = self.applier.measure_due(Utc::now()).await {
                        warn!("effectiveness measurement pass failed: {e}");
                    }
                }
                received = queue_rx.recv() => {
                    match received {
                        Some(event) => {
                            buffer.push(event);
                            if buffer.len() >= self.timing.reflect_max_queue {
                                self.reflect_if_ready(&mut buffer).await;
                            }
                        }
                        None => {
                            info!("reflection queue sender dropped; shutting down");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reflection engine draining on shutdown");
                        self.reflect_if_ready(&mut buffer).await;
                        break;
                    }
                }
            }
        }
    }

    async fn reflect_if_ready(&self, buffer: &mut Vec<TradeEvent>) {
        if buffer.len() < self.timing.min_trades_to_reflect {
            return;
        }
        let drained: Vec<TradeEvent> = buffer.drain(..).collect();
        let context = self.knowledge.context().await;
        let prompt = build_summary(&drained, &context);

        let insights = self.reasoning.reflect(prompt, self.timing.reflection_deadline).await;
        if insights.is_empty() {
            // The reasoning service's trait folds both "genuinely nothing to
            // report" and "timed out / malformed" into an empty vec, so this
            // is indistinguishable from a failure. Treating it as one and
            // requeuing is the safe side: no adaptations are ever lost, at
            // the cost of possibly retrying a batch that had nothing to say.
            warn!("reflection pass returned no insights; requeuing {} event(s)", drained.len());
            buffer.splice(0..0, drained);
            return;
        }

        let mut applied = 0;
        for insight in insights {
            if !insight.is_well_formed() || insight.confidence < self.thresholds.insight_min_conf {
                continue;
            }
            if let Err(e) = self.applier.apply(insight).await {
                warn!("failed to apply adaptation: {e}");
                continue;
            }
            applied += 1;
        }
        info!("reflection pass over {} trade(s) applied {applied} adaptation(s)", drained.len());
    }
}

fn build_summary(events: &[TradeEvent], context: &KnowledgeContext) -> String {
    use std::fmt::Write;

    let mut by_coin: HashMap<Coin, (u64, u64)> = HashMap::new();
    let mut by_hour: HashMap<u32, (u64, u64)> = HashMap::new();
    let mut by_pattern: HashMap<String, (u64, u64)> = HashMap::new();

    for event in events {
        let coin_entry = by_coin.entry(event.coin.clone()).or_default();
        let hour_entry = by_hour.entry(event.exit_time.format("%H").to_string().parse().unwrap_or(0)).or_default();
        bump(coin_entry, event.won);
        bump(hour_entry, event.won);
        if let Some(pattern_id) = &event.pattern_id {
            bump(by_pattern.entry(pattern_id.clone()).or_default(), event.won);
        }
    }

    let mut summary = String::new();
    let _ = writeln!(summary, "trades in window: {}", events.len());
    let _ = writeln!(summary, "by coin (wins/total):");
    for (coin, (wins, total)) in &by_coin {
        let _ = writeln!(summary, "  {coin}: {wins}/{total}");
    }
    let _ = writeln!(summary, "by hour-of-day (wins/total):");
    for (hour, (wins, total)) in &by_hour {
        let _ = writeln!(summary, "  {hour:02}: {wins}/{total}");
    }
    let _ = writeln!(summary, "by pattern (wins/total):");
    for (pattern_id, (wins, total)) in &by_pattern {
        let _ = writeln!(summary, "  {pattern_id}: {wins}/{total}");
    }
    let _ = writeln!(
        summary,
        "knowledge snapshot: blacklist={:?} favored={:?} active_patterns={} active_rules={}",
        context.blacklist,
        context.favored,
        context.active_patterns.len(),
        context.active_rules.len(),
    );
    summary.push_str(
        "respond with a JSON array of insights: \
         [{kind, target, evidence, suggested_action, confidence}]",
    );
    summary
}

fn bump(entry: &mut (u64, u64), won: bool) {
    entry.1 += 1;
    if won {
        entry.0 += 1;
    }
}
