//! Maps a surviving [`Insight`] into an [`Adaptation`], applies its
//! mutation, and later measures whether it helped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::TimingConfig;
use crate::domain::adaptation::Effectiveness;
use crate::domain::errors::KnowledgeError;
use crate::domain::{Adaptation, Insight};
use crate::knowledge_store::KnowledgeStore;

pub struct AdaptationApplier<K: KnowledgeStore> {
    knowledge: Arc<K>,
    timing: TimingConfig,
}

impl<K: KnowledgeStore> AdaptationApplier<K> {
    pub fn new(knowledge: Arc<K>, timing: TimingConfig) -> Self {
        Self { knowledge, timing }
    }

    /// Snapshots metrics_before, applies the mutation, and leaves the
    /// adaptation PENDING for later measurement.
    pub async fn apply(&self, insight: Insight) -> Result<(), KnowledgeError> {
        let since = Utc::now() - self.timing.measure_window;
        let metrics_before = self.knowledge.target_metrics(&insight.target, since).await;
        let adaptation = Adaptation::new(
            insight.kind,
            insight.target.clone(),
            insight.evidence.clone(),
            metrics_before,
            Utc::now(),
            self.timing.measure_window,
            self.timing.measure_post_trades,
        );
        info!("applying {:?} adaptation on {}", adaptation.kind, adaptation.target);
        self.knowledge.apply_adaptation(adaptation).await
    }

    /// Measures every still-PENDING adaptation whose measurement window (or
    /// post-trade count) has elapsed, rates its effectiveness, and rolls
    /// back the ones rated HARMFUL among the kinds that support inversion.
    pub async fn measure_due(&self, now: DateTime<Utc>) -> Result<(), KnowledgeError> {
        let lookback = now - self.timing.measure_window * 2;
        for adaptation in self.knowledge.adaptations_since(lookback).await {
            if !matches!(adaptation.effectiveness, Effectiveness::Pending) {
                continue;
            }
            let window_elapsed = now >= adaptation.measure_at;
            let trades_elapsed = adaptation.post_trade_count >= adaptation.measure_after_trades;
            if !window_elapsed && !trades_elapsed {
                continue;
            }

            let metrics_after = self.knowledge.target_metrics(&adaptation.target, adaptation.applied_at).await;
            let mut rated = adaptation.clone();
            rated.metrics_after = Some(metrics_after);
            let effectiveness = rated.rate_effectiveness();

            self.knowledge.record_effectiveness(adaptation.id, metrics_after, effectiveness).await?;
            info!("adaptation {} on {} rated {:?}", adaptation.id, adaptation.target, effectiveness);

            rated.effectiveness = effectiveness;
            if rated.should_rollback() {
                warn!("rolling back harmful adaptation {} on {}", adaptation.id, adaptation.target);
                if let Err(e) = self.knowledge.rollback_adaptation(adaptation.id).await {
                    error!("failed to roll back adaptation {}: {e}", adaptation.id);
                }
            }
        }
        Ok(())
    }
}
