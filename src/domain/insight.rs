use serde::{Deserialize, Serialize};

use super::adaptation::AdaptationKind;

/// Reasoning-service output consumed by the AdaptationApplier. Transient —
/// never stored, only mapped into an [`super::Adaptation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub kind: AdaptationKind,
    pub target: String,
    pub evidence: String,
    pub suggested_action: String,
    pub confidence: f64,
}

impl Insight {
    pub fn is_well_formed(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence) && !self.target.trim().is_empty()
    }
}
