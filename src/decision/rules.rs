//! Scoring rules and thresholds
//!
//! All constants live here, not in the engine. The exact numbers are
//! tunable policy; `DecisionPolicy::default()` is the shipped calibration.

use crate::model::EvidenceCategory;

// ============================================================================
// CATEGORY SCORE CAPS (points out of 100)
// ============================================================================

pub const STATIC_CAP: f32 = 30.0;
pub const SIGNATURE_CAP: f32 = 40.0;
pub const BEHAVIORAL_CAP: f32 = 20.0;
pub const REPUTATION_CAP: f32 = 30.0;
pub const PERMISSION_CAP: f32 = 10.0;

/// Bonus share of the cap granted per extra finding in the same category.
pub const EXTRA_FINDING_BONUS: f32 = 0.1;

// ============================================================================
// CONFIDENCE MODEL
// ============================================================================

/// Base confidence when an exact signature match is present.
pub const SIGNATURE_BASE_CONFIDENCE: f32 = 0.4;
/// Base confidence without a signature match.
pub const HEURISTIC_BASE_CONFIDENCE: f32 = 0.25;
/// First corroborating-category increment; each further one decays.
pub const CORROBORATION_INCREMENT: f32 = 0.25;
/// Decay factor applied per additional corroborating category.
pub const CORROBORATION_DECAY: f32 = 0.7;
/// Multiplier applied when only one evidence category contributed.
pub const SINGLE_SOURCE_PENALTY: f32 = 0.7;

/// Tunable decision thresholds.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    /// score >= this -> critical
    pub critical_min: f32,
    /// score >= this -> high
    pub high_min: f32,
    /// score >= this -> medium
    pub medium_min: f32,
    /// score >= this -> low
    pub low_min: f32,

    /// Quarantine requires both a high score and high confidence.
    pub quarantine_score_min: f32,
    pub quarantine_confidence_min: f32,
    pub autoblock_score_min: f32,
    pub alert_score_min: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            critical_min: 80.0,
            high_min: 60.0,
            medium_min: 40.0,
            low_min: 20.0,
            quarantine_score_min: 75.0,
            quarantine_confidence_min: 0.85,
            autoblock_score_min: 50.0,
            alert_score_min: 30.0,
        }
    }
}

/// Score cap for one evidence category.
pub fn category_cap(category: EvidenceCategory) -> f32 {
    match category {
        EvidenceCategory::Static => STATIC_CAP,
        EvidenceCategory::Signature => SIGNATURE_CAP,
        EvidenceCategory::Behavioral => BEHAVIORAL_CAP,
        EvidenceCategory::Reputation => REPUTATION_CAP,
        EvidenceCategory::Permission => PERMISSION_CAP,
    }
}
