//! Risk assessment engine
//!
//! ONLY contains the assess logic - no types, no policy constants.
//! Input: findings for one target. Output: RiskAssessment.
//! Deterministic and explainable: identical findings always produce an
//! identical assessment, and every contribution lands in `reasons`.

use crate::model::{EvidenceCategory, Finding, RecommendedAction, RiskAssessment, Severity};

use super::rules::{
    category_cap, DecisionPolicy, CORROBORATION_DECAY, CORROBORATION_INCREMENT,
    EXTRA_FINDING_BONUS, HEURISTIC_BASE_CONFIDENCE, SIGNATURE_BASE_CONFIDENCE,
    SINGLE_SOURCE_PENALTY,
};

/// Assess with the default policy.
pub fn assess(target_id: &str, findings: &[Finding]) -> RiskAssessment {
    assess_with_policy(target_id, findings, &DecisionPolicy::default())
}

/// Assess with a custom policy.
pub fn assess_with_policy(
    target_id: &str,
    findings: &[Finding],
    policy: &DecisionPolicy,
) -> RiskAssessment {
    let mut reasons = Vec::new();
    let mut score = 0.0f32;
    let mut contributing_categories = 0usize;

    // Capped weighted sum per evidence category.
    for category in EvidenceCategory::ALL {
        let in_category: Vec<&Finding> =
            findings.iter().filter(|f| f.category == category).collect();
        if in_category.is_empty() {
            continue;
        }

        let cap = category_cap(category);
        let strongest = in_category
            .iter()
            .map(|f| f.severity.weight() * f.confidence)
            .fold(0.0f32, f32::max);
        // Extra findings in the same category corroborate each other, but
        // the category can never exceed its cap.
        let bonus = (in_category.len() - 1) as f32 * EXTRA_FINDING_BONUS * cap;
        let points = (cap * strongest + bonus).min(cap);

        if points > 0.0 {
            contributing_categories += 1;
            reasons.push(format!(
                "{}: {:.1} pts from {} finding(s)",
                category.as_str(),
                points,
                in_category.len()
            ));
        }
        score += points;
    }

    score = score.clamp(0.0, 100.0);

    let signature_match = findings.iter().any(|f| f.is_signature_match());

    // Exact signature match overrides the numeric mapping.
    let severity = if signature_match {
        reasons.push("exact signature match: severity forced to critical".to_string());
        Severity::Critical
    } else {
        severity_for_score(score, policy)
    };

    let confidence = compute_confidence(signature_match, contributing_categories);
    let action = action_for(score, confidence, policy);

    reasons.push(format!(
        "final score {:.1}, confidence {:.2}",
        score, confidence
    ));

    RiskAssessment {
        target_id: target_id.to_string(),
        score,
        severity,
        confidence,
        action,
        reasons,
    }
}

/// Numeric score -> severity band. Monotonic non-decreasing by construction.
pub fn severity_for_score(score: f32, policy: &DecisionPolicy) -> Severity {
    if score >= policy.critical_min {
        Severity::Critical
    } else if score >= policy.high_min {
        Severity::High
    } else if score >= policy.medium_min {
        Severity::Medium
    } else if score >= policy.low_min {
        Severity::Low
    } else {
        Severity::Info
    }
}

fn compute_confidence(signature_match: bool, contributing_categories: usize) -> f32 {
    if contributing_categories == 0 {
        return 0.0;
    }

    let mut confidence = if signature_match {
        SIGNATURE_BASE_CONFIDENCE
    } else {
        HEURISTIC_BASE_CONFIDENCE
    };

    // Each additional corroborating category adds a diminishing increment.
    let mut increment = CORROBORATION_INCREMENT;
    for _ in 1..contributing_categories {
        confidence += increment;
        increment *= CORROBORATION_DECAY;
    }

    if contributing_categories == 1 {
        confidence *= SINGLE_SOURCE_PENALTY;
    }

    confidence.clamp(0.0, 1.0)
}

fn action_for(score: f32, confidence: f32, policy: &DecisionPolicy) -> RecommendedAction {
    if score >= policy.quarantine_score_min && confidence >= policy.quarantine_confidence_min {
        RecommendedAction::Quarantine
    } else if score >= policy.autoblock_score_min {
        RecommendedAction::AutoBlock
    } else if score >= policy.alert_score_min {
        RecommendedAction::Alert
    } else {
        RecommendedAction::Log
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(category: EvidenceCategory, severity: Severity, confidence: f32) -> Finding {
        Finding::new("test-detector", category, severity, confidence)
    }

    #[test]
    fn empty_findings_are_benign() {
        let a = assess("t1", &[]);
        assert_eq!(a.score, 0.0);
        assert_eq!(a.severity, Severity::Info);
        assert_eq!(a.confidence, 0.0);
        assert_eq!(a.action, RecommendedAction::Log);
    }

    #[test]
    fn deterministic_for_identical_findings() {
        let findings = vec![
            finding(EvidenceCategory::Static, Severity::High, 0.8),
            finding(EvidenceCategory::Behavioral, Severity::Medium, 0.6),
        ];
        let a = assess("t1", &findings);
        let b = assess("t1", &findings);
        assert_eq!(a.score, b.score);
        assert_eq!(a.severity, b.severity);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.action, b.action);
        assert_eq!(a.reasons, b.reasons);
    }

    #[test]
    fn signature_match_forces_critical() {
        // Weak signature finding, low numeric score - still critical.
        let findings = vec![finding(EvidenceCategory::Signature, Severity::Low, 0.5)];
        let a = assess("t1", &findings);
        assert!(a.score < 40.0);
        assert_eq!(a.severity, Severity::Critical);
    }

    #[test]
    fn signature_critical_independent_of_other_findings() {
        let findings = vec![
            finding(EvidenceCategory::Signature, Severity::Critical, 1.0),
            finding(EvidenceCategory::Static, Severity::Info, 0.1),
        ];
        assert_eq!(assess("t1", &findings).severity, Severity::Critical);
    }

    #[test]
    fn severity_mapping_is_monotonic() {
        let policy = DecisionPolicy::default();
        let mut last = Severity::Info;
        for s in 0..=100 {
            let sev = severity_for_score(s as f32, &policy);
            assert!(sev >= last, "severity decreased at score {}", s);
            last = sev;
        }
    }

    #[test]
    fn severity_band_edges() {
        let p = DecisionPolicy::default();
        assert_eq!(severity_for_score(80.0, &p), Severity::Critical);
        assert_eq!(severity_for_score(79.9, &p), Severity::High);
        assert_eq!(severity_for_score(60.0, &p), Severity::High);
        assert_eq!(severity_for_score(40.0, &p), Severity::Medium);
        assert_eq!(severity_for_score(20.0, &p), Severity::Low);
        assert_eq!(severity_for_score(19.9, &p), Severity::Info);
    }

    #[test]
    fn category_caps_are_enforced() {
        // Five maxed-out behavioral findings can never exceed the 20pt cap.
        let findings: Vec<Finding> = (0..5)
            .map(|_| finding(EvidenceCategory::Behavioral, Severity::Critical, 1.0))
            .collect();
        let a = assess("t1", &findings);
        assert!(a.score <= 20.0);
    }

    #[test]
    fn total_score_is_clipped_to_100() {
        let findings = vec![
            finding(EvidenceCategory::Static, Severity::Critical, 1.0),
            finding(EvidenceCategory::Signature, Severity::Critical, 1.0),
            finding(EvidenceCategory::Behavioral, Severity::Critical, 1.0),
            finding(EvidenceCategory::Reputation, Severity::Critical, 1.0),
            finding(EvidenceCategory::Permission, Severity::Critical, 1.0),
        ];
        let a = assess("t1", &findings);
        assert_eq!(a.score, 100.0);
        assert!(a.confidence <= 1.0);
    }

    #[test]
    fn single_source_penalty_applies() {
        let one_cat = vec![finding(EvidenceCategory::Static, Severity::Critical, 1.0)];
        let a = assess("t1", &one_cat);
        let expected = HEURISTIC_BASE_CONFIDENCE * SINGLE_SOURCE_PENALTY;
        assert!((a.confidence - expected).abs() < 1e-6);
    }

    #[test]
    fn corroboration_raises_confidence_with_diminishing_returns() {
        let two = assess(
            "t",
            &[
                finding(EvidenceCategory::Static, Severity::High, 0.9),
                finding(EvidenceCategory::Behavioral, Severity::High, 0.9),
            ],
        );
        let three = assess(
            "t",
            &[
                finding(EvidenceCategory::Static, Severity::High, 0.9),
                finding(EvidenceCategory::Behavioral, Severity::High, 0.9),
                finding(EvidenceCategory::Permission, Severity::High, 0.9),
            ],
        );
        assert!(three.confidence > two.confidence);
        // Third category adds less than the second did.
        let first_step = two.confidence - HEURISTIC_BASE_CONFIDENCE;
        let second_step = three.confidence - two.confidence;
        assert!(second_step < first_step);
    }

    #[test]
    fn quarantine_requires_score_and_confidence() {
        // Signature + three corroborating categories: high score, high confidence.
        let findings = vec![
            finding(EvidenceCategory::Signature, Severity::Critical, 1.0),
            finding(EvidenceCategory::Reputation, Severity::Critical, 1.0),
            finding(EvidenceCategory::Static, Severity::Critical, 1.0),
            finding(EvidenceCategory::Behavioral, Severity::Critical, 1.0),
        ];
        let a = assess("t1", &findings);
        assert!(a.score >= 75.0);
        assert!(a.confidence >= 0.85);
        assert_eq!(a.action, RecommendedAction::Quarantine);
    }

    #[test]
    fn high_score_low_confidence_autoblocks_instead() {
        // Two categories only: score can pass 50 but confidence stays < 0.85.
        let findings = vec![
            finding(EvidenceCategory::Static, Severity::Critical, 1.0),
            finding(EvidenceCategory::Reputation, Severity::Critical, 1.0),
        ];
        let a = assess("t1", &findings);
        assert!(a.score >= 50.0);
        assert!(a.confidence < 0.85);
        assert_eq!(a.action, RecommendedAction::AutoBlock);
    }

    #[test]
    fn mid_score_alerts() {
        let findings = vec![finding(EvidenceCategory::Static, Severity::Critical, 1.0)];
        let a = assess("t1", &findings);
        assert!(a.score >= 30.0 && a.score < 50.0);
        assert_eq!(a.action, RecommendedAction::Alert);
    }

    #[test]
    fn reasons_name_contributing_categories() {
        let findings = vec![
            finding(EvidenceCategory::Reputation, Severity::High, 0.9),
            finding(EvidenceCategory::Permission, Severity::Low, 0.5),
        ];
        let a = assess("t1", &findings);
        assert!(a.reasons.iter().any(|r| r.starts_with("reputation:")));
        assert!(a.reasons.iter().any(|r| r.starts_with("permission:")));
    }
}
