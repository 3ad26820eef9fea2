//! Core scan / lookup data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

// ============================================================================
// SCAN TARGETS
// ============================================================================

/// What kind of object a target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    App,
    File,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::App => "app",
            TargetKind::File => "file",
        }
    }
}

/// One item to scan, produced by the external inventory collector.
/// Immutable; the orchestrator only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTarget {
    pub id: String,
    /// Content hash (hex sha256) identifying the target's bytes.
    pub content_hash: String,
    pub kind: TargetKind,
    /// Cheap pre-signals from the collector (e.g. "sideloaded", "unsigned").
    #[serde(default)]
    pub risk_hints: Vec<String>,
}

impl ScanTarget {
    pub fn new(id: impl Into<String>, content_hash: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            id: id.into(),
            content_hash: content_hash.into(),
            kind,
            risk_hints: Vec::new(),
        }
    }

    /// Canonical hex digest of raw target bytes, as used for every
    /// lookup key in the pipeline.
    pub fn hash_bytes(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }
}

// ============================================================================
// FINDINGS
// ============================================================================

/// Severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Scoring weight of a finding at this severity.
    pub fn weight(&self) -> f32 {
        match self {
            Severity::Info => 0.1,
            Severity::Low => 0.3,
            Severity::Medium => 0.55,
            Severity::High => 0.8,
            Severity::Critical => 1.0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evidence category a finding contributes to. Each category has its own
/// score cap in the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvidenceCategory {
    /// Static / heuristic analysis of the target's content.
    Static,
    /// Exact signature or hash match against a known-bad set.
    Signature,
    /// Observed runtime behavior.
    Behavioral,
    /// Reputation from the lookup subsystem or an external feed.
    Reputation,
    /// Requested permissions / suspicious capability patterns.
    Permission,
}

impl EvidenceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceCategory::Static => "static",
            EvidenceCategory::Signature => "signature",
            EvidenceCategory::Behavioral => "behavioral",
            EvidenceCategory::Reputation => "reputation",
            EvidenceCategory::Permission => "permission",
        }
    }

    pub const ALL: [EvidenceCategory; 5] = [
        EvidenceCategory::Static,
        EvidenceCategory::Signature,
        EvidenceCategory::Behavioral,
        EvidenceCategory::Reputation,
        EvidenceCategory::Permission,
    ];
}

/// Recommended / decided response action, ordered by aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecommendedAction {
    Log,
    Alert,
    AutoBlock,
    Quarantine,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Log => "log",
            RecommendedAction::Alert => "alert",
            RecommendedAction::AutoBlock => "auto_block",
            RecommendedAction::Quarantine => "quarantine",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, RecommendedAction::AutoBlock | RecommendedAction::Quarantine)
    }
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One piece of evidence produced by a detector for one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub detector_id: String,
    pub category: EvidenceCategory,
    pub severity: Severity,
    /// Detector confidence in this finding, clamped to [0, 1].
    pub confidence: f32,
    /// Ordered evidence strings ("matched rule X", "contacted 1.2.3.4").
    pub indicators: Vec<String>,
    pub recommended_action: RecommendedAction,
}

impl Finding {
    pub fn new(
        detector_id: impl Into<String>,
        category: EvidenceCategory,
        severity: Severity,
        confidence: f32,
    ) -> Self {
        Self {
            detector_id: detector_id.into(),
            category,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            indicators: Vec::new(),
            recommended_action: RecommendedAction::Log,
        }
    }

    pub fn with_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.indicators.push(indicator.into());
        self
    }

    pub fn with_action(mut self, action: RecommendedAction) -> Self {
        self.recommended_action = action;
        self
    }

    /// Exact signature / hash matches short-circuit the early-exit policy
    /// and force-set severity to critical downstream.
    pub fn is_signature_match(&self) -> bool {
        self.category == EvidenceCategory::Signature
    }
}

// ============================================================================
// RISK ASSESSMENT
// ============================================================================

/// Final verdict for one target. Produced once by the decision engine,
/// immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub target_id: String,
    /// Aggregate risk score in [0, 100].
    pub score: f32,
    pub severity: Severity,
    /// Confidence in the verdict, in [0, 1].
    pub confidence: f32,
    pub action: RecommendedAction,
    /// Human-readable contributions, in scoring order.
    pub reasons: Vec<String>,
}

// ============================================================================
// LOOKUP ENTRIES
// ============================================================================

/// Classification outcome for a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Clean,
    Suspicious,
    Malicious,
    Unknown,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Clean => "clean",
            Verdict::Suspicious => "suspicious",
            Verdict::Malicious => "malicious",
            Verdict::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "clean" => Verdict::Clean,
            "suspicious" => Verdict::Suspicious,
            "malicious" => Verdict::Malicious,
            _ => Verdict::Unknown,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which layer of the lookup chain resolved a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceLayer {
    Bloom,
    L1,
    L2,
    L3,
    Remote,
    LocalDb,
    /// Every layer missed; synthetic `unknown` answer.
    Miss,
}

impl SourceLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceLayer::Bloom => "bloom",
            SourceLayer::L1 => "l1",
            SourceLayer::L2 => "l2",
            SourceLayer::L3 => "l3",
            SourceLayer::Remote => "remote",
            SourceLayer::LocalDb => "local_db",
            SourceLayer::Miss => "miss",
        }
    }
}

/// One resolved lookup, as stored in (and served from) the cache layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupEntry {
    pub key: String,
    pub verdict: Verdict,
    pub confidence: f32,
    /// Time-to-live from `cached_at`.
    pub ttl: Duration,
    pub cached_at: DateTime<Utc>,
    pub source: SourceLayer,
}

impl LookupEntry {
    pub fn new(key: impl Into<String>, verdict: Verdict, confidence: f32, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            verdict,
            confidence: confidence.clamp(0.0, 1.0),
            ttl,
            cached_at: Utc::now(),
            source: SourceLayer::Remote,
        }
    }

    pub fn from_layer(mut self, source: SourceLayer) -> Self {
        self.source = source;
        self
    }

    pub fn is_expired(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age.num_milliseconds() >= self.ttl.as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finding_confidence_is_clamped() {
        let f = Finding::new("t", EvidenceCategory::Static, Severity::Low, 1.7);
        assert_eq!(f.confidence, 1.0);
        let f = Finding::new("t", EvidenceCategory::Static, Severity::Low, -0.3);
        assert_eq!(f.confidence, 0.0);
    }

    #[test]
    fn severity_ordering_matches_weight() {
        let order = [
            Severity::Info,
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ];
        for pair in order.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].weight() < pair[1].weight());
        }
    }

    #[test]
    fn lookup_entry_expiry() {
        let mut e = LookupEntry::new("k", Verdict::Clean, 0.9, Duration::from_secs(60));
        assert!(!e.is_expired());
        e.cached_at = Utc::now() - chrono::Duration::seconds(61);
        assert!(e.is_expired());
    }

    #[test]
    fn hash_bytes_yields_hex_sha256() {
        let digest = ScanTarget::hash_bytes(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn verdict_round_trips_through_str() {
        for v in [Verdict::Clean, Verdict::Suspicious, Verdict::Malicious, Verdict::Unknown] {
            assert_eq!(Verdict::parse(v.as_str()), v);
        }
        assert_eq!(Verdict::parse("garbage"), Verdict::Unknown);
    }
}
