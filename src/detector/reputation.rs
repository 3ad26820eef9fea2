//! Reputation Detector
//!
//! The built-in bridge between the scan pipeline and the Fast Lookup
//! Subsystem: resolves the target's content hash and emits a reputation
//! finding when the verdict is adverse. Clean and unknown verdicts produce
//! no findings; absence of reputation is not evidence.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ScanResult;
use crate::lookup::LookupService;
use crate::model::{EvidenceCategory, Finding, RecommendedAction, ScanTarget, Severity, Verdict};

use super::{Detector, DetectorCost};

pub const REPUTATION_DETECTOR_ID: &str = "hash-reputation";

pub struct ReputationDetector {
    lookup: Arc<LookupService>,
}

impl ReputationDetector {
    pub fn new(lookup: Arc<LookupService>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl Detector for ReputationDetector {
    fn id(&self) -> &str {
        REPUTATION_DETECTOR_ID
    }

    fn cost(&self) -> DetectorCost {
        // Cached lookups are well under the detector budget.
        DetectorCost::Cheap
    }

    fn priority(&self) -> u8 {
        10
    }

    async fn detect(&self, target: &ScanTarget) -> ScanResult<Vec<Finding>> {
        let entry = self.lookup.lookup(&target.content_hash).await;

        let finding = match entry.verdict {
            Verdict::Malicious => Finding::new(
                REPUTATION_DETECTOR_ID,
                EvidenceCategory::Reputation,
                Severity::Critical,
                entry.confidence,
            )
            .with_indicator(format!(
                "hash {} flagged malicious by {}",
                target.content_hash,
                entry.source.as_str()
            ))
            .with_action(RecommendedAction::AutoBlock),
            Verdict::Suspicious => Finding::new(
                REPUTATION_DETECTOR_ID,
                EvidenceCategory::Reputation,
                Severity::Medium,
                entry.confidence,
            )
            .with_indicator(format!(
                "hash {} has suspicious reputation ({})",
                target.content_hash,
                entry.source.as_str()
            ))
            .with_action(RecommendedAction::Alert),
            Verdict::Clean | Verdict::Unknown => return Ok(vec![]),
        };

        Ok(vec![finding])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupConfig;
    use crate::error::ScanError;
    use crate::lookup::remote::{HashLookupResponse, IocVerdict, RemoteLookup};
    use crate::lookup::store::KnownHash;
    use crate::model::TargetKind;

    /// Unreachable endpoint: forces resolution through the local DB.
    struct DownRemote;

    #[async_trait]
    impl RemoteLookup for DownRemote {
        async fn lookup_hash(&self, _hash: &str) -> ScanResult<HashLookupResponse> {
            Err(ScanError::Network("down".into()))
        }
        async fn lookup_iocs(&self, _iocs: &[String]) -> ScanResult<Vec<IocVerdict>> {
            Err(ScanError::Network("down".into()))
        }
    }

    fn service() -> Arc<LookupService> {
        LookupService::open(LookupConfig::in_memory(), Arc::new(DownRemote)).unwrap()
    }

    #[tokio::test]
    async fn malicious_hash_yields_critical_reputation_finding() {
        let lookup = service();
        lookup
            .local_db()
            .load_signatures(&[KnownHash {
                hash: "deadbeef".into(),
                verdict: Verdict::Malicious,
                confidence: 0.95,
            }])
            .unwrap();

        let detector = ReputationDetector::new(lookup);
        let target = ScanTarget::new("t1", "deadbeef", TargetKind::File);
        let findings = detector.detect(&target).await.unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, EvidenceCategory::Reputation);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn unknown_hash_yields_no_findings() {
        let detector = ReputationDetector::new(service());
        let target = ScanTarget::new("t1", "cafebabe", TargetKind::App);
        assert!(detector.detect(&target).await.unwrap().is_empty());
    }
}
