//! Detector Registry
//!
//! Holds the registered detector set and fixes the per-target execution
//! order: all cheap detectors (by priority), then all expensive ones.
//! The early-exit decision is only well-defined because this order is.

use std::sync::Arc;

use super::{Detector, DetectorCost};

#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, detector: Arc<dyn Detector>) -> &mut Self {
        log::debug!(
            "registered detector '{}' ({}, priority {})",
            detector.id(),
            detector.cost().as_str(),
            detector.priority()
        );
        self.detectors.push(detector);
        self
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Cheap detectors in priority order.
    pub fn cheap(&self) -> Vec<Arc<dyn Detector>> {
        self.of_cost(DetectorCost::Cheap)
    }

    /// Expensive detectors in priority order.
    pub fn expensive(&self) -> Vec<Arc<dyn Detector>> {
        self.of_cost(DetectorCost::Expensive)
    }

    fn of_cost(&self, cost: DetectorCost) -> Vec<Arc<dyn Detector>> {
        let mut out: Vec<Arc<dyn Detector>> = self
            .detectors
            .iter()
            .filter(|d| d.cost() == cost)
            .cloned()
            .collect();
        out.sort_by_key(|d| d.priority());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanResult;
    use crate::model::{Finding, ScanTarget};
    use async_trait::async_trait;

    struct Fixed {
        id: String,
        cost: DetectorCost,
        priority: u8,
    }

    #[async_trait]
    impl Detector for Fixed {
        fn id(&self) -> &str {
            &self.id
        }
        fn cost(&self) -> DetectorCost {
            self.cost
        }
        fn priority(&self) -> u8 {
            self.priority
        }
        async fn detect(&self, _target: &ScanTarget) -> ScanResult<Vec<Finding>> {
            Ok(vec![])
        }
    }

    fn det(id: &str, cost: DetectorCost, priority: u8) -> Arc<dyn Detector> {
        Arc::new(Fixed {
            id: id.to_string(),
            cost,
            priority,
        })
    }

    #[test]
    fn splits_by_cost_and_sorts_by_priority() {
        let mut reg = DetectorRegistry::new();
        reg.register(det("deep-ml", DetectorCost::Expensive, 10))
            .register(det("sig", DetectorCost::Cheap, 1))
            .register(det("heur", DetectorCost::Cheap, 5))
            .register(det("hints", DetectorCost::Cheap, 0));

        let cheap: Vec<String> = reg.cheap().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(cheap, vec!["hints", "sig", "heur"]);

        let expensive: Vec<String> = reg.expensive().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(expensive, vec!["deep-ml"]);
        assert_eq!(reg.len(), 4);
    }
}
