//! Scan scheduling
//!
//! `run_scan` drives one scan session: a bounded pool of target workers,
//! cheap-first detector stages with an interim assessment between them, and
//! deterministic drain-on-cancel. Target-to-target ordering is unspecified;
//! within one target the registry's priority order is fixed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::ScanOptions;
use crate::decision::{assess_with_policy, DecisionPolicy};
use crate::detector::{Detector, DetectorRegistry};
use crate::error::ScanError;
use crate::model::{Finding, ScanTarget};

use super::cancel::CancellationToken;
use super::types::{DetectorFailure, ScanStatus, TargetScanResult};

/// How often the driver re-checks the cancellation flag while waiting for
/// worker results.
const CANCEL_POLL_MS: u64 = 20;

pub struct ScanOrchestrator {
    registry: Arc<DetectorRegistry>,
    policy: DecisionPolicy,
    options: ScanOptions,
    /// Worker-pool budget; can be shared with the lookup subsystem so the
    /// whole pipeline draws from one global concurrency budget.
    permits: Arc<Semaphore>,
}

impl ScanOrchestrator {
    pub fn new(registry: Arc<DetectorRegistry>, options: ScanOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.batch_size.max(1)));
        Self::with_budget(registry, options, permits)
    }

    pub fn with_budget(
        registry: Arc<DetectorRegistry>,
        options: ScanOptions,
        permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            registry,
            policy: DecisionPolicy::default(),
            options,
            permits,
        }
    }

    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn concurrency_budget(&self) -> Arc<Semaphore> {
        Arc::clone(&self.permits)
    }

    /// Start a scan. Returns a finite, non-restartable stream of per-target
    /// results; completion order across targets is unspecified.
    pub fn run_scan(
        &self,
        targets: Vec<ScanTarget>,
        token: CancellationToken,
    ) -> mpsc::Receiver<TargetScanResult> {
        // Capacity for every result so late sends never block the drain.
        let (tx, rx) = mpsc::channel(targets.len().max(1));

        let scan_id = Uuid::new_v4();
        log::info!(
            "scan {scan_id}: {} targets, pool size {}, deep-scan threshold {}",
            targets.len(),
            self.options.batch_size,
            self.options.deep_scan_threshold
        );

        let registry = Arc::clone(&self.registry);
        let policy = self.policy.clone();
        let options = self.options.clone();
        let permits = Arc::clone(&self.permits);

        tokio::spawn(drive_scan(
            scan_id, targets, registry, policy, options, permits, token, tx,
        ));
        rx
    }

    /// Convenience wrapper that drains the stream. Always terminates: every
    /// target yields exactly one result, cancelled or not.
    pub async fn run_scan_collect(
        &self,
        targets: Vec<ScanTarget>,
        token: CancellationToken,
    ) -> Vec<TargetScanResult> {
        let mut rx = self.run_scan(targets, token);
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_scan(
    scan_id: Uuid,
    targets: Vec<ScanTarget>,
    registry: Arc<DetectorRegistry>,
    policy: DecisionPolicy,
    options: ScanOptions,
    permits: Arc<Semaphore>,
    token: CancellationToken,
    tx: mpsc::Sender<TargetScanResult>,
) {
    let started = Instant::now();
    let mut pending: HashSet<String> = targets.iter().map(|t| t.id.clone()).collect();
    let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    // Task id -> target id, so a panicked worker can still be attributed
    // to its target and reported instead of vanishing from the stream.
    let mut task_targets: HashMap<tokio::task::Id, String> = HashMap::new();

    let mut workers = JoinSet::new();
    for target in targets {
        let target_id = target.id.clone();
        let handle = workers.spawn(scan_target_worker(
            target,
            Arc::clone(&registry),
            policy.clone(),
            options.clone(),
            Arc::clone(&permits),
            token.clone(),
            Arc::clone(&in_flight),
        ));
        task_targets.insert(handle.id(), target_id);
    }

    // Normal phase: forward results, watching the cancellation flag.
    let mut completed = 0usize;
    while !token.is_cancelled() && !workers.is_empty() {
        let poll = tokio::time::timeout(
            std::time::Duration::from_millis(CANCEL_POLL_MS),
            workers.join_next_with_id(),
        );
        match poll.await {
            Ok(Some(Ok((task_id, result)))) => {
                task_targets.remove(&task_id);
                pending.remove(&result.target_id);
                if result.status == ScanStatus::Completed {
                    completed += 1;
                }
                if tx.send(result).await.is_err() {
                    // Receiver gone; nothing left to report to.
                    workers.abort_all();
                    return;
                }
            }
            Ok(Some(Err(e))) => {
                log::error!("scan {scan_id}: worker panicked: {e}");
                if let Some(result) = panicked_worker_result(&mut task_targets, &e) {
                    pending.remove(&result.target_id);
                    if tx.send(result).await.is_err() {
                        workers.abort_all();
                        return;
                    }
                }
            }
            Ok(None) => break,
            Err(_) => {} // poll tick, re-check the flag
        }
    }

    // Drain phase after cancellation: in-flight workers get the grace
    // period, the rest are aborted and reported explicitly.
    if token.is_cancelled() && !workers.is_empty() {
        log::info!(
            "scan {scan_id}: cancelled, draining {} workers for {:?}",
            workers.len(),
            options.cancel_grace
        );
        let deadline = Instant::now() + options.cancel_grace;
        while !workers.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, workers.join_next_with_id()).await {
                Ok(Some(Ok((task_id, result)))) => {
                    task_targets.remove(&task_id);
                    pending.remove(&result.target_id);
                    if result.status == ScanStatus::Completed {
                        completed += 1;
                    }
                    let _ = tx.send(result).await;
                }
                Ok(Some(Err(e))) => {
                    if let Some(result) = panicked_worker_result(&mut task_targets, &e) {
                        pending.remove(&result.target_id);
                        let _ = tx.send(result).await;
                    }
                }
                Ok(None) => break,
                Err(_) => break, // grace expired
            }
        }

        workers.abort_all();
        while let Some(joined) = workers.join_next_with_id().await {
            // Workers that finished before the abort still surface here.
            if let Ok((task_id, result)) = joined {
                task_targets.remove(&task_id);
                pending.remove(&result.target_id);
                let _ = tx.send(result).await;
            }
        }

        // Whatever is still pending was either abandoned mid-flight
        // (incomplete) or never started (cancelled). Nothing is dropped
        // silently.
        let still_running = in_flight.lock().clone();
        for target_id in pending.drain() {
            let result = if still_running.contains(&target_id) {
                TargetScanResult::incomplete(target_id)
            } else {
                TargetScanResult::cancelled(target_id)
            };
            let _ = tx.send(result).await;
        }
    }

    log::info!(
        "scan {scan_id}: finished in {:?}, {completed} targets completed",
        started.elapsed()
    );
}

/// One target from permit acquisition to final result.
async fn scan_target_worker(
    target: ScanTarget,
    registry: Arc<DetectorRegistry>,
    policy: DecisionPolicy,
    options: ScanOptions,
    permits: Arc<Semaphore>,
    token: CancellationToken,
    in_flight: Arc<Mutex<HashSet<String>>>,
) -> TargetScanResult {
    let _permit = permits.acquire_owned().await.ok();

    // Suspension point: before starting a new target.
    if token.is_cancelled() {
        return TargetScanResult::cancelled(target.id);
    }

    let target_id = target.id.clone();
    in_flight.lock().insert(target_id.clone());

    let outcome = tokio::time::timeout(
        options.target_timeout,
        scan_target(&target, &registry, &policy, &options, &token),
    )
    .await;

    let result = match outcome {
        Ok(result) => result,
        Err(_) => {
            log::warn!("target {target_id}: exceeded {:?}", options.target_timeout);
            let mut result = TargetScanResult::incomplete(&target_id);
            result.errors.push(DetectorFailure {
                detector_id: "<target>".to_string(),
                error: ScanError::timeout(format!("target {target_id}"), options.target_timeout),
            });
            result
        }
    };

    in_flight.lock().remove(&target_id);
    result
}

/// The staged detector pipeline for one target: cheap detectors, interim
/// assessment, conditional escalation to the expensive stage.
async fn scan_target(
    target: &ScanTarget,
    registry: &DetectorRegistry,
    policy: &DecisionPolicy,
    options: &ScanOptions,
    token: &CancellationToken,
) -> TargetScanResult {
    let mut findings: Vec<Finding> = Vec::new();
    let mut errors: Vec<DetectorFailure> = Vec::new();

    for detector in registry.cheap() {
        // Suspension point: between detector stages.
        if token.is_cancelled() {
            return partial(target, findings, errors);
        }
        run_detector(&*detector, target, options, &mut findings, &mut errors).await;
    }

    let interim = assess_with_policy(&target.id, &findings, policy);

    // Exact signature matches escalate regardless of the threshold; the
    // early-exit policy only trades recall on heuristic borderline cases.
    let signature_hit = findings.iter().any(|f| f.is_signature_match());
    let escalate = signature_hit || interim.score >= options.deep_scan_threshold;

    let mut escalated = false;
    if escalate {
        for detector in registry.expensive() {
            if token.is_cancelled() {
                return partial(target, findings, errors);
            }
            escalated = true;
            run_detector(&*detector, target, options, &mut findings, &mut errors).await;
        }
    }

    if token.is_cancelled() {
        return partial(target, findings, errors);
    }

    let assessment = if escalated {
        assess_with_policy(&target.id, &findings, policy)
    } else {
        interim
    };

    log::debug!(
        "target {}: score {:.1} severity {} action {} ({} findings, {} errors{})",
        target.id,
        assessment.score,
        assessment.severity,
        assessment.action,
        findings.len(),
        errors.len(),
        if escalated { ", escalated" } else { "" }
    );

    TargetScanResult {
        target_id: target.id.clone(),
        status: ScanStatus::Completed,
        assessment: Some(assessment),
        findings,
        errors,
        escalated,
    }
}

async fn run_detector(
    detector: &dyn Detector,
    target: &ScanTarget,
    options: &ScanOptions,
    findings: &mut Vec<Finding>,
    errors: &mut Vec<DetectorFailure>,
) {
    let outcome = tokio::time::timeout(options.detector_timeout, detector.detect(target)).await;
    match outcome {
        Ok(Ok(mut produced)) => findings.append(&mut produced),
        Ok(Err(error)) => {
            log::warn!(
                "detector '{}' failed on target {}: {error}",
                detector.id(),
                target.id
            );
            errors.push(DetectorFailure {
                detector_id: detector.id().to_string(),
                error,
            });
        }
        Err(_) => {
            log::warn!(
                "detector '{}' timed out on target {} after {:?}",
                detector.id(),
                target.id,
                options.detector_timeout
            );
            errors.push(DetectorFailure {
                detector_id: detector.id().to_string(),
                error: ScanError::timeout(
                    format!("detector '{}'", detector.id()),
                    options.detector_timeout,
                ),
            });
        }
    }
}

/// A worker task died (detector panic) instead of returning a result.
/// Synthesize an incomplete result for its target so the stream still
/// carries one entry per target.
fn panicked_worker_result(
    task_targets: &mut HashMap<tokio::task::Id, String>,
    error: &tokio::task::JoinError,
) -> Option<TargetScanResult> {
    if !error.is_panic() {
        return None;
    }
    let target_id = task_targets.remove(&error.id())?;
    let mut result = TargetScanResult::incomplete(&target_id);
    result.errors.push(DetectorFailure {
        detector_id: "<worker>".to_string(),
        error: ScanError::detector("<worker>", format!("scan worker panicked: {error}")),
    });
    Some(result)
}

/// Cancellation hit mid-target: report what we have, marked incomplete.
fn partial(
    target: &ScanTarget,
    findings: Vec<Finding>,
    mut errors: Vec<DetectorFailure>,
) -> TargetScanResult {
    errors.push(DetectorFailure {
        detector_id: "<scan>".to_string(),
        error: ScanError::Cancelled,
    });
    TargetScanResult {
        target_id: target.id.clone(),
        status: ScanStatus::Incomplete,
        assessment: None,
        findings,
        errors,
        escalated: false,
    }
}

// ============================================================================
// TESTS
// ============================================================================
