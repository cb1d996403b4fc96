//! Instance dispatch
//!
//! Gantree: L4_Engine → ExecutionDispatcher
//!
//! Walks the term stream, claims each distinct instance in the shared
//! [`InstanceCache`], and sends the claimed instances to the executor in
//! batches on a rayon pool. The deadline and cancel flag are checked before
//! every wave of batches.

use crate::cache::InstanceCache;
use log::{debug, warn};
use qknit_backend::{validate_output, Executor, ShotBudget};
use qknit_core::{Distribution, KnitError, KnitResult};
use qknit_cutting::{SubcircuitInstance, TermGenerator};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Run Control
// ============================================================================

/// Cloneable cancel switch for a running pipeline
/// Gantree: CancelHandle // 취소 핸들
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create an untriggered handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the request
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Deadline plus cancel flag for one run
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    deadline: Option<Instant>,
    cancel: CancelHandle,
}

impl RunControl {
    /// Control with an optional timeout from now
    pub fn new(timeout: Option<Duration>, cancel: CancelHandle) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            cancel,
        }
    }

    /// Fail with `Cancelled` if cancellation was requested
    pub fn check_cancelled(&self) -> KnitResult<()> {
        if self.cancel.is_cancelled() {
            Err(KnitError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Check if the deadline has passed
    pub fn expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Dispatch counters and failures
/// Gantree: DispatchReport // 실행 보고
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Instance lookups made by the term walk
    pub requested: u64,
    /// Instances this dispatcher sent to the executor
    pub executed: usize,
    /// Lookups served by an instance already claimed
    pub reused: u64,
    /// Instances the executor failed or returned invalid output for
    pub failed: usize,
    /// Claimed instances never sent (deadline)
    pub not_attempted: usize,
}

impl DispatchReport {
    /// Check if every claimed instance produced a distribution
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.not_attempted == 0
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Sends subcircuit instances to an executor, at most once per key
/// Gantree: ExecutionDispatcher // 실행 분배기
pub struct ExecutionDispatcher<'a> {
    executor: &'a dyn Executor,
    budget: ShotBudget,
    batch_size: usize,
    threads: usize,
}

impl<'a> ExecutionDispatcher<'a> {
    /// Create a dispatcher
    pub fn new(executor: &'a dyn Executor, budget: ShotBudget) -> Self {
        Self {
            executor,
            budget,
            batch_size: qknit_core::execution::DEFAULT_BATCH_SIZE,
            threads: 1,
        }
    }

    /// Set instances per executor batch
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set pool size
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Claim and execute every instance the terms of `generator` need
    /// Gantree: dispatch(generator, cache, control) -> Result<DispatchReport> // 실행
    pub fn dispatch(
        &self,
        generator: &TermGenerator<'_>,
        cache: &InstanceCache,
        control: &RunControl,
    ) -> KnitResult<DispatchReport> {
        let mut report = DispatchReport::default();
        let mut claimed: Vec<SubcircuitInstance> = Vec::new();

        let mut terms = generator.clone();
        terms.reset();
        for term in terms {
            for key in generator.instance_keys(&term) {
                report.requested += 1;
                if cache.claim(&key)? {
                    match generator.build_instance(&key) {
                        Ok(instance) => claimed.push(instance),
                        Err(err) => {
                            cache.fulfil(&key, Err(err.clone()))?;
                            self.abandon_all(&claimed, cache, "dispatch aborted")?;
                            return Err(err);
                        }
                    }
                } else {
                    report.reused += 1;
                }
            }
        }
        debug!(
            "{}: {} instance lookups, {} distinct to execute, {} reused",
            self.executor.name(),
            report.requested,
            claimed.len(),
            report.reused
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|err| KnitError::InternalError(format!("thread pool: {}", err)))?;

        let batches: Vec<&[SubcircuitInstance]> = claimed.chunks(self.batch_size).collect();
        let mut next = 0;
        while next < batches.len() {
            if let Err(err) = control.check_cancelled() {
                self.abandon_all(&flatten(&batches[next..]), cache, "run cancelled")?;
                return Err(err);
            }
            if control.expired() {
                let rest = flatten(&batches[next..]);
                warn!(
                    "deadline passed with {} instances not dispatched",
                    rest.len()
                );
                report.not_attempted += rest.len();
                self.abandon_all(&rest, cache, "deadline exceeded before dispatch")?;
                break;
            }

            let wave = &batches[next..(next + self.threads).min(batches.len())];
            let results: Vec<Vec<KnitResult<Distribution>>> = pool.install(|| {
                wave.par_iter()
                    .map(|batch| {
                        let circuits: Vec<_> = batch.iter().map(|i| i.circuit.clone()).collect();
                        self.executor.execute_batch(&circuits, self.budget)
                    })
                    .collect()
            });

            for (batch, outcomes) in wave.iter().zip(results) {
                let mut outcomes = outcomes.into_iter();
                for instance in batch.iter() {
                    let outcome = outcomes.next().unwrap_or_else(|| {
                        Err(KnitError::BackendError("executor returned no result".to_string()))
                    });
                    let checked = outcome
                        .and_then(|dist| validate_output(&instance.circuit, &dist).map(|_| dist))
                        .map_err(|err| KnitError::InstanceExecution {
                            instance: instance.key.to_string(),
                            attempted: true,
                            reason: err.to_string(),
                        });
                    report.executed += 1;
                    if let Err(err) = &checked {
                        warn!("{}", err);
                        report.failed += 1;
                    }
                    cache.fulfil(&instance.key, checked)?;
                }
            }
            next += wave.len();
        }

        debug!(
            "{}: executed {} instances ({} failed, {} not attempted)",
            self.executor.name(),
            report.executed,
            report.failed,
            report.not_attempted
        );
        Ok(report)
    }

    fn abandon_all(
        &self,
        instances: &[SubcircuitInstance],
        cache: &InstanceCache,
        reason: &str,
    ) -> KnitResult<()> {
        for instance in instances {
            cache.abandon(&instance.key, reason)?;
        }
        Ok(())
    }
}

fn flatten(batches: &[&[SubcircuitInstance]]) -> Vec<SubcircuitInstance> {
    batches.iter().flat_map(|b| b.iter().cloned()).collect()
}

// ============================================================================
// Tests
// ============================================================================
