/// Run reports and the step driver
///
/// A sequencer run is an ordered list of named, fallible steps evaluated
/// with short-circuit semantics: the first failure stops forward progress,
/// later steps are never attempted, and the workspace-removal finalizer
/// still runs. [`StepLog`] implements that contract and records one
/// [`StepOutcome`] per step; the sequencers fold it into a [`RunReport`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::StepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Backup,
    Restore,
    Upgrade,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Backup => "Backup",
            OperationKind::Restore => "Restore",
            OperationKind::Upgrade => "Upgrade",
        }
    }
}

/// One named pipeline step's result.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub name: &'static str,
    pub succeeded: bool,
    pub detail: Option<String>,
}

/// Structured result of one sequencer run. Built once at the end of the
/// run and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub instance: String,
    pub kind: OperationKind,
    pub succeeded: bool,
    pub artifact_path: Option<PathBuf>,
    pub artifact_size_mb: Option<f64>,
    pub steps: Vec<StepOutcome>,
}

impl RunReport {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.succeeded)
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name).collect()
    }
}

/// Cooperative cancellation flag, set from the Ctrl-C handler and checked
/// between steps. Never interrupts a step already in flight: aborting a
/// running database dump mid-way is unsafe.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Marker returned once a step has failed and been recorded; callers bubble
/// it with `?` to skip the remaining steps.
pub struct Aborted;

/// Ordered step recorder with short-circuit evaluation.
pub struct StepLog {
    cancel: CancelFlag,
    steps: Vec<StepOutcome>,
}

impl StepLog {
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            cancel,
            steps: Vec::new(),
        }
    }

    fn cancelled(&mut self, name: &'static str) -> bool {
        if self.cancel.is_cancelled() {
            self.steps.push(StepOutcome {
                name,
                succeeded: false,
                detail: Some("cancelled before step started".to_string()),
            });
            return true;
        }
        false
    }

    fn record<T>(&mut self, name: &'static str, result: Result<T, StepError>) -> Result<T, Aborted> {
        match result {
            Ok(value) => {
                self.steps.push(StepOutcome {
                    name,
                    succeeded: true,
                    detail: None,
                });
                Ok(value)
            }
            Err(err) => {
                self.steps.push(StepOutcome {
                    name,
                    succeeded: false,
                    detail: Some(err.to_string()),
                });
                Err(Aborted)
            }
        }
    }

    /// Run a synchronous step.
    pub fn check<T>(
        &mut self,
        name: &'static str,
        f: impl FnOnce() -> Result<T, StepError>,
    ) -> Result<T, Aborted> {
        if self.cancelled(name) {
            return Err(Aborted);
        }
        self.record(name, f())
    }

    /// Run an asynchronous step. The future is not polled when the run was
    /// cancelled beforehand, so a cancelled step is genuinely not attempted.
    pub async fn run<T>(
        &mut self,
        name: &'static str,
        fut: impl Future<Output = Result<T, StepError>>,
    ) -> Result<T, Aborted> {
        if self.cancelled(name) {
            return Err(Aborted);
        }
        let result = fut.await;
        self.record(name, result)
    }

    /// Record the finalizer. Runs regardless of earlier failures and of
    /// cancellation; its own failure is recorded but aborts nothing.
    pub fn finalize(&mut self, name: &'static str, result: Result<(), StepError>) {
        let _ = self.record(name, result);
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.succeeded)
    }

    pub fn into_steps(self) -> Vec<StepOutcome> {
        self.steps
    }
}
