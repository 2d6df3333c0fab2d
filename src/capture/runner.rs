//! Per-test capture: run one test, keep its trace only if it validates.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rayon::prelude::*;

use crate::capture::harness::TestHarness;
use crate::error::CaptureFailure;
use crate::types::{TestCase, TraceFile};
use crate::validate::TraceValidator;

/// Outcome of capturing one test: the validated trace, or why there is none.
pub type CaptureResult = Result<TraceFile, CaptureFailure>;

pub struct CaptureRunner<'a, H: TestHarness, V: TraceValidator> {
    harness: &'a H,
    validator: &'a V,
    raw_dir: PathBuf,
    timeout: Option<Duration>,
}

impl<'a, H: TestHarness, V: TraceValidator> CaptureRunner<'a, H, V> {
    pub fn new(harness: &'a H, validator: &'a V, raw_dir: impl Into<PathBuf>) -> Self {
        CaptureRunner {
            harness,
            validator,
            raw_dir: raw_dir.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Captures and validates a single test.
    ///
    /// On every failure path the test's trace file is removed, so the raw
    /// directory only ever holds validated traces.
    pub fn capture(&self, test: &TestCase) -> CaptureResult {
        let trace = TraceFile::for_test(&self.raw_dir, test);
        // A leftover from an earlier run would otherwise be mistaken for output.
        trace.discard().map_err(|e| CaptureFailure::Io(e.to_string()))?;

        if let Err(failure) = self.harness.run_test(test, &trace.path, self.timeout) {
            discard_quietly(&trace);
            return Err(failure);
        }
        if !trace.exists() {
            return Err(CaptureFailure::NoTrace);
        }

        let outcome = self.validator.validate(&trace);
        if outcome.is_well_formed {
            tracing::debug!(test = %test.raw_identifier, path = %trace.path.display(), "trace accepted");
            Ok(trace)
        } else {
            discard_quietly(&trace);
            Err(CaptureFailure::Rejected(
                outcome.reason.unwrap_or_else(|| "malformed trace".to_owned()),
            ))
        }
    }

    /// Captures `tests` on `jobs` workers. Results come back in input order.
    ///
    /// Each capture owns its subprocess and trace path, so workers share no
    /// mutable state.
    pub fn capture_parallel(&self, tests: &[TestCase], jobs: usize) -> Vec<CaptureResult> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .thread_name(|i| format!("capture-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "capture pool unavailable, capturing sequentially");
                return tests.iter().map(|t| self.capture(t)).collect();
            }
        };
        let total = tests.len();
        let done = AtomicUsize::new(0);
        pool.install(|| {
            tests
                .par_iter()
                .map(|test| {
                    let result = self.capture(test);
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::info!(
                        test = %test.raw_identifier,
                        captured = result.is_ok(),
                        "capture {finished}/{total} finished"
                    );
                    result
                })
                .collect()
        })
    }
}

fn discard_quietly(trace: &TraceFile) {
    if let Err(e) = trace.discard() {
        tracing::warn!(path = %trace.path.display(), error = %e, "could not remove trace");
    }
}
