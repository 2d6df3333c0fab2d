//!
//! Pipeline orchestration: build tools, discover tests, capture and validate
//! each test, then extract the corpus.
//!
//! Stage order is `Building -> Discovering -> Capturing(i) -> Extracting -> Done`.
//! A failure while building, discovering or extracting is fatal and returned as
//! a [`PipelineError`]. A failure inside `Capturing(i)` is recorded against the
//! test and the run moves on to `i + 1`.

use std::fmt;
use std::path::Path;

use crate::capture::discover::parse_listing;
use crate::capture::harness::TestHarness;
use crate::capture::runner::{CaptureResult, CaptureRunner};
use crate::config::PipelineConfig;
use crate::error::{CaptureFailure, PipelineError};
use crate::extract::CorpusExtractor;
use crate::pipeline::summary::{FailureRecord, RunSummary};
use crate::tools::Toolchain;
use crate::types::TestCase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Building,
    Discovering,
    Capturing { index: usize, total: usize },
    Extracting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Building => write!(f, "building"),
            Stage::Discovering => write!(f, "discovering"),
            Stage::Capturing { index, total } => write!(f, "capturing {}/{}", index + 1, total),
            Stage::Extracting => write!(f, "extracting"),
            Stage::Done => write!(f, "done"),
        }
    }
}

/// Mutable state of one run. Lives only for the duration of [`Pipeline::run`].
#[derive(Debug)]
pub struct PipelineRun {
    stage: Stage,
    /// Every stage entered, in order.
    history: Vec<Stage>,
    discovered: usize,
    captured: Vec<TestCase>,
    failures: Vec<(TestCase, CaptureFailure)>,
}

impl PipelineRun {
    fn new() -> Self {
        PipelineRun {
            stage: Stage::Building,
            history: vec![Stage::Building],
            discovered: 0,
            captured: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn enter(&mut self, stage: Stage) {
        match stage {
            Stage::Capturing { .. } => tracing::debug!(stage = %stage, "entering stage"),
            _ => tracing::info!(stage = %stage, "entering stage"),
        }
        self.stage = stage;
        self.history.push(stage);
    }

    fn record(&mut self, test: &TestCase, result: CaptureResult) {
        match result {
            Ok(_) => self.captured.push(test.clone()),
            Err(failure) => {
                tracing::warn!(test = %test.raw_identifier, reason = %failure, "no trace captured");
                self.failures.push((test.clone(), failure));
            }
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    pub fn failures(&self) -> &[(TestCase, CaptureFailure)] {
        &self.failures
    }

    fn summary(&self, config: &PipelineConfig, corpus_entries: usize) -> RunSummary {
        RunSummary {
            discovered: self.discovered,
            captured: self.captured.len(),
            failures: self
                .failures
                .iter()
                .map(|(test, reason)| FailureRecord {
                    test: test.raw_identifier.clone(),
                    sanitized: test.sanitized_identifier.clone(),
                    reason: reason.clone(),
                })
                .collect(),
            corpus_entries,
            raw_dir: config.raw_dir(),
            extracted_dir: config.extracted_dir(),
        }
    }
}

/// The corpus generation pipeline, generic over how tests are run and how
/// the validator/extractor tools are obtained.
pub struct Pipeline<H: TestHarness, T: Toolchain> {
    config: PipelineConfig,
    harness: H,
    toolchain: T,
}

impl<H: TestHarness, T: Toolchain> Pipeline<H, T> {
    pub fn new(config: PipelineConfig, harness: H, toolchain: T) -> Self {
        Pipeline { config, harness, toolchain }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn harness(&self) -> &H {
        &self.harness
    }

    /// Runs every stage and writes `summary.json` under the corpus root.
    pub fn run(&self) -> Result<RunSummary, PipelineError> {
        let (summary, run) = self.run_stages()?;
        summary.write_json(&self.config.summary_path())?;
        tracing::info!(
            discovered = summary.discovered,
            captured = summary.captured,
            failed = summary.failures.len(),
            entries = summary.corpus_entries,
            corpus = %summary.extracted_dir.display(),
            stages = run.history().len(),
            "corpus generation finished"
        );
        Ok(summary)
    }

    /// Runs every stage without writing the summary, returning the run state as well.
    pub(crate) fn run_stages(&self) -> Result<(RunSummary, PipelineRun), PipelineError> {
        self.config.validate()?;
        let mut run = PipelineRun::new();
        tracing::info!(stage = %run.stage(), "entering stage");

        let (validator, extractor) = self.toolchain.build().map_err(|e| fatal(&run, e))?;

        run.enter(Stage::Discovering);
        let listing = self.harness.list_tests().map_err(|e| fatal(&run, e))?;
        let tests = parse_listing(&listing);
        run.discovered = tests.len();
        tracing::info!(tests = tests.len(), "discovered leaf tests");

        let raw_dir = self.config.raw_dir();
        create_dir(&raw_dir).map_err(|e| fatal(&run, e))?;

        if tests.is_empty() {
            tracing::warn!("no tests discovered, skipping capture");
        } else {
            let runner = CaptureRunner::new(&self.harness, &validator, &raw_dir)
                .with_timeout(self.config.test_timeout());
            self.capture(&mut run, &runner, &tests);
        }

        run.enter(Stage::Extracting);
        let manifest = extractor
            .extract(&raw_dir, &self.config.extracted_dir())
            .map_err(|e| fatal(&run, e))?;

        run.enter(Stage::Done);
        let summary = run.summary(&self.config, manifest.entries.len());
        Ok((summary, run))
    }

    fn capture<V: crate::validate::TraceValidator>(
        &self,
        run: &mut PipelineRun,
        runner: &CaptureRunner<'_, H, V>,
        tests: &[TestCase],
    ) {
        let total = tests.len();
        if self.config.jobs <= 1 {
            for (index, test) in tests.iter().enumerate() {
                run.enter(Stage::Capturing { index, total });
                let result = runner.capture(test);
                run.record(test, result);
            }
            return;
        }

        // Workers finish out of order, so the parallel pass is one stage.
        // Per-test completion is logged by the runner as it happens.
        run.enter(Stage::Capturing { index: 0, total });
        tracing::info!(jobs = self.config.jobs, tests = total, "capturing in parallel");
        let results = runner.capture_parallel(tests, self.config.jobs);
        for (test, result) in tests.iter().zip(results) {
            run.record(test, result);
        }
    }
}

fn fatal(run: &PipelineRun, err: PipelineError) -> PipelineError {
    tracing::error!(stage = %run.stage(), error = %err, "fatal pipeline failure");
    err
}

fn create_dir(path: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(path).map_err(|e| PipelineError::io(path, e))
}
