//! Test doubles and trace fixtures shared by unit and integration tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::capture::discover::LEAF_MARKER;
use crate::capture::harness::TestHarness;
use crate::error::{CaptureFailure, PipelineError};
use crate::trace::encode::RecordWriter;
use crate::trace::recorder::TraceRecorder;
use crate::types::TestCase;

/// Exit code the scripted harness reports for a crashing test.
pub const CRASH_EXIT_CODE: i32 = 101;

/// What a scripted test does when run.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Records one committed transaction whose context is the raw test name.
    RecordOwnName,
    /// Writes these bytes to the trace path and passes.
    Write(Vec<u8>),
    /// Writes these bytes, then fails.
    WriteThenCrash(Vec<u8>),
    /// Fails without writing anything.
    Crash,
    /// Passes without writing a trace.
    PassWithoutTrace,
    /// Reports a timeout.
    Hang,
}

/// In-memory [`TestHarness`] driven by a script instead of a real test suite.
#[derive(Debug, Default)]
pub struct ScriptedHarness {
    listing: Option<String>,
    behaviors: HashMap<String, Behavior>,
    runs: Mutex<Vec<(String, PathBuf)>>,
}

impl ScriptedHarness {
    /// A harness whose listing contains `tests` in order, each with its behavior.
    pub fn new<'a>(tests: impl IntoIterator<Item = (&'a str, Behavior)>) -> Self {
        let mut names = Vec::new();
        let mut behaviors = HashMap::new();
        for (name, behavior) in tests {
            names.push(name);
            behaviors.insert(name.to_owned(), behavior);
        }
        ScriptedHarness {
            listing: Some(listing(&names)),
            behaviors,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// A harness whose listing step fails.
    pub fn failing_discovery() -> Self {
        ScriptedHarness { listing: None, ..Default::default() }
    }

    /// Replaces the listing text verbatim.
    pub fn with_listing(mut self, text: impl Into<String>) -> Self {
        self.listing = Some(text.into());
        self
    }

    /// Every `(raw identifier, trace path)` pair the harness was asked to run.
    pub fn runs(&self) -> Vec<(String, PathBuf)> {
        match self.runs.lock() {
            Ok(runs) => runs.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TestHarness for ScriptedHarness {
    fn list_tests(&self) -> Result<String, PipelineError> {
        self.listing
            .clone()
            .ok_or_else(|| PipelineError::Discovery("scripted listing failure".to_owned()))
    }

    fn run_test(
        &self,
        test: &TestCase,
        trace_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<(), CaptureFailure> {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push((test.raw_identifier.clone(), trace_path.to_path_buf()));
        }
        let behavior = self
            .behaviors
            .get(&test.raw_identifier)
            .cloned()
            .unwrap_or(Behavior::PassWithoutTrace);
        let io = |e: std::io::Error| CaptureFailure::Io(e.to_string());
        match behavior {
            Behavior::RecordOwnName => {
                let mut recorder = TraceRecorder::create(trace_path);
                record_marker(&mut recorder, test.raw_identifier.as_bytes())
                    .map_err(|e| CaptureFailure::Io(e.to_string()))
            }
            Behavior::Write(bytes) => std::fs::write(trace_path, bytes).map_err(io),
            Behavior::WriteThenCrash(bytes) => {
                std::fs::write(trace_path, bytes).map_err(io)?;
                Err(CaptureFailure::Exited(Some(CRASH_EXIT_CODE)))
            }
            Behavior::Crash => Err(CaptureFailure::Exited(Some(CRASH_EXIT_CODE))),
            Behavior::PassWithoutTrace => Ok(()),
            Behavior::Hang => Err(CaptureFailure::TimedOut(
                timeout.map_or(0, |t| t.as_millis() as u64),
            )),
        }
    }
}

fn record_marker(recorder: &mut TraceRecorder, marker: &[u8]) -> Result<(), crate::TraceError> {
    recorder.transaction_start(marker)?;
    recorder.instruction(b"CALL_METHOD")?;
    recorder.invoke_start()?;
    // Keep the file write window open long enough for parallel runs to overlap.
    std::thread::sleep(Duration::from_millis(5));
    recorder.runtime_call(1, &[marker.to_vec()])?;
    recorder.invoke_end(marker)?;
    recorder.transaction_end(true)
}

/// List-only output in the shape `cargo test -- --list` prints.
pub fn listing(names: &[&str]) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str(name);
        out.push_str(LEAF_MARKER);
        out.push('\n');
    }
    out.push_str(&format!("\n{} tests, 0 benchmarks\n", names.len()));
    out
}

/// A valid trace with one committed transaction carrying `context`.
pub fn committed_trace(context: &[u8]) -> Vec<u8> {
    let mut writer = RecordWriter::with_header();
    writer
        .tx_start(context)
        .instruction(b"CALL_METHOD")
        .invoke_start()
        .runtime_call(3, &[context.to_vec(), b"arg".to_vec()])
        .invoke_end(b"ok")
        .tx_end(true);
    writer.into_bytes()
}

/// Same committed transaction as [`committed_trace`], preceded by a failed one.
/// Normalizes to the same seed.
pub fn trace_with_failed_prefix(context: &[u8]) -> Vec<u8> {
    let mut writer = RecordWriter::with_header();
    writer.tx_start(b"rolled back").instruction(b"LOCK_FEE").tx_end(false);
    let committed = committed_trace(context);
    let mut bytes = writer.into_bytes();
    bytes.extend_from_slice(&committed[crate::trace::format::HEADER_LEN..]);
    bytes
}

/// A trace whose only transaction failed. Rejected by the validator.
pub fn failed_only_trace() -> Vec<u8> {
    let mut writer = RecordWriter::with_header();
    writer.tx_start(b"ctx").instruction(b"LOCK_FEE").tx_end(false);
    writer.into_bytes()
}

/// A committed trace cut off in the middle of its last record.
pub fn truncated_trace() -> Vec<u8> {
    let mut bytes = committed_trace(b"cut");
    bytes.truncate(bytes.len() - 1);
    bytes
}
