#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(deprecated)]

//!
//! Runtime fuzz corpus generator.
//!
//! Runs an instrumented engine test suite one test at a time, captures the
//! binary execution trace each test writes, validates it, and distills the
//! accepted traces into a deduplicated fuzzing seed corpus.
//!
//! The trace wire format, its decoder and the in-engine recorder live in
//! [`trace`]. The pipeline stages are wired together in [`pipeline`].

/// File extension of raw traces and extracted seeds.
pub const TRACE_EXTENSION: &str = "bin";

// Error types for trace decoding, per-test capture and the pipeline.
pub mod error;

// Shared data types (TestCase, TraceFile, CorpusEntry, ...).
pub mod types;

pub mod sanitize;

// Wire format, decoder, encoder and recorder.
pub mod trace;

pub mod config;

// Test discovery, harness and per-test capture.
pub mod capture;

pub mod validate;

pub mod extract;

// Validator/extractor tool provisioning.
pub mod tools;

pub mod pipeline;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::PipelineConfig;
pub use error::{CaptureFailure, PipelineError, TraceError};
pub use pipeline::{Pipeline, RunSummary, Stage};
pub use types::{CorpusEntry, TestCase, TraceFile, ValidationOutcome};

/// Installs the `fmt` subscriber used by the binaries.
///
/// Output goes to stderr so tool stdout stays machine readable. The filter
/// comes from `RUST_LOG` and defaults to `info`. Calling this twice is harmless.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
