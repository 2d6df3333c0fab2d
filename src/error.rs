//!
//! Defines error types for trace handling and the corpus pipeline.

use std::path::PathBuf;

/// Errors raised while decoding or recording a binary trace.
///
/// Framing and grammar variants carry the byte offset of the offending record
/// so the validator's diagnostic points at the damage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceError {
    /// The file does not start with the trace magic.
    #[error("bad trace magic")]
    BadMagic,
    /// The header names a format version this decoder does not understand.
    #[error("unsupported trace version {0}")]
    UnsupportedVersion(u8),
    /// The input ended in the middle of a header, record, or argument.
    #[error("truncated input at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// A record carried a tag outside the known tag space.
    #[error("unknown record tag {tag:#04x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },
    /// A record declared a payload larger than the decoder accepts.
    #[error("record at offset {offset} declares {len} payload bytes (limit {limit})")]
    PayloadTooLarge { offset: usize, len: usize, limit: usize },
    /// The payload length disagrees with the record's inner framing.
    #[error("size mismatch in {record} record at offset {offset}: {detail}")]
    SizeMismatch {
        record: &'static str,
        offset: usize,
        detail: String,
    },
    /// A well-framed record appeared where the grammar does not allow it.
    #[error("unexpected {record} record at offset {offset}: {detail}")]
    UnexpectedRecord {
        record: &'static str,
        offset: usize,
        detail: &'static str,
    },
    /// Invoke nesting exceeded the decoder's depth limit.
    #[error("invoke nesting deeper than {limit} at offset {offset}")]
    NestingTooDeep { offset: usize, limit: usize },
    /// A TX_END record carried a status byte other than 0 or 1.
    #[error("invalid transaction status {status} at offset {offset}")]
    InvalidStatus { status: u8, offset: usize },
    /// The input ended while a transaction was still open.
    #[error("input ended inside an unterminated transaction")]
    UnterminatedTransaction,
    /// The trace holds no committed transaction and is useless as a seed.
    #[error("trace contains no committed transaction")]
    NoCommittedTransaction,
    /// Recorder API called out of order.
    #[error("recorder misuse: {0}")]
    RecorderState(&'static str),
    /// Recorder I/O failure. Stored as text so the error stays `Clone`.
    #[error("trace I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TraceError {
    fn from(err: std::io::Error) -> Self {
        TraceError::Io(err.to_string())
    }
}

/// Why a single test did not contribute a trace. These never abort a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CaptureFailure {
    /// The test process could not be started.
    #[error("failed to spawn test process: {0}")]
    Spawn(String),
    /// The test process exited unsuccessfully; `None` means killed by a signal.
    #[error("test process failed with exit code {0:?}")]
    Exited(Option<i32>),
    /// The test process ran past the configured timeout and was killed.
    #[error("test process timed out after {0} ms")]
    TimedOut(u64),
    /// The test passed but wrote no trace (e.g. feature-gated out).
    #[error("test produced no trace")]
    NoTrace,
    /// The trace was captured but rejected by the validator.
    #[error("trace rejected by validator: {0}")]
    Rejected(String),
    /// Filesystem error while preparing or cleaning the trace path.
    #[error("trace file I/O error: {0}")]
    Io(String),
}

/// Fatal pipeline errors: any of these aborts the run with a non-zero exit.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Building the validator/extractor tools failed.
    #[error("tool build failed: {0}")]
    ToolBuild(String),
    /// Listing the instrumented test suite failed.
    #[error("test discovery failed: {0}")]
    Discovery(String),
    /// The bulk extraction pass failed.
    #[error("corpus extraction failed: {0}")]
    Extraction(String),
    /// The run summary could not be serialized or parsed.
    #[error("summary report error: {0}")]
    Report(String),
    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Filesystem failure on a path the pipeline owns.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}
