// Shared data types that flow between the pipeline stages.
//
// The binary record types live in `trace::format`; this file holds the
// pipeline-level records describing tests, trace files and corpus entries.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// One leaf test discovered in the instrumented suite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TestCase {
    /// Identifier exactly as the test binary lists it.
    pub raw_identifier: String,
    /// Filesystem-safe name used for the trace artifact.
    pub sanitized_identifier: String,
}

impl TestCase {
    pub fn new(raw_identifier: impl Into<String>, sanitized_identifier: impl Into<String>) -> Self {
        TestCase {
            raw_identifier: raw_identifier.into(),
            sanitized_identifier: sanitized_identifier.into(),
        }
    }

    /// File name of this test's trace inside the raw corpus directory.
    pub fn trace_file_name(&self) -> String {
        format!("{}.{}", self.sanitized_identifier, crate::TRACE_EXTENSION)
    }
}

/// A trace written by one test run. The bytes are read on demand since most
/// callers only need the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFile {
    pub path: PathBuf,
    pub owning_test: TestCase,
}

impl TraceFile {
    /// Trace location for `test` under the raw corpus directory.
    pub fn for_test(raw_dir: &Path, test: &TestCase) -> Self {
        TraceFile {
            path: raw_dir.join(test.trace_file_name()),
            owning_test: test.clone(),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn raw_bytes(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Deletes the file if present. A missing file is not an error.
    pub fn discard(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Result of checking one trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub trace: TraceFile,
    pub is_well_formed: bool,
    /// Validator diagnostic when the trace was rejected.
    pub reason: Option<String>,
}

impl ValidationOutcome {
    pub fn accepted(trace: TraceFile) -> Self {
        ValidationOutcome { trace, is_well_formed: true, reason: None }
    }

    pub fn rejected(trace: TraceFile, reason: impl Into<String>) -> Self {
        ValidationOutcome { trace, is_well_formed: false, reason: Some(reason.into()) }
    }
}

/// One deduplicated seed. `source_traces` holds raw file names, sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub normalized_bytes: Vec<u8>,
    pub source_traces: BTreeSet<String>,
}

impl CorpusEntry {
    /// BLAKE3 digest of the normalized bytes, hex encoded. Used as the seed file name.
    pub fn digest_hex(&self) -> String {
        hex::encode(blake3::hash(&self.normalized_bytes).as_bytes())
    }
}
