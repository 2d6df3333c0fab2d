//! Per-run summary report written next to the corpus.

use std::path::{Path, PathBuf};

use crate::error::{CaptureFailure, PipelineError};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FailureRecord {
    pub test: String,
    pub sanitized: String,
    pub reason: CaptureFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunSummary {
    pub discovered: usize,
    /// Tests whose trace was captured and validated.
    pub captured: usize,
    pub failures: Vec<FailureRecord>,
    pub corpus_entries: usize,
    pub raw_dir: PathBuf,
    pub extracted_dir: PathBuf,
}

impl RunSummary {
    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| PipelineError::Report(format!("summary serialization failed: {e}")))?;
        std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))
    }

    pub fn read_json(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::Report(format!("unreadable summary {}: {e}", path.display())))
    }
}
