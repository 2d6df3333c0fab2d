//! Trace validation.
//!
//! The pipeline validates through the `validator` tool so a decoder bug can
//! only fail one trace, never the orchestrator. [`InProcessValidator`] runs the
//! same check without a subprocess.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::TraceError;
use crate::trace::decode::{validate, TraceStats};
use crate::types::{TraceFile, ValidationOutcome};

/// Checks a captured trace for structural well-formedness.
pub trait TraceValidator: Send + Sync {
    fn validate(&self, trace: &TraceFile) -> ValidationOutcome;
}

/// Reads and checks a trace file. This is the body of the `validator` binary.
pub fn validate_file(path: &Path) -> Result<TraceStats, TraceError> {
    let bytes = std::fs::read(path)?;
    validate(&bytes)
}

/// Validates by decoding in the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessValidator;

impl TraceValidator for InProcessValidator {
    fn validate(&self, trace: &TraceFile) -> ValidationOutcome {
        match validate_file(&trace.path) {
            Ok(_) => ValidationOutcome::accepted(trace.clone()),
            Err(e) => ValidationOutcome::rejected(trace.clone(), e.to_string()),
        }
    }
}

/// Validates by running the `validator` executable on each trace.
#[derive(Debug, Clone)]
pub struct ToolValidator {
    binary: PathBuf,
}

impl ToolValidator {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        ToolValidator { binary: binary.into() }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl TraceValidator for ToolValidator {
    fn validate(&self, trace: &TraceFile) -> ValidationOutcome {
        let output = Command::new(&self.binary)
            .arg(&trace.path)
            .stdin(Stdio::null())
            .output();
        match output {
            Ok(out) if out.status.success() => ValidationOutcome::accepted(trace.clone()),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let reason = stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .map(str::trim)
                    .unwrap_or("validator exited unsuccessfully");
                ValidationOutcome::rejected(trace.clone(), format!("{} ({})", reason, out.status))
            }
            // A validator that cannot run cannot vouch for the trace.
            Err(e) => ValidationOutcome::rejected(
                trace.clone(),
                format!("failed to run {}: {e}", self.binary.display()),
            ),
        }
    }
}
