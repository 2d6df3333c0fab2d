//! Pipeline configuration.
//!
//! Loaded from an optional JSON file; every field has a default so a partial
//! file (or none at all) is valid. Command-line flags are applied on top by the
//! `corpus-gen` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;

/// Environment key naming the trace destination inside the test process.
pub const DEFAULT_TRACE_ENV_VAR: &str = "RUNTIME_TRACE_FILE";

/// Cargo feature enabling the instrumented recorder in the test crate.
pub const DEFAULT_FEATURE: &str = "runtime_logger";

pub const RAW_DIR_NAME: &str = "raw";
pub const EXTRACTED_DIR_NAME: &str = "extracted";
pub const SUMMARY_FILE_NAME: &str = "summary.json";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory receiving `raw/`, `extracted/` and `summary.json`.
    pub corpus_root: PathBuf,
    /// Crate whose test suite is run under instrumentation.
    pub test_crate_dir: PathBuf,
    /// Manifest directory the validator/extractor tools are built from.
    pub tool_manifest_dir: PathBuf,
    /// Cargo target directory; `<tool_manifest_dir>/target` when unset.
    pub target_dir: Option<PathBuf>,
    /// Cargo executable.
    pub cargo: PathBuf,
    /// Feature flag passed to every `cargo test` invocation.
    pub feature: String,
    /// Environment key carrying the per-test trace path.
    pub trace_env_var: String,
    /// Concurrent capture workers. 1 keeps capture strictly sequential.
    pub jobs: usize,
    /// Per-test wall-clock limit. `None` waits indefinitely.
    pub test_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            corpus_root: PathBuf::from("runtime-fuzz-corpus"),
            test_crate_dir: PathBuf::from("."),
            tool_manifest_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")),
            target_dir: None,
            cargo: std::env::var_os("CARGO")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cargo")),
            feature: DEFAULT_FEATURE.to_owned(),
            trace_env_var: DEFAULT_TRACE_ENV_VAR.to_owned(),
            jobs: 1,
            test_timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.jobs == 0 {
            return Err(PipelineError::Config("jobs must be at least 1".into()));
        }
        if self.trace_env_var.is_empty() || self.trace_env_var.contains('=') {
            return Err(PipelineError::Config(format!(
                "invalid trace environment key {:?}",
                self.trace_env_var
            )));
        }
        if self.test_timeout_secs == Some(0) {
            return Err(PipelineError::Config("test timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.corpus_root.join(RAW_DIR_NAME)
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.corpus_root.join(EXTRACTED_DIR_NAME)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.corpus_root.join(SUMMARY_FILE_NAME)
    }

    pub fn target_dir(&self) -> PathBuf {
        self.target_dir
            .clone()
            .unwrap_or_else(|| self.tool_manifest_dir.join("target"))
    }

    pub fn test_timeout(&self) -> Option<Duration> {
        self.test_timeout_secs.map(Duration::from_secs)
    }
}
