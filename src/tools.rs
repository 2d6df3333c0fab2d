//! Tool Builder: provides the validator and extractor used by the pipeline.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::PipelineError;
use crate::extract::{CorpusExtractor, InProcessExtractor, ToolExtractor};
use crate::validate::{InProcessValidator, ToolValidator, TraceValidator};

pub const VALIDATOR_BIN: &str = "validator";
pub const EXTRACTOR_BIN: &str = "extractor";

/// Source of the two pipeline tools. Any error here is fatal to the run.
pub trait Toolchain {
    type Validator: TraceValidator;
    type Extractor: CorpusExtractor;

    fn build(&self) -> Result<(Self::Validator, Self::Extractor), PipelineError>;
}

/// Builds both tools with `cargo build --release` from a manifest directory.
#[derive(Debug, Clone)]
pub struct CargoToolchain {
    pub cargo: PathBuf,
    pub manifest_dir: PathBuf,
    pub target_dir: PathBuf,
}

impl CargoToolchain {
    pub fn new(cargo: impl Into<PathBuf>, manifest_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        CargoToolchain {
            cargo: cargo.into(),
            manifest_dir: manifest_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    /// Location of a release binary built by this toolchain.
    pub fn binary_path(&self, name: &str) -> PathBuf {
        self.target_dir
            .join("release")
            .join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
    }
}

impl Toolchain for CargoToolchain {
    type Validator = ToolValidator;
    type Extractor = ToolExtractor;

    fn build(&self) -> Result<(ToolValidator, ToolExtractor), PipelineError> {
        let manifest = self.manifest_dir.join("Cargo.toml");
        tracing::info!(manifest = %manifest.display(), "building validator and extractor");
        let output = Command::new(&self.cargo)
            .arg("build")
            .arg("--release")
            .arg("--manifest-path")
            .arg(&manifest)
            .arg("--target-dir")
            .arg(&self.target_dir)
            .args(["--bin", VALIDATOR_BIN, "--bin", EXTRACTOR_BIN])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PipelineError::ToolBuild(format!("failed to run {}: {e}", self.cargo.display())))?;
        if !output.status.success() {
            return Err(PipelineError::ToolBuild(format!(
                "cargo build exited with {}:\n{}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end()
            )));
        }
        PrebuiltToolchain::new(self.binary_path(VALIDATOR_BIN), self.binary_path(EXTRACTOR_BIN)).build()
    }
}

/// Uses tool binaries that already exist, e.g. from an earlier build.
#[derive(Debug, Clone)]
pub struct PrebuiltToolchain {
    pub validator: PathBuf,
    pub extractor: PathBuf,
}

impl PrebuiltToolchain {
    pub fn new(validator: impl Into<PathBuf>, extractor: impl Into<PathBuf>) -> Self {
        PrebuiltToolchain {
            validator: validator.into(),
            extractor: extractor.into(),
        }
    }
}

fn require_binary(path: &Path) -> Result<(), PipelineError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::ToolBuild(format!("tool binary {} not found", path.display())))
    }
}

impl Toolchain for PrebuiltToolchain {
    type Validator = ToolValidator;
    type Extractor = ToolExtractor;

    fn build(&self) -> Result<(ToolValidator, ToolExtractor), PipelineError> {
        require_binary(&self.validator)?;
        require_binary(&self.extractor)?;
        Ok((ToolValidator::new(&self.validator), ToolExtractor::new(&self.extractor)))
    }
}

/// Runs validation and extraction inside the orchestrator process.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessToolchain;

impl Toolchain for InProcessToolchain {
    type Validator = InProcessValidator;
    type Extractor = InProcessExtractor;

    fn build(&self) -> Result<(InProcessValidator, InProcessExtractor), PipelineError> {
        Ok((InProcessValidator, InProcessExtractor))
    }
}
