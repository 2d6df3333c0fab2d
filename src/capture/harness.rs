//! Test harness abstraction.
//!
//! A `TestHarness` lists the instrumented suite and runs one test with an
//! explicit trace destination. Implementations must hand the destination to
//! the test process per invocation (argument or child environment) and never
//! through state shared with other invocations, so captures can overlap.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::{CaptureFailure, PipelineError};
use crate::types::TestCase;

pub trait TestHarness: Send + Sync {
    /// Returns the raw list-only output of the test binary.
    fn list_tests(&self) -> Result<String, PipelineError>;

    /// Runs exactly one test, directing its trace to `trace_path`.
    fn run_test(
        &self,
        test: &TestCase,
        trace_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<(), CaptureFailure>;
}

/// Runs the suite through `cargo test` with the instrumentation feature on.
#[derive(Debug, Clone)]
pub struct CargoTestHarness {
    pub cargo: PathBuf,
    pub crate_dir: PathBuf,
    pub feature: String,
    pub trace_env_var: String,
}

impl CargoTestHarness {
    pub fn new(
        cargo: impl Into<PathBuf>,
        crate_dir: impl Into<PathBuf>,
        feature: impl Into<String>,
        trace_env_var: impl Into<String>,
    ) -> Self {
        CargoTestHarness {
            cargo: cargo.into(),
            crate_dir: crate_dir.into(),
            feature: feature.into(),
            trace_env_var: trace_env_var.into(),
        }
    }

    fn cargo_test(&self) -> Command {
        let mut cmd = Command::new(&self.cargo);
        cmd.current_dir(&self.crate_dir)
            .arg("test")
            .arg("--features")
            .arg(&self.feature)
            // A stray value inherited from the invoker must not leak into runs.
            .env_remove(&self.trace_env_var);
        cmd
    }
}

impl TestHarness for CargoTestHarness {
    fn list_tests(&self) -> Result<String, PipelineError> {
        let output = self
            .cargo_test()
            .args(["--", "--list"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                PipelineError::Discovery(format!("failed to run {}: {e}", self.cargo.display()))
            })?;
        if !output.status.success() {
            return Err(PipelineError::Discovery(format!(
                "test listing exited with {}:\n{}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_test(
        &self,
        test: &TestCase,
        trace_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<(), CaptureFailure> {
        let mut cmd = self.cargo_test();
        cmd.args(["--", "--exact"])
            .arg(&test.raw_identifier)
            .env(&self.trace_env_var, trace_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let status = run_bounded(&mut cmd, timeout)?;
        if status.success() {
            Ok(())
        } else {
            Err(CaptureFailure::Exited(status.code()))
        }
    }
}

/// Spawns `cmd` and waits for it, killing it once `timeout` elapses.
///
/// The child is always reaped before returning, including on timeout.
pub fn run_bounded(cmd: &mut Command, timeout: Option<Duration>) -> Result<ExitStatus, CaptureFailure> {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group so a timeout also reaches the test binary cargo spawns.
        cmd.process_group(0);
    }
    let mut child = cmd
        .spawn()
        .map_err(|e| CaptureFailure::Spawn(e.to_string()))?;
    let Some(limit) = timeout else {
        return child.wait().map_err(|e| CaptureFailure::Io(e.to_string()));
    };
    match child.wait_timeout(limit) {
        Ok(Some(status)) => Ok(status),
        Ok(None) => {
            terminate(&mut child);
            Err(CaptureFailure::TimedOut(limit.as_millis() as u64))
        }
        Err(e) => {
            terminate(&mut child);
            Err(CaptureFailure::Io(e.to_string()))
        }
    }
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // Negative pid addresses the whole group created in `run_bounded`.
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    if let Err(e) = child.kill() {
        tracing::debug!(pid = child.id(), error = %e, "kill after timeout failed");
    }
    let _ = child.wait();
}
