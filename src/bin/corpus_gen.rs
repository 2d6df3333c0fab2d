//! Pipeline driver: builds the tools, captures a trace per test and extracts
//! the fuzz corpus.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use runtime_fuzz_corpus::capture::CargoTestHarness;
use runtime_fuzz_corpus::tools::{CargoToolchain, PrebuiltToolchain, Toolchain, EXTRACTOR_BIN, VALIDATOR_BIN};
use runtime_fuzz_corpus::{Pipeline, PipelineConfig, RunSummary};

#[derive(Parser)]
#[command(name = "corpus-gen", about = "Generate a runtime fuzz corpus from an instrumented test suite")]
struct Opts {
    /// JSON configuration file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    corpus_root: Option<PathBuf>,
    /// Crate whose tests are run under instrumentation.
    #[arg(long)]
    test_crate: Option<PathBuf>,
    /// Cargo feature enabling the trace recorder.
    #[arg(long)]
    feature: Option<String>,
    #[arg(long)]
    trace_env_var: Option<String>,
    #[arg(long)]
    target_dir: Option<PathBuf>,
    /// Concurrent capture workers.
    #[arg(long)]
    jobs: Option<usize>,
    /// Per-test time limit in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Use validator/extractor binaries already present in the target dir.
    #[arg(long)]
    skip_build: bool,
}

impl Opts {
    fn into_config(self) -> anyhow::Result<(PipelineConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(root) = self.corpus_root {
            config.corpus_root = root;
        }
        if let Some(dir) = self.test_crate {
            config.test_crate_dir = dir;
        }
        if let Some(feature) = self.feature {
            config.feature = feature;
        }
        if let Some(var) = self.trace_env_var {
            config.trace_env_var = var;
        }
        if let Some(dir) = self.target_dir {
            config.target_dir = Some(dir);
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(secs) = self.timeout_secs {
            config.test_timeout_secs = Some(secs);
        }
        config.validate()?;
        Ok((config, self.skip_build))
    }
}

fn run<T: Toolchain>(config: PipelineConfig, toolchain: T) -> anyhow::Result<RunSummary> {
    let harness = CargoTestHarness::new(
        &config.cargo,
        &config.test_crate_dir,
        config.feature.clone(),
        config.trace_env_var.clone(),
    );
    Ok(Pipeline::new(config, harness, toolchain).run()?)
}

fn main() -> ExitCode {
    runtime_fuzz_corpus::init_tracing();

    let result = Opts::parse().into_config().and_then(|(config, skip_build)| {
        let cargo_tools = CargoToolchain::new(&config.cargo, &config.tool_manifest_dir, config.target_dir());
        if skip_build {
            let prebuilt = PrebuiltToolchain::new(
                cargo_tools.binary_path(VALIDATOR_BIN),
                cargo_tools.binary_path(EXTRACTOR_BIN),
            );
            run(config, prebuilt)
        } else {
            run(config, cargo_tools)
        }
    });

    match result {
        Ok(summary) => {
            println!(
                "discovered {} tests, captured {}, failed {}, {} corpus entries in {}",
                summary.discovered,
                summary.captured,
                summary.failures.len(),
                summary.corpus_entries,
                summary.extracted_dir.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("corpus generation failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
