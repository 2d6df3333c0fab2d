//! Distills a directory of validated raw traces into the fuzz seed corpus.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use runtime_fuzz_corpus::extract::extract_corpus;

#[derive(Parser)]
#[command(name = "extractor", about = "Extract deduplicated fuzz seeds from raw traces")]
struct Opts {
    /// Directory holding raw `.bin` traces.
    raw_dir: PathBuf,
    /// Directory receiving the seeds and `manifest.json`.
    extracted_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    runtime_fuzz_corpus::init_tracing();

    let manifest = extract_corpus(&opts.raw_dir, &opts.extracted_dir)
        .with_context(|| format!("extracting {}", opts.raw_dir.display()))?;
    println!(
        "{} seeds written to {} ({} raw traces skipped)",
        manifest.entries.len(),
        opts.extracted_dir.display(),
        manifest.skipped.len()
    );
    Ok(())
}
