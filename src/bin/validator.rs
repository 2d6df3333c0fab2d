//! Checks one trace file for structural well-formedness.
//!
//! Exit status 0 means the trace is accepted. On rejection the diagnostic is
//! the last line written to stderr and the exit status is 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use runtime_fuzz_corpus::validate::validate_file;

#[derive(Parser)]
#[command(name = "validator", about = "Validate a runtime execution trace")]
struct Opts {
    /// Trace file to check.
    trace: PathBuf,
    /// Print trace counters as JSON on success.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    runtime_fuzz_corpus::init_tracing();

    match validate_file(&opts.trace) {
        Ok(stats) => {
            if opts.json {
                match serde_json::to_string(&stats) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("failed to serialize stats: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!(
                    "{}: ok ({} transactions, {} committed, {} runtime calls)",
                    opts.trace.display(),
                    stats.transactions,
                    stats.committed,
                    stats.runtime_calls
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", opts.trace.display());
            ExitCode::FAILURE
        }
    }
}
