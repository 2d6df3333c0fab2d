#![cfg(test)]

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::error::{CaptureFailure, PipelineError};
use crate::extract::{Manifest, MANIFEST_FILE_NAME};
use crate::pipeline::{Pipeline, RunSummary, Stage};
use crate::testing::{
    committed_trace, failed_only_trace, listing, trace_with_failed_prefix, truncated_trace, Behavior,
    ScriptedHarness, CRASH_EXIT_CODE,
};
use crate::tools::{InProcessToolchain, PrebuiltToolchain};
use crate::trace::decode::decode;

// --- Test Utilities ---

fn config_in(root: &Path) -> PipelineConfig {
    PipelineConfig {
        corpus_root: root.join("corpus"),
        ..Default::default()
    }
}

fn run(config: PipelineConfig, harness: ScriptedHarness) -> Result<RunSummary, PipelineError> {
    Pipeline::new(config, harness, InProcessToolchain).run()
}

fn dir_contents(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let path = e.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            (name, std::fs::read(&path).unwrap())
        })
        .collect()
}

const LETTERS: [&str; 10] = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];

// --- Capture ---

#[test]
fn crashing_test_does_not_stop_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let names: Vec<String> = LETTERS.iter().map(|l| format!("suite::case_{l}")).collect();
    let harness = ScriptedHarness::new(names.iter().enumerate().map(|(i, name)| {
        let behavior = if i == 4 { Behavior::Crash } else { Behavior::RecordOwnName };
        (name.as_str(), behavior)
    }));

    let summary = run(config.clone(), harness).unwrap();

    assert_eq!(summary.discovered, 10);
    assert_eq!(summary.captured, 9);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].test, "suite::case_e");
    assert_eq!(summary.failures[0].reason, CaptureFailure::Exited(Some(CRASH_EXIT_CODE)));
    assert_eq!(dir_contents(&config.raw_dir()).len(), 9);
    assert!(!config.raw_dir().join("suite__case_e.bin").exists());
    assert_eq!(summary.corpus_entries, 9);
}

#[test]
fn malformed_traces_are_removed_and_not_extracted() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let harness = ScriptedHarness::new([
        ("ok::one", Behavior::RecordOwnName),
        ("bad::truncated", Behavior::Write(truncated_trace())),
        ("bad::failed_only", Behavior::Write(failed_only_trace())),
        ("bad::partial_then_crash", Behavior::WriteThenCrash(committed_trace(b"partial"))),
    ]);

    let summary = run(config.clone(), harness).unwrap();

    assert_eq!(summary.captured, 1);
    let raw = dir_contents(&config.raw_dir());
    assert_eq!(raw.keys().collect::<Vec<_>>(), vec!["ok__one.bin"]);

    let reasons: Vec<_> = summary.failures.iter().map(|f| (f.test.as_str(), &f.reason)).collect();
    assert!(matches!(reasons[0], ("bad::truncated", CaptureFailure::Rejected(_))));
    assert!(matches!(reasons[1], ("bad::failed_only", CaptureFailure::Rejected(_))));
    assert!(matches!(reasons[2], ("bad::partial_then_crash", CaptureFailure::Exited(_))));

    let manifest = Manifest::read(&config.extracted_dir()).unwrap();
    assert_eq!(manifest.entries.len(), 1);
    assert_eq!(manifest.entries[0].sources, vec!["ok__one.bin".to_owned()]);
}

#[test]
fn passing_test_without_trace_is_recorded_as_no_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    std::fs::create_dir_all(config.raw_dir()).unwrap();
    // Leftover from an earlier run must not be taken as this run's output.
    std::fs::write(config.raw_dir().join("quiet__test.bin"), committed_trace(b"stale")).unwrap();

    let harness = ScriptedHarness::new([("quiet::test", Behavior::PassWithoutTrace)]);
    let summary = run(config.clone(), harness).unwrap();

    assert_eq!(summary.captured, 0);
    assert_eq!(summary.failures[0].reason, CaptureFailure::NoTrace);
    assert!(!config.raw_dir().join("quiet__test.bin").exists());
    assert_eq!(summary.corpus_entries, 0);
}

#[test]
fn timed_out_test_is_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_in(tmp.path());
    config.test_timeout_secs = Some(2);
    let harness = ScriptedHarness::new([("slow::test", Behavior::Hang), ("fast::test", Behavior::RecordOwnName)]);

    let summary = run(config, harness).unwrap();

    assert_eq!(summary.captured, 1);
    assert_eq!(summary.failures[0].reason, CaptureFailure::TimedOut(2000));
}

#[test]
fn parallel_capture_keeps_traces_apart() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_in(tmp.path());
    config.jobs = 4;
    let names: Vec<String> = LETTERS.iter().map(|l| format!("par::test_{l}")).collect();
    let harness = ScriptedHarness::new(names.iter().map(|n| (n.as_str(), Behavior::RecordOwnName)));

    let pipeline = Pipeline::new(config.clone(), harness, InProcessToolchain);
    let summary = pipeline.run().unwrap();
    assert_eq!(summary.captured, names.len());

    for name in &names {
        let file = config.raw_dir().join(format!("par__test_{}.bin", &name[name.len() - 1..]));
        let trace = decode(&std::fs::read(&file).unwrap()).unwrap();
        assert_eq!(trace.transactions.len(), 1);
        assert_eq!(trace.transactions[0].context, name.as_bytes());
    }
}

#[test]
fn trace_destination_never_touches_orchestrator_environment() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_in(tmp.path());
    config.trace_env_var = "RUNTIME_FUZZ_CORPUS_PIPELINE_TEST_TRACE".to_owned();
    config.jobs = 2;
    let harness = ScriptedHarness::new([("env::a", Behavior::RecordOwnName), ("env::b", Behavior::RecordOwnName)]);

    run(config.clone(), harness).unwrap();

    assert!(std::env::var_os(&config.trace_env_var).is_none());
}

#[test]
fn each_test_is_given_its_own_trace_path() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let harness = ScriptedHarness::new([("m::Alpha", Behavior::RecordOwnName), ("m::alpha", Behavior::RecordOwnName)]);
    let pipeline = Pipeline::new(config.clone(), harness, InProcessToolchain);

    pipeline.run().unwrap();

    let runs = pipeline.harness().runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].1, config.raw_dir().join("m__alpha.bin"));
    assert_ne!(runs[0].1, runs[1].1);
    assert!(runs.iter().all(|(_, path)| path.starts_with(config.raw_dir())));
}

// --- Extraction ---

#[test]
fn equivalent_traces_collapse_into_one_seed() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let harness = ScriptedHarness::new([
        ("dup::plain", Behavior::Write(committed_trace(b"same"))),
        ("dup::with_rollback", Behavior::Write(trace_with_failed_prefix(b"same"))),
        ("dup::other", Behavior::Write(committed_trace(b"different"))),
    ]);

    let summary = run(config.clone(), harness).unwrap();

    assert_eq!(summary.captured, 3);
    assert_eq!(summary.corpus_entries, 2);
    let manifest = Manifest::read(&config.extracted_dir()).unwrap();
    let merged = manifest.entries.iter().find(|e| e.sources.len() == 2).unwrap();
    assert_eq!(merged.sources, vec!["dup__plain.bin".to_owned(), "dup__with_rollback.bin".to_owned()]);
    let seed = std::fs::read(config.extracted_dir().join(&merged.file)).unwrap();
    assert_eq!(seed, committed_trace(b"same"));
}

#[test]
fn repeated_runs_produce_identical_corpus() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let script = || {
        ScriptedHarness::new([
            ("r::one", Behavior::RecordOwnName),
            ("r::two", Behavior::Write(trace_with_failed_prefix(b"two"))),
            ("r::three", Behavior::Crash),
        ])
    };

    let first_summary = run(config.clone(), script()).unwrap();
    let first = dir_contents(&config.extracted_dir());
    let second_summary = run(config.clone(), script()).unwrap();
    let second = dir_contents(&config.extracted_dir());

    assert_eq!(first, second);
    assert_eq!(first_summary, second_summary);
    assert!(first.contains_key(MANIFEST_FILE_NAME));
}

// --- Stages and fatal errors ---

#[test]
fn stages_run_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let harness = ScriptedHarness::new([("s::a", Behavior::RecordOwnName), ("s::b", Behavior::Crash)]);
    let pipeline = Pipeline::new(config_in(tmp.path()), harness, InProcessToolchain);

    let (_, state) = pipeline.run_stages().unwrap();

    assert_eq!(
        state.history(),
        &[
            Stage::Building,
            Stage::Discovering,
            Stage::Capturing { index: 0, total: 2 },
            Stage::Capturing { index: 1, total: 2 },
            Stage::Extracting,
            Stage::Done,
        ]
    );
    assert_eq!(state.stage(), Stage::Done);
    assert_eq!(state.failures().len(), 1);
}

#[test]
fn parallel_capture_is_a_single_stage() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_in(tmp.path());
    config.jobs = 3;
    let harness = ScriptedHarness::new([
        ("q::a", Behavior::RecordOwnName),
        ("q::b", Behavior::Crash),
        ("q::c", Behavior::RecordOwnName),
    ]);
    let pipeline = Pipeline::new(config, harness, InProcessToolchain);

    let (summary, state) = pipeline.run_stages().unwrap();

    let capturing: Vec<_> = state
        .history()
        .iter()
        .filter(|s| matches!(s, Stage::Capturing { .. }))
        .collect();
    assert_eq!(capturing, [&Stage::Capturing { index: 0, total: 3 }]);
    assert_eq!(summary.captured, 2);
    assert_eq!(state.failures().len(), 1);
}

#[test]
fn empty_suite_skips_capture_and_extracts_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let harness = ScriptedHarness::default().with_listing("bench_only: benchmark\n\n0 tests, 1 benchmarks\n");
    let pipeline = Pipeline::new(config.clone(), harness, InProcessToolchain);

    let (summary, state) = pipeline.run_stages().unwrap();

    assert!(!state.history().iter().any(|s| matches!(s, Stage::Capturing { .. })));
    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.corpus_entries, 0);
    assert!(pipeline.harness().runs().is_empty());
    assert!(config.raw_dir().is_dir());
    assert_eq!(Manifest::read(&config.extracted_dir()).unwrap().entries.len(), 0);
}

#[test]
fn discovery_failure_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());

    let err = run(config.clone(), ScriptedHarness::failing_discovery()).unwrap_err();

    assert!(matches!(err, PipelineError::Discovery(_)));
    assert!(!config.summary_path().exists());
    assert!(!config.extracted_dir().exists());
}

#[test]
fn tool_build_failure_is_fatal_before_any_test_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let tools = PrebuiltToolchain::new(tmp.path().join("missing-validator"), tmp.path().join("missing-extractor"));
    let harness = ScriptedHarness::new([("never::runs", Behavior::RecordOwnName)]);
    let pipeline = Pipeline::new(config_in(tmp.path()), harness, tools);

    let err = pipeline.run().unwrap_err();

    assert!(matches!(err, PipelineError::ToolBuild(_)));
    assert!(pipeline.harness().runs().is_empty());
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_in(tmp.path());
    config.jobs = 0;

    let err = run(config, ScriptedHarness::default().with_listing(listing(&[]))).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn summary_is_written_next_to_the_corpus() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let harness = ScriptedHarness::new([("w::ok", Behavior::RecordOwnName), ("w::crash", Behavior::Crash)]);

    let summary = run(config.clone(), harness).unwrap();

    let on_disk = RunSummary::read_json(&config.summary_path()).unwrap();
    assert_eq!(on_disk, summary);
    let json = std::fs::read_to_string(config.summary_path()).unwrap();
    assert!(json.contains("\"kind\": \"exited\""));
}
