//! Corpus extraction.
//!
//! Turns the validated raw traces into fuzz seeds: each trace is normalized
//! (failed transactions dropped, canonical re-encoding), seeds are keyed by the
//! BLAKE3 digest of their normalized bytes, and one file per distinct seed is
//! written together with a `manifest.json` mapping seeds back to raw traces.
//! Output is a pure function of the raw directory's contents.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::PipelineError;
use crate::trace::decode::decode;
use crate::trace::encode::encode;
use crate::trace::format::Trace;
use crate::types::CorpusEntry;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Produces the extracted corpus from a raw trace directory.
pub trait CorpusExtractor {
    fn extract(&self, raw_dir: &Path, extracted_dir: &Path) -> Result<Manifest, PipelineError>;
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManifestEntry {
    /// Seed file name inside the extracted directory.
    pub file: String,
    pub size: usize,
    /// Raw trace file names that normalized to this seed, sorted.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    pub version: u32,
    /// Sorted by file name, which is the seed digest.
    pub entries: Vec<ManifestEntry>,
    /// Raw files that could not be decoded and were left out.
    pub skipped: Vec<String>,
}

impl Manifest {
    pub fn read(extracted_dir: &Path) -> Result<Self, PipelineError> {
        let path = extracted_dir.join(MANIFEST_FILE_NAME);
        let text = std::fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::Extraction(format!("unreadable manifest {}: {e}", path.display())))
    }
}

/// Canonical seed bytes for `trace`, or `None` if no transaction committed.
pub fn normalize(trace: &Trace) -> Option<Vec<u8>> {
    let committed = Trace {
        transactions: trace.transactions.iter().filter(|tx| tx.committed).cloned().collect(),
    };
    if committed.transactions.is_empty() {
        None
    } else {
        Some(encode(&committed))
    }
}

/// Raw trace files of `raw_dir`, sorted by file name.
fn raw_trace_files(raw_dir: &Path) -> Result<Vec<(String, PathBuf)>, PipelineError> {
    let entries = std::fs::read_dir(raw_dir).map_err(|e| PipelineError::io(raw_dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(raw_dir, e))?;
        let path = entry.path();
        let is_file = entry.file_type().map_err(|e| PipelineError::io(&path, e))?.is_file();
        if !is_file || path.extension().and_then(|e| e.to_str()) != Some(crate::TRACE_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            tracing::warn!(path = %path.display(), "skipping non UTF-8 trace file name");
            continue;
        };
        files.push((name, path));
    }
    files.sort();
    Ok(files)
}

/// Reads, normalizes and deduplicates every raw trace.
///
/// Returns the entries keyed by digest, plus the names of skipped files.
pub fn collect_entries(raw_dir: &Path) -> Result<(BTreeMap<String, CorpusEntry>, Vec<String>), PipelineError> {
    let mut entries: BTreeMap<String, CorpusEntry> = BTreeMap::new();
    let mut skipped = Vec::new();
    for (name, path) in raw_trace_files(raw_dir)? {
        let bytes = std::fs::read(&path).map_err(|e| PipelineError::io(&path, e))?;
        let normalized = decode(&bytes).map_err(|e| e.to_string()).and_then(|trace| {
            normalize(&trace).ok_or_else(|| "no committed transaction".to_owned())
        });
        let normalized_bytes = match normalized {
            Ok(seed) => seed,
            Err(reason) => {
                tracing::warn!(file = %name, %reason, "unusable raw trace, skipping");
                skipped.push(name);
                continue;
            }
        };
        let candidate = CorpusEntry {
            normalized_bytes,
            source_traces: Default::default(),
        };
        entries
            .entry(candidate.digest_hex())
            .or_insert(candidate)
            .source_traces
            .insert(name);
    }
    Ok((entries, skipped))
}

/// Removes seeds and the manifest from a previous extraction. Other files
/// in the directory are left alone.
fn clear_previous_output(extracted_dir: &Path) -> Result<(), PipelineError> {
    let entries = std::fs::read_dir(extracted_dir).map_err(|e| PipelineError::io(extracted_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(extracted_dir, e))?;
        let path = entry.path();
        let is_seed = path.extension().and_then(|e| e.to_str()) == Some(crate::TRACE_EXTENSION);
        let is_manifest = path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE_NAME);
        if (is_seed || is_manifest) && path.is_file() {
            std::fs::remove_file(&path).map_err(|e| PipelineError::io(&path, e))?;
        }
    }
    Ok(())
}

/// Full extraction pass from `raw_dir` into `extracted_dir`.
pub fn extract_corpus(raw_dir: &Path, extracted_dir: &Path) -> Result<Manifest, PipelineError> {
    if !raw_dir.is_dir() {
        return Err(PipelineError::Extraction(format!(
            "raw corpus directory {} does not exist",
            raw_dir.display()
        )));
    }
    let (entries, skipped) = collect_entries(raw_dir)?;

    std::fs::create_dir_all(extracted_dir).map_err(|e| PipelineError::io(extracted_dir, e))?;
    clear_previous_output(extracted_dir)?;

    let mut manifest = Manifest {
        version: MANIFEST_VERSION,
        entries: Vec::with_capacity(entries.len()),
        skipped,
    };
    for (digest, entry) in entries {
        let file = format!("{digest}.{}", crate::TRACE_EXTENSION);
        let path = extracted_dir.join(&file);
        std::fs::write(&path, &entry.normalized_bytes).map_err(|e| PipelineError::io(&path, e))?;
        manifest.entries.push(ManifestEntry {
            file,
            size: entry.normalized_bytes.len(),
            sources: entry.source_traces.into_iter().collect(),
        });
    }

    let manifest_path = extracted_dir.join(MANIFEST_FILE_NAME);
    let json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| PipelineError::Extraction(format!("manifest serialization failed: {e}")))?;
    std::fs::write(&manifest_path, json).map_err(|e| PipelineError::io(&manifest_path, e))?;

    tracing::info!(
        entries = manifest.entries.len(),
        skipped = manifest.skipped.len(),
        out = %extracted_dir.display(),
        "corpus extracted"
    );
    Ok(manifest)
}

/// Extracts in the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessExtractor;

impl CorpusExtractor for InProcessExtractor {
    fn extract(&self, raw_dir: &Path, extracted_dir: &Path) -> Result<Manifest, PipelineError> {
        extract_corpus(raw_dir, extracted_dir)
    }
}

/// Extracts by running the `extractor` executable, then reads its manifest.
#[derive(Debug, Clone)]
pub struct ToolExtractor {
    binary: PathBuf,
}

impl ToolExtractor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        ToolExtractor { binary: binary.into() }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl CorpusExtractor for ToolExtractor {
    fn extract(&self, raw_dir: &Path, extracted_dir: &Path) -> Result<Manifest, PipelineError> {
        let output = Command::new(&self.binary)
            .arg(raw_dir)
            .arg(extracted_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                PipelineError::Extraction(format!("failed to run {}: {e}", self.binary.display()))
            })?;
        if !output.status.success() {
            return Err(PipelineError::Extraction(format!(
                "extractor exited with {}:\n{}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end()
            )));
        }
        Manifest::read(extracted_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{committed_trace, failed_only_trace, trace_with_failed_prefix};

    #[test]
    fn normalize_drops_failed_transactions() {
        let trace = decode(&trace_with_failed_prefix(b"x")).unwrap();
        assert_eq!(normalize(&trace), Some(committed_trace(b"x")));
    }

    #[test]
    fn collect_dedups_and_reports_unusable_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), committed_trace(b"x")).unwrap();
        std::fs::write(dir.path().join("b.bin"), trace_with_failed_prefix(b"x")).unwrap();
        std::fs::write(dir.path().join("c.bin"), failed_only_trace()).unwrap();
        std::fs::write(dir.path().join("d.bin"), b"RTRC").unwrap();
        std::fs::create_dir(dir.path().join("e.bin")).unwrap();

        let (entries, skipped) = collect_entries(dir.path()).unwrap();

        assert_eq!(entries.len(), 1);
        let entry = entries.values().next().unwrap();
        assert_eq!(entry.source_traces.iter().collect::<Vec<_>>(), ["a.bin", "b.bin"]);
        assert_eq!(skipped, ["c.bin", "d.bin"]);
    }

    #[test]
    fn empty_raw_dir_yields_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        std::fs::create_dir(&raw).unwrap();

        let manifest = extract_corpus(&raw, &dir.path().join("out")).unwrap();

        assert!(manifest.entries.is_empty());
        assert_eq!(Manifest::read(&dir.path().join("out")).unwrap(), manifest);
    }

    #[test]
    fn every_skipped_file_is_logged() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("failed.bin"), failed_only_trace()).unwrap();
        std::fs::write(dir.path().join("garbage.bin"), b"garbage").unwrap();
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let (_, skipped) = tracing::subscriber::with_default(subscriber, || collect_entries(dir.path())).unwrap();

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(skipped, ["failed.bin", "garbage.bin"]);
        for file in skipped {
            assert!(logs.contains(&format!("file={file}")), "{file} not logged: {logs}");
        }
        assert!(logs.contains("no committed transaction"));
    }
}
