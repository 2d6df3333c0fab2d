pub mod orchestrator;
pub mod summary;

// Re-export the primary types so `crate::pipeline::*` paths stay short.
pub use orchestrator::{Pipeline, PipelineRun, Stage};
pub use summary::{FailureRecord, RunSummary};

#[cfg(test)]
mod tests;
