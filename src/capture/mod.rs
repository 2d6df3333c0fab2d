pub mod discover;
pub mod harness;
pub mod runner;

pub use discover::{parse_listing, LEAF_MARKER};
pub use harness::{run_bounded, CargoTestHarness, TestHarness};
pub use runner::{CaptureResult, CaptureRunner};
