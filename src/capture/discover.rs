//! Test discovery: turns the test binary's `--list` output into test cases.

use std::collections::HashSet;

use crate::sanitize::SanitizedNames;
use crate::types::TestCase;

/// Suffix libtest prints after an executable test in `--list` output.
/// Benchmarks (`: benchmark`) and group/summary lines never carry it.
pub const LEAF_MARKER: &str = ": test";

/// Returns the identifier of a leaf-test line, or `None` for anything else.
///
/// Trailing whitespace after the marker is accepted, so CRLF listings parse.
pub fn leaf_identifier(line: &str) -> Option<&str> {
    let line = line.trim_end();
    let ident = line.strip_suffix(LEAF_MARKER)?.trim();
    if ident.is_empty() {
        None
    } else {
        Some(ident)
    }
}

/// Parses listing output into test cases, in listing order.
///
/// A test listed twice (e.g. by two test binaries of one crate) is kept once,
/// since running it by exact name executes every copy anyway.
pub fn parse_listing(listing: &str) -> Vec<TestCase> {
    let mut names = SanitizedNames::new();
    let mut seen = HashSet::new();
    let mut tests = Vec::new();
    for ident in listing.lines().filter_map(leaf_identifier) {
        if !seen.insert(ident) {
            tracing::debug!(test = ident, "duplicate listing entry ignored");
            continue;
        }
        tests.push(names.assign(ident));
    }
    tests
}
