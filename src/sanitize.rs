//!
//! Identifier sanitization: maps test identifiers onto artifact file names.

use std::collections::{HashMap, HashSet};

use crate::types::TestCase;

/// Character substituted for everything outside `[a-z]`.
pub const FILLER: char = '_';

/// Characters of the BLAKE3 digest appended to a colliding name.
const COLLISION_SUFFIX_LEN: usize = 8;

/// Lower-cases `raw` and replaces every character outside `[a-z]` with [`FILLER`].
///
/// Total and deterministic. Multi-char lowercase expansions are kept
/// char-by-char, so the output length in chars can exceed the input's.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_lowercase() { c } else { FILLER })
        .collect()
}

/// Assigns sanitized names for one run, resolving collisions.
///
/// The first identifier to claim a sanitized name keeps it. A later, distinct
/// identifier mapping to the same name gets `_<hash>` appended, where `<hash>`
/// is a prefix of the BLAKE3 digest of its raw identifier rendered over
/// `[a-p]` so the result stays inside the sanitized alphabet. If that name is
/// taken too, `_<n>` (also over `[a-p]`) is appended with an increasing
/// counter until a free name is found. Every name is handed out at most once.
#[derive(Debug, Default)]
pub struct SanitizedNames {
    claimed: HashSet<String>,
    by_raw: HashMap<String, String>,
}

impl SanitizedNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the test case for `raw`, reusing the earlier assignment when the
    /// same raw identifier is seen twice.
    pub fn assign(&mut self, raw: &str) -> TestCase {
        if let Some(name) = self.by_raw.get(raw) {
            return TestCase::new(raw, name.clone());
        }
        let base = sanitize(raw);
        let mut name = base.clone();
        if self.claimed.contains(&name) {
            let digest = alphabetic_digest(raw);
            name = format!("{base}{FILLER}{digest}");
            let mut round: u64 = 1;
            while self.claimed.contains(&name) {
                name = format!("{base}{FILLER}{digest}{FILLER}{}", alphabetic_counter(round));
                round += 1;
            }
            tracing::debug!(raw, name = %name, "disambiguated colliding test identifier");
        }
        self.claimed.insert(name.clone());
        self.by_raw.insert(raw.to_owned(), name.clone());
        TestCase::new(raw, name)
    }
}

fn alphabetic_digest(raw: &str) -> String {
    blake3::hash(raw.as_bytes())
        .as_bytes()
        .iter()
        .take(COLLISION_SUFFIX_LEN / 2)
        .flat_map(|b| [b >> 4, b & 0x0f])
        .map(nibble_letter)
        .collect()
}

/// `n` in base 16 with digits `a`..`p`.
fn alphabetic_counter(n: u64) -> String {
    format!("{n:x}")
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| nibble_letter(d as u8))
        .collect()
}

fn nibble_letter(nibble: u8) -> char {
    (b'a' + nibble) as char
}
