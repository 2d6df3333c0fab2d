#![no_main]

// Arbitrary bytes must never panic the decoder, and anything it accepts must
// re-encode to exactly the input.

use libfuzzer_sys::fuzz_target;
use runtime_fuzz_corpus::trace::{decode, encode};

fuzz_target!(|data: &[u8]| {
    if let Ok(trace) = decode(data) {
        assert_eq!(encode(&trace), data);
    }
});
