#![no_main]

// Builds record streams from structured input so the grammar checks are
// reached far more often than with raw bytes, then checks that normalizing
// an accepted trace is stable.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use runtime_fuzz_corpus::extract::normalize;
use runtime_fuzz_corpus::trace::{decode, RecordWriter};

#[derive(Arbitrary, Debug)]
enum Op {
    TxStart(Vec<u8>),
    Instruction(Vec<u8>),
    InvokeStart,
    RuntimeCall(u8, Vec<Vec<u8>>),
    InvokeEnd(Vec<u8>),
    TxEnd(bool),
}

fuzz_target!(|ops: Vec<Op>| {
    let mut writer = RecordWriter::with_header();
    for op in &ops {
        match op {
            Op::TxStart(ctx) => writer.tx_start(ctx),
            Op::Instruction(ins) => writer.instruction(ins),
            Op::InvokeStart => writer.invoke_start(),
            Op::RuntimeCall(id, args) => writer.runtime_call(*id, args),
            Op::InvokeEnd(out) => writer.invoke_end(out),
            Op::TxEnd(committed) => writer.tx_end(*committed),
        };
    }
    let Ok(trace) = decode(writer.as_bytes()) else {
        return;
    };
    let seed = normalize(&trace).expect("accepted traces hold a committed transaction");
    let reparsed = decode(&seed).expect("normalized seed must decode");
    assert!(reparsed.transactions.iter().all(|tx| tx.committed));
    assert_eq!(normalize(&reparsed).as_deref(), Some(seed.as_slice()));
});
