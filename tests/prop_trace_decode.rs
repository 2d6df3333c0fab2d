use proptest::prelude::*;
use runtime_fuzz_corpus::error::TraceError;
use runtime_fuzz_corpus::extract::normalize;
use runtime_fuzz_corpus::trace::{
    decode, encode, validate, Invoke, InvokeEvent, RuntimeCall, Trace, Transaction, TxEvent,
};

fn bytes(max: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..max)
}

fn runtime_call() -> impl Strategy<Value = RuntimeCall> {
    (any::<u8>(), proptest::collection::vec(bytes(16), 0..4))
        .prop_map(|(func_id, args)| RuntimeCall { func_id, args })
}

fn invoke() -> impl Strategy<Value = Invoke> {
    let leaf = (proptest::collection::vec(runtime_call(), 0..3), bytes(8)).prop_map(|(calls, output)| Invoke {
        events: calls.into_iter().map(InvokeEvent::Call).collect(),
        output,
    });
    leaf.prop_recursive(4, 24, 4, |inner| {
        (
            proptest::collection::vec(
                prop_oneof![
                    runtime_call().prop_map(InvokeEvent::Call),
                    inner.prop_map(InvokeEvent::Invoke),
                ],
                0..4,
            ),
            bytes(8),
        )
            .prop_map(|(events, output)| Invoke { events, output })
    })
}

fn transaction(committed: impl Strategy<Value = bool>) -> impl Strategy<Value = Transaction> {
    let event = prop_oneof![
        proptest::collection::vec(any::<u8>(), 1..12).prop_map(TxEvent::Instruction),
        invoke().prop_map(TxEvent::Invoke),
    ];
    (bytes(12), proptest::collection::vec(event, 0..5), committed)
        .prop_map(|(context, events, committed)| Transaction { context, events, committed })
}

/// A trace with at least one committed transaction, in any position.
fn valid_trace() -> impl Strategy<Value = Trace> {
    (
        proptest::collection::vec(transaction(any::<bool>()), 0..3),
        transaction(Just(true)),
        proptest::collection::vec(transaction(any::<bool>()), 0..3),
    )
        .prop_map(|(mut before, committed, after)| {
            before.push(committed);
            before.extend(after);
            Trace { transactions: before }
        })
}

proptest! {
    /// The decoder returns an error, never panics, on arbitrary input.
    #[test]
    fn prop_arbitrary_bytes_never_panic(data in bytes(256)) {
        let _ = decode(&data);
    }

    /// Same, with a valid header in front so the record parser is reached.
    #[test]
    fn prop_arbitrary_records_never_panic(data in bytes(256)) {
        let mut input = b"RTRC\x01".to_vec();
        input.extend_from_slice(&data);
        let _ = decode(&input);
    }

    #[test]
    fn prop_encoded_traces_decode_back(trace in valid_trace()) {
        let bytes = encode(&trace);
        prop_assert_eq!(decode(&bytes), Ok(trace));
    }

    /// Every strict prefix of a single-transaction trace is rejected.
    #[test]
    fn prop_truncation_rejected(tx in transaction(Just(true)), cut in any::<prop::sample::Index>()) {
        let bytes = encode(&Trace { transactions: vec![tx] });
        let len = cut.index(bytes.len());
        prop_assert!(validate(&bytes[..len]).is_err());
    }

    /// Normalization keeps exactly the committed transactions and is stable.
    #[test]
    fn prop_normalize_is_idempotent(trace in valid_trace()) {
        let seed = normalize(&trace).unwrap();
        let reparsed = decode(&seed).unwrap();
        prop_assert_eq!(reparsed.transactions.len(), trace.committed_count());
        prop_assert!(reparsed.transactions.iter().all(|tx| tx.committed));
        prop_assert_eq!(normalize(&reparsed), Some(seed));
    }
}

#[test]
fn failed_only_trace_has_no_seed() {
    let trace = Trace {
        transactions: vec![Transaction { context: vec![], events: vec![], committed: false }],
    };
    assert_eq!(normalize(&trace), None);
    assert_eq!(decode(&encode(&trace)), Err(TraceError::NoCommittedTransaction));
}
