//! Defensive decoder for the v1 trace format.
//!
//! Input is untrusted: it comes from test processes that may have crashed
//! mid-write. Every read is bounds-checked through [`Reader`], payload sizes are
//! capped before anything is copied, and nesting is tracked on an explicit
//! stack, so decoding never panics, never recurses on input depth and runs in
//! time linear in the input length.

use crate::error::TraceError;
use crate::trace::format::{
    Invoke, InvokeEvent, RecordTag, RuntimeCall, Trace, Transaction, TxEvent, HEADER_LEN, MAGIC,
    MAX_INVOKE_DEPTH, MAX_PAYLOAD_LEN, RECORD_HEADER_LEN, STATUS_COMMITTED, STATUS_FAILED, VERSION,
};

/// Bounds-checked cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TraceError> {
        let truncated = TraceError::Truncated {
            offset: self.pos,
            needed: n,
            available: self.remaining(),
        };
        let end = self.pos.checked_add(n).ok_or_else(|| truncated.clone())?;
        let slice = self.data.get(self.pos..end).ok_or(truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, TraceError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, TraceError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// A framed record, not yet checked against the grammar.
struct RawRecord<'a> {
    tag: RecordTag,
    offset: usize,
    payload: &'a [u8],
}

fn read_header(reader: &mut Reader<'_>) -> Result<(), TraceError> {
    if reader.remaining() < HEADER_LEN {
        // Distinguish garbage from a file cut short inside the magic.
        let seen = &reader.data[..reader.remaining()];
        if !MAGIC.starts_with(seen) {
            return Err(TraceError::BadMagic);
        }
    }
    let magic = reader.take(MAGIC.len())?;
    if magic != MAGIC {
        return Err(TraceError::BadMagic);
    }
    match reader.u8()? {
        VERSION => Ok(()),
        other => Err(TraceError::UnsupportedVersion(other)),
    }
}

fn read_record<'a>(reader: &mut Reader<'a>) -> Result<RawRecord<'a>, TraceError> {
    let offset = reader.pos;
    if reader.remaining() < RECORD_HEADER_LEN {
        return Err(TraceError::Truncated {
            offset,
            needed: RECORD_HEADER_LEN,
            available: reader.remaining(),
        });
    }
    let tag_byte = reader.u8()?;
    let tag = RecordTag::try_from(tag_byte).map_err(|tag| TraceError::UnknownTag { tag, offset })?;
    let len = reader.u32()? as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(TraceError::PayloadTooLarge {
            offset,
            len,
            limit: MAX_PAYLOAD_LEN,
        });
    }
    let payload = reader.take(len)?;
    Ok(RawRecord { tag, offset, payload })
}

fn size_mismatch(record: RecordTag, offset: usize, detail: impl Into<String>) -> TraceError {
    TraceError::SizeMismatch {
        record: record.name(),
        offset,
        detail: detail.into(),
    }
}

fn unexpected(record: RecordTag, offset: usize, detail: &'static str) -> TraceError {
    TraceError::UnexpectedRecord {
        record: record.name(),
        offset,
        detail,
    }
}

/// Parses a RUNTIME_CALL payload. Inner framing errors are reported as size
/// mismatches against the enclosing record.
fn decode_runtime_call(payload: &[u8], offset: usize) -> Result<RuntimeCall, TraceError> {
    let tag = RecordTag::RuntimeCall;
    let mut inner = Reader::new(payload);
    let func_id = inner
        .u8()
        .map_err(|_| size_mismatch(tag, offset, "missing function id"))?;
    let argc = inner
        .u8()
        .map_err(|_| size_mismatch(tag, offset, "missing argument count"))?;
    let mut args = Vec::with_capacity(argc as usize);
    for index in 0..argc {
        let arg_len = inner.u32().map_err(|_| {
            size_mismatch(tag, offset, format!("argument {index} length truncated"))
        })? as usize;
        let arg = inner.take(arg_len).map_err(|_| {
            size_mismatch(
                tag,
                offset,
                format!("argument {index} declares {arg_len} bytes, {} left", inner.remaining()),
            )
        })?;
        args.push(arg.to_vec());
    }
    if !inner.is_empty() {
        return Err(size_mismatch(
            tag,
            offset,
            format!("{} trailing bytes after {argc} arguments", inner.remaining()),
        ));
    }
    Ok(RuntimeCall { func_id, args })
}

/// State of the transaction currently being decoded.
struct OpenTransaction {
    tx: Transaction,
    invokes: Vec<Invoke>,
}

/// Decodes and structurally validates a complete trace.
///
/// Succeeds only if the trace is well-formed and contains at least one
/// committed transaction.
pub fn decode(data: &[u8]) -> Result<Trace, TraceError> {
    let mut reader = Reader::new(data);
    read_header(&mut reader)?;

    let mut trace = Trace::default();
    let mut open: Option<OpenTransaction> = None;

    while !reader.is_empty() {
        let record = read_record(&mut reader)?;
        let RawRecord { tag, offset, payload } = record;
        let mut closes_transaction = false;

        match (tag, open.as_mut()) {
            (RecordTag::TxStart, Some(_)) => {
                return Err(unexpected(tag, offset, "previous transaction not terminated"));
            }
            (RecordTag::TxStart, None) => {
                open = Some(OpenTransaction {
                    tx: Transaction {
                        context: payload.to_vec(),
                        events: Vec::new(),
                        committed: false,
                    },
                    invokes: Vec::new(),
                });
            }
            (_, None) => return Err(unexpected(tag, offset, "record outside a transaction")),
            (RecordTag::Instruction, Some(current)) => {
                if payload.is_empty() {
                    return Err(size_mismatch(tag, offset, "empty instruction payload"));
                }
                if !current.invokes.is_empty() {
                    return Err(unexpected(tag, offset, "instruction inside an open invoke"));
                }
                current.tx.events.push(TxEvent::Instruction(payload.to_vec()));
            }
            (RecordTag::InvokeStart, Some(current)) => {
                if !payload.is_empty() {
                    return Err(size_mismatch(
                        tag,
                        offset,
                        format!("expected empty payload, found {} bytes", payload.len()),
                    ));
                }
                if current.invokes.len() >= MAX_INVOKE_DEPTH {
                    return Err(TraceError::NestingTooDeep {
                        offset,
                        limit: MAX_INVOKE_DEPTH,
                    });
                }
                current.invokes.push(Invoke::default());
            }
            (RecordTag::RuntimeCall, Some(current)) => {
                let invoke = current
                    .invokes
                    .last_mut()
                    .ok_or_else(|| unexpected(tag, offset, "runtime call outside an invoke"))?;
                let call = decode_runtime_call(payload, offset)?;
                invoke.events.push(InvokeEvent::Call(call));
            }
            (RecordTag::InvokeEnd, Some(current)) => {
                let mut finished = current
                    .invokes
                    .pop()
                    .ok_or_else(|| unexpected(tag, offset, "no open invoke to close"))?;
                finished.output = payload.to_vec();
                match current.invokes.last_mut() {
                    Some(parent) => parent.events.push(InvokeEvent::Invoke(finished)),
                    None => current.tx.events.push(TxEvent::Invoke(finished)),
                }
            }
            (RecordTag::TxEnd, Some(current)) => {
                if payload.len() != 1 {
                    return Err(size_mismatch(
                        tag,
                        offset,
                        format!("expected 1 status byte, found {}", payload.len()),
                    ));
                }
                if !current.invokes.is_empty() {
                    return Err(unexpected(tag, offset, "transaction ended with an open invoke"));
                }
                current.tx.committed = match payload[0] {
                    STATUS_COMMITTED => true,
                    STATUS_FAILED => false,
                    status => return Err(TraceError::InvalidStatus { status, offset }),
                };
                closes_transaction = true;
            }
        }

        if closes_transaction {
            if let Some(finished) = open.take() {
                trace.transactions.push(finished.tx);
            }
        }
    }

    if open.is_some() {
        return Err(TraceError::UnterminatedTransaction);
    }
    if trace.committed_count() == 0 {
        return Err(TraceError::NoCommittedTransaction);
    }
    tracing::debug!(
        transactions = trace.transactions.len(),
        bytes = data.len(),
        "decoded trace"
    );
    Ok(trace)
}

/// Counters reported by the validator for an accepted trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TraceStats {
    pub transactions: usize,
    pub committed: usize,
    pub instructions: usize,
    pub invokes: usize,
    pub runtime_calls: usize,
    pub max_depth: usize,
}

impl TraceStats {
    pub fn of(trace: &Trace) -> Self {
        let mut stats = TraceStats {
            transactions: trace.transactions.len(),
            committed: trace.committed_count(),
            ..TraceStats::default()
        };
        for tx in &trace.transactions {
            for event in &tx.events {
                match event {
                    TxEvent::Instruction(_) => stats.instructions += 1,
                    TxEvent::Invoke(invoke) => stats.add_invoke(invoke, 1),
                }
            }
        }
        stats
    }

    fn add_invoke(&mut self, invoke: &Invoke, depth: usize) {
        self.invokes += 1;
        self.max_depth = self.max_depth.max(depth);
        for event in &invoke.events {
            match event {
                InvokeEvent::Call(_) => self.runtime_calls += 1,
                // Depth is bounded by MAX_INVOKE_DEPTH at decode time.
                InvokeEvent::Invoke(nested) => self.add_invoke(nested, depth + 1),
            }
        }
    }
}

/// Decodes `data` and returns its counters. This is the validator's check.
pub fn validate(data: &[u8]) -> Result<TraceStats, TraceError> {
    decode(data).map(|trace| TraceStats::of(&trace))
}
