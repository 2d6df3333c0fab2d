//! Canonical v1 encoder.
//!
//! Encoding is a pure function of the decoded [`Trace`], so
//! `encode(decode(x))` is the canonical form of any well-formed `x`.

use crate::trace::format::{
    Invoke, InvokeEvent, RecordTag, RuntimeCall, Trace, Transaction, TxEvent, MAGIC,
    MAX_PAYLOAD_LEN, MAX_RUNTIME_CALL_ARGS, STATUS_COMMITTED, STATUS_FAILED, VERSION,
};

/// Appends framed records to a byte buffer.
#[derive(Debug, Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a buffer with the file header already written.
    pub fn with_header() -> Self {
        let mut writer = Self::new();
        writer.buf.extend_from_slice(&MAGIC);
        writer.buf.push(VERSION);
        writer
    }

    /// Appends one record. `payload` must not exceed [`MAX_PAYLOAD_LEN`]; the
    /// recorder checks this before calling in, and decoded traces satisfy it.
    pub fn record(&mut self, tag: RecordTag, payload: &[u8]) -> &mut Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_LEN, "{} payload over limit", tag.name());
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    pub fn tx_start(&mut self, context: &[u8]) -> &mut Self {
        self.record(RecordTag::TxStart, context)
    }

    pub fn instruction(&mut self, instruction: &[u8]) -> &mut Self {
        self.record(RecordTag::Instruction, instruction)
    }

    pub fn invoke_start(&mut self) -> &mut Self {
        self.record(RecordTag::InvokeStart, &[])
    }

    pub fn runtime_call(&mut self, func_id: u8, args: &[Vec<u8>]) -> &mut Self {
        let payload = runtime_call_payload(func_id, args);
        self.record(RecordTag::RuntimeCall, &payload)
    }

    pub fn invoke_end(&mut self, output: &[u8]) -> &mut Self {
        self.record(RecordTag::InvokeEnd, output)
    }

    pub fn tx_end(&mut self, committed: bool) -> &mut Self {
        let status = if committed { STATUS_COMMITTED } else { STATUS_FAILED };
        self.record(RecordTag::TxEnd, &[status])
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// RUNTIME_CALL payload: func_id, argc, then each argument length-prefixed.
///
/// At most 255 arguments are representable. [`TraceRecorder`] rejects longer
/// lists; here the extra arguments are dropped with a warning.
///
/// [`TraceRecorder`]: crate::trace::recorder::TraceRecorder
pub fn runtime_call_payload(func_id: u8, args: &[Vec<u8>]) -> Vec<u8> {
    if args.len() > MAX_RUNTIME_CALL_ARGS {
        tracing::warn!(func_id, argc = args.len(), "runtime call argument list truncated to 255");
    }
    let args = &args[..args.len().min(MAX_RUNTIME_CALL_ARGS)];
    let mut payload = Vec::with_capacity(runtime_call_payload_len(args));
    payload.push(func_id);
    payload.push(args.len() as u8);
    for arg in args {
        payload.extend_from_slice(&(arg.len() as u32).to_le_bytes());
        payload.extend_from_slice(arg);
    }
    payload
}

/// Encoded size of a RUNTIME_CALL payload carrying `args`.
pub fn runtime_call_payload_len(args: &[Vec<u8>]) -> usize {
    args.iter()
        .fold(2usize, |total, arg| total.saturating_add(4).saturating_add(arg.len()))
}

fn write_invoke(writer: &mut RecordWriter, invoke: &Invoke) {
    writer.invoke_start();
    for event in &invoke.events {
        match event {
            InvokeEvent::Call(RuntimeCall { func_id, args }) => {
                writer.runtime_call(*func_id, args);
            }
            InvokeEvent::Invoke(nested) => write_invoke(writer, nested),
        }
    }
    writer.invoke_end(&invoke.output);
}

pub fn write_transaction(writer: &mut RecordWriter, tx: &Transaction) {
    writer.tx_start(&tx.context);
    for event in &tx.events {
        match event {
            TxEvent::Instruction(bytes) => {
                writer.instruction(bytes);
            }
            TxEvent::Invoke(invoke) => write_invoke(writer, invoke),
        }
    }
    writer.tx_end(tx.committed);
}

/// Encodes a whole trace including the header.
pub fn encode(trace: &Trace) -> Vec<u8> {
    let mut writer = RecordWriter::with_header();
    for tx in &trace.transactions {
        write_transaction(&mut writer, tx);
    }
    writer.into_bytes()
}
