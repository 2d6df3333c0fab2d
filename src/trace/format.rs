//! Trace wire format, version 1.
//!
//! ```text
//! trace  := header transaction+
//! header := "RTRC" version:u8
//! record := tag:u8 len:u32le payload[len]
//! ```
//!
//! A transaction is `TX_START .. TX_END`. Inside it, `INSTRUCTION` only appears
//! at invoke depth 0, `RUNTIME_CALL` only inside an invoke, and `TX_END` only
//! once every `INVOKE_START` has been closed.

pub const MAGIC: [u8; 4] = *b"RTRC";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = MAGIC.len() + 1;

/// Tag byte plus little-endian u32 length.
pub const RECORD_HEADER_LEN: usize = 1 + 4;

/// Upper bound on a single record payload. Anything larger is treated as
/// corruption rather than allocated.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// RUNTIME_CALL argument count is a single byte.
pub const MAX_RUNTIME_CALL_ARGS: usize = u8::MAX as usize;

/// Maximum invoke nesting inside one transaction.
pub const MAX_INVOKE_DEPTH: usize = 64;

pub const STATUS_FAILED: u8 = 0;
pub const STATUS_COMMITTED: u8 = 1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordTag {
    TxStart = 0x01,
    Instruction = 0x02,
    InvokeStart = 0x03,
    RuntimeCall = 0x04,
    InvokeEnd = 0x05,
    TxEnd = 0x06,
}

impl RecordTag {
    pub fn name(self) -> &'static str {
        match self {
            RecordTag::TxStart => "TX_START",
            RecordTag::Instruction => "INSTRUCTION",
            RecordTag::InvokeStart => "INVOKE_START",
            RecordTag::RuntimeCall => "RUNTIME_CALL",
            RecordTag::InvokeEnd => "INVOKE_END",
            RecordTag::TxEnd => "TX_END",
        }
    }
}

impl TryFrom<u8> for RecordTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(RecordTag::TxStart),
            0x02 => Ok(RecordTag::Instruction),
            0x03 => Ok(RecordTag::InvokeStart),
            0x04 => Ok(RecordTag::RuntimeCall),
            0x05 => Ok(RecordTag::InvokeEnd),
            0x06 => Ok(RecordTag::TxEnd),
            other => Err(other),
        }
    }
}

/// One intercepted runtime call made by invoked code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeCall {
    pub func_id: u8,
    pub args: Vec<Vec<u8>>,
}

/// Everything recorded between an `INVOKE_START` and its `INVOKE_END`, in order.
/// Nested invokes appear inline as [`InvokeEvent::Invoke`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Invoke {
    pub events: Vec<InvokeEvent>,
    pub output: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvokeEvent {
    Call(RuntimeCall),
    Invoke(Invoke),
}

/// Top-level items of a transaction body, in recording order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TxEvent {
    Instruction(Vec<u8>),
    Invoke(Invoke),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transaction {
    pub context: Vec<u8>,
    pub events: Vec<TxEvent>,
    pub committed: bool,
}

impl Transaction {
    pub fn instruction_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TxEvent::Instruction(_)))
            .count()
    }
}

/// A fully decoded trace file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Trace {
    pub transactions: Vec<Transaction>,
}

impl Trace {
    pub fn committed_count(&self) -> usize {
        self.transactions.iter().filter(|t| t.committed).count()
    }
}
