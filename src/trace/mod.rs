pub mod decode;
pub mod encode;
pub mod format;
pub mod recorder;

// Re-export the entry points so `crate::trace::*` covers the common paths.
pub use decode::{decode, validate, TraceStats};
pub use encode::{encode, RecordWriter};
pub use format::{Invoke, InvokeEvent, RecordTag, RuntimeCall, Trace, Transaction, TxEvent};
pub use recorder::TraceRecorder;
