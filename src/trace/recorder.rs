//! Trace recorder used inside the instrumented engine.
//!
//! The engine calls into the recorder at its interception points. Records of
//! the current transaction are buffered and appended to the trace file only
//! when the transaction ends, so a process that dies mid-transaction leaves the
//! previous, complete transactions on disk.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::TraceError;
use crate::trace::encode::{runtime_call_payload_len, RecordWriter};
use crate::trace::format::{MAGIC, MAX_INVOKE_DEPTH, MAX_PAYLOAD_LEN, MAX_RUNTIME_CALL_ARGS, VERSION};

pub struct TraceRecorder {
    path: PathBuf,
    pending: RecordWriter,
    in_transaction: bool,
    invoke_depth: usize,
    transactions_written: usize,
}

impl TraceRecorder {
    /// Records to `path`. The file is truncated on the first committed write.
    pub fn create(path: impl Into<PathBuf>) -> Self {
        TraceRecorder {
            path: path.into(),
            pending: RecordWriter::new(),
            in_transaction: false,
            invoke_depth: 0,
            transactions_written: 0,
        }
    }

    /// Records to the path named by environment variable `var`, or returns
    /// `None` when the variable is unset so uninstrumented runs write nothing.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var_os(var).map(|path| Self::create(PathBuf::from(path)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn transactions_written(&self) -> usize {
        self.transactions_written
    }

    pub fn transaction_start(&mut self, context: &[u8]) -> Result<(), TraceError> {
        if self.in_transaction {
            return Err(TraceError::RecorderState("transaction already started"));
        }
        check_payload(context.len())?;
        self.pending.clear();
        self.pending.tx_start(context);
        self.in_transaction = true;
        self.invoke_depth = 0;
        Ok(())
    }

    pub fn instruction(&mut self, instruction: &[u8]) -> Result<(), TraceError> {
        self.require_transaction()?;
        if self.invoke_depth != 0 {
            return Err(TraceError::RecorderState("instruction recorded inside an invoke"));
        }
        if instruction.is_empty() {
            return Err(TraceError::RecorderState("empty instruction"));
        }
        check_payload(instruction.len())?;
        self.pending.instruction(instruction);
        Ok(())
    }

    pub fn invoke_start(&mut self) -> Result<(), TraceError> {
        self.require_transaction()?;
        if self.invoke_depth >= MAX_INVOKE_DEPTH {
            return Err(TraceError::RecorderState("invoke nesting limit reached"));
        }
        self.pending.invoke_start();
        self.invoke_depth += 1;
        Ok(())
    }

    pub fn runtime_call(&mut self, func_id: u8, args: &[Vec<u8>]) -> Result<(), TraceError> {
        self.require_transaction()?;
        if self.invoke_depth == 0 {
            return Err(TraceError::RecorderState("runtime call outside an invoke"));
        }
        if args.len() > MAX_RUNTIME_CALL_ARGS {
            return Err(TraceError::RecorderState("runtime call has more than 255 arguments"));
        }
        check_payload(runtime_call_payload_len(args))?;
        self.pending.runtime_call(func_id, args);
        Ok(())
    }

    pub fn invoke_end(&mut self, output: &[u8]) -> Result<(), TraceError> {
        self.require_transaction()?;
        if self.invoke_depth == 0 {
            return Err(TraceError::RecorderState("invoke_end without invoke_start"));
        }
        check_payload(output.len())?;
        self.pending.invoke_end(output);
        self.invoke_depth -= 1;
        Ok(())
    }

    /// Closes the transaction and appends it to the trace file.
    pub fn transaction_end(&mut self, committed: bool) -> Result<(), TraceError> {
        self.require_transaction()?;
        if self.invoke_depth != 0 {
            return Err(TraceError::RecorderState("transaction ended with an open invoke"));
        }
        self.pending.tx_end(committed);
        self.in_transaction = false;
        self.flush_pending()
    }

    /// Drops the buffered records of the open transaction, if any.
    pub fn abort_transaction(&mut self) {
        self.pending.clear();
        self.in_transaction = false;
        self.invoke_depth = 0;
    }

    fn require_transaction(&self) -> Result<(), TraceError> {
        if self.in_transaction {
            Ok(())
        } else {
            Err(TraceError::RecorderState("no transaction in progress"))
        }
    }

    fn flush_pending(&mut self) -> Result<(), TraceError> {
        let first = self.transactions_written == 0;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!first)
            .truncate(first)
            .open(&self.path)?;
        if first {
            file.write_all(&MAGIC)?;
            file.write_all(&[VERSION])?;
        }
        file.write_all(self.pending.as_bytes())?;
        file.flush()?;
        self.pending.clear();
        self.transactions_written += 1;
        tracing::trace!(path = %self.path.display(), tx = self.transactions_written, "appended transaction");
        Ok(())
    }
}

/// Keeps every buffered record decodable.
fn check_payload(len: usize) -> Result<(), TraceError> {
    if len > MAX_PAYLOAD_LEN {
        Err(TraceError::RecorderState("record payload exceeds the size limit"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::decode::{decode, TraceStats};

    #[test]
    fn recorded_file_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bin");
        let mut rec = TraceRecorder::create(&path);
        rec.transaction_start(b"ctx").unwrap();
        rec.instruction(b"CALL_METHOD").unwrap();
        rec.invoke_start().unwrap();
        rec.runtime_call(3, &[b"a".to_vec(), Vec::new()]).unwrap();
        rec.invoke_end(b"ok").unwrap();
        rec.transaction_end(true).unwrap();
        rec.transaction_start(b"").unwrap();
        rec.instruction(b"DROP").unwrap();
        rec.transaction_end(false).unwrap();

        let trace = decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(trace.transactions.len(), 2);
        assert_eq!(trace.committed_count(), 1);
        assert_eq!(rec.transactions_written(), 2);
    }

    #[test]
    fn first_write_truncates_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bin");
        std::fs::write(&path, b"stale garbage").unwrap();
        let mut rec = TraceRecorder::create(&path);
        rec.transaction_start(b"").unwrap();
        rec.instruction(b"X").unwrap();
        rec.transaction_end(true).unwrap();
        assert!(decode(&std::fs::read(&path).unwrap()).is_ok());
    }

    #[test]
    fn misuse_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = TraceRecorder::create(dir.path().join("t.bin"));
        assert!(matches!(rec.invoke_end(b""), Err(TraceError::RecorderState(_))));
        rec.transaction_start(b"").unwrap();
        assert!(rec.runtime_call(0, &[]).is_err());
        rec.invoke_start().unwrap();
        assert!(rec.instruction(b"x").is_err());
        assert!(rec.transaction_end(true).is_err());
        rec.abort_transaction();
        assert!(!dir.path().join("t.bin").exists());
    }

    #[test]
    fn oversized_payload_is_refused_before_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bin");
        let mut rec = TraceRecorder::create(&path);
        rec.transaction_start(b"ctx").unwrap();

        let huge = vec![0x42; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(rec.instruction(&huge), Err(TraceError::RecorderState(_))));
        rec.invoke_start().unwrap();
        assert!(matches!(rec.runtime_call(1, &[huge]), Err(TraceError::RecorderState(_))));
        assert!(matches!(
            rec.invoke_end(&vec![0; MAX_PAYLOAD_LEN + 1]),
            Err(TraceError::RecorderState(_))
        ));
        rec.invoke_end(b"ok").unwrap();
        rec.instruction(b"CALL_METHOD").unwrap();
        rec.transaction_end(true).unwrap();

        let trace = decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(trace.transactions[0].instruction_count(), 1);
    }

    #[test]
    fn too_many_call_arguments_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bin");
        let mut rec = TraceRecorder::create(&path);
        rec.transaction_start(b"").unwrap();
        rec.invoke_start().unwrap();

        let args = vec![Vec::new(); 300];
        assert!(matches!(rec.runtime_call(9, &args), Err(TraceError::RecorderState(_))));
        rec.runtime_call(9, &args[..MAX_RUNTIME_CALL_ARGS]).unwrap();
        rec.invoke_end(b"").unwrap();
        rec.transaction_end(true).unwrap();

        let trace = decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(TraceStats::of(&trace).runtime_calls, 1);
    }

    #[test]
    fn from_env_follows_the_named_variable() {
        let var = "RUNTIME_FUZZ_CORPUS_RECORDER_TEST_TRACE";
        assert!(TraceRecorder::from_env(var).is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.bin");
        std::env::set_var(var, &path);
        let rec = TraceRecorder::from_env(var);
        std::env::remove_var(var);

        assert_eq!(rec.unwrap().path(), path.as_path());
    }
}
