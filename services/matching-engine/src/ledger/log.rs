//! Durable log behind the ledger store
//!
//! The store calls `append` after a batch validated and before it is
//! applied; an `Err` aborts the commit with the store untouched.

use persistence::{JournalConfig, JournalError, JournalWriter};
use tracing::error;
use types::errors::StoreError;

use super::mutation::LedgerBatch;

pub trait LedgerLog: Send + Sync {
    fn append(&mut self, batch: &LedgerBatch) -> Result<(), StoreError>;

    /// Force everything appended so far to durable storage
    fn sync(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn describe(&self) -> String;
}

/// In-memory ledger; nothing survives the process
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl LedgerLog for NullLog {
    fn append(&mut self, _batch: &LedgerBatch) -> Result<(), StoreError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Journal-backed log: one bincode-encoded batch per journal entry
pub struct JournalLog {
    writer: JournalWriter,
    /// Set when a failed append could not be rolled back; the file may
    /// hold a frame the store never installed
    poisoned: bool,
}

impl JournalLog {
    /// Open the journal for appending at `next_sequence`
    pub fn open(config: JournalConfig, next_sequence: u64) -> Result<Self, StoreError> {
        let writer = JournalWriter::resume(config, next_sequence)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(Self {
            writer,
            poisoned: false,
        })
    }

    pub fn next_sequence(&self) -> u64 {
        self.writer.next_sequence()
    }
}

impl LedgerLog for JournalLog {
    fn append(&mut self, batch: &LedgerBatch) -> Result<(), StoreError> {
        if self.poisoned {
            return Err(StoreError::Write(
                "journal unavailable after an earlier write failure".into(),
            ));
        }

        let payload = bincode::serialize(batch).map_err(|e| StoreError::Write(e.to_string()))?;

        if let Err(e) = self.writer.write_entry(batch.timestamp, batch.kind.as_str(), payload) {
            self.poisoned = matches!(e, JournalError::RollbackFailed { .. });
            error!(error = %e, poisoned = self.poisoned, "journal append failed");
            return Err(StoreError::Write(e.to_string()));
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.writer
            .sync()
            .map_err(|e| StoreError::Write(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("journal:{}", self.writer.current_file_path().display())
    }
}

/// Decode a journaled batch
pub fn decode_batch(payload: &[u8]) -> Result<LedgerBatch, StoreError> {
    bincode::deserialize(payload).map_err(|e| StoreError::Read(e.to_string()))
}
