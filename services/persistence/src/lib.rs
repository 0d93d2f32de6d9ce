//! Ledger Persistence Service
//!
//! Append-only journal writing, checksummed sequential reading with torn-tail
//! detection, and replay of the journal into a ledger on boot.
//!
//! One committed ledger batch is one journal entry, which is what makes a
//! matching pass all-or-nothing across a crash.

pub mod journal;
pub mod reader;
pub mod recovery;

pub use journal::{
    list_journal_files, FlushPolicy, FsyncPolicy, JournalConfig, JournalEntry, JournalError,
    JournalWriter,
};
pub use reader::{JournalReader, ReadOutcome, ReaderError, TornTail};
pub use recovery::{replay, replay_read_only, JournalApplier, RecoveryError, ReplayReport};
