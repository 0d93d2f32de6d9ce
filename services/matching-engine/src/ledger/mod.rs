//! Ledger Store module
//!
//! Durable mapping from identifiers to orders and trades, mutated only in
//! validated, journaled batches.

pub mod log;
pub mod mutation;
pub mod store;

pub use log::{JournalLog, LedgerLog, NullLog};
pub use mutation::{BatchKind, LedgerBatch, LedgerMutation};
pub use store::{LedgerStore, RecoveredLedger};
