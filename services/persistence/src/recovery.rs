//! Recovery: journal replay on boot
//!
//! 1. Read and validate the whole journal
//! 2. Hand every valid entry, in sequence order, to a [`JournalApplier`]
//! 3. Cut a torn tail off the last file so new appends follow valid data
//! 4. Report where the writer must resume
//!
//! [`replay_read_only`] runs steps 1, 2 and 4 and never touches the files.

use crate::journal::JournalEntry;
use crate::reader::{JournalReader, ReaderError, TornTail};
use std::fs::OpenOptions;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Apply error at sequence {sequence}: {detail}")]
    Apply { sequence: u64, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Applier ─────────────────────────────────────────────────────────

/// Consumer of replayed journal entries.
///
/// The ledger implements this to rebuild its state; an error aborts replay.
pub trait JournalApplier {
    fn apply(&mut self, entry: &JournalEntry) -> Result<(), String>;
}

// ── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub entries_applied: u64,
    pub last_sequence: Option<u64>,
    pub torn_tail: Option<TornTail>,
    pub elapsed_ms: u64,
}

impl ReplayReport {
    /// Sequence the journal writer must use for its next append
    pub fn next_sequence(&self) -> u64 {
        self.last_sequence.map_or(1, |s| s + 1)
    }
}

// ── Replay ──────────────────────────────────────────────────────────

/// Replay every valid entry under `dir` into `applier`.
///
/// A torn tail is truncated away on disk once all valid entries have been
/// applied successfully.
pub fn replay(dir: &Path, applier: &mut dyn JournalApplier) -> Result<ReplayReport, RecoveryError> {
    replay_with(dir, applier, true)
}

/// Replay like [`replay`], but leave a torn tail in place
///
/// For inspection tools: the tail is still reported, and the next
/// [`replay`] will repair it.
pub fn replay_read_only(
    dir: &Path,
    applier: &mut dyn JournalApplier,
) -> Result<ReplayReport, RecoveryError> {
    replay_with(dir, applier, false)
}

fn replay_with(
    dir: &Path,
    applier: &mut dyn JournalApplier,
    repair: bool,
) -> Result<ReplayReport, RecoveryError> {
    let start = Instant::now();
    let reader = JournalReader::open(dir)?;
    let outcome = reader.read_all()?;

    info!(
        dir = %dir.display(),
        files = reader.files().len(),
        entries = outcome.entries.len(),
        "journal replay started"
    );

    for entry in &outcome.entries {
        applier.apply(entry).map_err(|detail| RecoveryError::Apply {
            sequence: entry.sequence,
            detail,
        })?;
    }

    match &outcome.torn_tail {
        Some(tail) if repair => {
            warn!(
                file = %tail.file.display(),
                valid_len = tail.valid_len,
                dropped_bytes = tail.dropped_bytes,
                detail = %tail.detail,
                "dropping torn journal tail"
            );
            repair_tail(tail)?;
        }
        Some(tail) => {
            warn!(
                file = %tail.file.display(),
                valid_len = tail.valid_len,
                dropped_bytes = tail.dropped_bytes,
                detail = %tail.detail,
                "torn journal tail ignored, file left unchanged"
            );
        }
        None => {}
    }

    let report = ReplayReport {
        entries_applied: outcome.entries.len() as u64,
        last_sequence: outcome.last_sequence(),
        torn_tail: outcome.torn_tail,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        entries_applied = report.entries_applied,
        last_sequence = ?report.last_sequence,
        elapsed_ms = report.elapsed_ms,
        "journal replay complete"
    );
    Ok(report)
}

/// Truncate the damaged file back to its valid prefix.
pub fn repair_tail(tail: &TornTail) -> Result<(), RecoveryError> {
    let file = OpenOptions::new().write(true).open(&tail.file)?;
    file.set_len(tail.valid_len)?;
    file.sync_all()?;
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{list_journal_files, JournalConfig, JournalWriter};
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Collecting {
        sequences: Vec<u64>,
        fail_at: Option<u64>,
    }

    impl JournalApplier for Collecting {
        fn apply(&mut self, entry: &JournalEntry) -> Result<(), String> {
            if Some(entry.sequence) == self.fail_at {
                return Err("rejected".into());
            }
            self.sequences.push(entry.sequence);
            Ok(())
        }
    }

    fn write_entries(dir: &Path, count: u64) {
        let mut writer = JournalWriter::open(JournalConfig::new(dir)).unwrap();
        for i in 0..count {
            writer.write_entry(i as i64, "submit", vec![i as u8; 8]).unwrap();
        }
    }

    #[test]
    fn test_replay_empty_journal() {
        let tmp = TempDir::new().unwrap();
        let mut applier = Collecting::default();
        let report = replay(tmp.path(), &mut applier).unwrap();

        assert_eq!(report.entries_applied, 0);
        assert_eq!(report.next_sequence(), 1);
        assert!(applier.sequences.is_empty());
    }

    #[test]
    fn test_replay_applies_in_order() {
        let tmp = TempDir::new().unwrap();
        write_entries(tmp.path(), 10);

        let mut applier = Collecting::default();
        let report = replay(tmp.path(), &mut applier).unwrap();

        assert_eq!(applier.sequences, (1..=10).collect::<Vec<_>>());
        assert_eq!(report.last_sequence, Some(10));
        assert_eq!(report.next_sequence(), 11);
    }

    #[test]
    fn test_torn_tail_repaired_then_writer_resumes() {
        let tmp = TempDir::new().unwrap();
        write_entries(tmp.path(), 4);

        let path = list_journal_files(tmp.path()).unwrap()[0].clone();
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 5]).unwrap();

        let mut applier = Collecting::default();
        let report = replay(tmp.path(), &mut applier).unwrap();
        assert_eq!(report.last_sequence, Some(3));
        assert!(report.torn_tail.is_some());

        // New appends must be readable after the repaired prefix
        let mut writer =
            JournalWriter::resume(JournalConfig::new(tmp.path()), report.next_sequence()).unwrap();
        writer.write_entry(99, "cancel", vec![]).unwrap();
        drop(writer);

        let mut applier = Collecting::default();
        let report = replay(tmp.path(), &mut applier).unwrap();
        assert_eq!(applier.sequences, vec![1, 2, 3, 4]);
        assert!(report.torn_tail.is_none());
    }

    #[test]
    fn test_read_only_replay_leaves_torn_tail() {
        let tmp = TempDir::new().unwrap();
        write_entries(tmp.path(), 3);

        let path = list_journal_files(tmp.path()).unwrap()[0].clone();
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 5]).unwrap();
        let torn_len = fs::metadata(&path).unwrap().len();

        let mut applier = Collecting::default();
        let report = replay_read_only(tmp.path(), &mut applier).unwrap();
        assert_eq!(applier.sequences, vec![1, 2]);
        assert!(report.torn_tail.is_some());
        assert_eq!(fs::metadata(&path).unwrap().len(), torn_len);

        // A regular replay still sees and repairs it
        let report = replay(tmp.path(), &mut Collecting::default()).unwrap();
        let tail = report.torn_tail.unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), tail.valid_len);
    }

    #[test]
    fn test_apply_failure_aborts_replay() {
        let tmp = TempDir::new().unwrap();
        write_entries(tmp.path(), 5);

        let mut applier = Collecting {
            fail_at: Some(3),
            ..Default::default()
        };
        match replay(tmp.path(), &mut applier) {
            Err(RecoveryError::Apply { sequence, .. }) => assert_eq!(sequence, 3),
            other => panic!("Expected Apply error, got: {:?}", other),
        }
        assert_eq!(applier.sequences, vec![1, 2]);
    }
}
