//! Journal reader: sequential reads with corruption detection
//!
//! Reads every journal file in index order, validating CRC32C checksums and
//! sequence continuity. Only the very end of the journal may be damaged: a
//! torn tail (a partial or checksum-failing final entry in the last file) is
//! dropped and reported, while damage anywhere else is an error because
//! valid history would follow it.

use crate::journal::{list_journal_files, JournalEntry, JournalError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Checksum mismatch in {file} at byte offset {offset}: entry seq={sequence}")]
    ChecksumMismatch {
        file: PathBuf,
        offset: u64,
        sequence: u64,
    },

    #[error("Corruption in {file} at byte offset {offset}: {detail}")]
    Corruption {
        file: PathBuf,
        offset: u64,
        detail: String,
    },

    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
}

// ── Torn tail ───────────────────────────────────────────────────────

/// Damaged bytes at the end of the last journal file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TornTail {
    pub file: PathBuf,
    /// Length of the valid prefix of `file`
    pub valid_len: u64,
    pub dropped_bytes: u64,
    pub detail: String,
}

/// Everything a full read produced.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub entries: Vec<JournalEntry>,
    pub torn_tail: Option<TornTail>,
}

impl ReadOutcome {
    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.last().map(|e| e.sequence)
    }
}

// ── Journal Reader ──────────────────────────────────────────────────

pub struct JournalReader {
    /// All journal file paths, sorted by index.
    files: Vec<PathBuf>,
}

impl JournalReader {
    /// Open a reader over all journal files in the given directory.
    ///
    /// A missing directory reads as an empty journal.
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        Ok(Self {
            files: list_journal_files(dir)?,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Read and validate the whole journal.
    pub fn read_all(&self) -> Result<ReadOutcome, ReaderError> {
        let mut outcome = ReadOutcome::default();

        for (idx, path) in self.files.iter().enumerate() {
            let is_last_file = idx + 1 == self.files.len();
            let data = fs::read(path)?;
            let mut pos = 0usize;

            while pos < data.len() {
                let damage = match JournalEntry::from_bytes(&data[pos..]) {
                    Ok((entry, consumed)) if entry.verify_checksum() => {
                        if let Some(prev) = outcome.last_sequence() {
                            if entry.sequence != prev + 1 {
                                return Err(ReaderError::SequenceGap {
                                    expected: prev + 1,
                                    got: entry.sequence,
                                });
                            }
                        }
                        outcome.entries.push(entry);
                        pos += consumed;
                        continue;
                    }
                    Ok((entry, consumed)) => {
                        if !(is_last_file && pos + consumed == data.len()) {
                            return Err(ReaderError::ChecksumMismatch {
                                file: path.clone(),
                                offset: pos as u64,
                                sequence: entry.sequence,
                            });
                        }
                        format!("checksum mismatch on final entry seq={}", entry.sequence)
                    }
                    Err(JournalError::Truncated { need, have }) if is_last_file => {
                        format!("partial entry: need {} bytes, have {}", need, have)
                    }
                    Err(JournalError::Malformed(detail))
                        if is_last_file && data[pos..].iter().all(|b| *b == 0) =>
                    {
                        format!("zero-filled tail ({})", detail)
                    }
                    Err(e) => {
                        return Err(ReaderError::Corruption {
                            file: path.clone(),
                            offset: pos as u64,
                            detail: e.to_string(),
                        });
                    }
                };

                outcome.torn_tail = Some(TornTail {
                    file: path.clone(),
                    valid_len: pos as u64,
                    dropped_bytes: (data.len() - pos) as u64,
                    detail: damage,
                });
                break;
            }
        }

        Ok(outcome)
    }

    /// Validate that a list of entries has gapless, monotonic sequences.
    pub fn validate_sequences(entries: &[JournalEntry]) -> Result<(), ReaderError> {
        for window in entries.windows(2) {
            let expected = window[0].sequence + 1;
            if window[1].sequence != expected {
                return Err(ReaderError::SequenceGap {
                    expected,
                    got: window[1].sequence,
                });
            }
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
