//! Journal writer: append-only ledger journal with checksums
//!
//! Every committed ledger batch becomes exactly one entry, so a crash can
//! leave at most one torn entry at the very end of the last file.
//!
//! # Binary Format (per entry)
//! ```text
//! [body_len:  u32]
//! [sequence:  u64]
//! [timestamp: i64]
//! [kind_len:  u16][kind: bytes]
//! [payload_len: u32][payload: bytes]
//! [checksum:  u32]  // CRC32C over sequence+timestamp+kind+payload
//! ```

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Upper bound on a single entry body; anything larger is treated as garbage
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// Fixed part of a body: seq + ts + kind_len + payload_len + crc
const MIN_BODY_LEN: usize = 8 + 8 + 2 + 4 + 4;

const FILE_PREFIX: &str = "ledger-";
const FILE_SUFFIX: &str = ".wal";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The buffer ends before the frame does (torn write)
    #[error("Truncated entry: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    /// The frame is structurally invalid
    #[error("Malformed entry: {0}")]
    Malformed(String),

    #[error("Sequence error: expected {expected}, got {got}")]
    SequenceError { expected: u64, got: u64 },

    /// A failed append left bytes behind that could not be removed
    #[error("Append failed ({cause}) and rollback failed: {rollback}")]
    RollbackFailed { cause: String, rollback: String },
}

// ── Journal Entry ───────────────────────────────────────────────────

/// A single persisted ledger batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Gapless commit sequence, starting at 1
    pub sequence: u64,
    /// Ledger time of the commit (Unix nanos)
    pub timestamp: i64,
    /// Short tag describing the batch (e.g. `submit`, `cancel`)
    pub kind: String,
    /// Encoded batch
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl JournalEntry {
    /// Create a new entry, computing the CRC32C checksum automatically.
    pub fn new(sequence: u64, timestamp: i64, kind: impl Into<String>, payload: Vec<u8>) -> Self {
        let kind = kind.into();
        let checksum = Self::compute_checksum(sequence, timestamp, &kind, &payload);
        Self {
            sequence,
            timestamp,
            kind,
            payload,
            checksum,
        }
    }

    pub fn compute_checksum(sequence: u64, timestamp: i64, kind: &str, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(16 + kind.len() + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(self.sequence, self.timestamp, &self.kind, &self.payload)
    }

    /// Serialize entry to the binary wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let kind_bytes = self.kind.as_bytes();
        let body_len = MIN_BODY_LEN + kind_bytes.len() + self.payload.len();

        let mut buf = Vec::with_capacity(4 + body_len);
        buf.extend_from_slice(&(body_len as u32).to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(kind_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(kind_bytes);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize one entry from the front of `data`.
    ///
    /// Returns `(entry, bytes_consumed)`. The checksum is decoded but not
    /// verified; callers decide how to treat a mismatch.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        let mut cursor = Cursor::new(data);

        let body_len = cursor.u32()? as usize;
        if body_len > MAX_BODY_LEN {
            return Err(JournalError::Malformed(format!(
                "implausible body length {}",
                body_len
            )));
        }
        if body_len < MIN_BODY_LEN {
            return Err(JournalError::Malformed(format!(
                "body too small: {} bytes, minimum is {}",
                body_len, MIN_BODY_LEN
            )));
        }
        let total = 4 + body_len;
        if data.len() < total {
            return Err(JournalError::Truncated {
                need: total,
                have: data.len(),
            });
        }

        // The frame is complete, so a short field here is corruption, not a torn write
        let entry = Self::decode_body(&data[4..total]).map_err(|e| match e {
            JournalError::Truncated { .. } => {
                JournalError::Malformed("field overruns entry body".into())
            }
            other => other,
        })?;
        Ok((entry, total))
    }

    fn decode_body(data: &[u8]) -> Result<Self, JournalError> {
        let mut body = Cursor::new(data);
        let sequence = body.u64()?;
        let timestamp = body.i64()?;
        let kind_len = body.u16()? as usize;
        let kind = String::from_utf8(body.take(kind_len)?.to_vec())
            .map_err(|e| JournalError::Malformed(e.to_string()))?;
        let payload_len = body.u32()? as usize;
        let payload = body.take(payload_len)?.to_vec();
        let checksum = body.u32()?;

        if body.remaining() != 0 {
            return Err(JournalError::Malformed(format!(
                "{} trailing bytes inside entry body",
                body.remaining()
            )));
        }

        Ok(Self {
            sequence,
            timestamp,
            kind,
            payload,
            checksum,
        })
    }
}

/// Little-endian field reader over a byte slice
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], JournalError> {
        if self.remaining() < n {
            return Err(JournalError::Truncated {
                need: self.pos + n,
                have: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], JournalError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, JournalError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, JournalError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, JournalError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, JournalError> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}

// ── Flush / Fsync Policies ──────────────────────────────────────────

/// Controls when buffered data is flushed to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    EveryWrite,
    EveryN(usize),
}

/// Controls when `fsync` (durable write) is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    EveryWrite,
    EveryN(usize),
    /// Fsync only on file rotation and explicit `sync`
    OnRotation,
}

// ── Journal Writer Configuration ────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory for journal files.
    pub dir: PathBuf,
    /// Maximum file size in bytes before rotation (default 64 MiB).
    pub max_file_size: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

// ── Journal Writer ──────────────────────────────────────────────────

/// Append-only journal writer with checksums, rotation, and fsync control.
pub struct JournalWriter {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    next_sequence: u64,
    writes_since_flush: usize,
    writes_since_fsync: usize,
    file_index: u64,
    #[cfg(test)]
    fail_fsync: bool,
}

impl JournalWriter {
    /// Open a writer on an empty or fresh journal directory.
    pub fn open(config: JournalConfig) -> Result<Self, JournalError> {
        Self::resume(config, 1)
    }

    /// Open a writer that continues an existing journal at `next_sequence`.
    ///
    /// The caller is expected to have replayed (and tail-repaired) the
    /// directory first, so appends land after the last valid entry.
    pub fn resume(config: JournalConfig, next_sequence: u64) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;

        let file_index = latest_index(&config.dir)?.unwrap_or(1);
        let current_file = journal_path(&config.dir, file_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_file)?;
        let current_file_size = file.metadata()?.len();

        info!(
            file = %current_file.display(),
            next_sequence,
            "journal writer opened"
        );

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            next_sequence,
            writes_since_flush: 0,
            writes_since_fsync: 0,
            file_index,
            #[cfg(test)]
            fail_fsync: false,
        })
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    /// Append a journal entry. Sequences must be gapless.
    ///
    /// All or nothing: when any step after the write fails (flush, fsync)
    /// the frame is cut off again, so a failed append is never replayed.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        if entry.sequence != self.next_sequence {
            return Err(JournalError::SequenceError {
                expected: self.next_sequence,
                got: entry.sequence,
            });
        }

        if self.current_file_size > 0 && self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let start = self.current_file_size;
        let counters = (self.writes_since_flush, self.writes_since_fsync);
        if let Err(cause) = self.write_frame(&entry.to_bytes()) {
            warn!(sequence = entry.sequence, error = %cause, "journal append failed, rolling back");
            if let Err(rollback) = self.rollback(start) {
                error!(sequence = entry.sequence, error = %rollback, "journal rollback failed");
                return Err(JournalError::RollbackFailed {
                    cause: cause.to_string(),
                    rollback: rollback.to_string(),
                });
            }
            (self.writes_since_flush, self.writes_since_fsync) = counters;
            return Err(cause);
        }

        self.next_sequence = entry.sequence + 1;
        Ok(())
    }

    /// Create a new entry at the next sequence and append it.
    pub fn write_entry(
        &mut self,
        timestamp: i64,
        kind: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<JournalEntry, JournalError> {
        let entry = JournalEntry::new(self.next_sequence, timestamp, kind, payload);
        self.append(&entry)?;
        Ok(entry)
    }

    /// Force flush + fsync.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_flush = 0;
        self.writes_since_fsync = 0;
        Ok(())
    }

    // ── Internal Helpers ────────────────────────────────────────────

    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), JournalError> {
        self.writer.write_all(bytes)?;
        self.current_file_size += bytes.len() as u64;
        self.writes_since_flush += 1;
        self.writes_since_fsync += 1;

        self.apply_flush_policy()?;
        self.apply_fsync_policy()?;
        Ok(())
    }

    /// Cut the current file back to `len` bytes, counting what is still
    /// buffered. File contents plus buffer form one contiguous stream, so
    /// either the file is truncated or the buffer is trimmed.
    fn rollback(&mut self, len: u64) -> Result<(), JournalError> {
        let fresh = BufWriter::new(self.writer.get_ref().try_clone()?);
        let (file, buffered) = std::mem::replace(&mut self.writer, fresh).into_parts();
        let buffered = buffered.unwrap_or_else(|panicked| panicked.into_inner());

        let on_disk = file.metadata()?.len();
        if on_disk >= len {
            file.set_len(len)?;
        } else {
            let keep = ((len - on_disk) as usize).min(buffered.len());
            self.writer.write_all(&buffered[..keep])?;
        }
        self.current_file_size = len;
        Ok(())
    }

    fn apply_flush_policy(&mut self) -> Result<(), JournalError> {
        let should_flush = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => self.writes_since_flush >= n,
        };
        // fsync implies flush, so flush whenever an fsync is due as well
        let fsync_due = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        };
        if should_flush || fsync_due {
            self.writer.flush()?;
            self.writes_since_flush = 0;
        }
        Ok(())
    }

    fn apply_fsync_policy(&mut self) -> Result<(), JournalError> {
        let should_fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        };
        if should_fsync {
            #[cfg(test)]
            if self.fail_fsync {
                return Err(io::Error::new(io::ErrorKind::Other, "fsync failed").into());
            }
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), JournalError> {
        self.sync()?;

        self.file_index += 1;
        self.current_file = journal_path(&self.config.dir, self.file_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;

        self.writer = BufWriter::new(file);
        self.current_file_size = 0;

        debug!(file = %self.current_file.display(), "journal rotated");
        Ok(())
    }
}

// ── File naming ─────────────────────────────────────────────────────

pub fn journal_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{}{:06}{}", FILE_PREFIX, index, FILE_SUFFIX))
}

/// Parse the index out of a journal file name
pub fn parse_index(name: &str) -> Option<u64> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse::<u64>()
        .ok()
}

/// All journal files in `dir`, sorted by index
pub fn list_journal_files(dir: &Path) -> Result<Vec<PathBuf>, io::Error> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(idx) = parse_index(&entry.file_name().to_string_lossy()) {
            files.push((idx, entry.path()));
        }
    }
    files.sort_by_key(|(idx, _)| *idx);
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

fn latest_index(dir: &Path) -> Result<Option<u64>, io::Error> {
    Ok(list_journal_files(dir)?
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| parse_index(&n.to_string_lossy())))
        .max())
}

// ── Tests ───────────────────────────────────────────────────────────
