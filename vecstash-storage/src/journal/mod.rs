//! Write-ahead journal with batch commit markers.
//!
//! Every mutation batch is appended as its operation entries followed by one
//! `Commit` entry, written with a single `write_all` and synced before the
//! batch is applied in memory.
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Journal File Layout                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Header (64 bytes)                                          │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ Magic Number (8 bytes): "VSTJRNL\0"                 │    │
//! │  │ Version (4 bytes)                                   │    │
//! │  │ Creation Time (8 bytes)                             │    │
//! │  │ Dimension (4 bytes)                                 │    │
//! │  │ First Sequence (8 bytes)                            │    │
//! │  │ Header CRC32 (4 bytes)                              │    │
//! │  │ Reserved (28 bytes)                                 │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Entry                                                      │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ Entry Header (32 bytes)                             │    │
//! │  │   - Length (4 bytes)                                │    │
//! │  │   - Sequence (8 bytes)                              │    │
//! │  │   - Timestamp (8 bytes)                             │    │
//! │  │   - Entry Type (1 byte): Insert | Delete | Commit   │    │
//! │  │   - Flags (1 byte)                                  │    │
//! │  │   - CRC32 over sequence, type, payload (4 bytes)    │    │
//! │  │   - Reserved (6 bytes)                              │    │
//! │  ├─────────────────────────────────────────────────────┤    │
//! │  │ Payload (Variable length)                           │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Insert, Insert, ..., Commit(n)   ◄── one batch             │
//! └─────────────────────────────────────────────────────────────┘
//!
//! Recovery keeps only batches whose commit entry is intact and whose count
//! matches, then truncates the file after the last such commit.

mod file;
mod iterator;
mod types;

pub use iterator::JournalEntryIterator;
pub use types::{CommittedBatch, EntryType, JournalEntry, JournalOp, Recovery};

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use vecstash_core::{
    config::JournalConfig,
    error::{Error, Result},
};

use file::{
    create_file, encode_entry, now_millis, read_header, reset_file, JournalFile, JournalHeader,
};
use types::{decode_commit, encode_commit, JOURNAL_HEADER_SIZE};

/// Journal file name inside the data directory.
pub const JOURNAL_FILE_NAME: &str = "journal.wal";

/// Result of a durable append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    pub commit_sequence: u64,
    pub bytes_written: u64,
}

pub struct Journal {
    file: JournalFile,
    dimension: u32,
    next_sequence: u64,
    config: JournalConfig,
    poisoned: bool,
}

impl Journal {
    /// Open or create the journal in `dir`.
    ///
    /// Entries with a sequence below `min_sequence` are already covered by a
    /// snapshot and are neither replayed nor kept.
    pub fn open(
        dir: impl AsRef<Path>,
        dimension: usize,
        min_sequence: u64,
        config: &JournalConfig,
    ) -> Result<(Self, Recovery)> {
        let path = dir.as_ref().join(JOURNAL_FILE_NAME);
        let dimension = u32::try_from(dimension).map_err(|_| Error::Configuration {
            message: format!("dimension {} too large for the journal", dimension),
        })?;
        let header = JournalHeader {
            dimension,
            first_sequence: min_sequence,
        };

        let existing_len = match std::fs::metadata(&path) {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        match existing_len {
            Some(len) if len >= JOURNAL_HEADER_SIZE as u64 => {
                Self::recover(path, dimension, min_sequence, config)
            }
            Some(len) => {
                warn!(
                    "Journal {:?} has a torn header ({} bytes), starting a fresh journal",
                    path, len
                );
                let file = create_file(&path, &header)?;
                Ok((Self::from_file(file, dimension, min_sequence, config), Recovery::default()))
            }
            None => {
                let file = create_file(&path, &header)?;
                Ok((Self::from_file(file, dimension, min_sequence, config), Recovery::default()))
            }
        }
    }

    fn from_file(file: JournalFile, dimension: u32, next_sequence: u64, config: &JournalConfig) -> Self {
        Self {
            file,
            dimension,
            next_sequence,
            config: config.clone(),
            poisoned: false,
        }
    }

    fn recover(
        path: PathBuf,
        dimension: u32,
        min_sequence: u64,
        config: &JournalConfig,
    ) -> Result<(Self, Recovery)> {
        info!("Recovering from journal: {:?}", path);

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let header = read_header(&mut file)?;
        if header.dimension != dimension {
            return Err(Error::Configuration {
                message: format!(
                    "journal was written for dimension {}, store is configured for {}",
                    header.dimension, dimension
                ),
            });
        }

        let mut recovery = Recovery::default();
        let mut pending = Vec::new();
        let mut committed_end = JOURNAL_HEADER_SIZE as u64;
        let mut last_commit = None;

        let mut entries = JournalEntryIterator::new(file.try_clone()?, config.buffer_size, min_sequence)?;
        for (entry, end) in &mut entries {
            match entry.entry_type {
                EntryType::Commit => {
                    let count = decode_commit(&entry)? as usize;
                    if count == pending.len() {
                        recovery.batches.push(CommittedBatch {
                            commit_sequence: entry.sequence,
                            ops: std::mem::take(&mut pending),
                        });
                    } else {
                        warn!(
                            "Commit {} expects {} entries but {} precede it, dropping batch",
                            entry.sequence,
                            count,
                            pending.len()
                        );
                        recovery.discarded_entries += pending.len();
                        pending.clear();
                    }
                    committed_end = end;
                    last_commit = Some(entry.sequence);
                }
                EntryType::Insert | EntryType::Delete => pending.push(JournalOp::decode(&entry)?),
            }
        }
        recovery.discarded_entries += pending.len();

        let file_len = file.metadata()?.len();
        if committed_end < file_len {
            warn!(
                "Truncating journal tail: {} bytes after last commit ({} uncommitted entries)",
                file_len - committed_end,
                recovery.discarded_entries
            );
            file.set_len(committed_end)?;
            file.sync_all()?;
            recovery.truncated_bytes = file_len - committed_end;
        }
        file.seek(SeekFrom::Start(committed_end))?;

        let next_sequence = [
            header.first_sequence,
            min_sequence,
            last_commit.map_or(0, |s| s + 1),
        ]
        .into_iter()
        .max()
        .unwrap_or(min_sequence);

        info!(
            "Journal recovered: {} committed batches, next sequence {}",
            recovery.batches.len(),
            next_sequence
        );

        let journal_file = JournalFile {
            path,
            file,
            size: committed_end,
        };
        Ok((Self::from_file(journal_file, dimension, next_sequence, config), recovery))
    }

    /// Append `ops` and their commit marker as one durable unit.
    ///
    /// On failure the file is cut back to its previous length and no
    /// sequence numbers are consumed. If even that fails the journal refuses
    /// further appends.
    pub fn append_batch(&mut self, ops: &[JournalOp]) -> Result<AppendReceipt> {
        if self.poisoned {
            return Err(Error::Journal {
                message: "journal is unusable after a failed rollback".to_string(),
                source: None,
            });
        }
        let count = u32::try_from(ops.len()).map_err(|_| Error::Journal {
            message: format!("batch of {} operations is too large", ops.len()),
            source: None,
        })?;

        let timestamp = now_millis();
        let mut buf = Vec::new();
        let mut sequence = self.next_sequence;
        for op in ops {
            encode_entry(&mut buf, sequence, timestamp, op.entry_type(), &op.encode()?)?;
            sequence += 1;
        }
        let commit_sequence = sequence;
        encode_entry(&mut buf, commit_sequence, timestamp, EntryType::Commit, &encode_commit(count))?;

        let sync = self.config.sync_on_commit;
        let written = self.file.file.write_all(&buf).and_then(|_| {
            if sync {
                self.file.file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            self.rollback();
            return Err(Error::Journal {
                message: format!("Failed to append batch of {} operations", ops.len()),
                source: Some(Box::new(e)),
            });
        }

        self.file.size += buf.len() as u64;
        self.next_sequence = commit_sequence + 1;

        Ok(AppendReceipt {
            commit_sequence,
            bytes_written: buf.len() as u64,
        })
    }

    fn rollback(&mut self) {
        let size = self.file.size;
        let restored = self
            .file
            .file
            .set_len(size)
            .and_then(|_| self.file.file.seek(SeekFrom::Start(size)).map(|_| ()));
        if let Err(e) = restored {
            error!("Journal rollback to {} bytes failed: {}", size, e);
            self.poisoned = true;
        }
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.file.flush()?;
        self.file.file.sync_all()?;
        Ok(())
    }

    /// Drop every entry after a snapshot has made them redundant.
    pub fn reset(&mut self) -> Result<()> {
        let header = JournalHeader {
            dimension: self.dimension,
            first_sequence: self.next_sequence,
        };
        reset_file(&mut self.file, &header)?;
        self.poisoned = false;
        info!("Journal reset, next sequence {}", self.next_sequence);
        Ok(())
    }

    /// Sequence of the last entry written, 0 if none.
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    pub fn size(&self) -> u64 {
        self.file.size
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vecstash_core::RecordId;

    fn insert(id: u64, text: &str) -> JournalOp {
        JournalOp::Insert {
            id: RecordId(id),
            content: Arc::from(text),
            embedding: Bytes::from(vec![id as u8; 8]),
        }
    }

    fn config() -> JournalConfig {
        JournalConfig::default()
    }

    fn truncate_by(path: &Path, bytes: u64) {
        let f = OpenOptions::new().write(true).open(path).unwrap();
        let len = f.metadata().unwrap().len();
        f.set_len(len - bytes).unwrap();
    }

    #[test]
    fn test_append_and_recover() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, recovery) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
            assert!(recovery.batches.is_empty());
            let r1 = journal.append_batch(&[insert(1, "a"), insert(2, "b")]).unwrap();
            assert_eq!(r1.commit_sequence, 3);
            journal
                .append_batch(&[JournalOp::Delete { id: RecordId(1) }])
                .unwrap();
            assert_eq!(journal.last_sequence(), 5);
        }

        let (journal, recovery) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
        assert_eq!(recovery.batches.len(), 2);
        assert_eq!(recovery.batches[0].ops, vec![insert(1, "a"), insert(2, "b")]);
        assert_eq!(recovery.batches[1].ops, vec![JournalOp::Delete { id: RecordId(1) }]);
        assert_eq!(recovery.truncated_bytes, 0);
        assert_eq!(journal.last_sequence(), 5);
    }

    #[test]
    fn test_missing_commit_discards_batch() {
        let dir = TempDir::new().unwrap();
        let path = {
            let (mut journal, _) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
            journal.append_batch(&[insert(1, "a")]).unwrap();
            journal.append_batch(&[insert(2, "b"), insert(3, "c")]).unwrap();
            journal.path().to_path_buf()
        };
        // Commit entry is a 32-byte header plus a 4-byte count.
        truncate_by(&path, 36);

        let (mut journal, recovery) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
        assert_eq!(recovery.batches.len(), 1);
        assert_eq!(recovery.discarded_entries, 2);
        assert!(recovery.truncated_bytes > 0);

        // New batches after recovery are not merged with the discarded tail.
        journal.append_batch(&[insert(2, "d")]).unwrap();
        drop(journal);
        let (_, recovery) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
        assert_eq!(recovery.batches.len(), 2);
        assert_eq!(recovery.batches[1].ops, vec![insert(2, "d")]);
    }

    #[test]
    fn test_torn_entry_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = {
            let (mut journal, _) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
            journal.append_batch(&[insert(1, "a")]).unwrap();
            journal.append_batch(&[insert(2, "b")]).unwrap();
            journal.path().to_path_buf()
        };
        truncate_by(&path, 40);

        let (journal, recovery) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
        assert_eq!(recovery.batches.len(), 1);
        assert_eq!(journal.size(), std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        drop(Journal::open(dir.path(), 2, 1, &config()).unwrap());
        let err = Journal::open(dir.path(), 3, 1, &config()).err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_reset_keeps_sequence_monotonic() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, _) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
            journal.append_batch(&[insert(1, "a")]).unwrap();
            journal.reset().unwrap();
            assert_eq!(journal.size(), JOURNAL_HEADER_SIZE as u64);
        }
        let (mut journal, recovery) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
        assert!(recovery.batches.is_empty());
        let receipt = journal.append_batch(&[insert(2, "b")]).unwrap();
        assert_eq!(receipt.commit_sequence, 4);
    }

    #[test]
    fn test_oversized_entry_is_refused() {
        let mut buf = Vec::new();
        let payload = vec![0u8; types::MAX_ENTRY_SIZE + 1];
        let err = encode_entry(&mut buf, 1, 0, EntryType::Insert, &payload).unwrap_err();
        assert!(matches!(err, Error::Journal { .. }));
        assert!(buf.is_empty());

        encode_entry(&mut buf, 1, 0, EntryType::Insert, &payload[..16]).unwrap();
        assert_eq!(buf.len(), file::entry_size(16));
    }

    #[test]
    fn test_entries_before_min_sequence_skipped() {
        let dir = TempDir::new().unwrap();
        {
            let (mut journal, _) = Journal::open(dir.path(), 2, 1, &config()).unwrap();
            journal.append_batch(&[insert(1, "a")]).unwrap(); // sequences 1, 2
            journal.append_batch(&[insert(2, "b")]).unwrap(); // sequences 3, 4
        }
        let (journal, recovery) = Journal::open(dir.path(), 2, 3, &config()).unwrap();
        assert_eq!(recovery.batches.len(), 1);
        assert_eq!(recovery.batches[0].commit_sequence, 4);
        assert_eq!(journal.last_sequence(), 4);
    }
}
