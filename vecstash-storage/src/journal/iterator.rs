use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};

use vecstash_core::error::Result;

use super::file::{entry_size, read_entry};
use super::types::{JournalEntry, JOURNAL_HEADER_SIZE};

/// Streaming iterator over intact journal entries.
///
/// Yields each entry with the file offset just past it and stops at the first
/// entry that cannot be read in full or fails its CRC.
pub struct JournalEntryIterator {
    reader: Option<BufReader<File>>,
    position: u64,
    start_sequence: u64,
}

impl JournalEntryIterator {
    pub(crate) fn new(file: File, buffer_size: usize, start_sequence: u64) -> Result<Self> {
        let mut reader = BufReader::with_capacity(buffer_size, file);
        reader.seek(SeekFrom::Start(JOURNAL_HEADER_SIZE as u64))?;
        Ok(Self {
            reader: Some(reader),
            position: JOURNAL_HEADER_SIZE as u64,
            start_sequence,
        })
    }

    /// Offset just past the last entry yielded.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Iterator for JournalEntryIterator {
    type Item = (JournalEntry, u64);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;

            match read_entry(reader) {
                Ok(entry) => {
                    self.position += entry_size(entry.data.len()) as u64;
                    // Already covered by a snapshot.
                    if entry.sequence < self.start_sequence {
                        continue;
                    }
                    return Some((entry, self.position));
                }
                Err(_) => {
                    self.reader = None;
                    return None;
                }
            }
        }
    }
}
