use std::io::{Cursor, Read};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use vecstash_core::{
    error::{Error, Result},
    RecordId,
};

pub const JOURNAL_MAGIC: &[u8; 8] = b"VSTJRNL\0";
pub const JOURNAL_VERSION: u32 = 1;
pub const JOURNAL_HEADER_SIZE: usize = 64;
pub const ENTRY_HEADER_SIZE: usize = 32;
/// Guards recovery against allocating for a garbage length field.
pub const MAX_ENTRY_SIZE: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    Insert = 1,
    Delete = 2,

    // Closes a batch. Carries the number of operations it commits; entries
    // without a matching commit are discarded on recovery.
    Commit = 3,
}

impl TryFrom<u8> for EntryType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(EntryType::Insert),
            2 => Ok(EntryType::Delete),
            3 => Ok(EntryType::Commit),
            _ => Err(Error::Journal {
                message: format!("Invalid entry type: {}", value),
                source: None,
            }),
        }
    }
}

/// A framed journal entry as read back from disk.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub sequence: u64,
    pub timestamp: u64,
    pub entry_type: EntryType,
    pub data: Bytes,
}

/// A logged mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalOp {
    Insert {
        id: RecordId,
        content: Arc<str>,
        embedding: Bytes,
    },
    Delete {
        id: RecordId,
    },
}

impl JournalOp {
    pub fn id(&self) -> RecordId {
        match self {
            JournalOp::Insert { id, .. } | JournalOp::Delete { id } => *id,
        }
    }

    pub(crate) fn entry_type(&self) -> EntryType {
        match self {
            JournalOp::Insert { .. } => EntryType::Insert,
            JournalOp::Delete { .. } => EntryType::Delete,
        }
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            JournalOp::Insert {
                id,
                content,
                embedding,
            } => {
                buf.reserve(8 + 4 + content.len() + 4 + embedding.len());
                buf.write_u64::<LittleEndian>(id.value())?;
                buf.write_u32::<LittleEndian>(field_len(content.len())?)?;
                buf.extend_from_slice(content.as_bytes());
                buf.write_u32::<LittleEndian>(field_len(embedding.len())?)?;
                buf.extend_from_slice(embedding);
            }
            JournalOp::Delete { id } => {
                buf.write_u64::<LittleEndian>(id.value())?;
            }
        }
        Ok(buf)
    }

    pub(crate) fn decode(entry: &JournalEntry) -> Result<Self> {
        let mut cursor = Cursor::new(&entry.data[..]);
        let op = match entry.entry_type {
            EntryType::Insert => {
                let id = RecordId(cursor.read_u64::<LittleEndian>()?);
                let content_len = cursor.read_u32::<LittleEndian>()? as usize;
                let mut content = vec![0u8; content_len];
                cursor.read_exact(&mut content)?;
                let content = String::from_utf8(content).map_err(|e| Error::Journal {
                    message: format!("Entry {} has non UTF-8 content", entry.sequence),
                    source: Some(Box::new(e)),
                })?;
                let embedding_len = cursor.read_u32::<LittleEndian>()? as usize;
                let start = cursor.position() as usize;
                let end = start + embedding_len;
                if end > entry.data.len() {
                    return Err(Error::Journal {
                        message: format!("Entry {} embedding overruns payload", entry.sequence),
                        source: None,
                    });
                }
                JournalOp::Insert {
                    id,
                    content: Arc::from(content),
                    embedding: entry.data.slice(start..end),
                }
            }
            EntryType::Delete => JournalOp::Delete {
                id: RecordId(cursor.read_u64::<LittleEndian>()?),
            },
            EntryType::Commit => {
                return Err(Error::Journal {
                    message: format!("Entry {} is a commit marker, not an operation", entry.sequence),
                    source: None,
                })
            }
        };
        Ok(op)
    }
}

fn field_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::Journal {
        message: format!("field of {} bytes does not fit an entry", len),
        source: None,
    })
}

/// Payload of a commit entry: number of operations in the batch.
pub(crate) fn encode_commit(op_count: u32) -> Vec<u8> {
    op_count.to_le_bytes().to_vec()
}

pub(crate) fn decode_commit(entry: &JournalEntry) -> Result<u32> {
    Ok(Cursor::new(&entry.data[..]).read_u32::<LittleEndian>()?)
}

/// A batch whose commit entry survived.
#[derive(Debug, Clone)]
pub struct CommittedBatch {
    pub commit_sequence: u64,
    pub ops: Vec<JournalOp>,
}

/// What `Journal::open` found on disk.
#[derive(Debug, Default)]
pub struct Recovery {
    pub batches: Vec<CommittedBatch>,
    /// Entries dropped because their batch never committed.
    pub discarded_entries: usize,
    /// Bytes cut from the end of the file.
    pub truncated_bytes: u64,
}
