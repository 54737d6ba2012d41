use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use vecstash_core::{
    checksum::{crc32_checksum, crc32_checksum_parts},
    error::{Error, Result},
};

use super::types::*;

/// The open journal file.
pub(crate) struct JournalFile {
    pub path: PathBuf,
    pub file: File,
    pub size: u64,
}

/// Header fields after the magic.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JournalHeader {
    pub dimension: u32,
    pub first_sequence: u64,
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn encode_header(header: &JournalHeader) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(JOURNAL_HEADER_SIZE);
    buf.write_all(JOURNAL_MAGIC)?;
    buf.write_u32::<LittleEndian>(JOURNAL_VERSION)?;
    buf.write_u64::<LittleEndian>(now_millis())?;
    buf.write_u32::<LittleEndian>(header.dimension)?;
    buf.write_u64::<LittleEndian>(header.first_sequence)?;
    let crc = crc32_checksum(&buf);
    buf.write_u32::<LittleEndian>(crc)?;
    buf.resize(JOURNAL_HEADER_SIZE, 0); // Reserved
    Ok(buf)
}

/// Create (or overwrite) a journal holding only a header.
pub(crate) fn create_file(path: &Path, header: &JournalHeader) -> Result<JournalFile> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    file.write_all(&encode_header(header)?)?;
    file.sync_all()?;

    Ok(JournalFile {
        path: path.to_path_buf(),
        file,
        size: JOURNAL_HEADER_SIZE as u64,
    })
}

/// Rewrite the header in place and drop every entry.
pub(crate) fn reset_file(journal: &mut JournalFile, header: &JournalHeader) -> Result<()> {
    journal.file.set_len(0)?;
    journal.file.seek(SeekFrom::Start(0))?;
    journal.file.write_all(&encode_header(header)?)?;
    journal.file.sync_all()?;
    journal.size = JOURNAL_HEADER_SIZE as u64;
    Ok(())
}

pub(crate) fn read_header(reader: &mut impl Read) -> Result<JournalHeader> {
    let mut raw = [0u8; JOURNAL_HEADER_SIZE];
    reader.read_exact(&mut raw)?;

    if &raw[..8] != JOURNAL_MAGIC {
        return Err(Error::Journal {
            message: "Invalid journal magic number".to_string(),
            source: None,
        });
    }

    let mut cursor = &raw[8..];
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != JOURNAL_VERSION {
        return Err(Error::Journal {
            message: format!("Unsupported journal version: {}", version),
            source: None,
        });
    }
    let _creation_time = cursor.read_u64::<LittleEndian>()?;
    let dimension = cursor.read_u32::<LittleEndian>()?;
    let first_sequence = cursor.read_u64::<LittleEndian>()?;
    let crc = cursor.read_u32::<LittleEndian>()?;

    if crc32_checksum(&raw[..32]) != crc {
        return Err(Error::Journal {
            message: "Journal header CRC mismatch".to_string(),
            source: None,
        });
    }

    Ok(JournalHeader {
        dimension,
        first_sequence,
    })
}

fn entry_crc(sequence: u64, entry_type: EntryType, data: &[u8]) -> u32 {
    crc32_checksum_parts(&[&sequence.to_le_bytes(), &[entry_type as u8], data])
}

/// Append one framed entry to `buf`.
///
/// Payloads over [`MAX_ENTRY_SIZE`] are refused, matching what
/// [`read_entry`] accepts.
pub(crate) fn encode_entry(
    buf: &mut Vec<u8>,
    sequence: u64,
    timestamp: u64,
    entry_type: EntryType,
    data: &[u8],
) -> Result<()> {
    if data.len() > MAX_ENTRY_SIZE {
        return Err(Error::Journal {
            message: format!(
                "Entry of {} bytes exceeds the {} byte limit",
                data.len(),
                MAX_ENTRY_SIZE
            ),
            source: None,
        });
    }
    buf.write_u32::<LittleEndian>(data.len() as u32)?;
    buf.write_u64::<LittleEndian>(sequence)?;
    buf.write_u64::<LittleEndian>(timestamp)?;
    buf.write_u8(entry_type as u8)?;
    buf.write_u8(0)?; // Flags
    buf.write_u32::<LittleEndian>(entry_crc(sequence, entry_type, data))?;
    buf.write_all(&[0u8; 6])?; // Reserved
    buf.write_all(data)?;
    Ok(())
}

pub(crate) fn read_entry(reader: &mut impl Read) -> Result<JournalEntry> {
    let length = match reader.read_u32::<LittleEndian>() {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::Journal {
                message: "EOF".to_string(),
                source: Some(Box::new(e)),
            });
        }
        Err(e) => return Err(e.into()),
    };

    if length > MAX_ENTRY_SIZE {
        return Err(Error::Journal {
            message: format!("Entry length {} exceeds limit", length),
            source: None,
        });
    }

    let sequence = reader.read_u64::<LittleEndian>()?;
    let timestamp = reader.read_u64::<LittleEndian>()?;
    let entry_type = EntryType::try_from(reader.read_u8()?)?;
    let _flags = reader.read_u8()?;
    let crc = reader.read_u32::<LittleEndian>()?;
    reader.read_exact(&mut [0u8; 6])?;

    let mut data = vec![0u8; length];
    reader.read_exact(&mut data)?;

    if entry_crc(sequence, entry_type, &data) != crc {
        return Err(Error::Journal {
            message: format!("CRC mismatch at sequence {}", sequence),
            source: None,
        });
    }

    Ok(JournalEntry {
        sequence,
        timestamp,
        entry_type,
        data: Bytes::from(data),
    })
}

pub(crate) fn entry_size(data_len: usize) -> usize {
    ENTRY_HEADER_SIZE + data_len
}
