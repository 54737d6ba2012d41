//! # Checksums
//!
//! CRC32 integrity checks for journal entries, index entries and segment slots.

use crc32fast::Hasher as Crc32Hasher;

/// CRC32 of a single buffer
#[inline]
pub fn crc32_checksum(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// CRC32 over several buffers, as if they were concatenated
pub fn crc32_checksum_parts(parts: &[&[u8]]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}
