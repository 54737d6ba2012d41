//! # Snapshots
//!
//! A checkpoint writes the whole store into a fresh generation directory and
//! then atomically swaps `MANIFEST.json` to point at it. Recovery loads the
//! generation named by the manifest and replays journal batches committed
//! after `journal_sequence`.
//!
//! ```text
//! data_dir/
//! ├── MANIFEST.json              generation, shape, next_id, journal_sequence
//! ├── journal.wal
//! └── snapshot-00000003/
//!     ├── records.vidx           every record; inline vectors embedded
//!     ├── segment-00000001.vseg  overflow slots
//!     └── segment-00000002.vseg
//! ```
//!
//! Every record and slot carries its own CRC32; a mismatch is reported as
//! `IndexCorruption` rather than silently skipped.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vecstash_core::checksum::crc32_checksum;
use vecstash_core::error::{Error, Result, ResultExt};
use vecstash_core::types::embedding_size;
use vecstash_core::{
    DistanceMetric, Placement, PlacementConfig, RecordId, SegmentHandle, SegmentId, FORMAT_VERSION,
};

use crate::placement::{PlacementLayer, Segment};
use crate::store::StoredRecord;

pub const MANIFEST_FILE_NAME: &str = "MANIFEST.json";
const MANIFEST_TMP_FILE_NAME: &str = "MANIFEST.json.tmp";
const SNAPSHOT_DIR_PREFIX: &str = "snapshot-";
pub const RECORDS_FILE_NAME: &str = "records.vidx";

const RECORDS_MAGIC: &[u8; 8] = b"VSTINDEX";
const SEGMENT_MAGIC: &[u8; 8] = b"VSTSEGMT";

const TAG_INLINE: u8 = 0;
const TAG_OVERFLOW: u8 = 1;

/// Points at the current snapshot generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub generation: u64,
    pub dimension: usize,
    pub metric: DistanceMetric,
    /// Next id to hand out, including ids of records deleted since.
    pub next_id: u64,
    /// Last journal sequence covered by this snapshot.
    pub journal_sequence: u64,
    pub record_count: u64,
    pub segments: Vec<SegmentId>,
}

impl Manifest {
    pub fn load(data_dir: &Path) -> Result<Option<Self>> {
        let path = data_dir.join(MANIFEST_FILE_NAME);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&raw).map_err(|e| Error::IndexCorruption {
            details: format!("unreadable manifest {:?}: {}", path, e),
        })?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::IndexCorruption {
                details: format!("unsupported snapshot format {}", manifest.format_version),
            });
        }
        Ok(Some(manifest))
    }

    /// Replace the manifest atomically (temp file, fsync, rename).
    pub fn store(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(MANIFEST_FILE_NAME);
        let tmp = data_dir.join(MANIFEST_TMP_FILE_NAME);
        let json = serde_json::to_vec_pretty(self).map_err(|e| Error::Internal {
            message: format!("manifest serialization failed: {}", e),
        })?;

        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        sync_dir(data_dir)
    }
}

pub fn snapshot_dir(data_dir: &Path, generation: u64) -> PathBuf {
    data_dir.join(format!("{}{:08}", SNAPSHOT_DIR_PREFIX, generation))
}

/// `snapshot-` followed by a generation number, as written by [`snapshot_dir`].
fn is_snapshot_dir_name(name: &str) -> bool {
    name.strip_prefix(SNAPSHOT_DIR_PREFIX)
        .map_or(false, |digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn segment_file_name(id: SegmentId) -> String {
    format!("segment-{:08}.vseg", id)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Shape recorded in `records.vidx`.
struct RecordsHeader {
    dimension: u32,
    metric: DistanceMetric,
    count: u64,
    next_id: u64,
}

/// Write a complete snapshot generation. Returns the segment ids written.
pub(crate) fn write_snapshot(
    dir: &Path,
    dimension: usize,
    metric: DistanceMetric,
    next_id: RecordId,
    records: &BTreeMap<RecordId, StoredRecord>,
    placement: &PlacementLayer,
) -> Result<Vec<SegmentId>> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    let header = RecordsHeader {
        dimension: dimension as u32,
        metric,
        count: records.len() as u64,
        next_id: next_id.value(),
    };
    write_records(&dir.join(RECORDS_FILE_NAME), &header, records)?;

    let mut segment_ids = Vec::new();
    for segment in placement.segments() {
        write_segment(&dir.join(segment_file_name(segment.id())), segment)?;
        segment_ids.push(segment.id());
    }
    sync_dir(dir)?;

    debug!(
        "Wrote snapshot {:?}: {} records, {} segments",
        dir,
        records.len(),
        segment_ids.len()
    );
    Ok(segment_ids)
}

fn write_records(
    path: &Path,
    header: &RecordsHeader,
    records: &BTreeMap<RecordId, StoredRecord>,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    let mut head = Vec::with_capacity(40);
    head.write_all(RECORDS_MAGIC)?;
    head.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    head.write_u32::<LittleEndian>(header.dimension)?;
    head.write_u8(header.metric.as_byte())?;
    head.write_all(&[0u8; 3])?; // Padding
    head.write_u64::<LittleEndian>(header.count)?;
    head.write_u64::<LittleEndian>(header.next_id)?;
    let crc = crc32_checksum(&head);
    head.write_u32::<LittleEndian>(crc)?;
    writer.write_all(&head)?;

    let mut entry = Vec::new();
    for (id, record) in records {
        entry.clear();
        entry.write_u64::<LittleEndian>(id.value())?;
        entry.write_u32::<LittleEndian>(record.content.len() as u32)?;
        entry.write_all(record.content.as_bytes())?;
        match (record.placement, &record.inline) {
            (Placement::Inline, Some(bytes)) => {
                entry.write_u8(TAG_INLINE)?;
                entry.write_all(bytes)?;
            }
            (Placement::Overflow(handle), None) => {
                entry.write_u8(TAG_OVERFLOW)?;
                entry.write_u32::<LittleEndian>(handle.segment_id)?;
                entry.write_u64::<LittleEndian>(handle.offset)?;
            }
            _ => {
                return Err(Error::Internal {
                    message: format!("record {} placement does not match its storage", id),
                })
            }
        }
        let crc = crc32_checksum(&entry);
        writer.write_all(&entry)?;
        writer.write_u32::<LittleEndian>(crc)?;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn write_segment(path: &Path, segment: &Segment) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let stats = segment.stats();

    let mut head = Vec::with_capacity(32);
    head.write_all(SEGMENT_MAGIC)?;
    head.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    head.write_u32::<LittleEndian>(segment.id())?;
    head.write_u32::<LittleEndian>(stats.slot_count as u32)?;
    head.write_u64::<LittleEndian>(segment.next_logical())?;
    let crc = crc32_checksum(&head);
    head.write_u32::<LittleEndian>(crc)?;
    writer.write_all(&head)?;

    for (logical, record_id, bytes) in segment.live_slots() {
        writer.write_u64::<LittleEndian>(logical)?;
        writer.write_u64::<LittleEndian>(record_id.value())?;
        writer.write_u32::<LittleEndian>(bytes.len() as u32)?;
        writer.write_u32::<LittleEndian>(crc32_checksum(bytes))?;
        writer.write_all(bytes)?;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Everything recovered from a snapshot generation.
pub(crate) struct LoadedSnapshot {
    pub records: BTreeMap<RecordId, StoredRecord>,
    pub placement: PlacementLayer,
}

pub(crate) fn load_snapshot(
    data_dir: &Path,
    manifest: &Manifest,
    placement_config: &PlacementConfig,
) -> Result<LoadedSnapshot> {
    let dir = snapshot_dir(data_dir, manifest.generation);
    info!("Loading snapshot {:?}", dir);

    let mut placement = PlacementLayer::new(placement_config);
    for &id in &manifest.segments {
        let path = dir.join(segment_file_name(id));
        let segment = read_segment(&path, id).with_context(|| format!("reading {:?}", path))?;
        placement.restore_segment(segment)?;
    }

    let records = read_records(&dir.join(RECORDS_FILE_NAME), manifest)?;

    // Every overflow handle must resolve to a slot of the right size.
    let expected_len = embedding_size(manifest.dimension);
    for (id, record) in &records {
        if let Placement::Overflow(handle) = record.placement {
            let bytes = placement.retrieve(handle).map_err(|_| Error::IndexCorruption {
                details: format!("record {} points at missing slot {}", id, handle),
            })?;
            if bytes.len() != expected_len {
                return Err(Error::IndexCorruption {
                    details: format!("record {} slot has {} bytes", id, bytes.len()),
                });
            }
        }
    }

    Ok(LoadedSnapshot { records, placement })
}

fn corruption(path: &Path, what: &str) -> Error {
    Error::IndexCorruption {
        details: format!("{:?}: {}", path, what),
    }
}

fn read_records(path: &Path, manifest: &Manifest) -> Result<BTreeMap<RecordId, StoredRecord>> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut head = [0u8; 36];
    reader.read_exact(&mut head)?;
    let crc = reader.read_u32::<LittleEndian>()?;
    if &head[..8] != RECORDS_MAGIC {
        return Err(corruption(path, "bad magic"));
    }
    if crc32_checksum(&head) != crc {
        return Err(corruption(path, "header CRC mismatch"));
    }

    let mut cursor = &head[8..];
    let _version = cursor.read_u32::<LittleEndian>()?;
    let dimension = cursor.read_u32::<LittleEndian>()? as usize;
    let metric = DistanceMetric::from_byte(cursor.read_u8()?);
    cursor = &cursor[3..];
    let count = cursor.read_u64::<LittleEndian>()?;
    let next_id = cursor.read_u64::<LittleEndian>()?;

    if dimension != manifest.dimension || metric != Some(manifest.metric) {
        return Err(corruption(path, "shape disagrees with manifest"));
    }
    if count != manifest.record_count || next_id != manifest.next_id {
        return Err(corruption(path, "counters disagree with manifest"));
    }

    let inline_len = embedding_size(dimension);
    let mut records = BTreeMap::new();
    let mut entry = Vec::new();

    for _ in 0..count {
        entry.clear();
        let id = reader.read_u64::<LittleEndian>()?;
        let content_len = reader.read_u32::<LittleEndian>()? as usize;
        let mut content = vec![0u8; content_len];
        reader.read_exact(&mut content)?;
        let tag = reader.read_u8()?;

        entry.write_u64::<LittleEndian>(id)?;
        entry.write_u32::<LittleEndian>(content_len as u32)?;
        entry.write_all(&content)?;
        entry.write_u8(tag)?;

        let (placement, inline) = match tag {
            TAG_INLINE => {
                let mut bytes = vec![0u8; inline_len];
                reader.read_exact(&mut bytes)?;
                entry.write_all(&bytes)?;
                (Placement::Inline, Some(Bytes::from(bytes)))
            }
            TAG_OVERFLOW => {
                let segment_id = reader.read_u32::<LittleEndian>()?;
                let offset = reader.read_u64::<LittleEndian>()?;
                entry.write_u32::<LittleEndian>(segment_id)?;
                entry.write_u64::<LittleEndian>(offset)?;
                (Placement::Overflow(SegmentHandle { segment_id, offset }), None)
            }
            other => return Err(corruption(path, &format!("record {} has tag {}", id, other))),
        };

        let crc = reader.read_u32::<LittleEndian>()?;
        if crc32_checksum(&entry) != crc {
            return Err(corruption(path, &format!("record {} CRC mismatch", id)));
        }
        let content = String::from_utf8(content)
            .map_err(|_| corruption(path, &format!("record {} content is not UTF-8", id)))?;

        let id = RecordId(id);
        if id.value() >= next_id {
            return Err(corruption(path, &format!("record {} at or above next id {}", id, next_id)));
        }
        records.insert(
            id,
            StoredRecord {
                content: Arc::from(content),
                placement,
                inline,
            },
        );
    }

    Ok(records)
}

fn read_segment(path: &Path, expected_id: SegmentId) -> Result<Segment> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut head = [0u8; 28];
    reader.read_exact(&mut head)?;
    let crc = reader.read_u32::<LittleEndian>()?;
    if &head[..8] != SEGMENT_MAGIC {
        return Err(corruption(path, "bad magic"));
    }
    if crc32_checksum(&head) != crc {
        return Err(corruption(path, "header CRC mismatch"));
    }

    let mut cursor = &head[8..];
    let _version = cursor.read_u32::<LittleEndian>()?;
    let id = cursor.read_u32::<LittleEndian>()?;
    let slot_count = cursor.read_u32::<LittleEndian>()?;
    let next_logical = cursor.read_u64::<LittleEndian>()?;
    if id != expected_id {
        return Err(corruption(path, &format!("holds segment {}", id)));
    }

    let mut slots = Vec::with_capacity(slot_count as usize);
    for _ in 0..slot_count {
        let logical = reader.read_u64::<LittleEndian>()?;
        let record_id = RecordId(reader.read_u64::<LittleEndian>()?);
        let len = reader.read_u32::<LittleEndian>()? as usize;
        let crc = reader.read_u32::<LittleEndian>()?;
        let mut bytes = vec![0u8; len];
        reader.read_exact(&mut bytes)?;
        if crc32_checksum(&bytes) != crc {
            return Err(corruption(path, &format!("slot {} CRC mismatch", logical)));
        }
        slots.push((logical, record_id, bytes));
    }

    Segment::from_slots(id, next_logical, slots)
}

/// Remove generation directories other than `keep`, plus a leftover
/// manifest temp file. Nothing else in `data_dir` is touched.
pub(crate) fn remove_stale(data_dir: &Path, keep: Option<u64>) -> Result<()> {
    let keep_name = keep.map(|generation| format!("{}{:08}", SNAPSHOT_DIR_PREFIX, generation));
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let stale_snapshot = is_snapshot_dir_name(&name)
            && entry.path().is_dir()
            && Some(&name) != keep_name.as_ref();
        let stale_tmp = name == MANIFEST_TMP_FILE_NAME;
        if !(stale_snapshot || stale_tmp) {
            continue;
        }
        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Ok(()) => debug!("Removed stale {:?}", path),
            Err(e) => warn!("Failed to remove stale {:?}: {}", path, e),
        }
    }
    Ok(())
}
