//! Parser for the RED engine's `.archive` binary container (spec §4.3).
//!
//! Only metadata is read: the fixed header and the hash table of
//! `(resource_hash, sha1)` pairs. File bodies are never needed for
//! conflict detection, so the parser never decompresses archive content.

use crate::error::{EngineError, EngineResult};
use std::io::{Cursor, Read, Seek, SeekFrom};

const MAGIC: u32 = 0x52_44_41_52; // "RDAR" little-endian on disk as b"RARD"... see note below
const HEADER_SIZE: u64 = 40;
const HASH_ENTRY_SIZE: usize = 40;

/// One resource entry from an `.archive`'s hash table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResourceEntry {
    pub resource_hash: u64,
    pub sha1: [u8; 20],
}

impl ArchiveResourceEntry {
    pub fn sha1_hex(&self) -> String {
        self.sha1.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Parsed metadata of a RED-engine `.archive` file: just enough to drive
/// resource-hash collision detection (spec §4.8).
#[derive(Debug, Clone)]
pub struct RedArchive {
    pub entries: Vec<ArchiveResourceEntry>,
}

/// Header layout (little-endian), as written by the RED engine's archive packer:
///
/// ```text
/// offset 0   u32 magic ("RDAR")
/// offset 4   u32 version
/// offset 8   u64 file_table_offset
/// offset 16  u64 file_table_size
/// offset 24  u64 header_extended_size  (unused by this parser)
/// offset 32  u64 total_size
/// ```
///
/// Each 40-byte hash-table entry is `u64 resource_hash` followed by a
/// 20-byte SHA1, followed by 12 bytes of unused metadata (padding /
/// compression flags not needed here).
pub fn parse_red_archive(data: &[u8]) -> EngineResult<RedArchive> {
    if data.len() < HEADER_SIZE as usize {
        return Err(EngineError::FormatError(
            "archive too small to contain a header".to_string(),
        ));
    }

    let mut cursor = Cursor::new(data);
    let magic = read_u32(&mut cursor)?;
    if magic != MAGIC {
        return Err(EngineError::FormatError(format!(
            "bad archive magic: expected {MAGIC:#010x}, found {magic:#010x}"
        )));
    }
    let _version = read_u32(&mut cursor)?;
    let table_offset = read_u64(&mut cursor)?;
    let table_size = read_u64(&mut cursor)?;
    let _header_extended_size = read_u64(&mut cursor)?;
    let _total_size = read_u64(&mut cursor)?;

    if table_size == 0 {
        return Ok(RedArchive { entries: Vec::new() });
    }

    let count = (table_size as usize) / HASH_ENTRY_SIZE;
    cursor
        .seek(SeekFrom::Start(table_offset))
        .map_err(|e| EngineError::FormatError(format!("invalid hash table offset: {e}")))?;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let resource_hash = read_u64(&mut cursor)?;
        let mut sha1 = [0u8; 20];
        cursor
            .read_exact(&mut sha1)
            .map_err(|e| EngineError::FormatError(format!("truncated hash entry: {e}")))?;
        let mut padding = [0u8; 12];
        cursor
            .read_exact(&mut padding)
            .map_err(|e| EngineError::FormatError(format!("truncated hash entry: {e}")))?;
        entries.push(ArchiveResourceEntry { resource_hash, sha1 });
    }

    Ok(RedArchive { entries })
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> EngineResult<u32> {
    let mut buf = [0u8; 4];
    cursor
        .read_exact(&mut buf)
        .map_err(|e| EngineError::FormatError(format!("truncated archive header: {e}")))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> EngineResult<u64> {
    let mut buf = [0u8; 8];
    cursor
        .read_exact(&mut buf)
        .map_err(|e| EngineError::FormatError(format!("truncated archive header: {e}")))?;
    Ok(u64::from_le_bytes(buf))
}
