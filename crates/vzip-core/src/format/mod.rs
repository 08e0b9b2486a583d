//! Archive layout.
//!
//! An archive is a plain sequence of entries, one per frame in ascending
//! frame order. Each entry is a 4-byte little-endian length followed by that
//! many bytes of zlib data. There is no header, footer, name table or
//! checksum, so the entry count is only known after reading to the end.

use bytes::{Buf, Bytes};

use crate::error::VzipError;
use crate::types::Result;

pub mod reader;
pub mod writer;

pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

/// Size of the length prefix in front of every entry.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Splits an archive held in memory into its entry payloads without copying.
pub fn split_entries(mut archive: Bytes) -> Result<Vec<Bytes>> {
    let mut entries = Vec::new();
    while archive.has_remaining() {
        if archive.remaining() < LENGTH_PREFIX_SIZE {
            return Err(VzipError::InvalidFormat("truncated entry length prefix"));
        }
        let len = archive.get_u32_le() as usize;
        if archive.remaining() < len {
            return Err(VzipError::InvalidFormat("entry extends past end of archive"));
        }
        entries.push(archive.split_to(len));
    }
    Ok(entries)
}
