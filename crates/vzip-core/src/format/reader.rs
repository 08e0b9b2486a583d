use std::io::{ErrorKind, Read};

use crate::error::VzipError;
use crate::types::Result;

use super::LENGTH_PREFIX_SIZE;

/// Streams entries out of an archive one at a time.
#[derive(Debug)]
pub struct ArchiveReader<R: Read> {
    reader: R,
    entries_read: usize,
}

impl<R: Read> ArchiveReader<R> {
    /// Reader positioned at the first entry of `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            entries_read: 0,
        }
    }

    /// Reads the next entry payload, or `None` at a clean end of stream.
    pub fn next_entry(&mut self) -> Result<Option<Vec<u8>>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;
        while filled < prefix.len() {
            match self.reader.read(&mut prefix[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(VzipError::InvalidFormat("truncated entry length prefix")),
                Ok(read) => filled += read,
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(error) => return Err(error.into()),
            }
        }

        let len = u32::from_le_bytes(prefix) as usize;
        let mut payload = Vec::new();
        payload
            .try_reserve_exact(len)
            .map_err(|_| VzipError::Allocation { bytes: len })?;
        (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != len {
            return Err(VzipError::InvalidFormat("entry extends past end of archive"));
        }

        self.entries_read += 1;
        Ok(Some(payload))
    }

    pub fn entries_read(&self) -> usize {
        self.entries_read
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for ArchiveReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
