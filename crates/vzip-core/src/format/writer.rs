use std::io::Write;

use crate::error::VzipError;
use crate::types::Result;

use super::LENGTH_PREFIX_SIZE;

/// Appends length-prefixed entries to an archive stream.
///
/// The writer does not reorder; callers append entries in frame order.
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    writer: W,
    entries_written: usize,
    bytes_written: u64,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            entries_written: 0,
            bytes_written: 0,
        }
    }

    /// Writes the 4-byte length prefix and then `payload`.
    pub fn write_entry(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| VzipError::InvalidFormat("entry exceeds 32-bit length prefix"))?;

        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.entries_written += 1;
        self.bytes_written += (LENGTH_PREFIX_SIZE + payload.len()) as u64;
        Ok(())
    }

    pub fn entries_written(&self) -> usize {
        self.entries_written
    }

    /// Archive bytes written so far, prefixes included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_each_entry_with_its_length() {
        let mut writer = ArchiveWriter::new(Vec::new());
        writer.write_entry(b"xyz").expect("write");
        writer.write_entry(b"").expect("write");

        assert_eq!(writer.entries_written(), 2);
        assert_eq!(writer.bytes_written(), 11);
        assert_eq!(
            writer.finish().expect("finish"),
            b"\x03\x00\x00\x00xyz\x00\x00\x00\x00".to_vec()
        );
    }
}
