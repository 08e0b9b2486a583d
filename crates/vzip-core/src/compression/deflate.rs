use std::io::Read;

use flate2::read::ZlibDecoder;
use flate2::{Compress, Compression, FlushCompress, Status};

use crate::error::VzipError;
use crate::types::Result;

/// Compresses `data` as one zlib stream into a buffer of exactly `capacity`
/// bytes.
///
/// A fresh context is used per call and the whole input is passed with
/// `Finish` in a single call. Anything other than a completed stream,
/// including running out of output space, is a codec error.
pub fn apply(data: &[u8], level: u32, capacity: usize) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    output
        .try_reserve_exact(capacity)
        .map_err(|_| VzipError::Allocation { bytes: capacity })?;

    let mut compressor = Compress::new(Compression::new(level), true);
    let status = compressor
        .compress_vec(data, &mut output, FlushCompress::Finish)
        .map_err(|error| VzipError::Codec(format!("deflate failed: {error}")))?;

    match status {
        Status::StreamEnd if output.len() <= capacity => Ok(output),
        Status::StreamEnd => Err(VzipError::Codec(format!(
            "compressed stream of {} bytes exceeds the {capacity} byte frame buffer",
            output.len()
        ))),
        Status::Ok | Status::BufError => Err(VzipError::Codec(format!(
            "stream did not end: {} of {} input bytes consumed into a {capacity} byte frame buffer",
            compressor.total_in(),
            data.len()
        ))),
    }
}

/// Inflates one zlib stream.
pub fn reverse(data: &[u8], size_hint: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(size_hint);
    ZlibDecoder::new(data)
        .read_to_end(&mut output)
        .map_err(|error| VzipError::Decompression(format!("inflate failed: {error}")))?;
    Ok(output)
}
