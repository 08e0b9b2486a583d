#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// Deterministic bytes that deflate cannot shrink.
pub fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1);
            (state >> 56) as u8
        })
        .collect()
}

/// A compressible frame body whose content identifies `order`.
pub fn frame_payload(order: usize, len: usize) -> Vec<u8> {
    let line = format!("frame {order:05} scanline\n");
    line.bytes().cycle().take(len).collect()
}

/// Writes `count` numbered frames of `len` bytes and returns their contents
/// in frame order.
pub fn write_frames(
    dir: &Path,
    count: usize,
    len: usize,
    extension: &str,
) -> std::io::Result<Vec<Vec<u8>>> {
    let mut frames = Vec::with_capacity(count);
    for order in 1..=count {
        let payload = frame_payload(order, len);
        fs::write(dir.join(format!("{order}.{extension}")), &payload)?;
        frames.push(payload);
    }
    Ok(frames)
}
