//! Gzip payload compression.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Upper bound for trusting the ISIZE trailer when preallocating.
const MAX_PREALLOCATION: usize = 16 * 1024 * 1024;

pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a gzip stream, sizing the buffer from its trailer.
pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(uncompressed_len(data).min(MAX_PREALLOCATION));
    GzDecoder::new(data).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// ISIZE: the last four bytes, little-endian, the input length mod 2^32.
fn uncompressed_len(data: &[u8]) -> usize {
    match data.len().checked_sub(4).and_then(|start| data.get(start..)) {
        Some(&[a, b, c, d]) => u32::from_le_bytes([a, b, c, d]) as usize,
        _ => 0,
    }
}
