//! # Frame Segmenter
//!
//! Splits an encoded frame into ordered, checksummed chunks sized for the
//! link, and puts them back together.
//!
//! Every chunk carries a CRC-32 (IEEE) of its own payload. The final chunk
//! is flagged `is_last` and is never padded.

use super::encoder::EncodedFrame;
use crate::error::EncodingError;

/// One unit of a frame, acknowledged individually by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence_number: u32,
    pub payload: Vec<u8>,
    pub checksum: u32,
    pub is_last: bool,
}

impl Chunk {
    /// Whether the payload still matches its checksum.
    pub fn verify(&self) -> bool {
        crc32(&self.payload) == self.checksum
    }
}

/// Split a frame into `ceil(len / chunk_size)` chunks.
pub fn segment(frame: &EncodedFrame, chunk_size: usize) -> Result<Vec<Chunk>, EncodingError> {
    segment_bytes(frame.bytes(), chunk_size)
}

/// [`segment`] over raw bytes.
pub fn segment_bytes(data: &[u8], chunk_size: usize) -> Result<Vec<Chunk>, EncodingError> {
    if chunk_size == 0 {
        return Err(EncodingError::InvalidChunkSize(chunk_size));
    }

    let total = data.len().div_ceil(chunk_size);
    Ok(data
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, part)| Chunk {
            sequence_number: i as u32,
            payload: part.to_vec(),
            checksum: crc32(part),
            is_last: i + 1 == total,
        })
        .collect())
}

/// Concatenate chunks after checking order and checksums.
pub fn reassemble(chunks: &[Chunk]) -> Result<Vec<u8>, EncodingError> {
    let mut buffer = Vec::with_capacity(chunks.iter().map(|c| c.payload.len()).sum());
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.sequence_number != i as u32 {
            return Err(EncodingError::SequenceGap {
                expected: i as u32,
                found: chunk.sequence_number,
            });
        }
        if !chunk.verify() {
            return Err(EncodingError::ChecksumMismatch(chunk.sequence_number));
        }
        buffer.extend_from_slice(&chunk.payload);
    }
    Ok(buffer)
}

/// CRC-32 (IEEE 802.3) of a chunk payload.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
