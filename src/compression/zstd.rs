//! Zstandard frame reconstruction for VFS3 payloads.
//!
//! VFS3 stores each compressed file as the concatenated *block bodies* of a
//! zstd frame, with the frame header and every 3-byte block header stripped.
//! The chunk-size table records one signed length per block: positive for a
//! compressed block, negative for a raw one. Rebuilding a decodable frame
//! means putting those headers back:
//!
//! ```text
//! [magic FD2FB528] [FHD 0x80] [window 0x88] [content size u32 LE]
//! [block header] [block body] ... [block header | last] [block body]
//! ```
//!
//! The rebuilt frame carries no checksum and no dictionary ID. Header
//! synthesis has no dependencies; decoding the result needs the
//! `compression` feature.

use tracing::trace;

use crate::{Error, Result};

pub const MAGIC: u32 = 0xFD2F_B528;
/// Frame header descriptor: 4-byte content size, not single-segment.
const FHD_CONTENT_SIZE_4: u8 = 0x80;
const FHD_NO_CONTENT_SIZE: u8 = 0x00;
/// Window descriptor: 2^27 bytes.
const WINDOW_DESCRIPTOR: u8 = 0x88;
/// Block sizes are stored in 21 bits.
pub const MAX_BLOCK_SIZE: u32 = (1 << 21) - 1;

const BLOCK_RAW: u32 = 0;
const BLOCK_COMPRESSED: u32 = 2;

/// Frame header for a frame decoding to `content_size` bytes, or with no
/// content size field when `None`.
pub fn frame_header(content_size: Option<u32>) -> Vec<u8> {
    let mut header = Vec::with_capacity(10);
    header.extend_from_slice(&MAGIC.to_le_bytes());
    match content_size {
        Some(size) => {
            header.push(FHD_CONTENT_SIZE_4);
            header.push(WINDOW_DESCRIPTOR);
            header.extend_from_slice(&size.to_le_bytes());
        }
        None => {
            header.push(FHD_NO_CONTENT_SIZE);
            header.push(WINDOW_DESCRIPTOR);
        }
    }
    header
}

/// 3-byte block header: `size << 3 | type << 1 | last`, little-endian.
///
/// Returns [`Error::MalformedHeader`] if `size` does not fit in 21 bits.
pub fn block_header(size: u32, compressed: bool, last: bool) -> Result<[u8; 3]> {
    if size > MAX_BLOCK_SIZE {
        return Err(Error::malformed(format!(
            "zstd block of {size} bytes exceeds {MAX_BLOCK_SIZE}"
        )));
    }
    let block_type = if compressed { BLOCK_COMPRESSED } else { BLOCK_RAW };
    let word = (size << 3) | (block_type << 1) | u32::from(last);
    let b = word.to_le_bytes();
    Ok([b[0], b[1], b[2]])
}

/// Rebuild a complete zstd frame from stripped block bodies.
///
/// `chunks` holds one entry per block; the absolute values must add up to
/// `data.len()` or this returns [`Error::SizeMismatch`].
pub fn reassemble_frame(decompressed_size: u64, data: &[u8], chunks: &[i32]) -> Result<Vec<u8>> {
    let total: u64 = chunks.iter().map(|c| u64::from(c.unsigned_abs())).sum();
    if total != data.len() as u64 {
        return Err(Error::size_mismatch(
            "zstd chunk sizes",
            data.len() as u64,
            total,
        ));
    }

    let mut frame = frame_header(u32::try_from(decompressed_size).ok());
    frame.reserve(data.len() + chunks.len() * 3);
    let mut pos = 0;
    for (i, &chunk) in chunks.iter().enumerate() {
        let size = chunk.unsigned_abs();
        let last = i + 1 == chunks.len();
        frame.extend_from_slice(&block_header(size, chunk >= 0, last)?);
        frame.extend_from_slice(&data[pos..pos + size as usize]);
        pos += size as usize;
    }
    trace!(blocks = chunks.len(), frame_len = frame.len(), "reassembled zstd frame");
    Ok(frame)
}

/// Reassemble and decode a stripped VFS3 payload.
///
/// The decoder refuses to produce more than `decompressed_size` bytes, and a
/// shorter result is an [`Error::SizeMismatch`].
#[cfg(feature = "compression")]
pub fn decompress_chunked(decompressed_size: u64, data: &[u8], chunks: &[i32]) -> Result<Vec<u8>> {
    let frame = reassemble_frame(decompressed_size, data, chunks)?;
    let capacity = crate::utils::to_usize(decompressed_size)?;
    let out = zstd::bulk::decompress(&frame, capacity).map_err(Error::Zstd)?;
    if out.len() as u64 != decompressed_size {
        return Err(Error::size_mismatch(
            "zstd decompressed size",
            decompressed_size,
            out.len() as u64,
        ));
    }
    Ok(out)
}

/// Split a real zstd frame into VFS3-style block bodies and chunk sizes.
#[cfg(all(test, feature = "compression"))]
pub(crate) fn strip_frame(frame: &[u8]) -> (Vec<u8>, Vec<i32>) {
    assert_eq!(&frame[..4], &MAGIC.to_le_bytes());
    let fhd = frame[4];
    let fcs_flag = fhd >> 6;
    let single_segment = (fhd >> 5) & 1 == 1;
    let checksum = (fhd >> 2) & 1 == 1;
    let dict_len = [0, 1, 2, 4][usize::from(fhd & 3)];
    let fcs_len = match fcs_flag {
        0 if single_segment => 1,
        0 => 0,
        1 => 2,
        2 => 4,
        _ => 8,
    };
    let mut pos = 5 + usize::from(!single_segment) + dict_len + fcs_len;

    let mut data = Vec::new();
    let mut chunks = Vec::new();
    loop {
        let word = u32::from_le_bytes([frame[pos], frame[pos + 1], frame[pos + 2], 0]);
        pos += 3;
        let last = word & 1 == 1;
        let block_type = (word >> 1) & 3;
        let size = (word >> 3) as usize;
        match block_type {
            0 => chunks.push(-(size as i32)),
            2 => chunks.push(size as i32),
            other => panic!("block type {other} has no chunk encoding"),
        }
        data.extend_from_slice(&frame[pos..pos + size]);
        pos += size;
        if last {
            break;
        }
    }
    if checksum {
        pos += 4;
    }
    assert_eq!(pos, frame.len());
    (data, chunks)
}
