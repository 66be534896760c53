//! NIS LZS - the flag-byte LZ scheme used inside NISPACK archives.
//!
//! ## Header (0x10 bytes)
//! ```text
//! [0x00] Extension        (4 bytes, Shift-JIS, NUL padded)
//! [0x04] DecompressedSize (u32 LE)
//! [0x08] CompressedSize   (u32 LE, measured from offset 0x04)
//! [0x0C] Flag             (u8)
//! [0x0D] Reserved         (3 bytes)
//! ```
//!
//! In the stream every byte other than `Flag` is a literal. `Flag Flag` is a
//! literal flag byte; `Flag D L` copies `L` bytes from `D` back, where `D` is
//! decremented when it is above the flag value (the flag itself can't be a
//! distance, so the encoding skips it).
//!
//! Decoding stops once the declared output size is reached, even if input
//! bytes remain.

use tracing::{debug, warn};

use super::{copy_forward, size_field};
use crate::utils::{fixed_str, put_fixed_str};
use crate::view::ByteView;
use crate::{Error, Result};

pub const HEADER_SIZE: usize = 0x10;
/// `CompressedSize` counts from the end of the extension field.
const SIZE_ORIGIN: usize = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzsHeader {
    pub extension: [u8; 4],
    pub decompressed_size: u32,
    pub compressed_size: u32,
    pub flag: u8,
}

impl LzsHeader {
    pub fn parse(view: &ByteView<'_>, offset: usize) -> Result<Self> {
        let header = Self {
            extension: view.array::<4>(offset)?,
            decompressed_size: view.le_u32(offset + 0x04)?,
            compressed_size: view.le_u32(offset + 0x08)?,
            flag: view.u8(offset + 0x0C)?,
        };
        if (header.compressed_size as usize) < HEADER_SIZE - SIZE_ORIGIN {
            return Err(Error::malformed(format!(
                "LZS compressed size {} is smaller than its header",
                header.compressed_size
            )));
        }
        Ok(header)
    }

    /// The original file extension, e.g. `"tx2"`.
    pub fn extension(&self) -> String {
        fixed_str(&self.extension)
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut b = [0u8; HEADER_SIZE];
        b[..4].copy_from_slice(&self.extension);
        b[0x04..0x08].copy_from_slice(&self.decompressed_size.to_le_bytes());
        b[0x08..0x0C].copy_from_slice(&self.compressed_size.to_le_bytes());
        b[0x0C] = self.flag;
        b
    }
}

/// Decompress an LZS stream that starts at the beginning of `data`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decompress_at(ByteView::new(data), 0)
}

/// Decompress the LZS stream whose header sits at `offset` in `view`.
pub fn decompress_at(view: ByteView<'_>, offset: usize) -> Result<Vec<u8>> {
    let header = LzsHeader::parse(&view, offset)?;
    let start = offset + HEADER_SIZE;
    let end = offset + SIZE_ORIGIN + header.compressed_size as usize;
    let input = view.bytes(start, end - start)?;
    let flag = header.flag;

    let mut out = vec![0u8; header.decompressed_size as usize];
    let mut op = 0;
    let mut ip = 0;
    let byte = |ip: usize| -> Result<u8> {
        input
            .get(ip)
            .copied()
            .ok_or_else(|| Error::out_of_bounds(start + ip, 1, end))
    };

    while ip < input.len() && op < out.len() {
        let b1 = byte(ip)?;
        if b1 != flag {
            put(&mut out, op, b1)?;
            op += 1;
            ip += 1;
            continue;
        }

        let b2 = byte(ip + 1)?;
        if b2 == flag {
            put(&mut out, op, flag)?;
            op += 1;
            ip += 2;
            continue;
        }

        let distance = usize::from(if b2 > flag { b2 - 1 } else { b2 });
        let len = usize::from(byte(ip + 2)?);
        if distance > op {
            return Err(Error::out_of_bounds(op, distance, op));
        }
        copy_forward(&mut out, op - distance, op, len)?;
        op += len;
        ip += 3;
    }

    if op != out.len() {
        warn!(
            written = op,
            expected = out.len(),
            "LZS stream ended before filling its output"
        );
    }
    debug!(
        extension = %header.extension(),
        compressed = header.compressed_size,
        decompressed = header.decompressed_size,
        "LZS decompressed"
    );
    Ok(out)
}

fn put(out: &mut [u8], op: usize, b: u8) -> Result<()> {
    let limit = out.len();
    *out.get_mut(op)
        .ok_or_else(|| Error::out_of_bounds(op, 1, limit))? = b;
    Ok(())
}

/// Encode `data` as an LZS stream of literals.
///
/// The least frequent byte value becomes the flag, so at most a handful of
/// input bytes need escaping. `extension` must fit in four bytes, and the
/// stream must fit the header's `u32` sizes.
pub fn compress(data: &[u8], extension: &str) -> Result<Vec<u8>> {
    let mut counts = [0usize; 256];
    for &b in data {
        counts[usize::from(b)] += 1;
    }
    let flag = (0..=u8::MAX)
        .min_by_key(|&b| counts[usize::from(b)])
        .unwrap_or(0);

    let mut payload = Vec::with_capacity(data.len() + counts[usize::from(flag)]);
    for &b in data {
        payload.push(b);
        if b == flag {
            payload.push(flag);
        }
    }

    let mut header = LzsHeader {
        extension: [0; 4],
        decompressed_size: size_field(data.len())?,
        compressed_size: size_field(HEADER_SIZE - SIZE_ORIGIN + payload.len())?,
        flag,
    };
    put_fixed_str(&mut header.extension, extension)?;

    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(&payload);
    Ok(out)
}
