//! YKCMP_V1 - Makai Kingdom's byte-oriented LZ scheme.
//!
//! ## Header (0x14 bytes)
//! ```text
//! [0x00] Magic "YKCMP_V1"          (8 bytes)
//! [0x08] Reserved, always 4        (u32 LE)
//! [0x0C] CompressedSize            (u32 LE, counts this header)
//! [0x10] DecompressedSize          (u32 LE)
//! ```
//!
//! ## Instructions
//! Each instruction starts with one opcode byte `b1`:
//!
//! | `b1`          | Width | Meaning |
//! |---------------|-------|---------|
//! | `0x00`        | 7     | copy `u16` bytes from absolute output offset `u32` |
//! | `0x01..=0x7F` | 1 + n | copy the next `b1` input bytes verbatim |
//! | `0x80..=0xBF` | 1     | `XY`: copy `X - 8 + 1` bytes from `Y + 1` back |
//! | `0xC0..=0xDF` | 2     | `b1 b2`: copy `b1 - 0xC0 + 2` bytes from `b2 + 1` back |
//! | `0xE0..=0xFF` | 3     | `XXXYYY`: copy `X - 0xE00 + 3` bytes from `Y + 1` back |
//!
//! Lookback sources may overlap the bytes being written, so copies run one
//! byte at a time, front to back.

use tracing::{debug, warn};

use super::{copy_forward, size_field};
use crate::view::ByteView;
use crate::{Error, Result};

pub const MAGIC: &[u8; 8] = b"YKCMP_V1";
pub const HEADER_SIZE: usize = 0x14;
const RESERVED_VALUE: u32 = 4;
const MAX_LITERAL: usize = 0x7F;

/// Parsed YKCMP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YkcmpHeader {
    /// Stream length including the header.
    pub compressed_size: u32,
    pub decompressed_size: u32,
}

impl YkcmpHeader {
    /// Parse and validate the header at `offset`.
    pub fn parse(view: &ByteView<'_>, offset: usize) -> Result<Self> {
        view.magic(offset, MAGIC)?;
        let reserved = view.le_u32(offset + 0x08)?;
        if reserved != RESERVED_VALUE {
            return Err(Error::malformed(format!(
                "YKCMP reserved field is {reserved}, expected {RESERVED_VALUE}"
            )));
        }
        let compressed_size = view.le_u32(offset + 0x0C)?;
        if (compressed_size as usize) < HEADER_SIZE {
            return Err(Error::malformed(format!(
                "YKCMP compressed size {compressed_size} is smaller than its header"
            )));
        }
        Ok(Self {
            compressed_size,
            decompressed_size: view.le_u32(offset + 0x10)?,
        })
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut b = [0u8; HEADER_SIZE];
        b[..8].copy_from_slice(MAGIC);
        b[0x08..0x0C].copy_from_slice(&RESERVED_VALUE.to_le_bytes());
        b[0x0C..0x10].copy_from_slice(&self.compressed_size.to_le_bytes());
        b[0x10..0x14].copy_from_slice(&self.decompressed_size.to_le_bytes());
        b
    }
}

/// Whether `data` starts with the YKCMP magic.
pub fn is_ykcmp(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

/// Decompress a YKCMP stream that starts at the beginning of `data`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decompress_at(ByteView::new(data), 0)
}

/// Decompress the YKCMP stream whose header sits at `offset` in `view`.
///
/// The returned buffer is owned and independent of `view`.
pub fn decompress_at(view: ByteView<'_>, offset: usize) -> Result<Vec<u8>> {
    let header = YkcmpHeader::parse(&view, offset)?;
    let data_start = offset + HEADER_SIZE;
    let input = view.bytes(data_start, header.compressed_size as usize - HEADER_SIZE)?;

    let mut out = vec![0u8; header.decompressed_size as usize];
    let mut dec = Decoder {
        input,
        base: data_start,
        out: &mut out,
        op: 0,
    };
    let instructions = dec.run()?;
    let written = dec.op;

    if written != header.decompressed_size as usize {
        warn!(
            written,
            expected = header.decompressed_size,
            "YKCMP stream ended before filling its output"
        );
    }
    debug!(
        compressed = header.compressed_size,
        decompressed = header.decompressed_size,
        instructions,
        "YKCMP decompressed"
    );
    Ok(out)
}

struct Decoder<'i, 'o> {
    input: &'i [u8],
    /// Absolute offset of `input[0]`, for error reporting.
    base: usize,
    out: &'o mut [u8],
    op: usize,
}

impl Decoder<'_, '_> {
    fn byte(&self, ip: usize) -> Result<u8> {
        self.input
            .get(ip)
            .copied()
            .ok_or_else(|| Error::out_of_bounds(self.base + ip, 1, self.base + self.input.len()))
    }

    fn run(&mut self) -> Result<usize> {
        let mut ip = 0;
        let mut instructions = 0;
        while ip < self.input.len() {
            let b1 = self.byte(ip)?;
            instructions += 1;

            match b1 {
                0x00 => {
                    let mut offset = [0u8; 4];
                    for (k, b) in offset.iter_mut().enumerate() {
                        *b = self.byte(ip + 1 + k)?;
                    }
                    let count = u16::from_le_bytes([self.byte(ip + 5)?, self.byte(ip + 6)?]);
                    self.absolute(u32::from_le_bytes(offset) as usize, count as usize)?;
                    ip += 7;
                }
                0x01..=0x7F => {
                    let n = b1 as usize;
                    let start = ip + 1;
                    let src = self.input.get(start..start + n).ok_or_else(|| {
                        Error::out_of_bounds(self.base + start, n, self.base + self.input.len())
                    })?;
                    let (op, limit) = (self.op, self.out.len());
                    let dst = self
                        .out
                        .get_mut(op..op + n)
                        .ok_or_else(|| Error::out_of_bounds(op, n, limit))?;
                    dst.copy_from_slice(src);
                    self.op += n;
                    ip = start + n;
                }
                0x80..=0xBF => {
                    let x = usize::from(b1 >> 4);
                    let y = usize::from(b1 & 0x0F);
                    self.lookback(y + 1, x - 0x08 + 1)?;
                    ip += 1;
                }
                0xC0..=0xDF => {
                    let b2 = self.byte(ip + 1)?;
                    self.lookback(usize::from(b2) + 1, usize::from(b1) - 0xC0 + 2)?;
                    ip += 2;
                }
                0xE0..=0xFF => {
                    let b2 = usize::from(self.byte(ip + 1)?);
                    let b3 = usize::from(self.byte(ip + 2)?);
                    let x = (usize::from(b1) << 4) | (b2 >> 4);
                    let y = ((b2 & 0x0F) << 8) | b3;
                    self.lookback(y + 1, x - 0x0E00 + 3)?;
                    ip += 3;
                }
            }
        }
        Ok(instructions)
    }

    /// Copy `len` bytes from `distance` bytes behind the write cursor.
    fn lookback(&mut self, distance: usize, len: usize) -> Result<()> {
        if distance > self.op {
            return Err(Error::out_of_bounds(self.op, distance, self.op));
        }
        self.absolute(self.op - distance, len)
    }

    /// Copy `len` bytes from output offset `src` to the write cursor.
    fn absolute(&mut self, src: usize, len: usize) -> Result<()> {
        copy_forward(self.out, src, self.op, len)?;
        self.op += len;
        Ok(())
    }
}

/// Wrap `data` in a YKCMP stream made only of literal runs.
///
/// The result is slightly larger than the input (one opcode per 127 bytes
/// plus the header), but every YKCMP reader accepts it. Streams that don't
/// fit the header's `u32` sizes are [`Error::OutOfBounds`].
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let runs = data.len().div_ceil(MAX_LITERAL);
    let total = HEADER_SIZE + data.len() + runs;
    let header = YkcmpHeader {
        compressed_size: size_field(total)?,
        decompressed_size: size_field(data.len())?,
    };

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&header.to_bytes());
    for chunk in data.chunks(MAX_LITERAL) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(decompressed_size: u32, body: &[u8]) -> Vec<u8> {
        let header = YkcmpHeader {
            compressed_size: (HEADER_SIZE + body.len()) as u32,
            decompressed_size,
        };
        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn literal_run() {
        let data = stream(5, b"\x05Hello");
        assert_eq!(decompress(&data).unwrap(), b"Hello");
    }

    #[test]
    fn literal_then_lookback_fills_declared_size() {
        // "Hello" then 0x81: x=8 -> 1 byte from 2 back ('l').
        let data = stream(6, b"\x05Hello\x81");
        assert_eq!(decompress(&data).unwrap(), b"Hellol");
    }

    #[test]
    fn one_byte_lookback_from_sixteen_back() {
        // 23 literal bytes, then 0x9F: x=9, y=0xF -> 2 bytes from 16 back.
        let literal: Vec<u8> = (0u8..23).collect();
        let mut body = vec![23];
        body.extend_from_slice(&literal);
        body.push(0x9F);
        let out = decompress(&stream(25, &body)).unwrap();
        assert_eq!(&out[..23], literal.as_slice());
        assert_eq!(&out[23..], &[7, 8]);
    }

    #[test]
    fn overlapping_lookback_repeats() {
        // "ab" then 0xC4 0x01: 6 bytes from 2 back.
        let data = stream(8, b"\x02ab\xC4\x01");
        assert_eq!(decompress(&data).unwrap(), b"abababab");
    }

    #[test]
    fn three_byte_lookback() {
        // 0xE0 0x00 0x00: x = 0xE00 -> 3 bytes, y = 0 -> 1 back.
        let data = stream(4, b"\x01z\xE0\x00\x00");
        assert_eq!(decompress(&data).unwrap(), b"zzzz");

        // 0xE0 0x10 0x02: x = 0xE01 -> 4 bytes, y = 2 -> 3 back.
        let data = stream(7, b"\x03xyz\xE0\x10\x02");
        assert_eq!(decompress(&data).unwrap(), b"xyzxyzx");
    }

    #[test]
    fn absolute_lookback() {
        // Copy 3 bytes from output offset 1.
        let data = stream(7, b"\x04abcd\x00\x01\x00\x00\x00\x03\x00");
        assert_eq!(decompress(&data).unwrap(), b"abcdbcd");
    }

    #[test]
    fn lookback_before_output_start_is_out_of_bounds() {
        let data = stream(4, b"\x01a\x82");
        assert!(matches!(decompress(&data), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn writing_past_declared_size_is_out_of_bounds() {
        let data = stream(3, b"\x05Hello");
        assert!(matches!(decompress(&data), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn truncated_instruction_is_out_of_bounds() {
        let data = stream(10, b"\x05Hel");
        assert!(matches!(decompress(&data), Err(Error::OutOfBounds { .. })));
        let data = stream(10, b"\x01a\xE0\x00");
        assert!(matches!(decompress(&data), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn header_validation() {
        let mut data = stream(5, b"\x05Hello");
        data[0x08] = 5;
        assert!(matches!(decompress(&data), Err(Error::MalformedHeader(_))));

        let mut data = stream(5, b"\x05Hello");
        data[0x0C..0x10].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(decompress(&data), Err(Error::OutOfBounds { .. })));

        assert!(matches!(
            decompress(b"YKCMP_V2\x04\0\0\0"),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn compress_emits_literal_runs() {
        let input: Vec<u8> = (0..300u32).map(|i| (i * 7) as u8).collect();
        let packed = compress(&input).unwrap();
        assert_eq!(packed.len(), HEADER_SIZE + 300 + 3);
        assert_eq!(packed[HEADER_SIZE], 0x7F);
        assert_eq!(packed[HEADER_SIZE + 128], 0x7F);
        assert_eq!(packed[HEADER_SIZE + 256], (300 - 254) as u8);
        assert_eq!(decompress(&packed).unwrap(), input);
    }

    #[test]
    fn compress_empty() {
        let packed = compress(b"").unwrap();
        assert_eq!(packed.len(), HEADER_SIZE);
        assert!(decompress(&packed).unwrap().is_empty());
    }

    #[test]
    fn decompress_at_nested_offset() {
        let mut data = b"junk".to_vec();
        data.extend_from_slice(&compress(b"nested").unwrap());
        data.extend_from_slice(b"trailing");
        assert_eq!(decompress_at(ByteView::new(&data), 4).unwrap(), b"nested");
    }
}
