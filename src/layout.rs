//! Data-driven descriptions of fixed-layout binary records.
//!
//! A [`RecordLayout`] is a static list of named fields with their offset and
//! width. A [`Record`] pairs a layout with the raw bytes of one record and
//! decodes fields on demand, so parsing never copies more than it reads and
//! writing starts from the original bytes (reserved fields and padding after
//! a name survive a rewrite untouched).
//!
//! ```
//! use nisarc::layout::{Field, FieldKind, RecordLayout};
//!
//! static ENTRY: RecordLayout = RecordLayout {
//!     name: "entry",
//!     size: 12,
//!     fields: &[
//!         Field::new("filename", 0, FieldKind::Str(8)),
//!         Field::new("size", 8, FieldKind::U32),
//!     ],
//! };
//!
//! let rec = ENTRY.record(b"a.txt\0\0\0\x05\0\0\0").unwrap();
//! assert_eq!(rec.str("filename").unwrap(), "a.txt");
//! assert_eq!(rec.uint("size").unwrap(), 5);
//! ```

use std::borrow::Cow;

use crate::utils::{fixed_str, put_fixed_str};
use crate::{Error, Result};

/// Storage class of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    I16,
    U32,
    I32,
    U64,
    /// NUL-padded Shift-JIS string of the given byte length.
    Str(usize),
    /// Opaque bytes (magic values, reserved areas).
    Bytes(usize),
}

impl FieldKind {
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 => 4,
            FieldKind::U64 => 8,
            FieldKind::Str(n) | FieldKind::Bytes(n) => n,
        }
    }
}

/// One named field within a record.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, kind: FieldKind) -> Self {
        Self { name, offset, kind }
    }

    const fn end(&self) -> usize {
        self.offset + self.kind.width()
    }
}

/// Byte-packed layout of a record type.
#[derive(Debug)]
pub struct RecordLayout {
    /// Human-readable name used in error messages.
    pub name: &'static str,
    /// Total record size in bytes.
    pub size: usize,
    pub fields: &'static [Field],
}

impl RecordLayout {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::NotFound(format!("{}.{name}", self.name)))
    }

    /// Wrap `raw` (exactly [`size`](Self::size) bytes) as a record without
    /// copying.
    pub fn record<'a>(&'static self, raw: &'a [u8]) -> Result<Record<'a>> {
        if raw.len() != self.size {
            return Err(Error::size_mismatch(self.name, self.size as u64, raw.len() as u64));
        }
        Ok(Record {
            layout: self,
            raw: Cow::Borrowed(raw),
        })
    }

    /// A fresh all-zero record.
    pub fn zeroed(&'static self) -> Record<'static> {
        Record {
            layout: self,
            raw: Cow::Owned(vec![0; self.size]),
        }
    }

    /// Whether every field lies inside the record and no two fields share a
    /// byte. Used by tests to catch typos in the static tables.
    pub fn is_consistent(&self) -> bool {
        let mut spans: Vec<(usize, usize)> = self.fields.iter().map(|f| (f.offset, f.end())).collect();
        spans.sort_unstable();
        spans.iter().all(|&(_, end)| end <= self.size)
            && spans.windows(2).all(|w| w[0].1 <= w[1].0)
    }
}

/// One record: a layout plus its bytes, borrowed until first written.
#[derive(Debug, Clone)]
pub struct Record<'a> {
    layout: &'static RecordLayout,
    raw: Cow<'a, [u8]>,
}

impl<'a> Record<'a> {
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn slot(&self, name: &str) -> Result<(&[u8], FieldKind)> {
        let f = self.layout.field(name)?;
        let limit = self.raw.len();
        let b = self
            .raw
            .get(f.offset..f.end())
            .ok_or_else(|| Error::out_of_bounds(f.offset, f.kind.width(), limit))?;
        Ok((b, f.kind))
    }

    /// Read an unsigned integer field of any width.
    pub fn uint(&self, name: &str) -> Result<u64> {
        let (b, kind) = self.slot(name)?;
        Ok(match kind {
            FieldKind::U8 => u64::from(b[0]),
            FieldKind::U16 => u64::from(u16::from_le_bytes([b[0], b[1]])),
            FieldKind::U32 => u64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            FieldKind::U64 => {
                let mut a = [0u8; 8];
                a.copy_from_slice(b);
                u64::from_le_bytes(a)
            }
            other => return Err(kind_error(self.layout, name, other)),
        })
    }

    /// Read a signed integer field.
    pub fn int(&self, name: &str) -> Result<i64> {
        let (b, kind) = self.slot(name)?;
        Ok(match kind {
            FieldKind::I16 => i64::from(i16::from_le_bytes([b[0], b[1]])),
            FieldKind::I32 => i64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            other => return Err(kind_error(self.layout, name, other)),
        })
    }

    /// Decode a string field.
    pub fn str(&self, name: &str) -> Result<String> {
        match self.slot(name)? {
            (b, FieldKind::Str(_)) => Ok(fixed_str(b)),
            (_, other) => Err(kind_error(self.layout, name, other)),
        }
    }

    /// Raw bytes of any field.
    pub fn bytes(&self, name: &str) -> Result<&[u8]> {
        self.slot(name).map(|(b, _)| b)
    }

    fn slot_mut(&mut self, name: &str) -> Result<(&mut [u8], FieldKind)> {
        let f = *self.layout.field(name)?;
        let limit = self.raw.len();
        let b = self
            .raw
            .to_mut()
            .get_mut(f.offset..f.end())
            .ok_or_else(|| Error::out_of_bounds(f.offset, f.kind.width(), limit))?;
        Ok((b, f.kind))
    }

    /// Store an unsigned integer, failing if it does not fit the field.
    pub fn set_uint(&mut self, name: &str, value: u64) -> Result<()> {
        let layout = self.layout;
        let (b, kind) = self.slot_mut(name)?;
        let too_big = || {
            Error::malformed(format!("{value:#x} does not fit {}.{name}", layout.name))
        };
        match kind {
            FieldKind::U8 => b[0] = u8::try_from(value).map_err(|_| too_big())?,
            FieldKind::U16 => {
                let v = u16::try_from(value).map_err(|_| too_big())?;
                b.copy_from_slice(&v.to_le_bytes());
            }
            FieldKind::U32 => {
                let v = u32::try_from(value).map_err(|_| too_big())?;
                b.copy_from_slice(&v.to_le_bytes());
            }
            FieldKind::U64 => b.copy_from_slice(&value.to_le_bytes()),
            other => return Err(kind_error(layout, name, other)),
        }
        Ok(())
    }

    /// Store a signed integer, failing if it does not fit the field.
    pub fn set_int(&mut self, name: &str, value: i64) -> Result<()> {
        let layout = self.layout;
        let (b, kind) = self.slot_mut(name)?;
        let too_big = || Error::malformed(format!("{value} does not fit {}.{name}", layout.name));
        match kind {
            FieldKind::I16 => {
                let v = i16::try_from(value).map_err(|_| too_big())?;
                b.copy_from_slice(&v.to_le_bytes());
            }
            FieldKind::I32 => {
                let v = i32::try_from(value).map_err(|_| too_big())?;
                b.copy_from_slice(&v.to_le_bytes());
            }
            other => return Err(kind_error(layout, name, other)),
        }
        Ok(())
    }

    /// Store a string, NUL-padding the rest of the field.
    pub fn set_str(&mut self, name: &str, value: &str) -> Result<()> {
        let layout = self.layout;
        match self.slot_mut(name)? {
            (b, FieldKind::Str(_)) => put_fixed_str(b, value),
            (_, other) => Err(kind_error(layout, name, other)),
        }
    }
}

fn kind_error(layout: &RecordLayout, name: &str, kind: FieldKind) -> Error {
    Error::malformed(format!(
        "{}.{name} is stored as {kind:?}, which this accessor cannot read",
        layout.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAMPLE: RecordLayout = RecordLayout {
        name: "sample",
        size: 16,
        fields: &[
            Field::new("name", 0, FieldKind::Str(6)),
            Field::new("flags", 6, FieldKind::U16),
            Field::new("id", 8, FieldKind::I32),
            Field::new("size", 12, FieldKind::U32),
        ],
    };

    fn sample_bytes() -> Vec<u8> {
        let mut raw = b"ab\0zz\0".to_vec();
        raw.extend_from_slice(&3u16.to_le_bytes());
        raw.extend_from_slice(&(-1i32).to_le_bytes());
        raw.extend_from_slice(&0x1234u32.to_le_bytes());
        raw
    }

    #[test]
    fn decodes_fields_in_place() {
        let raw = sample_bytes();
        let rec = SAMPLE.record(&raw).unwrap();
        assert_eq!(rec.str("name").unwrap(), "ab");
        assert_eq!(rec.uint("flags").unwrap(), 3);
        assert_eq!(rec.int("id").unwrap(), -1);
        assert_eq!(rec.uint("size").unwrap(), 0x1234);
        assert!(matches!(rec.uint("missing"), Err(Error::NotFound(_))));
        assert!(matches!(rec.uint("id"), Err(Error::MalformedHeader(_))));
    }

    #[test]
    fn writes_preserve_untouched_bytes() {
        let raw = sample_bytes();
        let mut rec = SAMPLE.record(&raw).unwrap();
        rec.set_uint("size", 7).unwrap();
        // Bytes after the name's NUL are not part of any write.
        assert_eq!(&rec.as_bytes()[..6], b"ab\0zz\0");
        assert_eq!(rec.uint("size").unwrap(), 7);
        // The source buffer is untouched.
        assert_eq!(&raw[12..16], &0x1234u32.to_le_bytes());

        rec.set_str("name", "xyz").unwrap();
        assert_eq!(&rec.as_bytes()[..6], b"xyz\0\0\0");
        rec.set_int("id", -2).unwrap();
        assert_eq!(rec.int("id").unwrap(), -2);
    }

    #[test]
    fn rejects_values_that_do_not_fit() {
        let mut rec = SAMPLE.zeroed();
        assert!(rec.set_uint("flags", 0x1_0000).is_err());
        assert!(rec.set_uint("size", u64::from(u32::MAX)).is_ok());
        assert!(rec.set_str("name", "toolong").is_err());
    }

    #[test]
    fn record_length_must_match_layout() {
        assert!(matches!(
            SAMPLE.record(&[0u8; 15]),
            Err(Error::SizeMismatch { .. })
        ));
        assert!(SAMPLE.is_consistent());
    }

    #[test]
    fn consistency_catches_overrun_and_overlap() {
        static OVERRUN: RecordLayout = RecordLayout {
            name: "overrun",
            size: 4,
            fields: &[Field::new("size", 2, FieldKind::U32)],
        };
        static OVERLAP: RecordLayout = RecordLayout {
            name: "overlap",
            size: 8,
            fields: &[
                Field::new("size", 4, FieldKind::U32),
                Field::new("offset", 0, FieldKind::U64),
            ],
        };
        static TOUCHING: RecordLayout = RecordLayout {
            name: "touching",
            size: 8,
            fields: &[
                Field::new("offset", 4, FieldKind::U32),
                Field::new("size", 0, FieldKind::U32),
            ],
        };
        assert!(!OVERRUN.is_consistent());
        assert!(!OVERLAP.is_consistent());
        assert!(TOUCHING.is_consistent());

        // A field past the end reads as an error instead of panicking.
        let raw = [0u8; 4];
        let mut rec = OVERRUN.record(&raw).unwrap();
        assert!(matches!(rec.uint("size"), Err(Error::OutOfBounds { .. })));
        assert!(matches!(rec.set_uint("size", 1), Err(Error::OutOfBounds { .. })));
    }
}
