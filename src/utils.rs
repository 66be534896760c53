//! Low-level primitives shared by all parsers and writers.
//!
//! Fixed-length name fields in every container are NUL-padded Shift-JIS;
//! VFS3 name tables are NUL-terminated UTF-16LE.

use encoding_rs::SHIFT_JIS;

use crate::view::ByteView;
use crate::{Error, Result};

/// Decode a NUL-padded Shift-JIS field. Decoding stops at the first NUL;
/// anything after it is ignored.
pub(crate) fn fixed_str(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    SHIFT_JIS.decode_without_bom_handling(&raw[..end]).0.into_owned()
}

/// Encode `s` as Shift-JIS into the fixed-length field `out`, zero-filling the
/// remainder.
///
/// Returns [`Error::MalformedHeader`] if the encoded string does not fit or is
/// not representable.
pub(crate) fn put_fixed_str(out: &mut [u8], s: &str) -> Result<()> {
    let (encoded, _, unmappable) = SHIFT_JIS.encode(s);
    if unmappable {
        return Err(Error::malformed(format!("{s:?} is not representable in Shift-JIS")));
    }
    if encoded.len() > out.len() {
        return Err(Error::malformed(format!(
            "{s:?} needs {} bytes but the field holds {}",
            encoded.len(),
            out.len()
        )));
    }
    out[..encoded.len()].copy_from_slice(&encoded);
    out[encoded.len()..].fill(0);
    Ok(())
}

/// Read a NUL-terminated UTF-16LE string at `offset`.
///
/// Returns the string and the offset just past its terminator.
pub(crate) fn utf16_null_string(view: &ByteView<'_>, offset: usize) -> Result<(String, usize)> {
    let mut units = Vec::new();
    let mut pos = offset;
    loop {
        let unit = view.le_u16(pos)?;
        pos += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    let s = String::from_utf16(&units)
        .map_err(|_| Error::malformed(format!("invalid UTF-16 name at {offset:#x}")))?;
    Ok((s, pos))
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Convert a stored 64-bit quantity to `usize`, failing on hosts where it
/// cannot be addressed.
#[inline]
pub(crate) fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::malformed(format!("{value:#x} is not addressable")))
}
