//! Codecs for payloads stored inside NIS containers.
//!
//! Only zstd decoding depends on the `compression` Cargo feature. YKCMP, LZS
//! and zstd frame reconstruction are plain Rust and always available:
//!
//! ```toml
//! [dependencies]
//! nisarc = { version = "0.1", default-features = false }
//! ```
//!
//! ## Submodules
//!
//! | Module    | Algorithm | Typical use in nisarc |
//! |-----------|-----------|-----------------------|
//! | [`ykcmp`] | YKCMP_V1  | `START.DAT` and other payloads in Makai Kingdom `DATA.DAT` |
//! | [`lzs`]   | NIS LZS   | NISPACK entries in ZHP |
//! | [`zstd`]  | Zstandard | VFS3 files with stripped frame and block headers |
//!
//! ## Choosing the right function
//!
//! * **YKCMP** - check with [`ykcmp::is_ykcmp`], then [`ykcmp::decompress`].
//!   [`ykcmp::compress`] produces a literal-only stream the games accept, so
//!   edited files (up to 4 GiB, the header's size limit) can be written back with
//!   [`Repack::replace_file`](crate::formats::Repack::replace_file).
//! * **LZS** - [`lzs::decompress`]; the header also keeps the original file
//!   extension.
//! * **VFS3** - use [`Vfs3::decompress_file`](crate::formats::vfs3::Vfs3::decompress_file),
//!   which looks up the chunk sizes and calls [`zstd::decompress_chunked`].

pub mod lzs;
pub mod ykcmp;
pub mod zstd;

use crate::{Error, Result};

/// Copy `len` bytes from `out[src..]` to `out[dst..]` one byte at a time, so
/// a source run that overlaps the destination repeats.
///
/// The source must start before `dst` and the copy must end inside `out`;
/// otherwise this returns [`Error::OutOfBounds`].
pub(crate) fn copy_forward(out: &mut [u8], src: usize, dst: usize, len: usize) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    if src >= dst {
        return Err(Error::out_of_bounds(src, len, dst));
    }
    if dst + len > out.len() {
        return Err(Error::out_of_bounds(dst, len, out.len()));
    }
    for k in 0..len {
        out[dst + k] = out[src + k];
    }
    Ok(())
}

/// Narrow a stream length to the `u32` size fields every NIS header uses.
pub(crate) fn size_field(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::out_of_bounds(0, len, u32::MAX as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_copy_repeats_pattern() {
        let mut out = *b"abc\0\0\0\0";
        copy_forward(&mut out, 1, 3, 4).unwrap();
        assert_eq!(&out, b"abcbcbc");
    }

    #[test]
    fn copy_bounds() {
        let mut out = [0u8; 4];
        assert!(copy_forward(&mut out, 2, 2, 1).is_err());
        assert!(copy_forward(&mut out, 0, 2, 3).is_err());
        assert!(copy_forward(&mut out, 5, 2, 0).is_ok());
    }

    #[test]
    fn size_fields_stop_at_u32() {
        assert_eq!(size_field(0x14).unwrap(), 0x14);
        assert_eq!(size_field(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn size_fields_reject_lengths_past_u32() {
        assert!(matches!(
            size_field(u32::MAX as usize + 1),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
