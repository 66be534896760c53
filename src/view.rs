//! Read-only addressable view over an in-memory buffer.
//!
//! Every container and codec reads fixed-width integers and byte runs from
//! absolute offsets through a [`ByteView`]. Each accessor reads exactly the
//! bytes it promises or returns [`Error::OutOfBounds`]; nothing is ever
//! silently truncated.

use crate::{Error, Result};

/// Borrowed, bounds-checked window onto a byte buffer.
///
/// Views never own or mutate their storage, and any number of them may alias
/// the same buffer.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
}

impl<'a> ByteView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole underlying slice.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Borrow `len` bytes starting at `offset`.
    #[inline]
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| Error::out_of_bounds(offset, len, self.data.len()))
    }

    /// A narrower view of `len` bytes starting at `offset`.
    pub fn subview(&self, offset: usize, len: usize) -> Result<ByteView<'a>> {
        self.bytes(offset, len).map(ByteView::new)
    }

    /// Read exactly `N` bytes into a fixed-size array.
    #[inline]
    pub fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut b = [0u8; N];
        b.copy_from_slice(self.bytes(offset, N)?);
        Ok(b)
    }

    #[inline]
    pub fn u8(&self, offset: usize) -> Result<u8> {
        self.data
            .get(offset)
            .copied()
            .ok_or_else(|| Error::out_of_bounds(offset, 1, self.data.len()))
    }

    #[inline]
    pub fn le_u16(&self, offset: usize) -> Result<u16> {
        self.array(offset).map(u16::from_le_bytes)
    }

    #[inline]
    pub fn le_i16(&self, offset: usize) -> Result<i16> {
        self.array(offset).map(i16::from_le_bytes)
    }

    #[inline]
    pub fn le_u32(&self, offset: usize) -> Result<u32> {
        self.array(offset).map(u32::from_le_bytes)
    }

    #[inline]
    pub fn le_i32(&self, offset: usize) -> Result<i32> {
        self.array(offset).map(i32::from_le_bytes)
    }

    #[inline]
    pub fn le_u64(&self, offset: usize) -> Result<u64> {
        self.array(offset).map(u64::from_le_bytes)
    }

    /// Verify that the `N` bytes at `offset` match `expected`.
    ///
    /// Returns [`Error::MalformedHeader`] on mismatch.
    pub fn magic<const N: usize>(&self, offset: usize, expected: &[u8; N]) -> Result<()> {
        let got = self.array::<N>(offset)?;
        if &got != expected {
            return Err(Error::malformed(format!(
                "bad magic: expected {:?}, found {:?}",
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(&got)
            )));
        }
        Ok(())
    }
}

impl<'a> From<&'a [u8]> for ByteView<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_integers() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFF, 0xFF, 0xFF];
        let view = ByteView::new(&data);
        assert_eq!(view.le_u16(0).unwrap(), 0x0201);
        assert_eq!(view.le_u32(0).unwrap(), 0x04030201);
        assert_eq!(view.le_i32(4).unwrap(), -1);
        assert_eq!(view.le_i16(6).unwrap(), -1);
        assert_eq!(view.le_u64(0).unwrap(), 0xFFFF_FFFF_0403_0201);
    }

    #[test]
    fn rejects_reads_past_the_end() {
        let data = [0u8; 6];
        let view = ByteView::new(&data);
        assert!(matches!(
            view.le_u32(4),
            Err(Error::OutOfBounds {
                offset: 4,
                len: 4,
                limit: 6
            })
        ));
        assert!(matches!(view.u8(6), Err(Error::OutOfBounds { .. })));
        assert!(matches!(
            view.bytes(usize::MAX, 2),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn magic_mismatch_is_malformed() {
        let view = ByteView::new(b"VFS4....");
        assert!(view.magic(0, b"VFS4").is_ok());
        assert!(matches!(
            view.magic(0, b"VFS3"),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn subviews_alias_the_parent() {
        let data = *b"abcdef";
        let view = ByteView::new(&data);
        let sub = view.subview(2, 3).unwrap();
        assert_eq!(sub.as_bytes(), b"cde");
        assert_eq!(sub.u8(0).unwrap(), b'c');
        assert!(view.subview(4, 3).is_err());
    }
}
