//! Length-prefixed tables of fixed-size records.
//!
//! Every container directory in this crate is one of these: a small count
//! header followed by back-to-back records. Game data tables stored inside
//! START.DAT use the same shape with a doubled count (capacity, then length).
//!
//! ## Layout
//! ```text
//! Single: [count u32] [record; count]
//! Double: [capacity u32] [count u32] [record; count]   (capacity == count)
//! ```

use tracing::trace;

use crate::layout::{Record, RecordLayout};
use crate::view::ByteView;
use crate::{Error, Result};

/// How many 32-bit counts precede the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counting {
    Single,
    Double,
}

impl Counting {
    pub const fn header_len(self) -> usize {
        match self {
            Counting::Single => 4,
            Counting::Double => 8,
        }
    }
}

/// A homogeneous record array over a [`ByteView`].
///
/// Construction bounds-checks the whole entry region, so indexing a valid
/// position never fails on bounds afterwards.
#[derive(Debug, Clone, Copy)]
pub struct CountedTable<'a> {
    view: ByteView<'a>,
    offset: usize,
    header_len: usize,
    entry_count: usize,
    layout: &'static RecordLayout,
}

impl<'a> CountedTable<'a> {
    /// Parse a count-prefixed table at `offset`.
    ///
    /// With [`Counting::Double`], the capacity and count must agree or this
    /// returns [`Error::SizeMismatch`].
    pub fn parse(
        view: ByteView<'a>,
        offset: usize,
        layout: &'static RecordLayout,
        counting: Counting,
    ) -> Result<Self> {
        let entry_count = match counting {
            Counting::Single => view.le_u32(offset)?,
            Counting::Double => {
                let capacity = view.le_u32(offset)?;
                let count = view.le_u32(offset + 4)?;
                if capacity != count {
                    return Err(Error::size_mismatch(
                        format!("{} table capacity", layout.name),
                        u64::from(capacity),
                        u64::from(count),
                    ));
                }
                count
            }
        };
        Self::build(view, offset, counting.header_len(), entry_count as usize, layout)
    }

    /// Wrap `count` records starting at `offset` whose count is stored
    /// somewhere else (a container header, typically).
    pub fn with_count(
        view: ByteView<'a>,
        offset: usize,
        count: usize,
        layout: &'static RecordLayout,
    ) -> Result<Self> {
        Self::build(view, offset, 0, count, layout)
    }

    fn build(
        view: ByteView<'a>,
        offset: usize,
        header_len: usize,
        entry_count: usize,
        layout: &'static RecordLayout,
    ) -> Result<Self> {
        let entries_len = entry_count
            .checked_mul(layout.size)
            .ok_or_else(|| Error::out_of_bounds(offset + header_len, usize::MAX, view.len()))?;
        view.bytes(offset + header_len, entries_len)?;
        trace!(
            table = layout.name,
            offset,
            entry_count,
            "counted table"
        );
        Ok(Self {
            view,
            offset,
            header_len,
            entry_count,
            layout,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entry_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Bytes consumed by the count header.
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Offset of the first record.
    pub fn entries_offset(&self) -> usize {
        self.offset + self.header_len
    }

    /// Offset just past the last record.
    pub fn end_offset(&self) -> usize {
        self.entries_offset() + self.entry_count * self.layout.size
    }

    pub fn layout(&self) -> &'static RecordLayout {
        self.layout
    }

    /// Raw bytes of record `index`.
    pub fn entry_bytes(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.entry_count {
            return Err(Error::OutOfBounds {
                offset: index as u64,
                len: 1,
                limit: self.entry_count as u64,
            });
        }
        self.view.bytes(
            self.entries_offset() + index * self.layout.size,
            self.layout.size,
        )
    }

    /// Record `index`, borrowed from the underlying buffer.
    pub fn get(&self, index: usize) -> Result<Record<'a>> {
        self.layout.record(self.entry_bytes(index)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Record<'a>>> + '_ {
        (0..self.entry_count).map(|i| self.get(i))
    }

    /// Decode every record, failing on the first error.
    pub fn records(&self) -> Result<Vec<Record<'a>>> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Field, FieldKind};

    static PAIR: RecordLayout = RecordLayout {
        name: "pair",
        size: 4,
        fields: &[
            Field::new("a", 0, FieldKind::U16),
            Field::new("b", 2, FieldKind::U16),
        ],
    };

    fn table_bytes(capacity: u32, count: u32, pairs: &[(u16, u16)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&capacity.to_le_bytes());
        data.extend_from_slice(&count.to_le_bytes());
        for (a, b) in pairs {
            data.extend_from_slice(&a.to_le_bytes());
            data.extend_from_slice(&b.to_le_bytes());
        }
        data
    }

    #[test]
    fn parses_double_counted_table() {
        let data = table_bytes(2, 2, &[(1, 2), (3, 4)]);
        let table = CountedTable::parse(ByteView::new(&data), 0, &PAIR, Counting::Double).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.header_len(), 8);
        assert_eq!(table.end_offset(), data.len());
        let second = table.get(1).unwrap();
        assert_eq!(second.uint("a").unwrap(), 3);
        assert_eq!(second.uint("b").unwrap(), 4);
    }

    #[test]
    fn capacity_must_equal_count() {
        let data = table_bytes(3, 2, &[(1, 2), (3, 4)]);
        assert!(matches!(
            CountedTable::parse(ByteView::new(&data), 0, &PAIR, Counting::Double),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn single_counted_table_at_offset() {
        let mut data = vec![0xEE; 3];
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[9, 0, 8, 0]);
        let table = CountedTable::parse(ByteView::new(&data), 3, &PAIR, Counting::Single).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries_offset(), 7);
        assert_eq!(table.get(0).unwrap().uint("b").unwrap(), 8);
    }

    #[test]
    fn index_past_count_is_out_of_bounds() {
        let data = table_bytes(1, 1, &[(1, 2)]);
        let table = CountedTable::parse(ByteView::new(&data), 0, &PAIR, Counting::Double).unwrap();
        assert!(matches!(table.get(1), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn truncated_entries_are_rejected_up_front() {
        let mut data = table_bytes(2, 2, &[(1, 2)]);
        data.push(0);
        assert!(matches!(
            CountedTable::parse(ByteView::new(&data), 0, &PAIR, Counting::Double),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
