//! START.DAT - the game-data archive nested inside the outer containers.
//!
//! Every title ships its gameplay tables (skills, items, classes) in a file
//! called some variant of `START.DAT`, but the directory shape differs per
//! game. The caller picks a [`StartDatFlavor`].
//!
//! ## EndOffset (Phantom Brave, La Pucelle)
//! ```text
//! [0x00] FileCount u32 + Reserved[3] u32   (or "DSARC FL" + FileCount u64)
//! [0x10] Entries: RawEndOffset u32, Filename[28]
//! [...]  FileData
//! ```
//! `RawEndOffset` is relative to the start of the data; a file begins where
//! the previous one ends. Phantom Brave's records are sorted by end offset,
//! La Pucelle's are not, so the parser sorts them.
//!
//! ## Dsarc (Makai Kingdom, decompressed `START.KS4`)
//! ```text
//! [0x00] Magic "DSARC FL"  FileCount u64
//! [0x10] Entries: Filename[40], Size u32, Offset u32
//! ```
//!
//! ## OffsetOnly (ZHP, decompressed `start.lzs`)
//! ```text
//! [0x00] FileCount u32
//! [0x04] Entries: Offset u32, Filename[27], Reserved u8
//! ```
//! A file runs to the next entry's offset; the last one runs to the end of
//! the buffer.

use tracing::debug;

use crate::formats::pspfs::Pspfs;
use crate::formats::{Archive, CompressionFlags, FileEntry, Repack, check_extents};
use crate::layout::{Field, FieldKind, Record, RecordLayout};
use crate::repack::{assemble, relayout, write_record};
use crate::table::{CountedTable, Counting};
use crate::utils::to_usize;
use crate::view::ByteView;
use crate::{Error, Result};

pub const DSARC_MAGIC: &[u8; 8] = b"DSARC FL";
const HEADER_SIZE: usize = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDatFlavor {
    /// End-offset records (Phantom Brave, La Pucelle).
    EndOffset,
    /// Explicit size and offset records (Makai Kingdom).
    Dsarc,
    /// Start-offset-only records (ZHP).
    OffsetOnly,
}

impl StartDatFlavor {
    /// Name of the archive inside its parent container, as the game ships
    /// it. `START.KS4` and `start.lzs` are compressed.
    pub fn standard_filename(self) -> &'static str {
        match self {
            StartDatFlavor::EndOffset => "START.DAT",
            StartDatFlavor::Dsarc => "START.KS4",
            StartDatFlavor::OffsetOnly => "start.lzs",
        }
    }

    pub fn entry_layout(self) -> &'static RecordLayout {
        match self {
            StartDatFlavor::EndOffset => &END_OFFSET_ENTRY,
            StartDatFlavor::Dsarc => &DSARC_ENTRY,
            StartDatFlavor::OffsetOnly => &OFFSET_ONLY_ENTRY,
        }
    }
}

static END_OFFSET_ENTRY: RecordLayout = RecordLayout {
    name: "start.dat entry (end offset)",
    size: 0x20,
    fields: &[
        Field::new("raw_end_offset", 0x00, FieldKind::U32),
        Field::new("filename", 0x04, FieldKind::Str(28)),
    ],
};

static DSARC_ENTRY: RecordLayout = RecordLayout {
    name: "start.dat entry (DSARC)",
    size: 0x30,
    fields: &[
        Field::new("filename", 0x00, FieldKind::Str(40)),
        Field::new("size", 0x28, FieldKind::U32),
        Field::new("offset", 0x2C, FieldKind::U32),
    ],
};

static OFFSET_ONLY_ENTRY: RecordLayout = RecordLayout {
    name: "start.dat entry (offset only)",
    size: 0x20,
    fields: &[
        Field::new("offset", 0x00, FieldKind::U32),
        Field::new("filename", 0x04, FieldKind::Str(27)),
        Field::new("reserved", 0x1F, FieldKind::U8),
    ],
};

/// Parsed START.DAT archive.
#[derive(Debug)]
pub struct StartDat<'a> {
    view: ByteView<'a>,
    flavor: StartDatFlavor,
    table: CountedTable<'a>,
    records: Vec<Record<'a>>,
    /// Entries in storage order. For [`StartDatFlavor::EndOffset`] this can
    /// differ from directory order; [`FileEntry::index`] maps back.
    pub files: Vec<FileEntry>,
}

impl<'a> StartDat<'a> {
    pub fn open(data: &'a [u8], flavor: StartDatFlavor) -> Result<Self> {
        let view = ByteView::new(data);
        let layout = flavor.entry_layout();

        let table = match flavor {
            StartDatFlavor::EndOffset => {
                let header = view.bytes(0, HEADER_SIZE)?;
                let count = if header.starts_with(DSARC_MAGIC) {
                    view.le_u64(0x08)?
                } else {
                    u64::from(view.le_u32(0x00)?)
                };
                CountedTable::with_count(view, HEADER_SIZE, to_usize(count)?, layout)?
            }
            StartDatFlavor::Dsarc => {
                view.magic(0, DSARC_MAGIC)?;
                let count = to_usize(view.le_u64(0x08)?)?;
                CountedTable::with_count(view, HEADER_SIZE, count, layout)?
            }
            StartDatFlavor::OffsetOnly => CountedTable::parse(view, 0, layout, Counting::Single)?,
        };
        let records = table.records()?;

        let files = match flavor {
            StartDatFlavor::EndOffset => end_offset_files(&records, table.end_offset() as u64)?,
            StartDatFlavor::Dsarc => dsarc_files(&records)?,
            StartDatFlavor::OffsetOnly => offset_only_files(&records, view.len() as u64)?,
        };
        check_extents(&files, view.len(), false)?;
        debug!(?flavor, file_count = files.len(), "START.DAT directory");

        Ok(Self {
            view,
            flavor,
            table,
            records,
            files,
        })
    }

    /// Open the uncompressed `START.DAT` stored in a Phantom Brave PSPFS.
    pub fn from_pspfs(archive: &Pspfs<'a>) -> Result<Self> {
        let flavor = StartDatFlavor::EndOffset;
        let data = archive.read_by_name(flavor.standard_filename())?;
        Self::open(data, flavor)
    }

    pub fn flavor(&self) -> StartDatFlavor {
        self.flavor
    }

    /// View the file `name` as a double-counted table of `layout` records,
    /// the shape of the game's data tables.
    pub fn file_as_table(
        &self,
        name: &str,
        layout: &'static RecordLayout,
    ) -> Result<CountedTable<'a>> {
        let entry = self.find_file(name)?;
        let file = self
            .view
            .subview(to_usize(entry.offset)?, to_usize(entry.size)?)?;
        CountedTable::parse(file, 0, layout, Counting::Double)
    }
}

fn entry(name: String, offset: u64, size: u64, index: usize) -> FileEntry {
    FileEntry {
        name,
        offset,
        size,
        decompressed_size: size,
        flags: CompressionFlags::NONE,
        index,
    }
}

fn end_offset_files(records: &[Record<'_>], data_start: u64) -> Result<Vec<FileEntry>> {
    let mut order = Vec::with_capacity(records.len());
    for (index, rec) in records.iter().enumerate() {
        order.push((rec.uint("raw_end_offset")?, index));
    }
    // Stable, so equal end offsets keep directory order.
    order.sort_by_key(|&(end, _)| end);

    let mut files = Vec::with_capacity(order.len());
    let mut offset = data_start;
    for (raw_end, index) in order {
        let end = data_start + raw_end;
        files.push(entry(records[index].str("filename")?, offset, end - offset, index));
        offset = end;
    }
    Ok(files)
}

fn dsarc_files(records: &[Record<'_>]) -> Result<Vec<FileEntry>> {
    records
        .iter()
        .enumerate()
        .map(|(index, rec)| {
            Ok(entry(
                rec.str("filename")?,
                rec.uint("offset")?,
                rec.uint("size")?,
                index,
            ))
        })
        .collect()
}

fn offset_only_files(records: &[Record<'_>], buffer_len: u64) -> Result<Vec<FileEntry>> {
    let mut files = Vec::with_capacity(records.len());
    for (index, rec) in records.iter().enumerate() {
        let offset = rec.uint("offset")?;
        let next = match records.get(index + 1) {
            Some(next) => next.uint("offset")?,
            None => buffer_len,
        };
        let size = next.checked_sub(offset).ok_or_else(|| {
            Error::malformed(format!(
                "start.dat entry {index} at {offset:#x} starts after the next one ({next:#x})"
            ))
        })?;
        files.push(entry(rec.str("filename")?, offset, size, index));
    }
    Ok(files)
}

impl<'a> Archive<'a> for StartDat<'a> {
    fn view(&self) -> ByteView<'a> {
        self.view
    }

    fn files(&self) -> &[FileEntry] {
        &self.files
    }
}

impl Repack for StartDat<'_> {
    /// START.DAT records carry no decompressed size, so `_decompressed_size`
    /// is ignored.
    fn replace_file(
        &self,
        name: &str,
        new_bytes: &[u8],
        _decompressed_size: u64,
    ) -> Result<Vec<u8>> {
        let layout = relayout(&self.files, name, new_bytes.len() as u64)?;
        let data_start = self.table.end_offset();
        let mut out = assemble(self.view, data_start, &self.files, &layout, new_bytes)?;

        for (file, place) in self.files.iter().zip(&layout.placements) {
            let mut rec = self.records[file.index].clone();
            match self.flavor {
                StartDatFlavor::EndOffset => {
                    let end = place.offset + place.size - data_start as u64;
                    rec.set_uint("raw_end_offset", end)?;
                }
                StartDatFlavor::Dsarc => {
                    rec.set_uint("offset", place.offset)?;
                    rec.set_uint("size", place.size)?;
                }
                StartDatFlavor::OffsetOnly => rec.set_uint("offset", place.offset)?,
            }
            write_record(&mut out, self.table.entries_offset(), file.index, rec.as_bytes())?;
        }

        StartDat::open(&out, self.flavor)?;
        Ok(out)
    }
}
