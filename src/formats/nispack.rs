//! NISPACK - ZHP's flat archive container.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "NISPACK\0"   (8 bytes)
//! [0x08] BigEndianFlag       (u32, only 0 is supported)
//! [0x0C] FileCount           (u32)
//! [0x10] Entries: Filename[32], Offset u32, Size u32, Reserved u32
//! [...]  FileData            (offsets are absolute within the container)
//! ```
//!
//! Most interesting payloads are LZS-compressed and named `*.lzs`;
//! `start.lzs` decompresses to an [`OffsetOnly`](super::startdat::StartDatFlavor::OffsetOnly)
//! START.DAT.

use tracing::debug;

use crate::compression::lzs;
use crate::formats::startdat::StartDatFlavor;
use crate::formats::{Archive, CompressionFlags, FileEntry, Repack, check_extents};
use crate::layout::{Field, FieldKind, Record, RecordLayout};
use crate::repack::{assemble, relayout, write_record};
use crate::table::{CountedTable, Counting};
use crate::view::ByteView;
use crate::{Error, Result};

pub const MAGIC: &[u8; 8] = b"NISPACK\0";
/// The file count at 0x0C doubles as the directory's count prefix.
const COUNT_OFFSET: usize = 0x0C;

static ENTRY: RecordLayout = RecordLayout {
    name: "nispack entry",
    size: 0x2C,
    fields: &[
        Field::new("filename", 0x00, FieldKind::Str(32)),
        Field::new("offset", 0x20, FieldKind::U32),
        Field::new("size", 0x24, FieldKind::U32),
        Field::new("reserved", 0x28, FieldKind::U32),
    ],
};

#[derive(Debug)]
pub struct Nispack<'a> {
    view: ByteView<'a>,
    table: CountedTable<'a>,
    records: Vec<Record<'a>>,
    pub files: Vec<FileEntry>,
}

impl<'a> Nispack<'a> {
    pub fn open(data: &'a [u8]) -> Result<Self> {
        let view = ByteView::new(data);
        view.magic(0, MAGIC)?;
        let big_endian = view.le_u32(0x08)?;
        if big_endian != 0 {
            return Err(Error::unsupported(format!(
                "big-endian NISPACK (flag {big_endian:#x})"
            )));
        }

        let table = CountedTable::parse(view, COUNT_OFFSET, &ENTRY, Counting::Single)?;
        let records = table.records()?;
        let files = records
            .iter()
            .enumerate()
            .map(|(index, rec)| {
                let size = rec.uint("size")?;
                Ok(FileEntry {
                    name: rec.str("filename")?,
                    offset: rec.uint("offset")?,
                    size,
                    decompressed_size: size,
                    flags: CompressionFlags::NONE,
                    index,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        check_extents(&files, view.len(), false)?;
        debug!(file_count = files.len(), "NISPACK directory");

        Ok(Self {
            view,
            table,
            records,
            files,
        })
    }

    /// Decompress `start.lzs`. Open the result with
    /// [`StartDatFlavor::OffsetOnly`].
    pub fn decompress_start_dat(&self) -> Result<Vec<u8>> {
        let entry = self.find_file(StartDatFlavor::OffsetOnly.standard_filename())?;
        self.decompress_file(entry)
    }
}

impl<'a> Archive<'a> for Nispack<'a> {
    fn view(&self) -> ByteView<'a> {
        self.view
    }

    fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Decompress `*.lzs` entries; other entries are copied as stored.
    fn decompress_file(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        let raw = self.read_file(entry)?;
        if entry.name.to_ascii_lowercase().ends_with(".lzs") {
            lzs::decompress(raw)
        } else {
            Ok(raw.to_vec())
        }
    }
}

impl Repack for Nispack<'_> {
    fn replace_file(&self, name: &str, new_bytes: &[u8], _decompressed_size: u64) -> Result<Vec<u8>> {
        let layout = relayout(&self.files, name, new_bytes.len() as u64)?;
        let mut out = assemble(self.view, self.table.end_offset(), &self.files, &layout, new_bytes)?;
        for (file, place) in self.files.iter().zip(&layout.placements) {
            let mut rec = self.records[file.index].clone();
            rec.set_uint("offset", place.offset)?;
            rec.set_uint("size", place.size)?;
            write_record(&mut out, self.table.entries_offset(), file.index, rec.as_bytes())?;
        }
        Nispack::open(&out)?;
        Ok(out)
    }
}
