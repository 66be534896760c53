//! PSPFS_V1 - flat archive container (`DATA.DAT`).
//!
//! The outer container for Phantom Brave and Makai Kingdom data. Both games
//! share the magic but not the record shape, and the PSP and PC/Switch
//! releases of Phantom Brave differ in filename width, so the caller picks a
//! [`PspfsFlavor`].
//!
//! ## Layout
//! ```text
//! [0x00] Magic "PSPFS_V1"          (8 bytes)
//! [0x08] FileCount                 (u64 LE; Makai Kingdom: u32 LE + u32 reserved)
//! [0x10] EntryTable                (FileCount × record)
//! [...]  FileData                  (offsets are absolute within the container)
//! ```
//!
//! ## File Entry
//! ```text
//! PC/Switch (0x34): Filename[0x28]  Reserved[4]          Size u32  Offset u32
//! PSP       (0x20): Filename[0x18]                       Size u32  Offset u32
//! Makai     (0x20): Filename[0x14]  DecompressedSize u32 Size u32  Offset u32
//! ```
//!
//! Makai Kingdom stores its START.DAT YKCMP-compressed as `START.KS4`; its
//! decompressed-size field is zero even then (the size is in the YKCMP
//! header). [`Archive::decompress_file`] undoes the compression.

use tracing::debug;

use crate::compression::ykcmp;
use crate::formats::{Archive, CompressionFlags, FileEntry, Repack, check_extents};
use crate::layout::{Field, FieldKind, Record, RecordLayout};
use crate::repack::{assemble, relayout, write_record};
use crate::table::CountedTable;
use crate::view::ByteView;
use crate::Result;

pub const MAGIC: &[u8; 8] = b"PSPFS_V1";
const HEADER_SIZE: usize = 0x10;

/// Which PSPFS record shape a container uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PspfsFlavor {
    /// Phantom Brave on PC and Switch: 40-byte filenames.
    PcSwitch,
    /// Phantom Brave on PSP: 24-byte filenames.
    Psp,
    /// Makai Kingdom: 20-byte filenames plus a decompressed-size field.
    MakaiKingdom,
}

static PC_SWITCH_ENTRY: RecordLayout = RecordLayout {
    name: "pspfs entry (PC/Switch)",
    size: 0x34,
    fields: &[
        Field::new("filename", 0x00, FieldKind::Str(0x28)),
        Field::new("reserved", 0x28, FieldKind::Bytes(4)),
        Field::new("size", 0x2C, FieldKind::U32),
        Field::new("offset", 0x30, FieldKind::U32),
    ],
};

static PSP_ENTRY: RecordLayout = RecordLayout {
    name: "pspfs entry (PSP)",
    size: 0x20,
    fields: &[
        Field::new("filename", 0x00, FieldKind::Str(0x18)),
        Field::new("size", 0x18, FieldKind::U32),
        Field::new("offset", 0x1C, FieldKind::U32),
    ],
};

static MAKAI_ENTRY: RecordLayout = RecordLayout {
    name: "pspfs entry (Makai Kingdom)",
    size: 0x20,
    fields: &[
        Field::new("filename", 0x00, FieldKind::Str(0x14)),
        Field::new("decompressed_size", 0x14, FieldKind::U32),
        Field::new("size", 0x18, FieldKind::U32),
        Field::new("offset", 0x1C, FieldKind::U32),
    ],
};

impl PspfsFlavor {
    /// Record layout of one directory entry.
    pub fn entry_layout(self) -> &'static RecordLayout {
        match self {
            PspfsFlavor::PcSwitch => &PC_SWITCH_ENTRY,
            PspfsFlavor::Psp => &PSP_ENTRY,
            PspfsFlavor::MakaiKingdom => &MAKAI_ENTRY,
        }
    }

    fn has_decompressed_size(self) -> bool {
        self == PspfsFlavor::MakaiKingdom
    }
}

/// Parsed PSPFS container.
#[derive(Debug)]
pub struct Pspfs<'a> {
    view: ByteView<'a>,
    flavor: PspfsFlavor,
    table: CountedTable<'a>,
    records: Vec<Record<'a>>,
    /// All file entries in directory order.
    pub files: Vec<FileEntry>,
}

impl<'a> Pspfs<'a> {
    /// Parse a PSPFS container occupying `data`.
    pub fn open(data: &'a [u8], flavor: PspfsFlavor) -> Result<Self> {
        let view = ByteView::new(data);
        view.magic(0, MAGIC)?;

        let file_count = match flavor {
            PspfsFlavor::MakaiKingdom => u64::from(view.le_u32(0x08)?),
            PspfsFlavor::PcSwitch | PspfsFlavor::Psp => view.le_u64(0x08)?,
        };
        let file_count = crate::utils::to_usize(file_count)?;
        debug!(?flavor, file_count, "PSPFS header");

        let table = CountedTable::with_count(view, HEADER_SIZE, file_count, flavor.entry_layout())?;
        let records = table.records()?;

        let mut files = Vec::with_capacity(records.len());
        for (index, rec) in records.iter().enumerate() {
            let size = rec.uint("size")?;
            let decompressed_size = if flavor.has_decompressed_size() {
                rec.uint("decompressed_size")?
            } else {
                size
            };
            files.push(FileEntry {
                name: rec.str("filename")?,
                offset: rec.uint("offset")?,
                size,
                decompressed_size,
                flags: CompressionFlags::NONE,
                index,
            });
        }
        check_extents(&files, view.len(), true)?;

        Ok(Self {
            view,
            flavor,
            table,
            records,
            files,
        })
    }

    pub fn flavor(&self) -> PspfsFlavor {
        self.flavor
    }
}

impl<'a> Archive<'a> for Pspfs<'a> {
    fn view(&self) -> ByteView<'a> {
        self.view
    }

    fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Decompress YKCMP payloads; other entries are copied as stored.
    fn decompress_file(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        let raw = self.read_file(entry)?;
        if ykcmp::is_ykcmp(raw) {
            ykcmp::decompress(raw)
        } else {
            Ok(raw.to_vec())
        }
    }
}

impl Repack for Pspfs<'_> {
    fn replace_file(
        &self,
        name: &str,
        new_bytes: &[u8],
        decompressed_size: u64,
    ) -> Result<Vec<u8>> {
        let layout = relayout(&self.files, name, new_bytes.len() as u64)?;
        let mut out = assemble(
            self.view,
            self.table.end_offset(),
            &self.files,
            &layout,
            new_bytes,
        )?;

        for (i, (file, place)) in self.files.iter().zip(&layout.placements).enumerate() {
            let mut rec = self.records[file.index].clone();
            rec.set_uint("offset", place.offset)?;
            rec.set_uint("size", place.size)?;
            if i == layout.target && self.flavor.has_decompressed_size() {
                rec.set_uint("decompressed_size", decompressed_size)?;
            }
            write_record(&mut out, self.table.entries_offset(), file.index, rec.as_bytes())?;
        }

        Pspfs::open(&out, self.flavor)?;
        Ok(out)
    }
}
