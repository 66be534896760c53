//! VFS3 - the hierarchical archive of La Pucelle's Prinny Presents release.
//!
//! Files live in a folder tree, names sit in a separate UTF-16 table, and
//! zstd-compressed payloads are stored with their framing stripped; the
//! per-block sizes needed to rebuild it are kept in an out-of-band chunk
//! table. This is the dictionary-free variant; files that reference a zstd
//! dictionary or use zlib are rejected.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "VFS3"  Version u32
//! [0x08] FolderCount u32, then FolderCount × folder record (0x1C bytes)
//! [...]  FileCount u32, then FileCount × file record (0x28 bytes)
//! [...]  Subheader: ChunkTableOffset u64, DictTableOffset u64, NameTableOffset u64
//! [...]  Data, starting at the subheader end rounded up to 16
//! ```
//!
//! Subheader offsets are absolute; a file's `DataOffset` is relative to the
//! start of the data region.
//!
//! ## Auxiliary tables
//! ```text
//! Names:  FileNameCount u32, UTF-16LE NUL-terminated × n,
//!         FolderNameCount u32, UTF-16LE NUL-terminated × n
//! Chunks: TableByteLen u32, then per file id: ByteLen u32, i32 × (ByteLen / 4)
//! ```
//! Names are indexed by file and folder id. A negative chunk size marks a
//! raw (stored) zstd block.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::formats::{Archive, CompressionFlags, FileEntry, check_extents};
use crate::layout::{Field, FieldKind, Record, RecordLayout};
use crate::table::{CountedTable, Counting};
use crate::utils::{align_up, to_usize, utf16_null_string};
use crate::view::ByteView;
use crate::{Error, Result};

pub const MAGIC: &[u8; 4] = b"VFS3";
const FOLDER_TABLE_OFFSET: usize = 0x08;
const SUBHEADER_SIZE: usize = 0x18;
const DATA_ALIGN: usize = 0x10;
const ROOT_PARENT: i32 = -1;
const NO_DICTIONARY: i32 = -1;

/// Path of `start_en.dat` inside La Pucelle's VFS3.
pub const START_DAT_PATH: &str = "PSP_GAME/USRDIR/start_en.dat";

static FOLDER_ENTRY: RecordLayout = RecordLayout {
    name: "vfs3 folder",
    size: 0x1C,
    fields: &[
        Field::new("crc", 0x00, FieldKind::U32),
        Field::new("folder_id", 0x04, FieldKind::I32),
        Field::new("parent_folder_id", 0x08, FieldKind::I32),
        Field::new("first_subfolder_id", 0x0C, FieldKind::I32),
        Field::new("subfolder_count", 0x10, FieldKind::U32),
        Field::new("reserved", 0x14, FieldKind::U32),
        Field::new("file_count", 0x18, FieldKind::U32),
    ],
};

static FILE_ENTRY: RecordLayout = RecordLayout {
    name: "vfs3 file",
    size: 0x28,
    fields: &[
        Field::new("data_offset", 0x00, FieldKind::U64),
        Field::new("compressed_size", 0x08, FieldKind::U64),
        Field::new("decompressed_size", 0x10, FieldKind::U64),
        Field::new("crc", 0x18, FieldKind::U32),
        Field::new("file_id", 0x1C, FieldKind::I32),
        Field::new("parent_folder_id", 0x20, FieldKind::I32),
        Field::new("flags", 0x24, FieldKind::U16),
        Field::new("dict_id", 0x26, FieldKind::I16),
    ],
};

/// One node of the folder tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vfs3Folder {
    pub crc: u32,
    pub folder_id: i32,
    /// `-1` for a root folder.
    pub parent_folder_id: i32,
    pub first_subfolder_id: i32,
    pub subfolder_count: u32,
    pub file_count: u32,
}

impl Vfs3Folder {
    fn from_record(rec: &Record<'_>) -> Result<Self> {
        Ok(Self {
            crc: rec.uint("crc")? as u32,
            folder_id: rec.int("folder_id")? as i32,
            parent_folder_id: rec.int("parent_folder_id")? as i32,
            first_subfolder_id: rec.int("first_subfolder_id")? as i32,
            subfolder_count: rec.uint("subfolder_count")? as u32,
            file_count: rec.uint("file_count")? as u32,
        })
    }
}

/// VFS3-specific fields of a file record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vfs3File {
    pub file_id: i32,
    pub parent_folder_id: i32,
    pub crc: u32,
    /// Offset relative to the data region.
    pub data_offset: u64,
}

/// File and folder names, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    pub file_names: Vec<String>,
    pub folder_names: Vec<String>,
}

impl NameTable {
    pub fn parse(view: &ByteView<'_>, offset: usize) -> Result<Self> {
        let (file_names, next) = name_list(view, offset)?;
        let (folder_names, _) = name_list(view, next)?;
        Ok(Self {
            file_names,
            folder_names,
        })
    }

    pub fn file_name(&self, file_id: i32) -> Result<&str> {
        lookup_name(&self.file_names, file_id, "file")
    }

    pub fn folder_name(&self, folder_id: i32) -> Result<&str> {
        lookup_name(&self.folder_names, folder_id, "folder")
    }
}

fn name_list(view: &ByteView<'_>, offset: usize) -> Result<(Vec<String>, usize)> {
    let count = view.le_u32(offset)? as usize;
    let mut pos = offset + 4;
    // Every name takes at least its terminator.
    view.bytes(pos, count.saturating_mul(2))?;
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        let (name, next) = utf16_null_string(view, pos)?;
        names.push(name);
        pos = next;
    }
    Ok((names, pos))
}

fn lookup_name<'n>(names: &'n [String], id: i32, what: &str) -> Result<&'n str> {
    usize::try_from(id)
        .ok()
        .and_then(|i| names.get(i))
        .map(String::as_str)
        .ok_or_else(|| {
            Error::malformed(format!(
                "{what} id {id} has no entry among {} names",
                names.len()
            ))
        })
}

/// Per-file lists of zstd block sizes, indexed by file id.
#[derive(Debug, Clone, Default)]
pub struct ChunkSizeTable {
    sizes: Vec<Vec<i32>>,
}

impl ChunkSizeTable {
    pub fn parse(view: &ByteView<'_>, offset: usize) -> Result<Self> {
        let byte_len = view.le_u32(offset)? as usize;
        let start = offset + 4;
        let end = start + byte_len;
        view.bytes(start, byte_len)?;

        let mut sizes = Vec::new();
        let mut pos = start;
        while pos < end {
            if pos + 4 > end {
                return Err(Error::malformed(format!(
                    "chunk list header at {pos:#x} crosses the chunk table end {end:#x}"
                )));
            }
            let list_len = view.le_u32(pos)? as usize;
            pos += 4;
            if list_len % 4 != 0 || pos + list_len > end {
                return Err(Error::malformed(format!(
                    "chunk list at {pos:#x} of {list_len} bytes does not fit the chunk table ending at {end:#x}"
                )));
            }
            let list = (0..list_len / 4)
                .map(|k| view.le_i32(pos + k * 4))
                .collect::<Result<Vec<_>>>()?;
            sizes.push(list);
            pos += list_len;
        }
        Ok(Self { sizes })
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Chunk sizes for `file_id`; empty for uncompressed files.
    pub fn for_file(&self, file_id: i32) -> Result<&[i32]> {
        usize::try_from(file_id)
            .ok()
            .and_then(|i| self.sizes.get(i))
            .map(Vec::as_slice)
            .ok_or_else(|| Error::malformed(format!("file id {file_id} has no chunk list")))
    }
}

/// Parsed VFS3 archive.
#[derive(Debug)]
pub struct Vfs3<'a> {
    view: ByteView<'a>,
    version: u32,
    folders: Vec<Vfs3Folder>,
    folder_paths: Vec<String>,
    records: Vec<Vfs3File>,
    names: NameTable,
    chunks: ChunkSizeTable,
    data_origin: usize,
    by_path: HashMap<String, usize>,
    /// One entry per file record, named by full path. `offset` is absolute.
    pub files: Vec<FileEntry>,
}

impl<'a> Vfs3<'a> {
    pub fn open(data: &'a [u8]) -> Result<Self> {
        let view = ByteView::new(data);
        view.magic(0, MAGIC)?;
        let version = view.le_u32(0x04)?;

        let folder_table =
            CountedTable::parse(view, FOLDER_TABLE_OFFSET, &FOLDER_ENTRY, Counting::Single)?;
        let folders = folder_table
            .iter()
            .map(|rec| Vfs3Folder::from_record(&rec?))
            .collect::<Result<Vec<_>>>()?;

        let file_table =
            CountedTable::parse(view, folder_table.end_offset(), &FILE_ENTRY, Counting::Single)?;
        let expected_files: u64 = folders.iter().map(|f| u64::from(f.file_count)).sum();
        if expected_files != file_table.len() as u64 {
            return Err(Error::size_mismatch(
                "vfs3 folder file counts",
                expected_files,
                file_table.len() as u64,
            ));
        }

        let subheader = file_table.end_offset();
        let chunk_offset = to_usize(view.le_u64(subheader)?)?;
        let dict_offset = view.le_u64(subheader + 0x08)?;
        let name_offset = to_usize(view.le_u64(subheader + 0x10)?)?;
        let data_origin = align_up(subheader + SUBHEADER_SIZE, DATA_ALIGN);
        debug!(
            version,
            folders = folders.len(),
            files = file_table.len(),
            chunk_offset,
            dict_offset,
            name_offset,
            data_origin,
            "VFS3 header"
        );

        let names = NameTable::parse(&view, name_offset)?;
        if names.file_names.len() != file_table.len() {
            return Err(Error::malformed(format!(
                "{} file names for {} files",
                names.file_names.len(),
                file_table.len()
            )));
        }
        if names.folder_names.len() != folders.len() {
            return Err(Error::malformed(format!(
                "{} folder names for {} folders",
                names.folder_names.len(),
                folders.len()
            )));
        }

        let chunks = ChunkSizeTable::parse(&view, chunk_offset)?;

        let mut raw_files = Vec::with_capacity(file_table.len());
        for rec in file_table.iter() {
            raw_files.push(RawFile::from_record(&rec?)?);
        }
        if let Some(max_id) = raw_files.iter().map(|f| f.info.file_id).max() {
            let needed = u64::try_from(i64::from(max_id) + 1).unwrap_or(0);
            if (chunks.len() as u64) < needed {
                return Err(Error::size_mismatch(
                    "vfs3 chunk lists",
                    needed,
                    chunks.len() as u64,
                ));
            }
        }

        let folder_paths = folder_paths(&folders, &names)?;
        let folder_index: HashMap<i32, usize> = folders
            .iter()
            .enumerate()
            .map(|(i, f)| (f.folder_id, i))
            .collect();

        let mut files = Vec::with_capacity(raw_files.len());
        let mut records = Vec::with_capacity(raw_files.len());
        let mut by_path = HashMap::with_capacity(raw_files.len());
        for (index, raw) in raw_files.into_iter().enumerate() {
            let name = names.file_name(raw.info.file_id)?;
            raw.check(name, chunks.for_file(raw.info.file_id)?)?;

            let folder = folder_index.get(&raw.info.parent_folder_id).ok_or_else(|| {
                Error::malformed(format!(
                    "{name:?} is in unknown folder {}",
                    raw.info.parent_folder_id
                ))
            })?;
            let path = join_path(&folder_paths[*folder], name);
            trace!(%path, file_id = raw.info.file_id, flags = raw.flags.0, "VFS3 file");
            if by_path.insert(path.clone(), index).is_some() {
                return Err(Error::malformed(format!("duplicate path {path:?}")));
            }

            let offset = (data_origin as u64)
                .checked_add(raw.info.data_offset)
                .ok_or_else(|| Error::malformed(format!("{path:?} has an overflowing offset")))?;
            files.push(FileEntry {
                name: path,
                offset,
                size: raw.compressed_size,
                decompressed_size: raw.decompressed_size,
                flags: raw.flags,
                index,
            });
            records.push(raw.info);
        }
        check_extents(&files, view.len(), true)?;

        Ok(Self {
            view,
            version,
            folders,
            folder_paths,
            records,
            names,
            chunks,
            data_origin,
            by_path,
            files,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn folders(&self) -> &[Vfs3Folder] {
        &self.folders
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    pub fn chunk_sizes(&self) -> &ChunkSizeTable {
        &self.chunks
    }

    /// Absolute offset that file `data_offset`s are relative to.
    pub fn data_origin(&self) -> usize {
        self.data_origin
    }

    /// Full path of the folder with id `folder_id`, without a trailing `/`.
    /// Root folders usually have an empty name, so top-level paths have no
    /// leading `/` either.
    pub fn folder_path(&self, folder_id: i32) -> Result<&str> {
        self.folders
            .iter()
            .position(|f| f.folder_id == folder_id)
            .map(|i| self.folder_paths[i].as_str())
            .ok_or_else(|| Error::NotFound(format!("folder id {folder_id}")))
    }

    /// VFS3 fields of `entry`'s record.
    pub fn file_record(&self, entry: &FileEntry) -> Result<&Vfs3File> {
        self.records
            .get(entry.index)
            .ok_or_else(|| Error::NotFound(entry.name.clone()))
    }

    /// Decompress La Pucelle's `start_en.dat`; open the result as an
    /// [`EndOffset`](super::startdat::StartDatFlavor::EndOffset) START.DAT.
    pub fn decompress_start_dat(&self) -> Result<Vec<u8>> {
        let entry = self.find_file(START_DAT_PATH)?;
        self.decompress_file(entry)
    }
}

#[cfg(feature = "compression")]
fn decode_zstd(entry: &FileEntry, raw: &[u8], chunks: &[i32]) -> Result<Vec<u8>> {
    crate::compression::zstd::decompress_chunked(entry.decompressed_size, raw, chunks)
}

#[cfg(not(feature = "compression"))]
fn decode_zstd(entry: &FileEntry, _raw: &[u8], _chunks: &[i32]) -> Result<Vec<u8>> {
    Err(Error::unsupported(format!(
        "{:?} is zstd-compressed; enable the `compression` feature",
        entry.name
    )))
}

impl<'a> Archive<'a> for Vfs3<'a> {
    fn view(&self) -> ByteView<'a> {
        self.view
    }

    fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Find a file by its full path, e.g. `PSP_GAME/USRDIR/start_en.dat`.
    fn find_file(&self, name: &str) -> Result<&FileEntry> {
        self.by_path
            .get(name)
            .map(|&i| &self.files[i])
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    /// Rebuild and decode zstd payloads; uncompressed files are copied.
    ///
    /// Without the `compression` feature, compressed files are
    /// [`Error::UnsupportedFeature`].
    fn decompress_file(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        let raw = self.read_file(entry)?;
        if !entry.flags.is_compressed() {
            return Ok(raw.to_vec());
        }
        let chunks = self.chunks.for_file(self.file_record(entry)?.file_id)?;
        decode_zstd(entry, raw, chunks)
    }
}

/// A decoded file record before validation.
struct RawFile {
    info: Vfs3File,
    compressed_size: u64,
    decompressed_size: u64,
    flags: CompressionFlags,
    dict_id: i32,
}

impl RawFile {
    fn from_record(rec: &Record<'_>) -> Result<Self> {
        Ok(Self {
            info: Vfs3File {
                file_id: rec.int("file_id")? as i32,
                parent_folder_id: rec.int("parent_folder_id")? as i32,
                crc: rec.uint("crc")? as u32,
                data_offset: rec.uint("data_offset")?,
            },
            compressed_size: rec.uint("compressed_size")?,
            decompressed_size: rec.uint("decompressed_size")?,
            flags: CompressionFlags(rec.uint("flags")? as u16),
            dict_id: rec.int("dict_id")? as i32,
        })
    }

    fn check(&self, name: &str, chunks: &[i32]) -> Result<()> {
        let id = self.info.file_id;
        if self.flags.is_zlib() {
            return Err(Error::unsupported(format!(
                "{name:?} (id {id}) is zlib-compressed (flags {:#x})",
                self.flags.0
            )));
        }
        if self.dict_id != NO_DICTIONARY {
            return Err(Error::unsupported(format!(
                "{name:?} (id {id}) uses zstd dictionary {}",
                self.dict_id
            )));
        }

        let chunk_total: u64 = chunks.iter().map(|c| u64::from(c.unsigned_abs())).sum();
        let (what, expected, found) = match (self.flags.is_compressed(), chunks.is_empty()) {
            (true, true) => ("chunk count", 1, 0),
            (true, false) => ("chunk sizes", self.compressed_size, chunk_total),
            (false, false) => ("chunk count", 0, chunks.len() as u64),
            (false, true) => ("decompressed size", self.compressed_size, self.decompressed_size),
        };
        if expected != found {
            return Err(Error::size_mismatch(format!("{what} of {name:?}"), expected, found));
        }
        Ok(())
    }
}

/// Resolve every folder's path by walking parent links. A walk longer than
/// the folder table means a cycle.
fn folder_paths(folders: &[Vfs3Folder], names: &NameTable) -> Result<Vec<String>> {
    let by_id: HashMap<i32, &Vfs3Folder> = folders.iter().map(|f| (f.folder_id, f)).collect();

    folders
        .iter()
        .map(|folder| {
            let mut parts = Vec::new();
            let mut current = folder;
            loop {
                if parts.len() > folders.len() {
                    return Err(Error::malformed(format!(
                        "folder {} has a cyclic parent chain",
                        folder.folder_id
                    )));
                }
                parts.push(names.folder_name(current.folder_id)?);
                if current.parent_folder_id == ROOT_PARENT {
                    break;
                }
                current = by_id.get(&current.parent_folder_id).ok_or_else(|| {
                    Error::malformed(format!(
                        "folder {} has unknown parent {}",
                        current.folder_id, current.parent_folder_id
                    ))
                })?;
            }

            let mut path = String::new();
            for part in parts.iter().rev() {
                path = join_path(&path, part);
            }
            Ok(path)
        })
        .collect()
}

/// Append `name` to `base`, skipping the `/` when `base` is empty.
fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_owned()
    } else {
        format!("{base}/{name}")
    }
}
