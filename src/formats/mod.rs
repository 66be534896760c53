//! Parsers for Nippon Ichi container formats.
//!
//! Each submodule targets one format family. All parsers follow the same
//! conventions:
//!
//! * **Borrowed input** - `open` takes the container's bytes as a `&[u8]`
//!   (a full file read, a memory map, or a slice of a parent container for
//!   nested archives) and never copies file payloads.
//! * **Validated up front** - `open` checks magic values, counts and every
//!   entry's byte range before returning. A container that opens is safe to
//!   read from.
//! * **Caller-selected flavor** - formats with several on-disk variants take
//!   an explicit flavor enum; nothing is auto-detected.
//! * **Repacking builds a new buffer** - [`Repack::replace_file`] returns fresh
//!   bytes, already re-parsed, and leaves the source untouched.
//!
//! ## Format overview
//!
//! | Module       | Format    | Found in |
//! |--------------|-----------|----------|
//! | [`pspfs`]    | PSPFS_V1  | Phantom Brave, Makai Kingdom (`DATA.DAT`) |
//! | [`startdat`] | START.DAT | Phantom Brave, La Pucelle, Makai Kingdom, ZHP |
//! | [`vfs3`]     | VFS3      | La Pucelle (Prinny Presents release) |
//! | [`nispack`]  | NISPACK   | ZHP |

#[cfg(test)]
pub(crate) mod fixtures;
pub mod nispack;
pub mod pspfs;
pub mod startdat;
pub mod vfs3;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::utils::to_usize;
use crate::view::ByteView;
use crate::{Error, Result};

/// VFS3-style compression flags. Zero for formats without per-entry flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CompressionFlags(pub u16);

impl CompressionFlags {
    pub const NONE: Self = Self(0);

    /// Bit 1: payload is compressed.
    pub fn is_compressed(self) -> bool {
        self.0 & 2 == 2
    }

    /// Bit 0 on a compressed payload: zstd rather than zlib.
    pub fn is_zstd(self) -> bool {
        self.is_compressed() && self.0 & 1 == 1
    }

    pub fn is_zlib(self) -> bool {
        self.is_compressed() && !self.is_zstd()
    }
}

/// A named byte range inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Name (or, for VFS3, full path).
    pub name: String,
    /// Start of the stored bytes, relative to the container start.
    pub offset: u64,
    /// Stored (possibly compressed) size in bytes.
    pub size: u64,
    /// Size after decompression; equals `size` when the format does not
    /// record one.
    pub decompressed_size: u64,
    pub flags: CompressionFlags,
    /// Position of this entry's record in the on-disk directory.
    pub index: usize,
}

impl FileEntry {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Read access shared by every container.
pub trait Archive<'a> {
    /// The container's bytes.
    fn view(&self) -> ByteView<'a>;

    /// All entries, in the order the format defines.
    fn files(&self) -> &[FileEntry];

    /// Find an entry by name.
    ///
    /// Returns [`Error::NotFound`] if absent.
    fn find_file(&self, name: &str) -> Result<&FileEntry> {
        self.files()
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    /// Borrow an entry's stored bytes.
    fn read_file(&self, entry: &FileEntry) -> Result<&'a [u8]> {
        self.view()
            .bytes(to_usize(entry.offset)?, to_usize(entry.size)?)
    }

    /// Borrow the stored bytes of the entry called `name`.
    fn read_by_name(&self, name: &str) -> Result<&'a [u8]> {
        let entry = self.find_file(name)?;
        self.read_file(entry)
    }

    /// An entry's contents with the format's payload compression undone.
    ///
    /// Formats without compression return a copy of the stored bytes.
    fn decompress_file(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        Ok(self.read_file(entry)?.to_vec())
    }

    /// Write every entry, decompressed, below `dir`, creating folders for
    /// `/`-separated names. Returns the number of files written.
    ///
    /// Names containing `..` or a drive/root component are rejected with
    /// [`Error::MalformedHeader`] before anything is written.
    fn extract_to_directory(&self, dir: &Path) -> Result<usize> {
        let targets = self
            .files()
            .iter()
            .map(|f| Ok((f, dir.join(relative_path(&f.name)?))))
            .collect::<Result<Vec<_>>>()?;

        for (entry, path) in &targets {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let bytes = self.decompress_file(entry)?;
            debug!(name = %entry.name, len = bytes.len(), "extract");
            fs::write(path, bytes)?;
        }
        Ok(targets.len())
    }
}

/// Turn an entry name into a relative filesystem path.
fn relative_path(name: &str) -> Result<PathBuf> {
    let mut path = PathBuf::new();
    for part in name.split(['/', '\\']).filter(|p| !p.is_empty()) {
        if part == "." || part == ".." || part.contains(':') {
            return Err(Error::malformed(format!("{name:?} escapes the output folder")));
        }
        path.push(part);
    }
    if path.as_os_str().is_empty() {
        return Err(Error::malformed(format!("{name:?} is not a file name")));
    }
    Ok(path)
}

/// Replacement of one entry's payload.
pub trait Repack {
    /// Build a new container in which `name` holds `new_bytes`.
    ///
    /// Entries stored after the replaced one move by the size difference;
    /// everything else keeps its offset. `decompressed_size` is written where
    /// the format records one (leave it at 0 for YKCMP payloads, as the game
    /// does).
    fn replace_file(&self, name: &str, new_bytes: &[u8], decompressed_size: u64)
    -> Result<Vec<u8>>;
}

/// Reject entries that run past `len`, and with `disjoint`, entries that
/// overlap each other.
pub(crate) fn check_extents(files: &[FileEntry], len: usize, disjoint: bool) -> Result<()> {
    for f in files {
        let end = f
            .offset
            .checked_add(f.size)
            .ok_or_else(|| Error::malformed(format!("{:?} has an overflowing range", f.name)))?;
        if end > len as u64 {
            return Err(Error::OutOfBounds {
                offset: f.offset,
                len: f.size,
                limit: len as u64,
            });
        }
    }

    if disjoint {
        let mut sorted: Vec<&FileEntry> = files.iter().filter(|f| f.size > 0).collect();
        sorted.sort_by_key(|f| f.offset);
        for pair in sorted.windows(2) {
            if pair[0].end() > pair[1].offset {
                return Err(Error::malformed(format!(
                    "{:?} overlaps {:?}",
                    pair[0].name, pair[1].name
                )));
            }
        }
    }
    Ok(())
}
