//! **nisarc** - archive containers and codecs for Nippon Ichi game data.
//!
//! Parses the monolithic data files of Phantom Brave, La Pucelle, Makai
//! Kingdom and ZHP, decompresses their payloads and rebuilds containers with
//! one entry replaced.
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::pspfs`]    | PSPFS_V1 - flat outer archive (`DATA.DAT`) |
//! | [`formats::startdat`] | START.DAT - game-table archive, three directory shapes |
//! | [`formats::vfs3`]     | VFS3 - folder-tree archive with stripped zstd payloads |
//! | [`formats::nispack`]  | NISPACK - flat archive of LZS payloads |
//! | [`compression::ykcmp`] | YKCMP_V1 - LZ codec (decoder and literal encoder) |
//! | [`compression::lzs`]   | NIS LZS - flag-byte LZ codec |
//! | [`compression::zstd`]  | zstd frame reconstruction |
//!
//! # Example
//! ```no_run
//! use nisarc::formats::pspfs::{Pspfs, PspfsFlavor};
//! use nisarc::formats::startdat::{StartDat, StartDatFlavor};
//! use nisarc::formats::{Archive, Repack};
//!
//! # fn main() -> nisarc::Result<()> {
//! let data = std::fs::read("DATA.DAT")?;
//! let outer = Pspfs::open(&data, PspfsFlavor::MakaiKingdom)?;
//!
//! let ks4 = outer.find_file("START.KS4")?;
//! let start = outer.decompress_file(ks4)?;
//! let archive = StartDat::open(&start, StartDatFlavor::Dsarc)?;
//! let patched = archive.replace_file("wish.dat", b"...", 0)?;
//!
//! let packed = nisarc::compression::ykcmp::compress(&patched)?;
//! let new_data = outer.replace_file("START.KS4", &packed, 0)?;
//! std::fs::write("DATA.DAT.new", new_data)?;
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod error;
pub mod formats;
pub mod layout;
pub(crate) mod repack;
pub mod table;
pub(crate) mod utils;
pub mod view;

pub use error::{Error, Result};
