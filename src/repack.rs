//! Shared payload replacement for directory-based containers.
//!
//! Entries are not assumed to be densely packed, so the new container length
//! is the furthest extent of any entry after the move, not a sum of sizes.
//! Every format-specific `replace_file` runs the same three steps:
//!
//! 1. [`relayout`] the directory around the replaced entry.
//! 2. [`assemble`] a buffer with the old header and directory bytes, old
//!    payloads at their new offsets and the new payload in place.
//! 3. Patch the directory records and re-open the result.

use tracing::debug;

use crate::formats::FileEntry;
use crate::utils::to_usize;
use crate::view::ByteView;
use crate::{Error, Result};

/// Where one entry lands in the rebuilt container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    pub offset: u64,
    pub size: u64,
}

/// The rebuilt directory: one placement per entry (same order as the input),
/// the replaced entry's position, and the new container length.
#[derive(Debug)]
pub(crate) struct Relayout {
    pub placements: Vec<Placement>,
    pub target: usize,
    pub total_len: u64,
}

/// Compute new offsets and sizes when `name` is replaced by `new_len` bytes.
///
/// Entries stored after the replaced one shift by the size difference; the
/// replaced entry keeps its offset and takes the new size. At equal offsets
/// an empty entry is stored before a non-empty one, and two empty entries
/// keep their order in `files`.
///
/// Replacing an entry whose bytes are shared with another entry is
/// [`Error::MalformedHeader`]: the shared bytes cannot follow both.
pub(crate) fn relayout(files: &[FileEntry], name: &str, new_len: u64) -> Result<Relayout> {
    let target = files
        .iter()
        .position(|f| f.name == name)
        .ok_or_else(|| Error::NotFound(name.to_owned()))?;
    let old = &files[target];
    if let Some(other) = files
        .iter()
        .enumerate()
        .find(|&(i, f)| i != target && shares_bytes(old, f))
        .map(|(_, f)| f)
    {
        return Err(Error::malformed(format!(
            "cannot replace {name:?}: its bytes are shared with {:?}",
            other.name
        )));
    }
    let delta = i128::from(new_len) - i128::from(old.size);
    let old_key = storage_key(old, target);

    let mut placements = Vec::with_capacity(files.len());
    let mut total_len = 0u64;
    for (i, f) in files.iter().enumerate() {
        let placement = if i == target {
            Placement {
                offset: f.offset,
                size: new_len,
            }
        } else if storage_key(f, i) > old_key {
            let shifted = u64::try_from(i128::from(f.offset) + delta).map_err(|_| {
                Error::malformed(format!("{:?} would move before the container start", f.name))
            })?;
            Placement {
                offset: shifted,
                size: f.size,
            }
        } else {
            Placement {
                offset: f.offset,
                size: f.size,
            }
        };
        total_len = total_len.max(placement.offset + placement.size);
        placements.push(placement);
    }

    debug!(name, delta = %delta, total_len, "relayout");
    Ok(Relayout {
        placements,
        target,
        total_len,
    })
}

/// Position of an entry in the payload area.
fn storage_key(f: &FileEntry, index: usize) -> (u64, bool, usize) {
    (f.offset, f.size != 0, index)
}

/// Whether two entries overlap. An empty entry overlaps an entry whose
/// range strictly surrounds its offset.
fn shares_bytes(a: &FileEntry, b: &FileEntry) -> bool {
    match (a.size, b.size) {
        (0, 0) => false,
        (0, _) => b.offset < a.offset && a.offset < b.end(),
        (_, 0) => a.offset < b.offset && b.offset < a.end(),
        _ => a.offset < b.end() && b.offset < a.end(),
    }
}

/// Build the new container bytes.
///
/// Everything before the first payload (header, directory and any padding
/// after it) is copied from `view`; the caller then rewrites the records
/// that changed. Gaps between payloads are zero-filled.
pub(crate) fn assemble(
    view: ByteView<'_>,
    directory_len: usize,
    files: &[FileEntry],
    relayout: &Relayout,
    new_bytes: &[u8],
) -> Result<Vec<u8>> {
    let total = to_usize(relayout.total_len)?.max(directory_len);
    let first_payload = files.iter().map(|f| f.offset).min().unwrap_or(0);
    let head = to_usize(first_payload)?
        .min(total)
        .min(view.len())
        .max(directory_len);
    let mut out = vec![0u8; total.max(head)];
    out[..head].copy_from_slice(view.bytes(0, head)?);

    for (i, (file, place)) in files.iter().zip(&relayout.placements).enumerate() {
        let src = if i == relayout.target {
            new_bytes
        } else {
            view.bytes(to_usize(file.offset)?, to_usize(file.size)?)?
        };
        let start = to_usize(place.offset)?;
        out[start..start + src.len()].copy_from_slice(src);
    }
    Ok(out)
}

/// Copy `record` over the directory slot `index` of a table starting at
/// `entries_offset`.
pub(crate) fn write_record(
    out: &mut [u8],
    entries_offset: usize,
    index: usize,
    record: &[u8],
) -> Result<()> {
    let start = entries_offset + index * record.len();
    let limit = out.len();
    out.get_mut(start..start + record.len())
        .ok_or_else(|| Error::out_of_bounds(start, record.len(), limit))?
        .copy_from_slice(record);
    Ok(())
}
