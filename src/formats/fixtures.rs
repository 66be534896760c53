//! Byte-level container builders shared by the format tests.

use crate::formats::pspfs::{self, PspfsFlavor};
use crate::formats::startdat::{DSARC_MAGIC, StartDatFlavor};
use crate::layout::{Record, RecordLayout};

/// Append one `layout` record per file after `header`, then the payloads
/// back to back. `fill` gets each zeroed record with its name, payload
/// offset and size.
pub(crate) fn pack(
    mut data: Vec<u8>,
    layout: &'static RecordLayout,
    files: &[(&str, &[u8])],
    fill: impl Fn(&mut Record<'static>, &str, u64, u64),
) -> Vec<u8> {
    let mut offset = (data.len() + files.len() * layout.size) as u64;
    for (name, body) in files {
        let mut rec = layout.zeroed();
        fill(&mut rec, name, offset, body.len() as u64);
        data.extend_from_slice(rec.as_bytes());
        offset += body.len() as u64;
    }
    for (_, body) in files {
        data.extend_from_slice(body);
    }
    data
}

/// PSPFS container. Makai Kingdom records carry the payload size as their
/// decompressed size and `0xDEAD` in the reserved header word.
pub(crate) fn pspfs(flavor: PspfsFlavor, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut header = pspfs::MAGIC.to_vec();
    match flavor {
        PspfsFlavor::MakaiKingdom => {
            header.extend_from_slice(&(files.len() as u32).to_le_bytes());
            header.extend_from_slice(&0xDEADu32.to_le_bytes());
        }
        PspfsFlavor::PcSwitch | PspfsFlavor::Psp => {
            header.extend_from_slice(&(files.len() as u64).to_le_bytes());
        }
    }
    pack(header, flavor.entry_layout(), files, |rec, name, offset, size| {
        rec.set_str("filename", name).unwrap();
        rec.set_uint("offset", offset).unwrap();
        rec.set_uint("size", size).unwrap();
        if flavor == PspfsFlavor::MakaiKingdom {
            rec.set_uint("decompressed_size", size).unwrap();
        }
    })
}

/// START.DAT with payloads in directory order. OffsetOnly records get
/// `0x7C` in their reserved byte.
pub(crate) fn start_dat(flavor: StartDatFlavor, files: &[(&str, &[u8])]) -> Vec<u8> {
    let layout = flavor.entry_layout();
    match flavor {
        StartDatFlavor::EndOffset => {
            let order: Vec<usize> = (0..files.len()).collect();
            end_offset(files, &order, false)
        }
        StartDatFlavor::Dsarc => {
            let mut header = DSARC_MAGIC.to_vec();
            header.extend_from_slice(&(files.len() as u64).to_le_bytes());
            pack(header, layout, files, |rec, name, offset, size| {
                rec.set_str("filename", name).unwrap();
                rec.set_uint("offset", offset).unwrap();
                rec.set_uint("size", size).unwrap();
            })
        }
        StartDatFlavor::OffsetOnly => {
            let header = (files.len() as u32).to_le_bytes().to_vec();
            pack(header, layout, files, |rec, name, offset, _| {
                rec.set_str("filename", name).unwrap();
                rec.set_uint("offset", offset).unwrap();
                rec.set_uint("reserved", 0x7C).unwrap();
            })
        }
    }
}

/// End-offset START.DAT. `order` lists directory positions in storage
/// order, so tests can build unsorted directories.
pub(crate) fn end_offset(files: &[(&str, &[u8])], order: &[usize], dsarc_header: bool) -> Vec<u8> {
    let mut data = Vec::new();
    if dsarc_header {
        data.extend_from_slice(DSARC_MAGIC);
        data.extend_from_slice(&(files.len() as u64).to_le_bytes());
    } else {
        data.extend_from_slice(&(files.len() as u32).to_le_bytes());
        data.extend_from_slice(&[0u8; 12]);
    }

    let mut ends = vec![0u64; files.len()];
    let mut end = 0;
    for &i in order {
        end += files[i].1.len() as u64;
        ends[i] = end;
    }
    let layout = StartDatFlavor::EndOffset.entry_layout();
    for ((name, _), &end) in files.iter().zip(&ends) {
        let mut rec = layout.zeroed();
        rec.set_uint("raw_end_offset", end).unwrap();
        rec.set_str("filename", name).unwrap();
        data.extend_from_slice(rec.as_bytes());
    }
    for &i in order {
        data.extend_from_slice(files[i].1);
    }
    data
}
