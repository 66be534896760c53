//! Outer container -> compressed START.DAT -> game table, end to end.

use nisarc::compression::{lzs, ykcmp};
use nisarc::formats::nispack::Nispack;
use nisarc::formats::pspfs::{Pspfs, PspfsFlavor};
use nisarc::formats::startdat::{DSARC_MAGIC, StartDat, StartDatFlavor};
use nisarc::formats::{Archive, Repack};
use nisarc::layout::{Field, FieldKind, RecordLayout};

static WISH: RecordLayout = RecordLayout {
    name: "wish",
    size: 8,
    fields: &[
        Field::new("id", 0, FieldKind::U32),
        Field::new("cost", 4, FieldKind::I32),
    ],
};

fn dsarc(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut data = DSARC_MAGIC.to_vec();
    data.extend_from_slice(&(files.len() as u64).to_le_bytes());
    let mut offset = 0x10 + files.len() * 0x30;
    for (name, body) in files {
        let mut rec = [0u8; 0x30];
        rec[..name.len()].copy_from_slice(name.as_bytes());
        rec[0x28..0x2C].copy_from_slice(&(body.len() as u32).to_le_bytes());
        rec[0x2C..0x30].copy_from_slice(&(offset as u32).to_le_bytes());
        data.extend_from_slice(&rec);
        offset += body.len();
    }
    for (_, body) in files {
        data.extend_from_slice(body);
    }
    data
}

fn makai_pspfs(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut data = b"PSPFS_V1".to_vec();
    data.extend_from_slice(&(files.len() as u32).to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    let mut offset = 0x10 + files.len() * 0x20;
    for (name, body) in files {
        let mut rec = [0u8; 0x20];
        rec[..name.len()].copy_from_slice(name.as_bytes());
        rec[0x18..0x1C].copy_from_slice(&(body.len() as u32).to_le_bytes());
        rec[0x1C..0x20].copy_from_slice(&(offset as u32).to_le_bytes());
        data.extend_from_slice(&rec);
        offset += body.len();
    }
    for (_, body) in files {
        data.extend_from_slice(body);
    }
    data
}

/// Double-counted table of `wish` records.
fn wish_table(rows: &[(u32, u32)]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&(rows.len() as u32).to_le_bytes());
    data.extend_from_slice(&(rows.len() as u32).to_le_bytes());
    for (id, cost) in rows {
        data.extend_from_slice(&id.to_le_bytes());
        data.extend_from_slice(&cost.to_le_bytes());
    }
    data
}

#[test]
fn makai_kingdom_patch_cycle() {
    let wishes = wish_table(&[(1, 100), (2, 250)]);
    let start = dsarc(&[("wish.dat", &wishes), ("char.dat", b"CHARS")]);
    let ks4 = ykcmp::compress(&start).unwrap();
    let outer_bytes = makai_pspfs(&[("SYSTEM.DAT", b"sys"), ("START.KS4", &ks4), ("BGM.DAT", b"music")]);

    let outer = Pspfs::open(&outer_bytes, PspfsFlavor::MakaiKingdom).unwrap();
    let entry = outer
        .find_file(StartDatFlavor::Dsarc.standard_filename())
        .unwrap();
    let decompressed = outer.decompress_file(entry).unwrap();
    assert_eq!(decompressed, start);

    let inner = StartDat::open(&decompressed, StartDatFlavor::Dsarc).unwrap();
    let table = inner.file_as_table("wish.dat", &WISH).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(1).unwrap().int("cost").unwrap(), 250);

    // Patch wish 2 in place and append wish 3.
    let mut new_wishes = 3u32.to_le_bytes().repeat(2);
    for rec in table.iter() {
        let mut rec = rec.unwrap();
        if rec.uint("id").unwrap() == 2 {
            rec.set_int("cost", 5).unwrap();
        }
        new_wishes.extend_from_slice(rec.as_bytes());
    }
    let mut extra = WISH.zeroed();
    extra.set_uint("id", 3).unwrap();
    extra.set_int("cost", 9999).unwrap();
    new_wishes.extend_from_slice(extra.as_bytes());
    assert_eq!(new_wishes, wish_table(&[(1, 100), (2, 5), (3, 9999)]));

    let new_start = inner.replace_file("wish.dat", &new_wishes, 0).unwrap();
    let new_ks4 = ykcmp::compress(&new_start).unwrap();
    let new_outer_bytes = outer
        .replace_file("START.KS4", &new_ks4, new_start.len() as u64)
        .unwrap();

    let outer = Pspfs::open(&new_outer_bytes, PspfsFlavor::MakaiKingdom).unwrap();
    assert_eq!(outer.read_by_name("SYSTEM.DAT").unwrap(), b"sys");
    assert_eq!(outer.read_by_name("BGM.DAT").unwrap(), b"music");
    let entry = outer.find_file("START.KS4").unwrap();
    assert_eq!(entry.decompressed_size, new_start.len() as u64);

    let decompressed = outer.decompress_file(entry).unwrap();
    let inner = StartDat::open(&decompressed, StartDatFlavor::Dsarc).unwrap();
    assert_eq!(inner.read_by_name("char.dat").unwrap(), b"CHARS");
    let table = inner.file_as_table("wish.dat", &WISH).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(1).unwrap().int("cost").unwrap(), 5);
    assert_eq!(table.get(2).unwrap().int("cost").unwrap(), 9999);
}

#[test]
fn zhp_start_lzs_opens_as_offset_only() {
    let mut start = 2u32.to_le_bytes().to_vec();
    let first = 4 + 2 * 0x20;
    for (name, offset) in [("class.dat", first), ("skill.dat", first + 6)] {
        let mut rec = [0u8; 0x20];
        rec[..4].copy_from_slice(&(offset as u32).to_le_bytes());
        rec[4..4 + name.len()].copy_from_slice(name.as_bytes());
        start.extend_from_slice(&rec);
    }
    start.extend_from_slice(b"CLASS!SKILLS");

    let packed = lzs::compress(&start, "dat").unwrap();
    let mut pack = b"NISPACK\0".to_vec();
    pack.extend_from_slice(&0u32.to_le_bytes());
    pack.extend_from_slice(&1u32.to_le_bytes());
    let mut rec = [0u8; 0x2C];
    rec[..9].copy_from_slice(b"start.lzs");
    rec[0x20..0x24].copy_from_slice(&(0x10u32 + 0x2C).to_le_bytes());
    rec[0x24..0x28].copy_from_slice(&(packed.len() as u32).to_le_bytes());
    pack.extend_from_slice(&rec);
    pack.extend_from_slice(&packed);

    let nispack = Nispack::open(&pack).unwrap();
    let bytes = nispack.decompress_start_dat().unwrap();
    let archive = StartDat::open(&bytes, StartDatFlavor::OffsetOnly).unwrap();
    assert_eq!(archive.read_by_name("class.dat").unwrap(), b"CLASS!");
    assert_eq!(archive.read_by_name("skill.dat").unwrap(), b"SKILLS");
}

#[test]
fn extract_writes_every_entry() {
    let start = dsarc(&[("wish.dat", b"W"), ("char.dat", b"CC")]);
    let archive = StartDat::open(&start, StartDatFlavor::Dsarc).unwrap();

    let dir = std::env::temp_dir().join(format!("nisarc-extract-{}", std::process::id()));
    let written = archive.extract_to_directory(&dir).unwrap();
    assert_eq!(written, 2);
    assert_eq!(std::fs::read(dir.join("char.dat")).unwrap(), b"CC");
    std::fs::remove_dir_all(&dir).unwrap();
}
