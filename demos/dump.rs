use std::fs;
use std::path::PathBuf;

use clap::Parser;
use nisarc::Result;
use nisarc::formats::Archive;
use nisarc::formats::nispack::Nispack;
use nisarc::formats::pspfs::{Pspfs, PspfsFlavor};
use nisarc::formats::startdat::{StartDat, StartDatFlavor};
use nisarc::formats::vfs3::Vfs3;
use tracing_subscriber::EnvFilter;

/// List the entries of a NIS archive and optionally extract them.
#[derive(Parser)]
#[command(name = "nisarc-dump", version, about)]
struct Cli {
    /// Container format of FILE
    #[arg(value_enum)]
    format: Format,

    /// Archive to open
    file: PathBuf,

    /// Extract every entry into this directory
    out_dir: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Format {
    /// PSPFS_V1, PC and Switch releases
    PspfsPc,
    /// PSPFS_V1, PSP releases
    PspfsPsp,
    /// PSPFS_V1, Makai Kingdom
    PspfsMk,
    /// START.DAT with end offsets (Phantom Brave)
    StartdatPb,
    /// START.KS4 with a DSARC FL header (Makai Kingdom)
    StartdatMk,
    /// start.lzs with offsets only (ZHP)
    StartdatZhp,
    /// VFS3 (La Pucelle)
    #[value(name = "vfs3")]
    Vfs3,
    /// NISPACK (ZHP)
    Nispack,
}

fn open(format: Format, data: &[u8]) -> Result<Box<dyn Archive<'_> + '_>> {
    Ok(match format {
        Format::PspfsPc => Box::new(Pspfs::open(data, PspfsFlavor::PcSwitch)?),
        Format::PspfsPsp => Box::new(Pspfs::open(data, PspfsFlavor::Psp)?),
        Format::PspfsMk => Box::new(Pspfs::open(data, PspfsFlavor::MakaiKingdom)?),
        Format::StartdatPb => Box::new(StartDat::open(data, StartDatFlavor::EndOffset)?),
        Format::StartdatMk => Box::new(StartDat::open(data, StartDatFlavor::Dsarc)?),
        Format::StartdatZhp => Box::new(StartDat::open(data, StartDatFlavor::OffsetOnly)?),
        Format::Vfs3 => Box::new(Vfs3::open(data)?),
        Format::Nispack => Box::new(Nispack::open(data)?),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let data = fs::read(&cli.file)?;
    let archive = open(cli.format, &data)?;

    for f in archive.files() {
        println!(
            "{:#010x} {:>10} {:>10} {}",
            f.offset, f.size, f.decompressed_size, f.name
        );
    }

    if let Some(out) = &cli.out_dir {
        let written = archive.extract_to_directory(out)?;
        println!("extracted {written} files to {}", out.display());
    }

    Ok(())
}
