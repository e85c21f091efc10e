//! `ccmix repair`

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};

use anyhow::{Context, Result};
use ccmix_formats::mix::{MixArchive, RandomAccessFile};
use tracing::info;

use super::RepairArgs;

pub fn run(args: &RepairArgs) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&args.mix)
        .with_context(|| format!("Failed to open {} for writing", args.mix.display()))?;
    let source = RandomAccessFile::new(file)
        .with_context(|| format!("Failed to stat {}", args.mix.display()))?;

    let mut archive = MixArchive::open(&source, args.game.game)
        .with_context(|| format!("Failed to open {}", args.mix.display()))?;
    let report = archive.recover();
    if report.is_clean() {
        info!("{} needs no repair", args.mix.display());
        return Ok(());
    }

    let mut writer = source.file();
    writer.seek(SeekFrom::Start(0))?;
    archive
        .rewrite_header(&mut writer)
        .with_context(|| format!("Failed to rewrite header of {}", args.mix.display()))?;

    info!(
        "Repaired {}: {} relocated, {} lost",
        args.mix.display(),
        report.relocated.len(),
        report.lost.len()
    );
    Ok(())
}
