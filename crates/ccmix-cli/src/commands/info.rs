//! `ccmix info`

use anyhow::{Context, Result};
use ccmix_formats::mix::MixArchive;

use super::{InfoArgs, resolve_names};
use crate::mapped::MappedArchive;

pub fn run(args: &InfoArgs) -> Result<()> {
    let mapped = MappedArchive::open(&args.mix)?;
    let mut archive = MixArchive::open(mapped.bytes(), args.game.game)
        .with_context(|| format!("Failed to open {}", args.mix.display()))?;
    resolve_names(&mut archive, args.gmd.as_deref(), args.recover)?;

    let flags = archive.flags();
    println!("checksum:  {}", flags.checksum());
    println!("encrypted: {}", flags.encrypted());
    println!("files:     {}", archive.len());
    println!("size:      {} bytes", archive.body_size());
    println!();

    for (i, entry) in archive.entries().iter().enumerate() {
        println!(
            "{:04} - {:08X} {:08X} {:>12} {}",
            i,
            entry.id,
            entry.offset,
            entry.size,
            entry.name.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}
