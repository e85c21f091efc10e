//! `ccmix pack`

use std::fs::{self, File};
use std::io::BufWriter;

use anyhow::{Context, Result, bail};
use ccmix_formats::mix::{PackOptions, files_to_pack, pack};
use tracing::info;

use super::{PackArgs, is_inside};

pub fn run(args: &PackArgs) -> Result<()> {
    let game = args.game.game;
    if is_inside(&args.mix, &args.dir)? {
        bail!(
            "Cannot write {} into the directory being packed",
            args.mix.display()
        );
    }

    let files = files_to_pack(&args.dir, game, args.database)
        .with_context(|| format!("Failed to list {}", args.dir.display()))?;
    let options = PackOptions::new(game)
        .checksum(args.checksum)
        .encrypted(args.encrypt);

    let file = File::create(&args.mix)
        .with_context(|| format!("Failed to create {}", args.mix.display()))?;
    let mut writer = BufWriter::new(file);

    match pack(&mut writer, &files, &options) {
        Ok(summary) => {
            info!(
                "Wrote {} ({} files, {} bytes)",
                args.mix.display(),
                summary.entries,
                summary.body_offset + u64::from(summary.body_size)
            );
            Ok(())
        }
        Err(err) => {
            drop(writer);
            // Remove the partial archive
            let _ = fs::remove_file(&args.mix);
            Err(err).with_context(|| format!("Failed to pack {}", args.dir.display()))
        }
    }
}
