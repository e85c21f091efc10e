//! `ccmix unpack`

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result, bail};
use ccmix_formats::mix::{MixArchive, MixEntry};
use tracing::{debug, info, warn};

use super::{UnpackArgs, is_inside, resolve_names};
use crate::mapped::MappedArchive;

/// Filename to extract an entry as
///
/// Resolved names that would escape the output directory fall back to the
/// identifier.
fn output_name(entry: &MixEntry) -> String {
    match entry.name.as_deref() {
        Some(name)
            if !name.is_empty()
                && name != "."
                && name != ".."
                && !name.contains(['/', '\\']) =>
        {
            name.to_string()
        }
        Some(name) => {
            warn!("Refusing unsafe name {:?} for {:08X}", name, entry.id);
            format!("{:08X}", entry.id)
        }
        None => entry.display_name(),
    }
}

pub fn run(args: &UnpackArgs) -> Result<()> {
    let game = args.game.game;
    if is_inside(&args.mix, &args.dir)? {
        bail!(
            "Cannot unpack into {}, the directory holding the archive",
            args.dir.display()
        );
    }
    fs::create_dir_all(&args.dir)
        .with_context(|| format!("Failed to create {}", args.dir.display()))?;

    let mapped = MappedArchive::open(&args.mix)?;
    let mut archive = MixArchive::open(mapped.bytes(), game)
        .with_context(|| format!("Failed to open {}", args.mix.display()))?;
    resolve_names(&mut archive, args.gmd.as_deref(), args.recover)?;

    for entry in archive.entries() {
        let path = args.dir.join(output_name(entry));
        debug!("Extracting {:08X} to {}", entry.id, path.display());

        let file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let copied = io::copy(&mut archive.open_entry(entry), &mut writer)
            .and_then(|n| writer.flush().map(|()| n))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if copied != u64::from(entry.size) {
            warn!(
                "{} is cut short: {} of {} bytes",
                path.display(),
                copied,
                entry.size
            );
        }
    }

    info!(
        "Unpacked {} files into {}",
        archive.len(),
        args.dir.display()
    );
    Ok(())
}
