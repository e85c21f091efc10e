//! Subcommand arguments and shared helpers

pub mod info;
pub mod pack;
pub mod repair;
pub mod unpack;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ccmix_formats::mix::{ByteSource, Game, MixArchive, load_gmd};
use clap::Args;
use tracing::{debug, info};

/// Target generation, shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GameArg {
    /// One of cc1, ra1, cc2, ra2
    #[arg(short, long, env = "CCMIX_GAME")]
    pub game: Game,
}

/// Arguments for `ccmix pack`
#[derive(Args, Debug, Clone)]
pub struct PackArgs {
    /// Directory to pack
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Archive to write
    #[arg(short, long, default_value = "out.mix")]
    pub mix: PathBuf,

    #[command(flatten)]
    pub game: GameArg,

    /// Append a SHA-1 of the body (not for cc1)
    #[arg(long)]
    pub checksum: bool,

    /// Encrypt the index (not for cc1)
    #[arg(long)]
    pub encrypt: bool,

    /// Include a local mix database naming every file
    #[arg(long)]
    pub database: bool,
}

/// Arguments for `ccmix unpack`
#[derive(Args, Debug, Clone)]
pub struct UnpackArgs {
    /// Archive to read
    #[arg(short, long)]
    pub mix: PathBuf,

    /// Directory to extract into, created if missing
    #[arg(short, long)]
    pub dir: PathBuf,

    #[command(flatten)]
    pub game: GameArg,

    /// Tab-separated name table to resolve identifiers with
    #[arg(long, env = "CCMIX_GMD")]
    pub gmd: Option<PathBuf>,

    /// Relocate a stale local mix database before naming entries
    #[arg(long)]
    pub recover: bool,
}

/// Arguments for `ccmix info`
#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    /// Archive to read
    #[arg(short, long)]
    pub mix: PathBuf,

    #[command(flatten)]
    pub game: GameArg,

    /// Tab-separated name table to resolve identifiers with
    #[arg(long, env = "CCMIX_GMD")]
    pub gmd: Option<PathBuf>,

    /// Relocate a stale local mix database before naming entries
    #[arg(long)]
    pub recover: bool,
}

/// Arguments for `ccmix repair`
#[derive(Args, Debug, Clone)]
pub struct RepairArgs {
    /// Archive to repair in place
    #[arg(short, long)]
    pub mix: PathBuf,

    #[command(flatten)]
    pub game: GameArg,
}

/// Absolute form of a path that may not exist yet
fn absolute(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(path.canonicalize().unwrap_or(path))
}

/// Whether `file` would land directly inside `dir`
pub(crate) fn is_inside(file: &Path, dir: &Path) -> Result<bool> {
    let dir = absolute(dir)?;
    let file = std::path::absolute(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    let Some(parent) = file.parent() else {
        return Ok(false);
    };
    Ok(absolute(parent)? == dir)
}

/// Apply the global then the local mix database
///
/// Names from the local database replace those from the table.
pub(crate) fn resolve_names<S: ByteSource + ?Sized>(
    archive: &mut MixArchive<'_, S>,
    gmd: Option<&Path>,
    recover: bool,
) -> Result<()> {
    if recover {
        let report = archive.recover();
        if !report.is_clean() {
            info!(
                "Recovered {} entries, {} lost",
                report.relocated.len(),
                report.lost.len()
            );
        }
    }

    if let Some(path) = gmd {
        let names: HashMap<u32, String> = load_gmd(path, archive.game().id_hash())
            .with_context(|| format!("Failed to load name table {}", path.display()))?;
        let named = archive.apply_names(&names);
        debug!("Name table {} named {} entries", path.display(), named);
    }

    archive
        .load_local_database()
        .context("Failed to read local mix database")?;
    Ok(())
}
