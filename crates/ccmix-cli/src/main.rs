//! `ccmix` binary entry point
//!
//! Parses the command line, installs the tracing subscriber and hands the
//! selected subcommand to [`commands`].

mod commands;
mod mapped;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{InfoArgs, PackArgs, RepairArgs, UnpackArgs};

#[derive(Parser)]
#[command(
    name = "ccmix",
    about = "Pack, unpack, inspect and repair Westwood MIX archives",
    version,
    long_about = "A command-line tool for the MIX archives of Tiberian Dawn (cc1), Red Alert (ra1), Tiberian Sun (cc2) and Red Alert 2 (ra2)."
)]
struct Cli {
    /// Log debug details (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into an archive
    Pack(PackArgs),

    /// Extract every entry of an archive into a directory
    Unpack(UnpackArgs),

    /// Print the header and index of an archive
    Info(InfoArgs),

    /// Relocate a stale local mix database and rewrite the header in place
    Repair(RepairArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Pack(args) => commands::pack::run(&args),
        Commands::Unpack(args) => commands::unpack::run(&args),
        Commands::Info(args) => commands::info::run(&args),
        Commands::Repair(args) => commands::repair::run(&args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
