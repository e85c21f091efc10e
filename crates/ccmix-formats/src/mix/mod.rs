//! Westwood MIX archives
//!
//! A MIX archive is a flat list of files addressed only by a 32-bit hash of
//! their name. Four generations of the format exist:
//!
//! | Game | Header | Identifier hash |
//! |------|--------|-----------------|
//! | Tiberian Dawn (`cc1`) | legacy, no flags | V1 |
//! | Red Alert (`ra1`) | flagged | V1 |
//! | Tiberian Sun (`cc2`) | flagged | V2 |
//! | Red Alert 2 (`ra2`) | flagged | V2 |
//!
//! Flagged archives may encrypt their index with Blowfish and may append a
//! SHA-1 of the body. Filenames can be recovered from a local mix database
//! stored inside the archive, or from an external name table.
//!
//! # Examples
//!
//! ## Pack and read back
//!
//! ```rust
//! use ccmix_formats::mix::{pack, Game, MemoryFile, MixArchive, PackOptions};
//!
//! let files = [MemoryFile::new("rules.ini", b"[General]".to_vec())];
//! let mut archive_bytes = Vec::new();
//! pack(
//!     &mut archive_bytes,
//!     &files,
//!     &PackOptions::new(Game::RedAlert2).encrypted(true).checksum(true),
//! )?;
//!
//! let archive = MixArchive::open(archive_bytes.as_slice(), Game::RedAlert2)?;
//! let entry = archive
//!     .find_entry(Game::RedAlert2.file_id("rules.ini"))
//!     .expect("entry present");
//! assert_eq!(archive.read_entry(entry)?, b"[General]");
//! # Ok::<(), ccmix_formats::mix::MixError>(())
//! ```
//!
//! ## Repair a stale local mix database
//!
//! ```rust,no_run
//! use ccmix_formats::mix::{Game, MixArchive, RandomAccessFile};
//! use std::fs::OpenOptions;
//! use std::io::{Seek, SeekFrom};
//!
//! let file = OpenOptions::new().read(true).write(true).open("expand01.mix")?;
//! let source = RandomAccessFile::new(file)?;
//! let mut archive = MixArchive::open(&source, Game::RedAlert2)?;
//! archive.recover();
//!
//! let mut out = source.file();
//! out.seek(SeekFrom::Start(0))?;
//! archive.rewrite_header(&mut out)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod game;
pub mod gmd;
pub mod index;
pub mod lmd;
pub mod reader;
pub mod recovery;
pub mod source;
pub mod writer;

pub use error::{MixError, MixResult};
pub use game::{Game, MixFlags};
pub use gmd::{load_gmd, read_gmd};
pub use index::{
    IndexHeader, IndexLayout, IndexRecord, MixEntry, encode_index, read_counted_index, read_index,
    write_index,
};
pub use lmd::{LMD_FILENAME, LMD_MAGIC, LmdHeader, LmdRecord, build_lmd_record, parse_lmd_record};
pub use reader::{EntryReader, MixArchive, MixLayout};
pub use recovery::{RecoveryReport, SignatureScanner, locate_local_database, recover_entries};
pub use source::{
    ByteSource, DiskFile, FileSource, MemoryFile, RandomAccessFile, files_to_pack, read_directory,
};
pub use writer::{PackOptions, PackSummary, pack};
