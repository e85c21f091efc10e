//! Local mix database records
//!
//! A local mix database (LMD) is a pseudo-file stored inside an archive
//! under a reserved identifier. Its body lists the original filenames so a
//! reader can map identifiers back to names:
//!
//! ```text
//! magic[32]  size u32  reserved u32 x2  game u32  count u32  names\0...
//! ```
//!
//! The record's own filename is always the last name listed.

use std::collections::HashMap;
use std::io::Cursor;

use binrw::{BinRead, BinWrite};
use ccmix_crypto::{FileIdHash, filename_as_id};
use tracing::debug;

use super::error::{MixError, MixResult};
use super::game::Game;
use super::source::MemoryFile;

/// Filename of the local mix database pseudo-file
pub const LMD_FILENAME: &str = "local mix database.dat";

/// Signature opening every local mix database record
pub const LMD_MAGIC: &[u8; 32] = b"XCC by Olaf van der Spek\x1a\x04\x17\x27\x10\x19\x80\x00";

/// Size of the signature plus the five header fields
pub const LMD_HEADER_SIZE: usize = 52;

/// Fixed part of a local mix database record
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, magic = b"XCC by Olaf van der Spek\x1a\x04\x17\x27\x10\x19\x80\x00")]
pub struct LmdHeader {
    /// Total record size in bytes, signature included
    pub size: u32,
    /// Always zero
    pub reserved: [u32; 2],
    /// Game tag the names were hashed for
    pub game_tag: u32,
    /// Number of names listed
    pub count: u32,
}

/// Parsed local mix database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmdRecord {
    /// Record header
    pub header: LmdHeader,
    /// Filenames in stored order
    pub names: Vec<String>,
}

impl LmdRecord {
    /// Build a record naming `names`
    ///
    /// Names that are just an identifier in hex carry nothing worth keeping
    /// and are skipped. The record's own filename is appended last. The count
    /// field covers every packed file plus the record itself, skipped names
    /// included.
    pub fn new<'a>(game: Game, names: impl IntoIterator<Item = &'a str>) -> Self {
        let files: Vec<&str> = names.into_iter().collect();
        let mut names: Vec<String> = files
            .iter()
            .filter(|name| filename_as_id(name).is_none())
            .map(|name| (*name).to_string())
            .collect();
        names.push(LMD_FILENAME.to_string());

        let size = LMD_HEADER_SIZE + names.iter().map(|n| n.len() + 1).sum::<usize>();

        Self {
            header: LmdHeader {
                size: size as u32,
                reserved: [0; 2],
                game_tag: game.lmd_tag(),
                count: (files.len() + 1) as u32,
            },
            names,
        }
    }

    /// Parse a record body
    pub fn parse(data: &[u8]) -> MixResult<Self> {
        let mut cursor = Cursor::new(data);
        let header = match LmdHeader::read(&mut cursor) {
            Ok(header) => header,
            Err(binrw::Error::BadMagic { .. }) => return Err(MixError::NotADatabase),
            Err(err) => return Err(err.into()),
        };

        let names = data[LMD_HEADER_SIZE..]
            .split(|&b| b == 0)
            .filter(|name| !name.is_empty())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();

        Ok(Self { header, names })
    }

    /// Identifier hash matching the stored game tag
    pub fn id_hash(&self) -> FileIdHash {
        if self.header.game_tag <= Game::RedAlert.lmd_tag() {
            FileIdHash::V1
        } else {
            FileIdHash::V2
        }
    }

    /// Map every listed name's identifier to the name
    pub fn id_map(&self) -> HashMap<u32, String> {
        let hash = self.id_hash();
        self.names
            .iter()
            .map(|name| (hash.hash(name), name.clone()))
            .collect()
    }

    /// Serialize the record
    pub fn to_bytes(&self) -> MixResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(self.header.size as usize));
        self.header.write(&mut cursor)?;
        let mut data = cursor.into_inner();
        for name in &self.names {
            data.extend_from_slice(name.as_bytes());
            data.push(0);
        }
        Ok(data)
    }
}

/// Build the local mix database pseudo-file for a set of filenames
pub fn build_lmd_record<'a>(
    game: Game,
    names: impl IntoIterator<Item = &'a str>,
) -> MixResult<MemoryFile> {
    let record = LmdRecord::new(game, names);
    debug!(
        "Built local mix database for {}: {} names, {} bytes",
        game, record.header.count, record.header.size
    );
    Ok(MemoryFile::new(LMD_FILENAME, record.to_bytes()?))
}

/// Parse a record body into an identifier to filename map
pub fn parse_lmd_record(data: &[u8]) -> MixResult<HashMap<u32, String>> {
    Ok(LmdRecord::parse(data)?.id_map())
}
