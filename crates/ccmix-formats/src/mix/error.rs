//! Error types for MIX archive operations

use std::io;

use ccmix_crypto::CryptoError;
use thiserror::Error;

use super::game::Game;

/// MIX operation result type
pub type MixResult<T> = Result<T, MixError>;

/// Errors raised while reading, writing or repairing MIX archives
#[derive(Debug, Error)]
pub enum MixError {
    /// Source ended while decoding the header or index
    #[error("Truncated archive: {0}")]
    TruncatedArchive(String),

    /// Local mix database record has the wrong signature
    #[error("Not a local mix database")]
    NotADatabase,

    /// Two files hash to the same identifier
    #[error("ID collision 0x{id:08X} on {name_a} and {name_b}")]
    IdCollision {
        /// Shared identifier
        id: u32,
        /// First colliding filename
        name_a: String,
        /// Second colliding filename
        name_b: String,
    },

    /// Flags requested for a generation without a flags field
    #[error("Game {game} does not support flags {flags:#010x}")]
    UnsupportedFlags {
        /// Target generation
        game: Game,
        /// Requested flags
        flags: u32,
    },

    /// Cipher setup failed
    #[error("Cipher key error: {0}")]
    CipherKey(#[from] CryptoError),

    /// More files than the 16-bit entry count can hold
    #[error("Too many entries: {0} (maximum 65535)")]
    TooManyEntries(usize),

    /// File does not fit a 32-bit size field
    #[error("File too large: {name} is {size} bytes")]
    FileTooLarge {
        /// Filename
        name: String,
        /// Declared size in bytes
        size: u64,
    },

    /// Source produced a different number of bytes than it declared
    #[error("Size mismatch for {name}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Filename
        name: String,
        /// Declared size in bytes
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// Unknown game name
    #[error("Invalid game: {0:?} (expected one of cc1, ra1, cc2, ra2)")]
    InvalidGame(String),

    /// Malformed global mix database line
    #[error("Invalid name database at line {line}: {reason}")]
    InvalidGmd {
        /// One-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Binary read/write error
    #[error("Binary format error: {0}")]
    BinRw(binrw::Error),
}

impl MixError {
    /// Map an I/O error hit while decoding structure, turning a short read
    /// into [`MixError::TruncatedArchive`]
    pub(crate) fn decoding(err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::TruncatedArchive(format!("{what}: {err}"))
        } else {
            Self::Io(err)
        }
    }

    /// Check if this error reports a short read
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::TruncatedArchive(_))
    }
}

impl From<binrw::Error> for MixError {
    fn from(err: binrw::Error) -> Self {
        match err {
            binrw::Error::Io(io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                Self::TruncatedArchive(io_err.to_string())
            }
            binrw::Error::Io(io_err) => Self::Io(io_err),
            other => Self::BinRw(other),
        }
    }
}
