//! Game generations and archive header flags

use std::fmt;
use std::str::FromStr;

use ccmix_crypto::FileIdHash;

use super::error::MixError;

/// Format generation an archive was built for
///
/// The generation selects the identifier hash, the identifier reserved for
/// the local mix database, and whether the header carries a flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Game {
    /// Tiberian Dawn: legacy header without flags
    TiberianDawn,
    /// Red Alert
    RedAlert,
    /// Tiberian Sun
    TiberianSun,
    /// Red Alert 2
    RedAlert2,
}

impl Game {
    /// Every supported generation, oldest first
    pub const ALL: [Self; 4] = [
        Self::TiberianDawn,
        Self::RedAlert,
        Self::TiberianSun,
        Self::RedAlert2,
    ];

    /// Identifier hash used by this generation
    pub const fn id_hash(self) -> FileIdHash {
        match self {
            Self::TiberianDawn | Self::RedAlert => FileIdHash::V1,
            Self::TiberianSun | Self::RedAlert2 => FileIdHash::V2,
        }
    }

    /// Identifier of a filename under this generation's hash
    pub fn file_id(self, name: &str) -> u32 {
        self.id_hash().hash(name)
    }

    /// Identifier reserved for the local mix database
    pub const fn lmd_id(self) -> u32 {
        match self.id_hash() {
            FileIdHash::V1 => 0x54C2_D545,
            FileIdHash::V2 => 0x366E_051F,
        }
    }

    /// Game tag stored inside local mix database records
    pub const fn lmd_tag(self) -> u32 {
        match self {
            Self::TiberianDawn => 0,
            Self::RedAlert => 1,
            Self::TiberianSun => 2,
            Self::RedAlert2 => 5,
        }
    }

    /// Whether the header starts with a flags word
    pub const fn has_flags_field(self) -> bool {
        !matches!(self, Self::TiberianDawn)
    }

    /// Short name used on the command line
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::TiberianDawn => "cc1",
            Self::RedAlert => "ra1",
            Self::TiberianSun => "cc2",
            Self::RedAlert2 => "ra2",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Game {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|game| game.short_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| MixError::InvalidGame(s.to_string()))
    }
}

/// Header flags of a flagged archive
///
/// On disk only the high half is stored, as a 16-bit value following a zero
/// count word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MixFlags {
    /// Raw 32-bit flag value
    pub value: u32,
}

impl MixFlags {
    /// No flags
    pub const NONE: u32 = 0x0000_0000;

    /// SHA-1 trailer follows the body
    pub const CHECKSUM: u32 = 0x0001_0000;

    /// Index is Blowfish encrypted behind a key source
    pub const ENCRYPTED: u32 = 0x0002_0000;

    /// Create flags from a raw value
    pub const fn new(value: u32) -> Self {
        Self { value }
    }

    /// Rebuild flags from the 16-bit value stored on disk
    pub const fn from_stored(stored: u16) -> Self {
        Self::new((stored as u32) << 16)
    }

    /// Check if flag is set
    pub const fn has(&self, flag: u32) -> bool {
        (self.value & flag) != 0
    }

    /// Set flag
    pub fn set(&mut self, flag: u32) {
        self.value |= flag;
    }

    /// Clear flag
    pub fn clear(&mut self, flag: u32) {
        self.value &= !flag;
    }

    /// Whether a checksum trailer is present
    pub const fn checksum(&self) -> bool {
        self.has(Self::CHECKSUM)
    }

    /// Whether the index is encrypted
    pub const fn encrypted(&self) -> bool {
        self.has(Self::ENCRYPTED)
    }

    /// Whether no flag is set
    pub const fn is_empty(&self) -> bool {
        self.value == Self::NONE
    }
}

impl fmt::Display for MixFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.value)
    }
}

impl From<u32> for MixFlags {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}
