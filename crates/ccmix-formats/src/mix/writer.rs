//! Archive writer
//!
//! Packing hashes and sorts the files, writes the header and index (through
//! the Blowfish stream when encrypting), then the bodies in index order. A
//! SHA-1 of the body follows when the checksum flag is set.

use std::io::{self, Read, Write};

use ccmix_crypto::{DEFAULT_KEY_SOURCE, EcbWriter, KEY_SOURCE_SIZE, KeySource, padded_len};
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use super::error::{MixError, MixResult};
use super::game::{Game, MixFlags};
use super::index::IndexLayout;
use super::reader::index_cipher;
use super::source::FileSource;

/// Settings for [`pack`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    /// Target generation
    pub game: Game,
    /// Header flags
    pub flags: MixFlags,
    /// Key source stored in front of an encrypted index
    pub key_source: KeySource,
}

impl PackOptions {
    /// Plain archive for `game`
    pub fn new(game: Game) -> Self {
        Self {
            game,
            flags: MixFlags::default(),
            key_source: DEFAULT_KEY_SOURCE,
        }
    }

    /// Append a SHA-1 of the body
    pub fn checksum(mut self, enabled: bool) -> Self {
        self.toggle(MixFlags::CHECKSUM, enabled);
        self
    }

    /// Encrypt the index
    pub fn encrypted(mut self, enabled: bool) -> Self {
        self.toggle(MixFlags::ENCRYPTED, enabled);
        self
    }

    /// Use a specific key source for encryption
    pub fn key_source(mut self, key_source: KeySource) -> Self {
        self.key_source = key_source;
        self
    }

    fn toggle(&mut self, flag: u32, enabled: bool) {
        if enabled {
            self.flags.set(flag);
        } else {
            self.flags.clear(flag);
        }
    }
}

/// Result of a successful [`pack`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    /// Number of entries written
    pub entries: usize,
    /// Body size in bytes
    pub body_size: u32,
    /// Offset of the body from the start of the archive
    pub body_offset: u64,
    /// SHA-1 trailer, when the checksum flag was set
    pub checksum: Option<[u8; 20]>,
}

/// Writer that feeds everything it passes through to SHA-1
struct HashingWriter<W> {
    inner: W,
    hasher: Sha1,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha1::new(),
        }
    }

    fn finish(self) -> (W, [u8; 20]) {
        (self.inner, self.hasher.finalize().into())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Pack `files` into an archive written to `writer`
///
/// Identifier collisions, unsupported flags and size limits are all detected
/// before the first byte is written.
pub fn pack<W: Write, F: FileSource>(
    writer: &mut W,
    files: &[F],
    options: &PackOptions,
) -> MixResult<PackSummary> {
    let game = options.game;
    let flags = options.flags;

    if !game.has_flags_field() && !flags.is_empty() {
        return Err(MixError::UnsupportedFlags {
            game,
            flags: flags.value,
        });
    }

    let layout = IndexLayout::plan(files.iter().map(|f| (f.name(), f.size())), game.id_hash())?;
    let index = layout.to_bytes()?;

    let mut body_offset = 0u64;
    if game.has_flags_field() {
        writer.write_all(&flags.value.to_le_bytes())?;
        body_offset += 4;
    }

    if flags.encrypted() {
        writer.write_all(&options.key_source)?;
        let mut ecb = EcbWriter::new(&mut *writer, index_cipher(&options.key_source)?);
        ecb.write_all(&index)?;
        ecb.finish()?;
        body_offset += (KEY_SOURCE_SIZE + padded_len(index.len())) as u64;
    } else {
        writer.write_all(&index)?;
        body_offset += index.len() as u64;
    }

    debug!(
        "Wrote {} header for {} entries, body at {}",
        game,
        layout.records.len(),
        body_offset
    );

    let checksum = if flags.checksum() {
        let mut hashing = HashingWriter::new(&mut *writer);
        write_bodies(&mut hashing, files, &layout)?;
        let (_, digest) = hashing.finish();
        writer.write_all(&digest)?;
        Some(digest)
    } else {
        write_bodies(writer, files, &layout)?;
        None
    };

    writer.flush()?;

    info!(
        "Packed {} entries for {} ({} body bytes{}{})",
        layout.records.len(),
        game,
        layout.body_size,
        if flags.encrypted() { ", encrypted" } else { "" },
        if flags.checksum() { ", checksum" } else { "" }
    );

    Ok(PackSummary {
        entries: layout.records.len(),
        body_size: layout.body_size,
        body_offset,
        checksum,
    })
}

/// Copy every body in index order, checking each against its declared size
fn write_bodies<W: Write, F: FileSource>(
    writer: &mut W,
    files: &[F],
    layout: &IndexLayout,
) -> MixResult<()> {
    for &i in &layout.order {
        let file = &files[i];
        let expected = file.size();
        // One byte more than declared is enough to notice a file that grew.
        let mut reader = file.open()?.take(expected + 1);
        let actual = io::copy(&mut reader, writer)?;
        if actual != expected {
            return Err(MixError::SizeMismatch {
                name: file.name().to_string(),
                expected,
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mix::source::MemoryFile;
    use pretty_assertions::assert_eq;

    /// Source that declares one size and yields another
    struct LyingFile {
        declared: u64,
        data: Vec<u8>,
    }

    impl FileSource for LyingFile {
        fn name(&self) -> &str {
            "liar.bin"
        }

        fn size(&self) -> u64 {
            self.declared
        }

        fn open(&self) -> io::Result<Box<dyn Read + '_>> {
            Ok(Box::new(self.data.as_slice()))
        }
    }

    #[test]
    fn test_legacy_layout_bytes() {
        let files = [
            MemoryFile::new("00000002", b"bb".to_vec()),
            MemoryFile::new("00000001", b"a".to_vec()),
        ];
        let mut out = Vec::new();
        let summary = pack(&mut out, &files, &PackOptions::new(Game::TiberianDawn)).unwrap();

        let mut expected = vec![2, 0, 3, 0, 0, 0];
        expected.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]);
        expected.extend_from_slice(&[2, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]);
        expected.extend_from_slice(b"abb");
        assert_eq!(out, expected);
        assert_eq!(summary.body_offset, 30);
        assert_eq!(summary.checksum, None);
    }

    #[test]
    fn test_flags_rejected_for_legacy() {
        let files = [MemoryFile::new("a.ini", b"a".to_vec())];
        let mut out = Vec::new();
        let err = pack(
            &mut out,
            &files,
            &PackOptions::new(Game::TiberianDawn).checksum(true),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MixError::UnsupportedFlags {
                game: Game::TiberianDawn,
                flags: 0x0001_0000
            }
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_collision_writes_nothing() {
        let files = [
            MemoryFile::new("rules.ini", b"one".to_vec()),
            MemoryFile::new("RULES.INI", b"two".to_vec()),
        ];
        let mut out = Vec::new();
        let err = pack(&mut out, &files, &PackOptions::new(Game::RedAlert2).encrypted(true))
            .unwrap_err();
        assert!(matches!(err, MixError::IdCollision { .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_checksum_trailer() {
        let files = [MemoryFile::new("a.ini", b"hello".to_vec())];
        let mut out = Vec::new();
        let summary = pack(&mut out, &files, &PackOptions::new(Game::RedAlert).checksum(true))
            .unwrap();

        let digest: [u8; 20] = Sha1::digest(b"hello").into();
        assert_eq!(summary.checksum, Some(digest));
        assert_eq!(&out[out.len() - 20..], &digest);
        assert_eq!(&out[..4], &[0, 0, 1, 0]);
        assert_eq!(summary.body_offset, 22);
    }

    #[test]
    fn test_encrypted_header_shape() {
        let files = [MemoryFile::new("a.ini", b"hello".to_vec())];
        let mut out = Vec::new();
        let summary = pack(&mut out, &files, &PackOptions::new(Game::RedAlert2).encrypted(true))
            .unwrap();

        assert_eq!(&out[..4], &[0, 0, 2, 0]);
        assert_eq!(&out[4..84], &DEFAULT_KEY_SOURCE);
        // 6 + 12 bytes of index padded to 24
        assert_eq!(summary.body_offset, 108);
        assert_eq!(out.len(), 113);
        assert_eq!(&out[108..], b"hello");
    }

    #[test]
    fn test_size_mismatch() {
        for (declared, data) in [(4, vec![1u8; 3]), (2, vec![1u8; 3])] {
            let files = [LyingFile { declared, data }];
            let err = pack(&mut Vec::<u8>::new(), &files, &PackOptions::new(Game::RedAlert)).unwrap_err();
            assert!(matches!(
                err,
                MixError::SizeMismatch { expected, actual, .. }
                    if expected == declared && actual == 3.min(declared + 1)
            ));
        }
    }

    #[test]
    fn test_empty_flagged_archive() {
        let files: [MemoryFile; 0] = [];
        let mut out = Vec::new();
        pack(&mut out, &files, &PackOptions::new(Game::TiberianSun)).unwrap();
        assert_eq!(out, vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
