//! Archive reader
//!
//! Opening an archive classifies its header from the first bytes, decodes
//! the index (through the Blowfish stream when encrypted) and returns a
//! [`MixArchive`] that borrows the source for its whole lifetime.
//!
//! ```text
//! legacy:     count u16 | size u32 | records           | body
//! flagged:    0 u16 | flags u16 | count u16 | size u32 | records | body [| sha1]
//! encrypted:  0 u16 | flags u16 | key source[80] | ECB(count, size, records) | body [| sha1]
//! ```

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};

use ccmix_crypto::{
    Blowfish, EcbReader, EcbWriter, KEY_SOURCE_SIZE, KeySource, derive_blowfish_key,
    new_blowfish, padded_len,
};
use tracing::{debug, warn};

use super::error::{MixError, MixResult};
use super::game::{Game, MixFlags};
use super::index::{
    INDEX_HEADER_SIZE, INDEX_RECORD_SIZE, MixEntry, IndexRecord, encode_index, read_counted_index,
    read_index,
};
use super::lmd::LmdRecord;
use super::recovery::{RecoveryReport, recover_entries};
use super::source::ByteSource;

/// Header shape found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixLayout {
    /// Entry count first, no flags word
    Legacy,
    /// Zero count word, then flags
    Flagged,
}

/// Build the index cipher for a key source
pub(crate) fn index_cipher(key_source: &KeySource) -> MixResult<Blowfish> {
    Ok(new_blowfish(&derive_blowfish_key(key_source))?)
}

/// Opened MIX archive
///
/// Holds the decoded index and a borrowed view of the archive bytes. Entry
/// contents are read on demand.
#[derive(Debug)]
pub struct MixArchive<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    game: Game,
    layout: MixLayout,
    flags: MixFlags,
    key_source: Option<KeySource>,
    body_offset: u64,
    body_size: u32,
    stored_body_size: u32,
    entries: Vec<MixEntry>,
}

impl<'a, S: ByteSource + ?Sized> MixArchive<'a, S> {
    /// Decode the header and index of an archive
    ///
    /// Any short read while decoding fails with
    /// [`MixError::TruncatedArchive`]. Index contents are not validated.
    pub fn open(source: &'a S, game: Game) -> MixResult<Self> {
        let mut head = [0u8; 2];
        source
            .read_exact_at(0, &mut head)
            .map_err(|e| MixError::decoding(e, "header"))?;
        let first = u16::from_le_bytes(head);

        if first != 0 {
            let mut reader = EntryReader::new(source, 2, source.len().saturating_sub(2));
            let (stored_body_size, entries) = read_index(&mut reader, first)?;
            let body_offset = (INDEX_HEADER_SIZE + INDEX_RECORD_SIZE * entries.len()) as u64;

            debug!(
                "Legacy archive: {} entries, body at {}, {} bytes",
                entries.len(),
                body_offset,
                stored_body_size
            );
            if game.has_flags_field() {
                debug!("Legacy header opened as {}", game);
            }

            return Ok(Self {
                source,
                game,
                layout: MixLayout::Legacy,
                flags: MixFlags::default(),
                key_source: None,
                body_offset,
                body_size: stored_body_size,
                stored_body_size,
                entries,
            });
        }

        source
            .read_exact_at(2, &mut head)
            .map_err(|e| MixError::decoding(e, "flags"))?;
        let flags = MixFlags::from_stored(u16::from_le_bytes(head));

        let (key_source, stored_body_size, entries, body_offset) = if flags.encrypted() {
            let mut key_source = [0u8; KEY_SOURCE_SIZE];
            source
                .read_exact_at(4, &mut key_source)
                .map_err(|e| MixError::decoding(e, "key source"))?;

            let start = 4 + KEY_SOURCE_SIZE as u64;
            let ciphertext = EntryReader::new(source, start, source.len().saturating_sub(start));
            let mut reader = EcbReader::new(ciphertext, index_cipher(&key_source)?);
            let (size, entries) = read_counted_index(&mut reader)?;

            let index_len = padded_len(INDEX_HEADER_SIZE + INDEX_RECORD_SIZE * entries.len());
            (Some(key_source), size, entries, start + index_len as u64)
        } else {
            let mut reader = EntryReader::new(source, 4, source.len().saturating_sub(4));
            let (size, entries) = read_counted_index(&mut reader)?;
            let offset = 4 + (INDEX_HEADER_SIZE + INDEX_RECORD_SIZE * entries.len()) as u64;
            (None, size, entries, offset)
        };

        let body_len = source.len().saturating_sub(body_offset);
        let body_size = u32::try_from(body_len).unwrap_or(u32::MAX);

        debug!(
            "Flagged archive ({}): {} entries, body at {}, {} bytes (stored size {})",
            flags,
            entries.len(),
            body_offset,
            body_size,
            stored_body_size
        );

        Ok(Self {
            source,
            game,
            layout: MixLayout::Flagged,
            flags,
            key_source,
            body_offset,
            body_size,
            stored_body_size,
            entries,
        })
    }

    /// Generation the archive was opened as
    pub fn game(&self) -> Game {
        self.game
    }

    /// Header shape found on disk
    pub fn layout(&self) -> MixLayout {
        self.layout
    }

    /// Header flags; always empty for legacy archives
    pub fn flags(&self) -> MixFlags {
        self.flags
    }

    /// Key source of an encrypted archive
    pub fn key_source(&self) -> Option<&KeySource> {
        self.key_source.as_ref()
    }

    /// Absolute offset of the body within the source
    pub fn body_offset(&self) -> u64 {
        self.body_offset
    }

    /// Body size in bytes
    ///
    /// Legacy archives report the stored size field. Flagged archives report
    /// everything that follows the index, checksum trailer included.
    pub fn body_size(&self) -> u32 {
        self.body_size
    }

    /// Body size field as stored in the index
    pub fn stored_body_size(&self) -> u32 {
        self.stored_body_size
    }

    /// Entries in index order
    pub fn entries(&self) -> &[MixEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the first entry with the given identifier
    pub fn find(&self, id: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Entry with the given identifier
    pub fn find_entry(&self, id: u32) -> Option<&MixEntry> {
        self.find(id).map(|i| &self.entries[i])
    }

    /// Bounded reader over an entry's bytes
    pub fn open_entry(&self, entry: &MixEntry) -> EntryReader<'a, S> {
        EntryReader::new(
            self.source,
            self.body_offset + u64::from(entry.offset),
            u64::from(entry.size),
        )
    }

    /// Read an entry's bytes
    ///
    /// Fails with an `UnexpectedEof` I/O error if the source ends before
    /// the entry does. The buffer only grows as bytes arrive, so a corrupt
    /// size field cannot force a huge allocation.
    pub fn read_entry(&self, entry: &MixEntry) -> MixResult<Vec<u8>> {
        let mut data = Vec::new();
        self.open_entry(entry).read_to_end(&mut data)?;
        if data.len() as u64 != u64::from(entry.size) {
            return Err(MixError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry {:08X} needs {} bytes, source holds {}",
                    entry.id,
                    entry.size,
                    data.len()
                ),
            )));
        }
        Ok(data)
    }

    /// Name every entry found in `names`, returning how many were named
    pub fn apply_names(&mut self, names: &HashMap<u32, String>) -> usize {
        let mut applied = 0;
        for entry in &mut self.entries {
            if let Some(name) = names.get(&entry.id) {
                entry.name = Some(name.clone());
                applied += 1;
            }
        }
        applied
    }

    /// Parse the local mix database entry, if there is one
    pub fn local_database(&self) -> MixResult<Option<LmdRecord>> {
        let Some(entry) = self.find_entry(self.game.lmd_id()) else {
            return Ok(None);
        };
        let data = self.read_entry(entry)?;
        LmdRecord::parse(&data).map(Some)
    }

    /// Name entries from the local mix database
    ///
    /// A database with a bad signature or cut short is ignored with a
    /// warning. Returns how many entries were named.
    pub fn load_local_database(&mut self) -> MixResult<usize> {
        let record = match self.local_database() {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No local mix database in archive");
                return Ok(0);
            }
            Err(err @ (MixError::NotADatabase | MixError::TruncatedArchive(_))) => {
                warn!("Ignoring local mix database: {}", err);
                return Ok(0);
            }
            Err(MixError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                warn!("Ignoring local mix database: {}", err);
                return Ok(0);
            }
            Err(err) => return Err(err),
        };

        let applied = self.apply_names(&record.id_map());
        debug!(
            "Local mix database lists {} names, {} matched",
            record.names.len(),
            applied
        );
        Ok(applied)
    }

    /// Relocate a stale local mix database and zero other out-of-range
    /// entries
    ///
    /// Never fails. Running it again on a repaired archive changes nothing.
    pub fn recover(&mut self) -> RecoveryReport {
        recover_entries(
            self.source,
            self.body_offset,
            self.body_size,
            self.game.lmd_id(),
            &mut self.entries,
        )
    }

    /// Write the header and index for the current entries
    ///
    /// The shape follows the layout found on disk. Entries are written in
    /// their current order with the current body size. The entry count does
    /// not change, so the body offset stays where it was.
    pub fn rewrite_header<W: Write>(&self, writer: &mut W) -> MixResult<()> {
        let records: Vec<IndexRecord> = self.entries.iter().map(MixEntry::record).collect();
        let index = encode_index(self.body_size, &records)?;

        if self.layout == MixLayout::Flagged {
            writer.write_all(&self.flags.value.to_le_bytes())?;
        }

        match &self.key_source {
            Some(key_source) if self.layout == MixLayout::Flagged => {
                writer.write_all(key_source)?;
                let mut ecb = EcbWriter::new(&mut *writer, index_cipher(key_source)?);
                ecb.write_all(&index)?;
                ecb.finish()?;
            }
            _ => writer.write_all(&index)?,
        }

        writer.flush()?;
        debug!(
            "Rewrote {:?} header with {} entries",
            self.layout,
            records.len()
        );
        Ok(())
    }
}

/// Bounded `Read + Seek` view of a byte range of a source
///
/// Reads stop early, without error, if the source itself ends inside the
/// range.
#[derive(Debug)]
pub struct EntryReader<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    start: u64,
    len: u64,
    pos: u64,
}

impl<'a, S: ByteSource + ?Sized> EntryReader<'a, S> {
    /// View `len` bytes of `source` starting at `start`
    pub fn new(source: &'a S, start: u64, len: u64) -> Self {
        Self {
            source,
            start,
            len,
            pos: 0,
        }
    }

    /// Length of the range
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<S: ByteSource + ?Sized> Read for EntryReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if want == 0 {
            return Ok(0);
        }
        let n = self.source.read_at(self.start + self.pos, &mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: ByteSource + ?Sized> Seek for EntryReader<'_, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mix::lmd::{LMD_FILENAME, build_lmd_record};
    use crate::mix::source::{FileSource, MemoryFile};
    use crate::mix::writer::{PackOptions, pack};
    use ccmix_crypto::DEFAULT_KEY_SOURCE;
    use pretty_assertions::assert_eq;

    fn legacy_archive() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&5u32.to_le_bytes());
        for (id, offset, size) in [(0x10u32, 0u32, 2u32), (0x20, 2, 3)] {
            data.extend_from_slice(&id.to_le_bytes());
            data.extend_from_slice(&offset.to_le_bytes());
            data.extend_from_slice(&size.to_le_bytes());
        }
        data.extend_from_slice(b"abcde");
        data
    }

    #[test]
    fn test_open_legacy() {
        let data = legacy_archive();
        let archive = MixArchive::open(data.as_slice(), Game::TiberianDawn).unwrap();

        assert_eq!(archive.layout(), MixLayout::Legacy);
        assert!(archive.flags().is_empty());
        assert_eq!(archive.body_offset(), 30);
        assert_eq!(archive.body_size(), 5);
        assert_eq!(archive.len(), 2);

        let second = archive.find_entry(0x20).unwrap();
        assert_eq!(archive.read_entry(second).unwrap(), b"cde");
    }

    #[test]
    fn test_truncated_headers() {
        let data = legacy_archive();
        for len in [0, 1, 5, 29] {
            let err = MixArchive::open(&data[..len], Game::TiberianDawn).unwrap_err();
            assert!(err.is_truncation(), "length {len}: {err}");
        }

        // Flagged header cut inside the flags word and the key source
        let flagged: &[u8] = &[0, 0, 2];
        assert!(MixArchive::open(flagged, Game::RedAlert).unwrap_err().is_truncation());
        let encrypted: &[u8] = &[0, 0, 2, 0, 1, 2, 3];
        assert!(MixArchive::open(encrypted, Game::RedAlert).unwrap_err().is_truncation());
    }

    #[test]
    fn test_truncated_encrypted_index() {
        let files = [MemoryFile::new("a.ini", b"alpha".to_vec())];
        let mut out = Vec::new();
        pack(&mut out, &files, &PackOptions::new(Game::RedAlert).encrypted(true)).unwrap();

        // Key source intact, ciphertext cut inside the first block
        let err = MixArchive::open(&out[..88], Game::RedAlert).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_flagged_body_size_ignores_stored_field() {
        let files = [MemoryFile::new("a.ini", b"alpha".to_vec())];
        let mut out = Vec::new();
        pack(&mut out, &files, &PackOptions::new(Game::TiberianSun).checksum(true)).unwrap();
        out.extend_from_slice(b"junk");

        // 5 body bytes, 20 checksum bytes, 4 junk bytes
        let archive = MixArchive::open(out.as_slice(), Game::TiberianSun).unwrap();
        assert_eq!(archive.stored_body_size(), 5);
        assert_eq!(archive.body_offset(), 22);
        assert_eq!(archive.body_size(), 29);
        assert_eq!(u64::from(archive.body_size()), out.len() as u64 - 22);

        // Repair writes the derived size back
        let mut header = Vec::new();
        archive.rewrite_header(&mut header).unwrap();
        assert_eq!(&header[6..10], &29u32.to_le_bytes());
    }

    #[test]
    fn test_checksum_trailer_is_inside_recovery_range() {
        let files = [MemoryFile::new("a.ini", b"alpha".to_vec())];
        let mut out = Vec::new();
        pack(&mut out, &files, &PackOptions::new(Game::RedAlert2).checksum(true)).unwrap();

        let archive = MixArchive::open(out.as_slice(), Game::RedAlert2).unwrap();
        assert_eq!(out.len(), 47);
        assert_eq!(archive.body_size(), 25);
    }

    #[test]
    fn test_oversized_entry_is_not_allocated() {
        let lmd_id = Game::RedAlert2.lmd_id();
        let mut data = vec![0, 0, 0, 0];
        data.extend_from_slice(&encode_index(
            8,
            &[IndexRecord {
                id: lmd_id,
                offset: 0,
                size: 0xFFFF_FFF0,
            }],
        )
        .unwrap());
        data.extend_from_slice(b"12345678");

        let mut archive = MixArchive::open(data.as_slice(), Game::RedAlert2).unwrap();
        let entry = archive.find_entry(lmd_id).unwrap();
        let err = archive.read_entry(entry).unwrap_err();
        assert!(matches!(err, MixError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));

        assert!(matches!(archive.local_database(), Err(MixError::Io(_))));
        assert_eq!(archive.load_local_database().unwrap(), 0);
    }

    #[test]
    fn test_encrypted_body_offset() {
        let files: Vec<MemoryFile> = (0..3)
            .map(|i| MemoryFile::new(format!("f{i}.bin"), vec![i as u8; 4]))
            .collect();
        let mut out = Vec::new();
        pack(&mut out, &files, &PackOptions::new(Game::RedAlert2).encrypted(true)).unwrap();

        let archive = MixArchive::open(out.as_slice(), Game::RedAlert2).unwrap();
        assert_eq!(archive.key_source(), Some(&DEFAULT_KEY_SOURCE));
        // 84 + roundUp8(6 + 36)
        assert_eq!(archive.body_offset(), 132);
        assert_eq!(archive.body_size(), 12);
    }

    #[test]
    fn test_entry_reader_bounds_and_seek() {
        let data: &[u8] = b"0123456789";
        let mut reader = EntryReader::new(data, 2, 5);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "23456");

        reader.seek(SeekFrom::End(-2)).unwrap();
        let mut two = [0u8; 2];
        reader.read_exact(&mut two).unwrap();
        assert_eq!(&two, b"56");

        assert!(reader.seek(SeekFrom::Current(-10)).is_err());

        // Range running past the end of the source stops short
        let mut tail = EntryReader::new(data, 8, 10);
        let mut rest = Vec::new();
        tail.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"89");
    }

    #[test]
    fn test_names_from_database_override_table() {
        let mut files = vec![
            MemoryFile::new("rules.ini", b"[General]".to_vec()),
            MemoryFile::new("art.ini", b"[Art]".to_vec()),
        ];
        let lmd = build_lmd_record(Game::RedAlert, files.iter().map(|f| f.name())).unwrap();
        files.push(lmd);
        let mut out = Vec::new();
        pack(&mut out, &files, &PackOptions::new(Game::RedAlert)).unwrap();

        let mut archive = MixArchive::open(out.as_slice(), Game::RedAlert).unwrap();
        let table = HashMap::from([
            (Game::RedAlert.file_id("rules.ini"), "RULES-FROM-TABLE".to_string()),
            (0xDEAD_BEEF, "missing.shp".to_string()),
        ]);
        assert_eq!(archive.apply_names(&table), 1);
        assert_eq!(archive.load_local_database().unwrap(), 3);

        let rules = archive.find_entry(Game::RedAlert.file_id("rules.ini")).unwrap();
        assert_eq!(rules.name.as_deref(), Some("rules.ini"));
        let lmd = archive.find_entry(Game::RedAlert.lmd_id()).unwrap();
        assert_eq!(lmd.name.as_deref(), Some(LMD_FILENAME));
    }

    #[test]
    fn test_bad_database_is_ignored() {
        let files = [
            MemoryFile::new("rules.ini", b"[General]".to_vec()),
            MemoryFile::new(LMD_FILENAME, b"not a database at all, just text padding".to_vec()),
        ];
        let mut out = Vec::new();
        pack(&mut out, &files, &PackOptions::new(Game::RedAlert2)).unwrap();

        let mut archive = MixArchive::open(out.as_slice(), Game::RedAlert2).unwrap();
        assert!(matches!(archive.local_database(), Err(MixError::NotADatabase)));
        assert_eq!(archive.load_local_database().unwrap(), 0);
        assert!(archive.entries().iter().all(|e| e.name.is_none()));
    }

    #[test]
    fn test_rewrite_header_roundtrip() {
        for options in [
            PackOptions::new(Game::TiberianDawn),
            PackOptions::new(Game::RedAlert),
            PackOptions::new(Game::RedAlert2).encrypted(true),
        ] {
            let files = [
                MemoryFile::new("a.shp", vec![1; 9]),
                MemoryFile::new("b.shp", vec![2; 3]),
            ];
            let mut out = Vec::new();
            pack(&mut out, &files, &options).unwrap();

            let archive = MixArchive::open(out.as_slice(), options.game).unwrap();
            let mut header = Vec::new();
            archive.rewrite_header(&mut header).unwrap();

            assert_eq!(header.len() as u64, archive.body_offset());
            assert_eq!(header.as_slice(), &out[..header.len()]);
        }
    }
}
