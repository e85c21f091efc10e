//! Archive index codec
//!
//! The index is a 16-bit entry count, a 32-bit body size and one 12-byte
//! `(id, offset, size)` record per entry. Records are sorted by identifier
//! compared as a signed 32-bit integer, and offsets are relative to the start
//! of the body.

use std::io::{Cursor, Read, Write};

use binrw::{BinRead, BinWrite};
use ccmix_crypto::FileIdHash;
use tracing::debug;

use super::error::{MixError, MixResult};

/// Size of the count and body size fields
pub const INDEX_HEADER_SIZE: usize = 6;

/// Size of one index record
pub const INDEX_RECORD_SIZE: usize = 12;

/// Largest number of entries the count field can hold
pub const MAX_ENTRIES: usize = u16::MAX as usize;

/// Count and body size preceding the records
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct IndexHeader {
    /// Number of records
    pub count: u16,
    /// Body size in bytes
    pub size: u32,
}

/// On-disk index record
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct IndexRecord {
    /// File identifier
    pub id: u32,
    /// Offset from the start of the body
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

/// Entry of an opened archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixEntry {
    /// File identifier, the only key stored on disk
    pub id: u32,
    /// Offset from the start of the body
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
    /// Filename, when a name database resolved it
    pub name: Option<String>,
}

impl MixEntry {
    /// Name to show or extract the entry as
    ///
    /// Unnamed entries use their identifier as eight upper-case hex digits,
    /// which hashes back to the same identifier when packed again.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{:08X}", self.id),
        }
    }

    /// Record as stored on disk
    pub const fn record(&self) -> IndexRecord {
        IndexRecord {
            id: self.id,
            offset: self.offset,
            size: self.size,
        }
    }
}

impl From<IndexRecord> for MixEntry {
    fn from(record: IndexRecord) -> Self {
        Self {
            id: record.id,
            offset: record.offset,
            size: record.size,
            name: None,
        }
    }
}

/// Sorted index computed for a set of files before packing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    /// Sum of all file sizes
    pub body_size: u32,
    /// Records in on-disk order
    pub records: Vec<IndexRecord>,
    /// For each record, the position of its file in the input
    pub order: Vec<usize>,
}

impl IndexLayout {
    /// Hash, sort and lay out `(name, size)` pairs
    ///
    /// Fails before anything is written if two names share an identifier,
    /// there are more than 65535 files, or a file (or the body as a whole)
    /// does not fit in 32 bits.
    pub fn plan<'a>(
        files: impl IntoIterator<Item = (&'a str, u64)>,
        hash: FileIdHash,
    ) -> MixResult<Self> {
        let files: Vec<(&str, u64)> = files.into_iter().collect();
        if files.len() > MAX_ENTRIES {
            return Err(MixError::TooManyEntries(files.len()));
        }

        let mut keyed: Vec<(u32, usize)> = files
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (hash.hash(name), i))
            .collect();
        keyed.sort_by_key(|&(id, _)| id as i32);

        if let Some(pair) = keyed.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(MixError::IdCollision {
                id: pair[0].0,
                name_a: files[pair[0].1].0.to_string(),
                name_b: files[pair[1].1].0.to_string(),
            });
        }

        let mut records = Vec::with_capacity(keyed.len());
        let mut offset: u32 = 0;
        for &(id, i) in &keyed {
            let (name, size) = files[i];
            let too_large = || MixError::FileTooLarge {
                name: name.to_string(),
                size,
            };
            let size = u32::try_from(size).map_err(|_| too_large())?;
            records.push(IndexRecord { id, offset, size });
            offset = offset.checked_add(size).ok_or_else(too_large)?;
        }

        debug!(
            "Planned index: {} entries, {} body bytes ({} hash)",
            records.len(),
            offset,
            hash
        );

        Ok(Self {
            body_size: offset,
            order: keyed.into_iter().map(|(_, i)| i).collect(),
            records,
        })
    }

    /// Plaintext index bytes: header then records
    pub fn to_bytes(&self) -> MixResult<Vec<u8>> {
        encode_index(self.body_size, &self.records)
    }
}

/// Encode an index with the given body size and records, in the given order
pub fn encode_index(body_size: u32, records: &[IndexRecord]) -> MixResult<Vec<u8>> {
    let count =
        u16::try_from(records.len()).map_err(|_| MixError::TooManyEntries(records.len()))?;
    let mut cursor = Cursor::new(Vec::with_capacity(
        INDEX_HEADER_SIZE + INDEX_RECORD_SIZE * records.len(),
    ));
    IndexHeader {
        count,
        size: body_size,
    }
    .write(&mut cursor)?;
    for record in records {
        record.write(&mut cursor)?;
    }
    Ok(cursor.into_inner())
}

/// Write an index to `writer`
pub fn write_index<W: Write>(
    writer: &mut W,
    body_size: u32,
    records: &[IndexRecord],
) -> MixResult<()> {
    writer.write_all(&encode_index(body_size, records)?)?;
    Ok(())
}

/// Read the body size and `count` records that follow an entry count
///
/// Nothing is validated: records may overlap, repeat or point past the end
/// of the archive.
pub fn read_index<R: Read>(reader: &mut R, count: u16) -> MixResult<(u32, Vec<MixEntry>)> {
    let mut data = vec![0u8; 4 + INDEX_RECORD_SIZE * usize::from(count)];
    reader
        .read_exact(&mut data)
        .map_err(|e| MixError::decoding(e, &format!("index of {count} entries")))?;

    let mut cursor = Cursor::new(data.as_slice());
    let size = u32::read_le(&mut cursor)?;
    let entries = (0..count)
        .map(|_| IndexRecord::read(&mut cursor).map(MixEntry::from))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((size, entries))
}

/// Read an entry count, then the rest of the index
pub fn read_counted_index<R: Read>(reader: &mut R) -> MixResult<(u32, Vec<MixEntry>)> {
    let mut count = [0u8; 2];
    reader
        .read_exact(&mut count)
        .map_err(|e| MixError::decoding(e, "entry count"))?;
    read_index(reader, u16::from_le_bytes(count))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_signed_sort_order() {
        let layout = IndexLayout::plan(
            [("80000000", 1), ("7FFFFFFF", 2), ("00000001", 3), ("FFFFFFFF", 4)],
            FileIdHash::V1,
        )
        .unwrap();

        let ids: Vec<u32> = layout.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0x8000_0000, 0xFFFF_FFFF, 0x0000_0001, 0x7FFF_FFFF]);
        assert_eq!(layout.order, vec![0, 3, 2, 1]);

        let offsets: Vec<u32> = layout.records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1, 5, 8]);
        assert_eq!(layout.body_size, 10);
    }

    #[test]
    fn test_collision_detected() {
        let err = IndexLayout::plan(
            [("CAFEBABE", 1), ("x.shp", 2), ("cafebabe", 3)],
            FileIdHash::V2,
        )
        .unwrap_err();
        match err {
            MixError::IdCollision { id, name_a, name_b } => {
                assert_eq!(id, 0xCAFE_BABE);
                assert_eq!(name_a, "CAFEBABE");
                assert_eq!(name_b, "cafebabe");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Same names differing only in case collide too
        assert!(matches!(
            IndexLayout::plan([("rules.ini", 1), ("RULES.INI", 1)], FileIdHash::V1),
            Err(MixError::IdCollision { .. })
        ));
    }

    #[test]
    fn test_size_limits() {
        assert!(matches!(
            IndexLayout::plan([("big.bin", 1u64 << 32)], FileIdHash::V1),
            Err(MixError::FileTooLarge { size, .. }) if size == 1 << 32
        ));
        assert!(matches!(
            IndexLayout::plan([("a", u64::from(u32::MAX)), ("b", 1)], FileIdHash::V1),
            Err(MixError::FileTooLarge { .. })
        ));

        let names: Vec<String> = (0..=MAX_ENTRIES as u32).map(|i| format!("{i:08X}")).collect();
        assert!(matches!(
            IndexLayout::plan(names.iter().map(|n| (n.as_str(), 0)), FileIdHash::V1),
            Err(MixError::TooManyEntries(65536))
        ));
    }

    #[test]
    fn test_encoded_bytes() {
        let records = [IndexRecord {
            id: 0x0403_0201,
            offset: 0,
            size: 7,
        }];
        let bytes = encode_index(7, &records).unwrap();
        assert_eq!(
            bytes,
            vec![1, 0, 7, 0, 0, 0, 1, 2, 3, 4, 0, 0, 0, 0, 7, 0, 0, 0]
        );
    }

    #[test]
    fn test_truncated_index() {
        let bytes = encode_index(0, &[IndexRecord { id: 1, offset: 0, size: 0 }; 3]).unwrap();
        let err = read_counted_index(&mut &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.is_truncation());

        let err = read_counted_index(&mut &[5u8][..]).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_read_does_not_validate() {
        let records = [
            IndexRecord { id: 9, offset: 100, size: 5 },
            IndexRecord { id: 9, offset: 0, size: 5 },
        ];
        let bytes = encode_index(3, &records).unwrap();
        let (size, entries) = read_counted_index(&mut bytes.as_slice()).unwrap();
        assert_eq!(size, 3);
        assert_eq!(entries.iter().map(MixEntry::record).collect::<Vec<_>>(), records);
    }

    #[test]
    fn test_display_name() {
        let mut entry = MixEntry::from(IndexRecord { id: 0xAB, offset: 0, size: 0 });
        assert_eq!(entry.display_name(), "000000AB");
        entry.name = Some("rules.ini".to_string());
        assert_eq!(entry.display_name(), "rules.ini");
    }

    proptest! {
        #[test]
        fn prop_layout_roundtrip(
            files in proptest::collection::btree_map(any::<u32>(), 0u64..5000, 0..64)
        ) {
            let names: Vec<(String, u64)> = files
                .iter()
                .map(|(id, size)| (format!("{id:08X}"), *size))
                .collect();
            let layout = IndexLayout::plan(
                names.iter().map(|(n, s)| (n.as_str(), *s)),
                FileIdHash::V2,
            )
            .unwrap();

            let bytes = layout.to_bytes().unwrap();
            let (size, entries) = read_counted_index(&mut bytes.as_slice()).unwrap();
            prop_assert_eq!(size, layout.body_size);
            prop_assert_eq!(entries.len(), files.len());

            let mut expected_offset = 0u32;
            for pair in entries.windows(2) {
                prop_assert!((pair[0].id as i32) < (pair[1].id as i32));
            }
            for entry in &entries {
                prop_assert_eq!(entry.offset, expected_offset);
                prop_assert_eq!(u64::from(entry.size), files[&entry.id]);
                expected_offset += entry.size;
            }
            prop_assert_eq!(expected_offset, size);
        }
    }
}
