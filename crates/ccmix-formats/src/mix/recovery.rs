//! Recovery of a stale local mix database entry
//!
//! Tools that rewrite an archive sometimes move the local mix database
//! without fixing the index, leaving its record pointing past the body. The
//! record is relocated by scanning the body for the database signature.
//! Every other out-of-range record is zeroed and its file is lost.

use std::io;

use tracing::{debug, info, warn};

use super::index::MixEntry;
use super::lmd::LMD_MAGIC;
use super::source::ByteSource;

/// Bytes scanned per window
pub const SCAN_WINDOW_SIZE: usize = 0x40_0000;

/// Iterator over the positions of a signature within a byte range
///
/// Reads the range one fixed-size window at a time, carrying the last
/// `signature.len() - 1` bytes into the next window so a match straddling a
/// boundary is still found. Positions are relative to the start of the
/// range. A read error is yielded once and ends the scan.
pub struct SignatureScanner<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    signature: &'a [u8],
    end: u64,
    next_read: u64,
    start: u64,
    buf: Vec<u8>,
    buf_base: u64,
    buf_len: usize,
    scan_from: usize,
    done: bool,
}

impl<'a, S: ByteSource + ?Sized> SignatureScanner<'a, S> {
    /// Scan `len` bytes of `source` from `start` with the default window
    pub fn new(source: &'a S, start: u64, len: u64, signature: &'a [u8]) -> Self {
        Self::with_window(source, start, len, signature, SCAN_WINDOW_SIZE)
    }

    /// Scan with a custom window size
    ///
    /// The window is widened to twice the signature length if smaller.
    pub fn with_window(
        source: &'a S,
        start: u64,
        len: u64,
        signature: &'a [u8],
        window: usize,
    ) -> Self {
        let window = window.max(signature.len() * 2).max(1);
        Self {
            source,
            signature,
            end: start.saturating_add(len),
            next_read: start,
            start,
            buf: vec![0; window],
            buf_base: start,
            buf_len: 0,
            scan_from: 0,
            done: signature.is_empty(),
        }
    }

    /// Drop fully scanned bytes and read the next window
    fn refill(&mut self) -> io::Result<bool> {
        let keep_from = self
            .buf_len
            .saturating_sub(self.signature.len() - 1)
            .max(self.scan_from)
            .min(self.buf_len);
        self.buf.copy_within(keep_from..self.buf_len, 0);
        self.buf_base += keep_from as u64;
        self.buf_len -= keep_from;
        self.scan_from = 0;

        let remaining = self.end.saturating_sub(self.next_read);
        let room = self.buf.len() - self.buf_len;
        let want = room.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if want == 0 {
            return Ok(false);
        }

        let n = self
            .source
            .read_at(self.next_read, &mut self.buf[self.buf_len..self.buf_len + want])?;
        self.next_read += n as u64;
        self.buf_len += n;
        Ok(n > 0)
    }
}

impl<S: ByteSource + ?Sized> Iterator for SignatureScanner<'_, S> {
    type Item = io::Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let window = &self.buf[self.scan_from..self.buf_len];
            if let Some(i) = window
                .windows(self.signature.len())
                .position(|w| w == self.signature)
            {
                let pos = self.buf_base + (self.scan_from + i) as u64;
                self.scan_from += i + 1;
                return Some(Ok(pos - self.start));
            }

            match self.refill() {
                Ok(true) => {}
                Ok(false) => self.done = true,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

/// What a recovery pass changed, by entry position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries moved to a signature found in the body
    pub relocated: Vec<usize>,
    /// Entries zeroed because their data could not be found
    pub lost: Vec<usize>,
}

impl RecoveryReport {
    /// Whether nothing was out of range
    pub fn is_clean(&self) -> bool {
        self.relocated.is_empty() && self.lost.is_empty()
    }
}

/// Find the first local mix database in the body, returning its offset
/// within the body and its declared size
pub fn locate_local_database<S: ByteSource + ?Sized>(
    source: &S,
    body_offset: u64,
    body_size: u32,
    window: usize,
) -> Option<(u32, u32)> {
    let body_len = u64::from(body_size);
    let scanner = SignatureScanner::with_window(source, body_offset, body_len, LMD_MAGIC, window);

    for hit in scanner {
        let hit = match hit {
            Ok(hit) => hit,
            Err(err) => {
                warn!("Scan for local mix database stopped: {}", err);
                return None;
            }
        };

        let size_at = hit + LMD_MAGIC.len() as u64;
        if size_at + 4 > body_len {
            debug!("Signature at {} has no room for a size field", hit);
            continue;
        }
        let mut size = [0u8; 4];
        match source.read_exact_at(body_offset + size_at, &mut size) {
            Ok(()) => return Some((hit as u32, u32::from_le_bytes(size))),
            Err(err) => {
                warn!("Cannot read local mix database size at {}: {}", hit, err);
                return None;
            }
        }
    }
    None
}

/// Repair entries whose offset lies past the body
///
/// The local mix database entry is relocated when its signature is still in
/// the body; every other out-of-range entry, and a database that cannot be
/// found, has its offset and size zeroed. Entries in range are untouched, so
/// a second pass is a no-op.
pub fn recover_entries<S: ByteSource + ?Sized>(
    source: &S,
    body_offset: u64,
    body_size: u32,
    lmd_id: u32,
    entries: &mut [MixEntry],
) -> RecoveryReport {
    recover_entries_with_window(
        source,
        body_offset,
        body_size,
        lmd_id,
        entries,
        SCAN_WINDOW_SIZE,
    )
}

pub(crate) fn recover_entries_with_window<S: ByteSource + ?Sized>(
    source: &S,
    body_offset: u64,
    body_size: u32,
    lmd_id: u32,
    entries: &mut [MixEntry],
    window: usize,
) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    for (i, entry) in entries.iter_mut().enumerate() {
        if entry.offset <= body_size {
            continue;
        }

        let found = if entry.id == lmd_id {
            locate_local_database(source, body_offset, body_size, window)
        } else {
            None
        };

        match found {
            Some((offset, size)) => {
                info!(
                    "Relocated local mix database from offset {} to {} ({} bytes)",
                    entry.offset, offset, size
                );
                entry.offset = offset;
                entry.size = size;
                report.relocated.push(i);
            }
            None => {
                warn!(
                    "Entry {:08X} at offset {} lies past the {}-byte body, marking lost",
                    entry.id, entry.offset, body_size
                );
                entry.offset = 0;
                entry.size = 0;
                report.lost.push(i);
            }
        }
    }

    if !report.is_clean() {
        info!(
            "Recovery: {} relocated, {} lost",
            report.relocated.len(),
            report.lost.len()
        );
    }
    report
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mix::index::IndexRecord;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn hits(data: &[u8], start: u64, len: u64, sig: &[u8], window: usize) -> Vec<u64> {
        SignatureScanner::with_window(data, start, len, sig, window)
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_scanner_finds_all_matches() {
        let data = b"xxABCxxxABCABC";
        assert_eq!(hits(data, 0, 14, b"ABC", 6), vec![2, 8, 11]);
        assert_eq!(hits(data, 0, 14, b"ABC", 1024), vec![2, 8, 11]);
    }

    #[test]
    fn test_scanner_respects_range() {
        let data = b"ABCxxABCxxABC";
        // Relative to the range start, last match excluded by the length
        assert_eq!(hits(data, 3, 8, b"ABC", 6), vec![2]);
        assert!(hits(data, 0, 0, b"ABC", 6).is_empty());
        // Range past the end of the source just ends early
        assert_eq!(hits(data, 9, 100, b"ABC", 6), vec![1]);
    }

    #[test]
    fn test_scanner_match_across_window_boundary() {
        let mut data = vec![0u8; 100];
        data[62..94].copy_from_slice(LMD_MAGIC);
        for window in [64, 70, 96, 4096] {
            assert_eq!(hits(&data, 0, 100, LMD_MAGIC, window), vec![62], "window {window}");
        }
    }

    fn body_with_database(prefix: usize, size: u32) -> Vec<u8> {
        let mut body = vec![0xEEu8; prefix];
        body.extend_from_slice(LMD_MAGIC);
        body.extend_from_slice(&size.to_le_bytes());
        body.extend_from_slice(&[0u8; 16]);
        body
    }

    fn entry(id: u32, offset: u32, size: u32) -> MixEntry {
        MixEntry::from(IndexRecord { id, offset, size })
    }

    #[test]
    fn test_recover_relocates_database_and_zeroes_others() {
        let header = vec![0xAAu8; 10];
        let body = body_with_database(40, 68);
        let mut source = header.clone();
        source.extend_from_slice(&body);
        let body_size = body.len() as u32;

        let mut entries = vec![
            entry(1, 0, 40),
            entry(0x54C2_D545, 5000, 68),
            entry(2, 9000, 3),
        ];
        let report = recover_entries_with_window(
            source.as_slice(),
            header.len() as u64,
            body_size,
            0x54C2_D545,
            &mut entries,
            64,
        );

        assert_eq!(report.relocated, vec![1]);
        assert_eq!(report.lost, vec![2]);
        assert_eq!(entries[0], entry(1, 0, 40));
        assert_eq!(entries[1], entry(0x54C2_D545, 40, 68));
        assert_eq!(entries[2], entry(2, 0, 0));

        let again = recover_entries(
            source.as_slice(),
            header.len() as u64,
            body_size,
            0x54C2_D545,
            &mut entries,
        );
        assert!(again.is_clean());
        assert_eq!(entries[1], entry(0x54C2_D545, 40, 68));
    }

    #[test]
    fn test_missing_database_is_lost() {
        let body = vec![0u8; 256];
        let mut entries = vec![entry(0x366E_051F, 1000, 80)];
        let report = recover_entries(body.as_slice(), 0, 256, 0x366E_051F, &mut entries);
        assert_eq!(report.lost, vec![0]);
        assert_eq!(entries[0], entry(0x366E_051F, 0, 0));
    }

    #[test]
    fn test_signature_without_size_field_is_skipped() {
        let mut body = vec![0u8; 8];
        body.extend_from_slice(LMD_MAGIC);
        body.extend_from_slice(&[1, 2]);
        assert_eq!(
            locate_local_database(body.as_slice(), 0, body.len() as u32, 64),
            None
        );
    }

    proptest! {
        #[test]
        fn prop_scanner_matches_naive_search(
            data in proptest::collection::vec(prop_oneof![Just(b'A'), Just(b'B')], 0..300),
            window in 4usize..80,
        ) {
            let sig = b"ABBA";
            let expected: Vec<u64> = data
                .windows(sig.len())
                .enumerate()
                .filter(|(_, w)| *w == sig.as_slice())
                .map(|(i, _)| i as u64)
                .collect();
            prop_assert_eq!(hits(&data, 0, data.len() as u64, sig, window), expected);
        }
    }
}
