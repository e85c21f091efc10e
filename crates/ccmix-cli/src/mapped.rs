//! Read-only memory-mapped archives

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::{Mmap, MmapOptions};

/// Archive file mapped into memory
///
/// Empty files cannot be mapped and read as an empty slice.
pub struct MappedArchive {
    map: Option<Mmap>,
}

impl MappedArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        if len == 0 {
            return Ok(Self { map: None });
        }

        #[allow(unsafe_code)]
        let map = unsafe {
            MmapOptions::new()
                .map(&file)
                .with_context(|| format!("Failed to mmap {}", path.display()))?
        };
        Ok(Self { map: Some(map) })
    }

    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_mapped() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.mix");
        std::fs::write(&empty, b"").unwrap();
        assert!(MappedArchive::open(&empty).unwrap().bytes().is_empty());

        let full = dir.path().join("full.mix");
        std::fs::write(&full, b"abc").unwrap();
        assert_eq!(MappedArchive::open(&full).unwrap().bytes(), b"abc");

        assert!(MappedArchive::open(&dir.path().join("missing.mix")).is_err());
    }
}
