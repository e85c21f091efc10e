//! Byte sources consumed by the archive reader and writer
//!
//! The reader works over a [`ByteSource`], a random-access view of a whole
//! archive. The writer consumes [`FileSource`]s, named blobs that know their
//! size up front and can be opened as a stream.

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::MixResult;
use super::game::Game;
use super::lmd::{LMD_FILENAME, build_lmd_record};

/// Random-access view of an archive
pub trait ByteSource {
    /// Total length in bytes
    fn len(&self) -> u64;

    /// Whether the source holds no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `buf.len()` bytes starting at `offset`
    ///
    /// Returns 0 at or past the end of the source.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Fill `buf` from `offset`, failing with `UnexpectedEof` if the source
    /// ends first
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("source ended at offset {offset}"),
                    ));
                }
                Ok(n) => {
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl ByteSource for [u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        let Some(available) = self.get(start..) else {
            return Ok(0);
        };
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.as_slice().read_at(offset, buf)
    }
}

/// File opened for positional reads
///
/// The length is captured when the file is opened. Writes through
/// [`RandomAccessFile::file`] do not update it.
#[derive(Debug)]
pub struct RandomAccessFile {
    file: File,
    len: u64,
}

impl RandomAccessFile {
    /// Wrap an open file
    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    /// Open a file read-only
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(File::open(path)?)
    }

    /// Borrow the underlying file
    ///
    /// `&File` implements `Write` and `Seek`, so a header can be rewritten
    /// while an archive still borrows this source.
    pub fn file(&self) -> &File {
        &self.file
    }
}

impl ByteSource for RandomAccessFile {
    fn len(&self) -> u64 {
        self.len
    }

    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(&self.file, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(&self.file, buf, offset)
    }
}

/// Named blob to be packed into an archive
pub trait FileSource {
    /// Filename hashed into the entry identifier
    fn name(&self) -> &str;

    /// Declared size in bytes
    fn size(&self) -> u64;

    /// Open the contents as a stream
    fn open(&self) -> io::Result<Box<dyn Read + '_>>;
}

impl<T: FileSource + ?Sized> FileSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        (**self).open()
    }
}

impl<T: FileSource + ?Sized> FileSource for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        (**self).open()
    }
}

/// File on disk
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    name: String,
    size: u64,
}

impl DiskFile {
    /// Describe a file on disk, reading its size now
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let size = fs::metadata(&path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { path, name, size })
    }

    /// Path the contents are read from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for DiskFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// In-memory blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFile {
    name: String,
    data: Vec<u8>,
}

impl MemoryFile {
    /// Create a named in-memory file
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(Cursor::new(self.data.as_slice())))
    }
}

/// List the regular files of a directory, sorted by name
///
/// Subdirectories are ignored. A stale local mix database is skipped so a
/// freshly generated one never collides with it.
pub fn read_directory(dir: impl AsRef<Path>) -> MixResult<Vec<DiskFile>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file = DiskFile::new(entry.path())?;
        if file.name().eq_ignore_ascii_case(LMD_FILENAME) {
            debug!("Skipping existing {} in {}", LMD_FILENAME, dir.display());
            continue;
        }
        files.push(file);
    }

    files.sort_by(|a, b| a.name().cmp(b.name()));
    debug!("Found {} files in {}", files.len(), dir.display());
    Ok(files)
}

/// List the files to pack from a directory, optionally followed by a freshly
/// built local mix database naming them
pub fn files_to_pack(
    dir: impl AsRef<Path>,
    game: Game,
    database: bool,
) -> MixResult<Vec<Box<dyn FileSource>>> {
    let files = read_directory(dir)?;
    let lmd = database
        .then(|| build_lmd_record(game, files.iter().map(DiskFile::name)))
        .transpose()?;

    let mut sources: Vec<Box<dyn FileSource>> = files
        .into_iter()
        .map(|f| Box::new(f) as Box<dyn FileSource>)
        .collect();
    if let Some(lmd) = lmd {
        sources.push(Box::new(lmd));
    }
    Ok(sources)
}
