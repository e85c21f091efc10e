//! Blowfish ECB streams for encrypted archive indexes
//!
//! Encrypted archives store their index as a run of independently encrypted
//! 8-byte blocks. The last block is zero-padded. [`EcbReader`] and
//! [`EcbWriter`] adapt any `Read`/`Write` so the index codec can work on
//! plaintext without knowing about block boundaries.
//!
//! ```rust
//! use std::io::{Read, Write};
//! use ccmix_crypto::ecb::{new_blowfish, EcbReader, EcbWriter};
//!
//! let key = [0x42u8; 56];
//!
//! let mut writer = EcbWriter::new(Vec::new(), new_blowfish(&key).expect("valid key"));
//! writer.write_all(b"twelve bytes").expect("write");
//! let ciphertext = writer.finish().expect("finish");
//! assert_eq!(ciphertext.len(), 16);
//!
//! let mut reader = EcbReader::new(ciphertext.as_slice(), new_blowfish(&key).expect("valid key"));
//! let mut plaintext = [0u8; 12];
//! reader.read_exact(&mut plaintext).expect("read");
//! assert_eq!(&plaintext, b"twelve bytes");
//! ```

use std::io::{self, Read, Write};

use blowfish::Blowfish;
use cipher::consts::U8;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit};

use crate::error::CryptoError;

/// Cipher block size in bytes
pub const BLOCK_SIZE: usize = 8;

/// Round a plaintext length up to a whole number of blocks
pub const fn padded_len(len: usize) -> usize {
    len.next_multiple_of(BLOCK_SIZE)
}

/// Build a big-endian Blowfish cipher from a derived key
pub fn new_blowfish(key: &[u8]) -> Result<Blowfish, CryptoError> {
    Ok(Blowfish::new_from_slice(key)?)
}

/// Decrypting reader over a stream of ECB blocks
///
/// Ciphertext is pulled one whole block at a time. Running out of ciphertext
/// part way through a block, or at a block boundary, is reported as
/// [`io::ErrorKind::UnexpectedEof`], so callers should request exactly the
/// plaintext they expect.
pub struct EcbReader<R, C> {
    inner: R,
    cipher: C,
    block: [u8; BLOCK_SIZE],
    pos: usize,
}

impl<R, C> EcbReader<R, C> {
    /// Wrap a ciphertext reader
    pub fn new(inner: R, cipher: C) -> Self {
        Self {
            inner,
            cipher,
            block: [0; BLOCK_SIZE],
            pos: BLOCK_SIZE,
        }
    }

    /// Return the underlying reader, discarding any buffered plaintext
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R, C> Read for EcbReader<R, C>
where
    R: Read,
    C: BlockDecrypt + BlockSizeUser<BlockSize = U8>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pos == BLOCK_SIZE {
            self.inner.read_exact(&mut self.block)?;
            self.cipher
                .decrypt_block(GenericArray::from_mut_slice(&mut self.block));
            self.pos = 0;
        }

        let n = buf.len().min(BLOCK_SIZE - self.pos);
        buf[..n].copy_from_slice(&self.block[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Encrypting writer producing ECB blocks
///
/// Plaintext is buffered until a full block is available. Call
/// [`EcbWriter::finish`] to pad and emit the final partial block; dropping the
/// writer loses it.
pub struct EcbWriter<W, C> {
    inner: W,
    cipher: C,
    block: [u8; BLOCK_SIZE],
    len: usize,
}

impl<W, C> EcbWriter<W, C>
where
    W: Write,
    C: BlockEncrypt + BlockSizeUser<BlockSize = U8>,
{
    /// Wrap a ciphertext writer
    pub fn new(inner: W, cipher: C) -> Self {
        Self {
            inner,
            cipher,
            block: [0; BLOCK_SIZE],
            len: 0,
        }
    }

    fn emit_block(&mut self) -> io::Result<()> {
        self.cipher
            .encrypt_block(GenericArray::from_mut_slice(&mut self.block));
        self.inner.write_all(&self.block)?;
        self.len = 0;
        Ok(())
    }

    /// Zero-pad and write any buffered plaintext, then return the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        if self.len > 0 {
            self.block[self.len..].fill(0);
            self.emit_block()?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W, C> Write for EcbWriter<W, C>
where
    W: Write,
    C: BlockEncrypt + BlockSizeUser<BlockSize = U8>,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(BLOCK_SIZE - self.len);
        self.block[self.len..self.len + n].copy_from_slice(&buf[..n]);
        self.len += n;
        if self.len == BLOCK_SIZE {
            self.emit_block()?;
        }
        Ok(n)
    }

    /// Flushes the inner writer only. A partial block stays buffered until
    /// [`EcbWriter::finish`].
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
