//! Error types for cryptographic operations

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key source is not the expected length
    #[error("Invalid key source length: expected {expected}, got {actual}")]
    InvalidKeySourceLength {
        /// Expected key source size in bytes
        expected: usize,
        /// Actual key source size in bytes
        actual: usize,
    },

    /// The block cipher refused the derived key
    #[error("Cipher key rejected: {0}")]
    CipherKey(String),
}

impl From<cipher::InvalidLength> for CryptoError {
    fn from(err: cipher::InvalidLength) -> Self {
        Self::CipherKey(err.to_string())
    }
}
