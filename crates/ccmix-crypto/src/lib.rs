//! Cryptographic primitives for Westwood MIX archives
//!
//! This crate provides the hashing and encryption pieces the MIX container
//! format is built on.
//!
//! # Components
//!
//! - **Identifiers**: the two filename hash variants used to address entries
//! - **Key derivation**: recovery of the Blowfish key from an archive key source
//! - **Encryption**: Blowfish ECB reader and writer for encrypted indexes
//!
//! # Examples
//!
//! ## Filename Identifiers
//!
//! ```
//! use ccmix_crypto::FileIdHash;
//!
//! assert_eq!(FileIdHash::V1.hash("rules.ini"), 0xB1C3_B238);
//! assert_eq!(FileIdHash::V2.hash("rules.ini"), 0xF025_A96C);
//! ```
//!
//! ## Index Cipher
//!
//! ```
//! use ccmix_crypto::{derive_blowfish_key, new_blowfish, DEFAULT_KEY_SOURCE};
//!
//! let key = derive_blowfish_key(&DEFAULT_KEY_SOURCE);
//! let cipher = new_blowfish(&key).expect("derived keys are always 56 bytes");
//! # let _ = cipher;
//! ```

#![warn(missing_docs)]

pub mod ecb;
pub mod error;
pub mod file_id;
pub mod key_source;

pub use error::CryptoError;

// Re-export commonly used types
pub use blowfish::Blowfish;
pub use ecb::{new_blowfish, padded_len, EcbReader, EcbWriter, BLOCK_SIZE};
pub use file_id::{file_id_v1, file_id_v2, filename_as_id, FileIdHash};
pub use key_source::{
    derive_blowfish_key, derive_blowfish_key_from_slice, BlowfishKey, KeySource,
    BLOWFISH_KEY_SIZE, DEFAULT_KEY_SOURCE, KEY_SOURCE_SIZE,
};
