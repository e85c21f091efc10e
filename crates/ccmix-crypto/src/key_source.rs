//! Blowfish key derivation from an archive key source
//!
//! Encrypted archives store an 80-byte key source in the clear. The Blowfish
//! key is recovered by treating the key source as two 40-byte little-endian
//! integers and raising each to the fixed public exponent modulo the fixed
//! public modulus. Each result contributes 39 little-endian bytes; the first
//! 56 bytes of the concatenation form the key.

use rsa::BigUint;

use crate::error::CryptoError;

/// Size of the key source stored in encrypted archive headers
pub const KEY_SOURCE_SIZE: usize = 80;

/// Size of the derived Blowfish key
pub const BLOWFISH_KEY_SIZE: usize = 56;

/// Raw 80-byte key source
pub type KeySource = [u8; KEY_SOURCE_SIZE];

/// Derived Blowfish key
pub type BlowfishKey = [u8; BLOWFISH_KEY_SIZE];

/// Public exponent
const PUBLIC_EXPONENT: u32 = 0x10001;

/// Public modulus, big-endian
const PUBLIC_MODULUS: [u8; 40] = [
    0x51, 0xbc, 0xda, 0x08, 0x6d, 0x39, 0xfc, 0xe4, //
    0x56, 0x51, 0x60, 0xd6, 0x51, 0x71, 0x3f, 0xa2, //
    0xe8, 0xaa, 0x54, 0xfa, 0x66, 0x82, 0xb0, 0x4a, //
    0xab, 0xdd, 0x0e, 0x6a, 0xf8, 0xb0, 0xc1, 0xe6, //
    0xd1, 0xfb, 0x4f, 0x3d, 0xaa, 0x43, 0x7f, 0x15, //
];

/// Key source written by the packer
///
/// Any 80 bytes work. This is the key source shipped with the classic
/// Westwood tools.
pub const DEFAULT_KEY_SOURCE: KeySource = [
    0xca, 0xd0, 0xb0, 0x1b, 0xfe, 0x3f, 0x3f, 0xb6, //
    0xca, 0xc0, 0xbd, 0x8f, 0x40, 0xf0, 0xee, 0x85, //
    0x6e, 0xe1, 0xda, 0x7a, 0xef, 0xb4, 0xd4, 0xbb, //
    0x6a, 0xd8, 0x4b, 0x84, 0x26, 0x99, 0x6f, 0xfd, //
    0x65, 0x97, 0xf2, 0x5f, 0xa4, 0x46, 0xdb, 0x47, //
    0x88, 0x63, 0x4f, 0x2c, 0x14, 0x0b, 0x3c, 0xce, //
    0xaa, 0xc4, 0x5c, 0xe4, 0x15, 0x86, 0x26, 0x5c, //
    0x52, 0x3a, 0x80, 0xf8, 0xbe, 0x45, 0x40, 0x6a, //
    0x66, 0xb4, 0xc5, 0xf6, 0xd0, 0x12, 0xe0, 0x43, //
    0x44, 0x65, 0xc6, 0xe3, 0x9e, 0xf9, 0x43, 0x35, //
];

/// Derive the Blowfish key for an archive from its key source
pub fn derive_blowfish_key(key_source: &KeySource) -> BlowfishKey {
    let modulus = BigUint::from_bytes_be(&PUBLIC_MODULUS);
    let exponent = BigUint::from(PUBLIC_EXPONENT);

    // Output chunks are one byte narrower than input chunks.
    let output_len = (modulus.bits() - 2) / 8;
    let input_len = output_len + 1;

    let mut derived = Vec::with_capacity(KEY_SOURCE_SIZE);
    for chunk in key_source.chunks_exact(input_len) {
        let value = BigUint::from_bytes_le(chunk).modpow(&exponent, &modulus);
        let mut bytes = value.to_bytes_le();
        bytes.resize(output_len, 0);
        derived.extend_from_slice(&bytes);
    }

    let mut key = [0u8; BLOWFISH_KEY_SIZE];
    key.copy_from_slice(&derived[..BLOWFISH_KEY_SIZE]);
    key
}

/// Derive a key from an untyped slice, checking its length
pub fn derive_blowfish_key_from_slice(key_source: &[u8]) -> Result<BlowfishKey, CryptoError> {
    let key_source: &KeySource =
        key_source
            .try_into()
            .map_err(|_| CryptoError::InvalidKeySourceLength {
                expected: KEY_SOURCE_SIZE,
                actual: key_source.len(),
            })?;
    Ok(derive_blowfish_key(key_source))
}
