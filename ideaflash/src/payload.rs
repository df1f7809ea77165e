//! Wire payload conversion for the bootloader client.
//!
//! The client API takes image data as a "binary string": one `char` per
//! byte, where the code point equals the byte value. This is a lossless
//! mapping of all 256 byte values, not text decoding.

use md5::{Digest, Md5};

use crate::error::{Error, Result};

/// Signature of the integrity digest the bootloader client calls back with.
///
/// Receives the full image as a binary string and returns the digest as
/// lowercase hex.
pub type ChecksumFn = fn(&str) -> Result<String>;

/// Image bytes in binary-string form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinaryString(String);

impl BinaryString {
    /// Map every byte to the `char` with the same code point.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(
            bytes
                .iter()
                .copied()
                .map(char::from)
                .collect(),
        )
    }

    /// Borrow the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of bytes represented (one per char).
    pub fn len(&self) -> usize {
        self.0
            .chars()
            .count()
    }

    /// Whether the payload holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0
            .is_empty()
    }

    /// Recover the original bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        latin1_bytes(&self.0)
    }
}

/// Parse a binary string back into bytes.
///
/// Fails if any char lies outside U+0000..=U+00FF.
pub fn latin1_bytes(image: &str) -> Result<Vec<u8>> {
    image
        .chars()
        .map(|ch| {
            u8::try_from(u32::from(ch)).map_err(|_| {
                Error::InvalidFirmware(format!(
                    "payload char U+{:04X} is not a byte value",
                    u32::from(ch)
                ))
            })
        })
        .collect()
}

/// MD5 over the latin-1 decoded image, as lowercase hex.
pub fn md5_latin1(image: &str) -> Result<String> {
    let bytes = latin1_bytes(image)?;
    Ok(hex::encode(Md5::digest(&bytes)))
}
