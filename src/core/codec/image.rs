//! The 128-byte module record

use super::CodecError;
use std::fmt;
use std::ops::Range;

/// Image size in bytes
pub const IMAGE_LEN: usize = 128;
/// Image size in 16-bit words
pub const WORD_COUNT: usize = IMAGE_LEN / 2;
/// Index of the checksum word
pub const CHECKSUM_WORD: usize = WORD_COUNT - 1;
/// Length of the serial number text
pub const SERIAL_LEN: usize = 7;

const MODEL: Range<usize> = 0x6e..0x76;
const SERIAL: Range<usize> = 0x76..0x7e;
const DESCRIPTION: Range<usize> = 0x6e..0x7d;

/// A module image, always exactly [`IMAGE_LEN`] bytes
#[derive(Clone, PartialEq, Eq)]
pub struct ModuleImage {
    bytes: [u8; IMAGE_LEN],
}

impl ModuleImage {
    /// Build from big-endian bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let bytes: [u8; IMAGE_LEN] = data.try_into().map_err(|_| CodecError::WrongSize {
            expected: IMAGE_LEN,
            actual: data.len(),
        })?;
        Ok(Self { bytes })
    }

    /// Build from 64 words, stored big endian
    pub fn from_words(words: &[u16]) -> Result<Self, CodecError> {
        if words.len() != WORD_COUNT {
            return Err(CodecError::WrongWordCount {
                expected: WORD_COUNT,
                actual: words.len(),
            });
        }

        let mut bytes = [0u8; IMAGE_LEN];
        for (chunk, word) in bytes.chunks_exact_mut(2).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        Ok(Self { bytes })
    }

    /// Raw big-endian bytes
    pub fn as_bytes(&self) -> &[u8; IMAGE_LEN] {
        &self.bytes
    }

    /// The image as 64 words
    pub fn words(&self) -> Vec<u16> {
        self.bytes
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect()
    }

    /// An erased slot reads back as all ones
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0xff)
    }

    /// Model name field, trimmed
    pub fn model(&self) -> String {
        ascii_lossy(&self.bytes[MODEL]).trim().to_string()
    }

    /// Serial number field, trimmed
    pub fn serial(&self) -> String {
        ascii_lossy(&self.bytes[SERIAL]).trim().to_string()
    }

    /// Model and serial with whitespace runs collapsed, used to name dumps
    pub fn description(&self) -> String {
        ascii_lossy(&self.bytes[DESCRIPTION])
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Checksum word as stored
    pub fn stored_checksum(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2 * CHECKSUM_WORD], self.bytes[2 * CHECKSUM_WORD + 1]])
    }

    /// Negated sum of every word before the checksum
    pub fn computed_checksum(&self) -> u16 {
        self.words()[..CHECKSUM_WORD]
            .iter()
            .fold(0u16, |acc, &w| acc.wrapping_add(w))
            .wrapping_neg()
    }

    /// Check the stored checksum
    pub fn validate(&self) -> Result<(), CodecError> {
        let stored = self.stored_checksum();
        let computed = self.computed_checksum();
        if stored == computed {
            Ok(())
        } else {
            Err(CodecError::ChecksumMismatch { stored, computed })
        }
    }

    /// Store the computed checksum, returning it
    pub fn update_checksum(&mut self) -> u16 {
        let checksum = self.computed_checksum();
        self.bytes[2 * CHECKSUM_WORD..].copy_from_slice(&checksum.to_be_bytes());
        checksum
    }

    /// Replace the serial number and refresh the checksum
    pub fn set_serial(&mut self, serial: &str) -> Result<(), CodecError> {
        if serial.len() != SERIAL_LEN || !serial.is_ascii() {
            return Err(CodecError::SerialLength {
                expected: SERIAL_LEN,
                actual: serial.to_string(),
            });
        }

        let field = format!("{:<width$}", serial, width = SERIAL.len());
        self.bytes[SERIAL].copy_from_slice(field.as_bytes());
        self.update_checksum();
        Ok(())
    }

    /// Same image with every word byte-swapped
    pub fn swapped_bytes(&self) -> [u8; IMAGE_LEN] {
        let mut out = self.bytes;
        for chunk in out.chunks_exact_mut(2) {
            chunk.swap(0, 1);
        }
        out
    }
}

impl fmt::Debug for ModuleImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleImage")
            .field("model", &self.model())
            .field("serial", &self.serial())
            .field("checksum", &format_args!("{:#06x}", self.stored_checksum()))
            .finish()
    }
}

fn ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
        .collect()
}
