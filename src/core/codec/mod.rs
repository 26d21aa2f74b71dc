//! Module image codec
//!
//! A module image is a fixed 128-byte record (64 big-endian words) holding
//! the model and serial text of a plug-in module plus a checksum word.
//! Supported external forms:
//! - Big endian binary (as read from the instrument)
//! - Little endian binary (every word byte-swapped)
//! - Text (8 lines of 8 hex words)

mod binary;
mod image;
mod text;

pub use binary::BinaryCodec;
pub use image::{ModuleImage, CHECKSUM_WORD, IMAGE_LEN, SERIAL_LEN, WORD_COUNT};
pub use text::TextCodec;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Word byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Low byte first
    #[default]
    Little,
    /// High byte first
    Big,
}

impl ByteOrder {
    /// Pack 16-bit words into bytes
    pub fn pack_words(self, words: &[u16]) -> Vec<u8> {
        words
            .iter()
            .flat_map(|w| match self {
                Self::Little => w.to_le_bytes(),
                Self::Big => w.to_be_bytes(),
            })
            .collect()
    }
}

/// External module image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleFormat {
    /// Big endian binary
    #[default]
    Big,
    /// Little endian binary
    Little,
    /// Hex word text
    Text,
}

impl FromStr for ModuleFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "big" => Ok(Self::Big),
            "little" => Ok(Self::Little),
            "text" => Ok(Self::Text),
            _ => Err(CodecError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Big => write!(f, "big endian"),
            Self::Little => write!(f, "little endian"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Codec trait for module image forms
pub trait ImageCodec {
    /// Decode an external form into an image
    fn decode(&self, input: &[u8]) -> Result<ModuleImage, CodecError>;

    /// Encode an image into its external form
    fn encode(&self, image: &ModuleImage) -> Vec<u8>;
}

/// Codec errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Binary input of the wrong size
    #[error("Input must be {expected} bytes, got {actual}")]
    WrongSize {
        /// Required size
        expected: usize,
        /// Size received
        actual: usize,
    },

    /// Wrong number of words for an image
    #[error("Image must contain {expected} words, got {actual}")]
    WrongWordCount {
        /// Required word count
        expected: usize,
        /// Word count received
        actual: usize,
    },

    /// Text line does not hold exactly 8 words
    #[error("Line {line}: each line of input must contain 8 words, found {found}")]
    WordsPerLine {
        /// 1-based line number
        line: usize,
        /// Words found on that line
        found: usize,
    },

    /// Text input does not hold exactly 8 data lines
    #[error("Input must contain 8 lines of words, found {found}")]
    LineCount {
        /// Data lines found
        found: usize,
    },

    /// Token is not a 16-bit hex word
    #[error("Line {line}: invalid hex word {token:?}")]
    InvalidHex {
        /// 1-based line number
        line: usize,
        /// Offending token
        token: String,
    },

    /// Text input is not valid UTF-8
    #[error("Invalid text input: {0}")]
    InvalidText(#[from] std::str::Utf8Error),

    /// Stored checksum does not match the computed one
    #[error("Invalid checksum {stored:#06x}, calculated {computed:#06x}")]
    ChecksumMismatch {
        /// Word 63 as stored
        stored: u16,
        /// Negated sum of words 0..63
        computed: u16,
    },

    /// Serial number of the wrong length
    #[error("Serial number must be {expected} ASCII characters, got {actual:?}")]
    SerialLength {
        /// Required length
        expected: usize,
        /// Rejected serial
        actual: String,
    },

    /// Unsupported format name
    #[error("Invalid format {0:?} (expected big, little or text)")]
    UnknownFormat(String),
}

/// Create a codec for a format
pub fn create_codec(format: ModuleFormat) -> Box<dyn ImageCodec> {
    match format {
        ModuleFormat::Big => Box::new(BinaryCodec::new(ByteOrder::Big)),
        ModuleFormat::Little => Box::new(BinaryCodec::new(ByteOrder::Little)),
        ModuleFormat::Text => Box::new(TextCodec::new()),
    }
}

/// Format bytes as a hexdump (like xxd)
pub fn hexdump(data: &[u8], bytes_per_line: usize) -> String {
    let mut output = String::new();

    for (offset, chunk) in data.chunks(bytes_per_line.max(1)).enumerate() {
        output.push_str(&format!("{:08x}  ", offset * bytes_per_line));
        output.push_str(&hex::encode(chunk));

        for _ in chunk.len()..bytes_per_line {
            output.push_str("  ");
        }

        output.push_str("  |");
        for byte in chunk {
            if byte.is_ascii_graphic() || *byte == b' ' {
                output.push(*byte as char);
            } else {
                output.push('.');
            }
        }
        output.push_str("|\n");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_words() {
        assert_eq!(ByteOrder::Big.pack_words(&[0x1234, 0xabcd]), [0x12, 0x34, 0xab, 0xcd]);
        assert_eq!(ByteOrder::Little.pack_words(&[0x1234, 0xabcd]), [0x34, 0x12, 0xcd, 0xab]);
    }

    #[test]
    fn test_format_names() {
        assert_eq!("big".parse::<ModuleFormat>().unwrap(), ModuleFormat::Big);
        assert_eq!("little".parse::<ModuleFormat>().unwrap(), ModuleFormat::Little);
        assert_eq!("text".parse::<ModuleFormat>().unwrap(), ModuleFormat::Text);
        assert!(matches!(
            "BIG".parse::<ModuleFormat>(),
            Err(CodecError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_hexdump() {
        let dump = hexdump(b"SD-24 B020024", 16);
        assert!(dump.starts_with("00000000  53442d3234"));
        assert!(dump.contains("|SD-24 B020024|"));
    }
}
