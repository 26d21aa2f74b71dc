//! Text codec: 8 lines of 8 hex words
//!
//! Lines starting with `#` and blank lines are ignored on input. Output starts
//! with a `# <model> <serial>` comment.

use super::{CodecError, ImageCodec, ModuleImage, WORD_COUNT};

const WORDS_PER_LINE: usize = 8;

/// Text image codec
#[derive(Default)]
pub struct TextCodec;

impl TextCodec {
    /// Create a new text codec
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for TextCodec {
    fn decode(&self, input: &[u8]) -> Result<ModuleImage, CodecError> {
        let text = std::str::from_utf8(input)?;
        let mut words = Vec::with_capacity(WORD_COUNT);
        let mut lines = 0;

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parsed = line
                .split_whitespace()
                .map(|token| {
                    u16::from_str_radix(token, 16).map_err(|_| CodecError::InvalidHex {
                        line: idx + 1,
                        token: token.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            if parsed.len() != WORDS_PER_LINE {
                return Err(CodecError::WordsPerLine {
                    line: idx + 1,
                    found: parsed.len(),
                });
            }

            words.extend(parsed);
            lines += 1;
        }

        if words.len() != WORD_COUNT {
            return Err(CodecError::LineCount { found: lines });
        }

        ModuleImage::from_words(&words)
    }

    fn encode(&self, image: &ModuleImage) -> Vec<u8> {
        let mut output = format!("# {} {}\n", image.model(), image.serial());
        for line in image.words().chunks(WORDS_PER_LINE) {
            let words: Vec<String> = line.iter().map(|w| format!("{:04x}", w)).collect();
            output.push_str(&words.join(" "));
            output.push('\n');
        }
        output.into_bytes()
    }
}
