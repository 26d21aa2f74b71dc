//! Module slot dump
//!
//! The register exerciser of each acquisition board can print the 64-word
//! image of a plug-in module. Slots 1..=4 map to board 1 head 1, board 1
//! head 2, board 2 head 1 and board 2 head 2.

use crate::core::codec::{ModuleImage, WORD_COUNT};
use crate::core::error::{InstrumentError, Result};
use crate::core::matcher::{MatchCursor, Matcher, HOME_PATTERN};
use crate::core::navigator::{Navigator, Screen, Step, Transition};
use crate::core::transport::TransportTrait;
use crate::utils::sanitize_filename;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DATA_LINE: &str = "(?:[0-9A-F]{4} ){8}";
const HEAD_PROMPT: &str = "Enter head number";

/// A physical module position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleSlot {
    /// Slot number, 1..=4
    pub unit: u8,
    /// Acquisition board, 1 or 2
    pub board: u8,
    /// Head on the board, 1 or 2
    pub head: u8,
}

impl ModuleSlot {
    /// Map a slot number to its board and head
    pub fn new(unit: u8) -> Result<Self> {
        if !(1..=4).contains(&unit) {
            return Err(InstrumentError::InvalidUnit(unit));
        }
        Ok(Self {
            unit,
            board: (unit - 1) / 2 + 1,
            head: (unit - 1) % 2 + 1,
        })
    }

    /// Menu key selecting the board
    pub fn board_key(&self) -> char {
        if self.board == 1 {
            'a'
        } else {
            'b'
        }
    }

    /// Screens leading to the board's register exerciser
    pub fn route(&self) -> [Screen; 5] {
        [
            Screen::Stopped,
            Screen::MainAcq,
            Screen::Acq(self.board),
            Screen::Exercisers,
            Screen::Registers,
        ]
    }
}

/// Result of a module dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    /// The slot reads back erased
    Empty,
    /// Image written to this path
    Saved(PathBuf),
}

/// Reads module images into a directory
pub struct ModuleDumper {
    navigator: Navigator,
    module_dir: PathBuf,
}

impl ModuleDumper {
    /// Create a dumper writing into `module_dir`
    pub fn new(navigator: Navigator, module_dir: impl Into<PathBuf>) -> Self {
        Self {
            navigator,
            module_dir: module_dir.into(),
        }
    }

    /// Directory images are written to
    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Dump one slot, starting from the extended diagnostics screen.
    ///
    /// Returns the outcome and the cursor of the extended diagnostics screen
    /// reached on the way out.
    pub fn dump<T: TransportTrait>(
        &self,
        matcher: &mut Matcher<T>,
        cursor: &MatchCursor,
        unit: u8,
    ) -> Result<(ModuleOutcome, MatchCursor)> {
        let slot = ModuleSlot::new(unit)?;
        fs::create_dir_all(&self.module_dir)?;

        self.navigator
            .follow(matcher, cursor, Screen::ExtendedDiagnostics, &slot.route())?;

        let outcome = self
            .collect(matcher, &slot)
            .and_then(|image| self.store(&slot, &image));

        match outcome {
            Ok(outcome) => match self.leave(matcher) {
                Ok(cursor) => Ok((outcome, cursor)),
                Err(exit_err) => {
                    // The image is on disk; the next navigation starts from an unknown screen
                    warn!("Slot {} read, but could not leave the register exerciser: {}", unit, exit_err);
                    Ok((outcome, MatchCursor::empty()))
                }
            },
            Err(err) => {
                if let Err(exit_err) = self.leave(matcher) {
                    warn!("Could not leave the register exerciser: {}", exit_err);
                }
                Err(err)
            }
        }
    }

    fn collect<T: TransportTrait>(&self, matcher: &mut Matcher<T>, slot: &ModuleSlot) -> Result<ModuleImage> {
        use Screen::*;

        for (from, to) in [(Registers, SelectFunction), (SelectFunction, EnterPrompt), (EnterPrompt, HeadNumber)] {
            self.navigator.execute(matcher, &Transition::between(from, to)?)?;
        }
        self.navigator.execute(matcher, &Transition::select_head(slot.head))?;
        self.navigator
            .run(matcher, &[Step::Pause, Step::Send("\r".into())])?;

        let complete = format!("Select ENTER to continue.*{}", HOME_PATTERN);
        let timeout = self.navigator.pacing().timeout;
        let mut words: Vec<u16> = Vec::with_capacity(WORD_COUNT);

        loop {
            let found = matcher.wait(&[complete.as_str(), DATA_LINE, HEAD_PROMPT], timeout)?;
            match found.index {
                0 => break,
                1 => {
                    for token in found.cursor.as_str().split_whitespace() {
                        let word = u16::from_str_radix(token, 16)
                            .map_err(|_| InstrumentError::MalformedModule(token.to_string()))?;
                        words.push(word);
                    }
                }
                _ => {
                    debug!("Head prompt redrawn, discarding {} words", words.len());
                    words.clear();
                }
            }
        }

        if words.len() != WORD_COUNT {
            return Err(InstrumentError::MalformedModule(format!(
                "slot {}: expected {} words, got {}",
                slot.unit,
                WORD_COUNT,
                words.len()
            )));
        }

        Ok(ModuleImage::from_words(&words)?)
    }

    fn store(&self, slot: &ModuleSlot, image: &ModuleImage) -> Result<ModuleOutcome> {
        if image.is_blank() {
            info!("no module in slot {}", slot.unit);
            return Ok(ModuleOutcome::Empty);
        }

        let description = image.description();
        let stem = if description.is_empty() {
            format!("slot-{}", slot.unit)
        } else {
            sanitize_filename(&description)
        };

        let path = self.module_dir.join(format!("{}.bin", stem));
        fs::write(&path, image.as_bytes())?;
        info!("Slot {}: {} -> {}", slot.unit, description, path.display());

        Ok(ModuleOutcome::Saved(path))
    }

    fn leave<T: TransportTrait>(&self, matcher: &mut Matcher<T>) -> Result<MatchCursor> {
        use Screen::*;

        let mut cursor = MatchCursor::empty();
        for (from, to) in [(EnterPrompt, SelectFunction), (SelectFunction, Stopped), (Stopped, ExtendedDiagnostics)] {
            cursor = self.navigator.execute(matcher, &Transition::between(from, to)?)?;
        }
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_mapping() {
        let slots: Vec<(u8, u8, char)> = (1..=4)
            .map(|unit| {
                let slot = ModuleSlot::new(unit).unwrap();
                (slot.board, slot.head, slot.board_key())
            })
            .collect();
        assert_eq!(slots, [(1, 1, 'a'), (1, 2, 'a'), (2, 1, 'b'), (2, 2, 'b')]);
    }

    #[test]
    fn test_invalid_units() {
        assert!(matches!(ModuleSlot::new(0), Err(InstrumentError::InvalidUnit(0))));
        assert!(matches!(ModuleSlot::new(5), Err(InstrumentError::InvalidUnit(5))));
    }

    #[test]
    fn test_route_targets_board() {
        let slot = ModuleSlot::new(3).unwrap();
        assert_eq!(slot.route()[2], Screen::Acq(2));
    }
}
