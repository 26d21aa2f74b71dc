//! Byte interleave split and merge
//!
//! ROMs on 16-bit buses are commonly stored as an even-byte chip and an
//! odd-byte chip. Splitting distributes the byte at offset `k` to output
//! `k % parts`; merging is the inverse.

use std::fs;
use std::path::Path;
use thiserror::Error;

/// Interleave errors
#[derive(Error, Debug)]
pub enum InterleaveError {
    /// Zero outputs requested
    #[error("Number of parts must be at least 1")]
    NoParts,

    /// Input does not divide evenly
    #[error("Length {len} is not a multiple of {parts} parts")]
    UnevenLength {
        /// Input length in bytes
        len: usize,
        /// Requested number of parts
        parts: usize,
    },

    /// Merge inputs differ in size
    #[error("Input sizes are not equal ({first} vs {other} bytes)")]
    UnequalInputs {
        /// Size of the first input
        first: usize,
        /// Size of the first mismatching input
        other: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Split `data` into `parts` sequences by fixed stride
pub fn split(data: &[u8], parts: usize) -> Result<Vec<Vec<u8>>, InterleaveError> {
    if parts == 0 {
        return Err(InterleaveError::NoParts);
    }
    if data.len() % parts != 0 {
        return Err(InterleaveError::UnevenLength {
            len: data.len(),
            parts,
        });
    }

    let mut outputs = vec![Vec::with_capacity(data.len() / parts); parts];
    for chunk in data.chunks(parts) {
        for (out, &byte) in outputs.iter_mut().zip(chunk) {
            out.push(byte);
        }
    }

    Ok(outputs)
}

/// Merge equal-length sequences back into one by fixed stride
pub fn merge<S: AsRef<[u8]>>(inputs: &[S]) -> Result<Vec<u8>, InterleaveError> {
    let first = inputs.first().ok_or(InterleaveError::NoParts)?.as_ref().len();
    if let Some(other) = inputs.iter().map(|i| i.as_ref().len()).find(|&l| l != first) {
        return Err(InterleaveError::UnequalInputs { first, other });
    }

    let mut output = Vec::with_capacity(first * inputs.len());
    for offset in 0..first {
        for input in inputs {
            output.push(input.as_ref()[offset]);
        }
    }

    Ok(output)
}

/// Split a file into one output file per path
pub fn split_file<P: AsRef<Path>>(input: &Path, outputs: &[P]) -> Result<(), InterleaveError> {
    let data = fs::read(input)?;
    let parts = split(&data, outputs.len())?;
    for (path, part) in outputs.iter().zip(parts) {
        fs::write(path, part)?;
    }
    Ok(())
}

/// Merge input files into a single output file
pub fn merge_files<P: AsRef<Path>>(output: &Path, inputs: &[P]) -> Result<(), InterleaveError> {
    let data = inputs
        .iter()
        .map(fs::read)
        .collect::<Result<Vec<_>, _>>()?;
    fs::write(output, merge(&data)?)?;
    Ok(())
}
