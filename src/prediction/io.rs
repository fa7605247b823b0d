//! Loading raw prediction dumps.
//!
//! A dump is a flat sequence of little-endian `f32` values with no header,
//! as written by an inference runtime copying its output tensor to disk.

use crate::util::{DecodeError, DecodeResult};
use std::path::Path;

/// Decodes little-endian `f32` values from a byte buffer.
pub fn predictions_from_le_bytes(bytes: &[u8]) -> DecodeResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::Io {
            reason: format!("byte length {} is not a multiple of 4", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Reads a raw prediction dump from disk.
pub fn load_predictions<P: AsRef<Path>>(path: P) -> DecodeResult<Vec<f32>> {
    let bytes = std::fs::read(path.as_ref()).map_err(|err| DecodeError::Io {
        reason: format!("{}: {err}", path.as_ref().display()),
    })?;
    predictions_from_le_bytes(&bytes)
}
