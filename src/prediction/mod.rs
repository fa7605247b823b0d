//! Raw prediction tensors.
//!
//! `PredictionView` is a borrowed row-major view of `rows` detection rows of
//! `cols` floats each: `cx, cy, w, h, objectness` followed by `cols - 5`
//! class scores. The row stride is always `cols`; construction validates the
//! shape so row access never strides past the backing slice.

use crate::util::{DecodeError, DecodeResult};

pub mod io;

/// Number of leading geometry fields in every row (`cx, cy, w, h, objectness`).
pub const HEADER_LEN: usize = 5;

/// Smallest usable row width: the header plus one class score.
pub const MIN_COLS: usize = HEADER_LEN + 1;

/// Borrowed view over a row-major prediction tensor.
#[derive(Copy, Clone, Debug)]
pub struct PredictionView<'a> {
    data: &'a [f32],
    rows: usize,
    cols: usize,
}

impl<'a> PredictionView<'a> {
    /// Creates a view over the first `rows * cols` elements of `data`.
    pub fn new(data: &'a [f32], rows: usize, cols: usize) -> DecodeResult<Self> {
        if cols < MIN_COLS {
            return Err(DecodeError::TooFewColumns {
                cols,
                min: MIN_COLS,
            });
        }
        let needed = rows
            .checked_mul(cols)
            .ok_or(DecodeError::InvalidDimensions { rows, cols })?;
        if data.len() < needed {
            return Err(DecodeError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data: &data[..needed],
            rows,
            cols,
        })
    }

    /// Creates a view inferring the row count from the buffer length.
    ///
    /// Trailing elements that do not fill a whole row are ignored.
    pub fn from_flat(data: &'a [f32], cols: usize) -> DecodeResult<Self> {
        if cols < MIN_COLS {
            return Err(DecodeError::TooFewColumns {
                cols,
                min: MIN_COLS,
            });
        }
        Self::new(data, data.len() / cols, cols)
    }

    /// Returns the number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of floats per row.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the number of class scores per row.
    pub fn num_classes(&self) -> usize {
        self.cols - HEADER_LEN
    }

    /// Returns the exact `rows * cols` backing slice.
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Returns row `index`, if present.
    pub fn row(&self, index: usize) -> Option<PredictionRow<'a>> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.cols;
        self.data
            .get(start..start + self.cols)
            .map(|values| PredictionRow { values })
    }

    /// Iterates over all rows in order.
    pub fn iter(&self) -> impl Iterator<Item = PredictionRow<'a>> + 'a {
        self.data
            .chunks_exact(self.cols)
            .map(|values| PredictionRow { values })
    }
}

/// One detection row: center-form geometry, objectness, class scores.
#[derive(Copy, Clone, Debug)]
pub struct PredictionRow<'a> {
    values: &'a [f32],
}

impl<'a> PredictionRow<'a> {
    pub fn cx(&self) -> f32 {
        self.values[0]
    }

    pub fn cy(&self) -> f32 {
        self.values[1]
    }

    pub fn width(&self) -> f32 {
        self.values[2]
    }

    pub fn height(&self) -> f32 {
        self.values[3]
    }

    /// Probability that the anchor holds any object.
    pub fn objectness(&self) -> f32 {
        self.values[4]
    }

    /// Per-class scores following the header.
    pub fn class_scores(&self) -> &'a [f32] {
        &self.values[HEADER_LEN..]
    }
}
