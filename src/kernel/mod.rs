//! Decode-and-suppress kernels.
//!
//! A kernel reads a device-resident prediction tensor and fills a device
//! output buffer laid out as one `u32` occupancy counter followed by up to
//! `max_objects` records of `record_width` words:
//! `[left, top, right, bottom, confidence, label, keep]` as `f32` bits.
//!
//! Work is split into independent execution units. Decode units each own
//! one input row and claim an output slot from the counter, which saturates
//! at `max_objects` so excess candidates are dropped. Suppression units each
//! own one ordered pair of records and may clear the keep flag of the
//! loser. Keep flags only ever go from set to cleared, so concurrent units
//! need no locking and their order does not change the outcome.

use crate::device::DeviceBuffer;
use crate::geometry::{iou, AffineMatrix, DetectionBox};
use crate::prediction::HEADER_LEN;
use crate::util::math::{argmax_first, passes};
use crate::util::{DecodeError, DecodeResult};
use std::sync::atomic::{AtomicU32, Ordering};

pub mod scalar;

#[cfg(feature = "rayon")]
pub mod rayon;

/// Kernel used when none is chosen explicitly.
#[cfg(feature = "rayon")]
pub type DefaultKernel = self::rayon::RayonKernel;
/// Kernel used when none is chosen explicitly.
#[cfg(not(feature = "rayon"))]
pub type DefaultKernel = scalar::ScalarKernel;

/// Words per output record.
pub const RECORD_WIDTH: usize = 7;

/// Word offsets inside one output record.
pub mod field {
    pub const LEFT: usize = 0;
    pub const TOP: usize = 1;
    pub const RIGHT: usize = 2;
    pub const BOTTOM: usize = 3;
    pub const CONFIDENCE: usize = 4;
    pub const LABEL: usize = 5;
    pub const KEEP: usize = 6;
}

const KEEP_SET: f32 = 1.0;
const KEEP_CLEARED: f32 = 0.0;

/// Shape of the kernel output buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    pub max_objects: usize,
    pub record_width: usize,
}

impl OutputLayout {
    /// Layout with the standard seven-word record.
    pub fn new(max_objects: usize) -> Self {
        Self {
            max_objects,
            record_width: RECORD_WIDTH,
        }
    }

    /// Counter word plus all record words, saturating at `usize::MAX`.
    pub fn total_words(&self) -> usize {
        self.max_objects
            .saturating_mul(self.record_width)
            .saturating_add(1)
    }

    /// Word offset of record `slot`.
    pub fn record_offset(&self, slot: usize) -> usize {
        1 + slot * self.record_width
    }

    /// Rebuilds the kept boxes from a host copy of the output buffer.
    ///
    /// The counter is clamped to `max_objects` (and to the records actually
    /// present), so a saturated or corrupt counter never reads past the end.
    /// Records with a cleared keep flag are skipped; the rest come back in
    /// slot order.
    pub fn read_boxes(&self, words: &[u32]) -> Vec<DetectionBox> {
        let Some(&counter) = words.first() else {
            return Vec::new();
        };
        if self.record_width < RECORD_WIDTH {
            return Vec::new();
        }
        let present = (words.len() - 1) / self.record_width;
        let count = (counter as usize).min(self.max_objects).min(present);
        let value = |idx: usize| f32::from_bits(words[idx]);

        let mut boxes = Vec::with_capacity(count);
        for slot in 0..count {
            let base = self.record_offset(slot);
            if value(base + field::KEEP) == KEEP_CLEARED {
                continue;
            }
            boxes.push(DetectionBox {
                left: value(base + field::LEFT),
                top: value(base + field::TOP),
                right: value(base + field::RIGHT),
                bottom: value(base + field::BOTTOM),
                confidence: value(base + field::CONFIDENCE),
                label: value(base + field::LABEL) as usize,
            });
        }
        boxes
    }
}

/// Launch parameters for a decode-and-suppress kernel.
#[derive(Clone, Debug)]
pub struct KernelArgs {
    /// Row-major prediction tensor on the device.
    pub input: DeviceBuffer,
    pub num_rows: usize,
    /// Class scores per row; rows are `num_classes + 5` words wide.
    pub num_classes: usize,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    /// Optional mapping applied to both box corners.
    pub affine: Option<AffineMatrix>,
    /// Counter plus records, see [`OutputLayout`].
    pub output: DeviceBuffer,
    pub max_objects: usize,
    pub record_width: usize,
}

impl KernelArgs {
    pub fn layout(&self) -> OutputLayout {
        OutputLayout {
            max_objects: self.max_objects,
            record_width: self.record_width,
        }
    }

    fn row_width(&self) -> usize {
        self.num_classes + HEADER_LEN
    }

    /// Checks the launch shape against the bound buffers.
    pub fn validate(&self) -> DecodeResult<()> {
        if self.record_width < RECORD_WIDTH {
            return Err(DecodeError::KernelFailed {
                reason: format!(
                    "record width {} is below {RECORD_WIDTH}",
                    self.record_width
                ),
            });
        }
        if self.num_classes == 0 {
            return Err(DecodeError::KernelFailed {
                reason: "no class scores per row".to_owned(),
            });
        }
        if u32::try_from(self.max_objects).is_err() {
            return Err(DecodeError::KernelFailed {
                reason: format!(
                    "max_objects {} exceeds the counter range",
                    self.max_objects
                ),
            });
        }
        let needed = self
            .num_rows
            .checked_mul(self.row_width())
            .ok_or(DecodeError::InvalidDimensions {
                rows: self.num_rows,
                cols: self.row_width(),
            })?;
        if self.input.len() < needed {
            return Err(DecodeError::BufferTooSmall {
                needed,
                got: self.input.len(),
            });
        }
        let needed = self.layout().total_words();
        if self.output.len() < needed {
            return Err(DecodeError::BufferTooSmall {
                needed,
                got: self.output.len(),
            });
        }
        Ok(())
    }
}

/// Kernel-dispatch capability executed on a stream.
///
/// Implementations must threshold, convert and suppress exactly like the
/// sequential decoder, but may visit rows and pairs in any order and leave
/// records unsorted.
pub trait DecodeKernel: Send + Sync {
    fn decode_and_suppress(&self, args: &KernelArgs) -> DecodeResult<()>;
}

#[inline]
fn load_f32(word: &AtomicU32) -> f32 {
    f32::from_bits(word.load(Ordering::Relaxed))
}

#[inline]
fn store_f32(word: &AtomicU32, value: f32) {
    word.store(value.to_bits(), Ordering::Relaxed);
}

/// Claims the next output slot, or `None` once `max_objects` are taken.
fn claim_slot(counter: &AtomicU32, max_objects: usize) -> Option<usize> {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
            ((count as usize) < max_objects).then_some(count + 1)
        })
        .ok()
        .map(|slot| slot as usize)
}

/// Decode unit: thresholds one row and appends it as a kept record.
pub(crate) fn decode_unit(
    args: &KernelArgs,
    input: &[AtomicU32],
    output: &[AtomicU32],
    row: usize,
) {
    let base = row * args.row_width();
    let value = |offset: usize| load_f32(&input[base + offset]);

    let objectness = value(4);
    if !passes(objectness, args.confidence_threshold) {
        return;
    }
    let scores = (0..args.num_classes).map(|class| value(HEADER_LEN + class));
    let Some((label, score)) = argmax_first(scores) else {
        return;
    };
    let confidence = score * objectness;
    if !passes(confidence, args.confidence_threshold) {
        return;
    }
    let Some(slot) = claim_slot(&output[0], args.max_objects) else {
        return;
    };

    let mut bbox =
        DetectionBox::from_center(value(0), value(1), value(2), value(3), confidence, label);
    if let Some(affine) = args.affine {
        (bbox.left, bbox.top) = affine.apply(bbox.left, bbox.top);
        (bbox.right, bbox.bottom) = affine.apply(bbox.right, bbox.bottom);
    }

    let record = &output[args.layout().record_offset(slot)..];
    store_f32(&record[field::LEFT], bbox.left);
    store_f32(&record[field::TOP], bbox.top);
    store_f32(&record[field::RIGHT], bbox.right);
    store_f32(&record[field::BOTTOM], bbox.bottom);
    store_f32(&record[field::CONFIDENCE], bbox.confidence);
    store_f32(&record[field::LABEL], label as f32);
    store_f32(&record[field::KEEP], KEEP_SET);
}

/// Number of records written by the decode units.
pub(crate) fn occupied(args: &KernelArgs, output: &[AtomicU32]) -> usize {
    (output[0].load(Ordering::Relaxed) as usize).min(args.max_objects)
}

fn load_record(output: &[AtomicU32], offset: usize) -> DetectionBox {
    DetectionBox {
        left: load_f32(&output[offset + field::LEFT]),
        top: load_f32(&output[offset + field::TOP]),
        right: load_f32(&output[offset + field::RIGHT]),
        bottom: load_f32(&output[offset + field::BOTTOM]),
        confidence: load_f32(&output[offset + field::CONFIDENCE]),
        label: load_f32(&output[offset + field::LABEL]) as usize,
    }
}

/// Suppression unit for the ordered pair of slots `i < j`.
///
/// When both records share a label and overlap by at least `nms_threshold`,
/// the lower-confidence record loses; on equal confidence slot `j` loses.
pub(crate) fn suppress_pair(args: &KernelArgs, output: &[AtomicU32], i: usize, j: usize) {
    let layout = args.layout();
    let a = load_record(output, layout.record_offset(i));
    let b = load_record(output, layout.record_offset(j));
    if a.label != b.label || !passes(iou(&a, &b), args.nms_threshold) {
        return;
    }
    let loser = if a.confidence >= b.confidence { j } else { i };
    store_f32(&output[layout.record_offset(loser) + field::KEEP], KEEP_CLEARED);
}

#[cfg(test)]
mod tests {
    use super::{claim_slot, OutputLayout};
    use std::sync::atomic::AtomicU32;

    #[test]
    fn slot_counter_saturates_at_capacity() {
        let counter = AtomicU32::new(0);
        assert_eq!(claim_slot(&counter, 2), Some(0));
        assert_eq!(claim_slot(&counter, 2), Some(1));
        assert_eq!(claim_slot(&counter, 2), None);
        assert_eq!(counter.into_inner(), 2);
    }

    #[test]
    fn read_boxes_clamps_counter_and_skips_cleared() {
        let layout = OutputLayout::new(2);
        let mut words = vec![0u32; layout.total_words()];
        words[0] = 9;
        let records = [
            [0.0f32, 0.0, 2.0, 2.0, 0.9, 1.0, 1.0],
            [5.0, 5.0, 6.0, 6.0, 0.8, 0.0, 0.0],
        ];
        for (slot, record) in records.iter().enumerate() {
            let base = layout.record_offset(slot);
            for (k, value) in record.iter().enumerate() {
                words[base + k] = value.to_bits();
            }
        }

        let boxes = layout.read_boxes(&words);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, 1);
        assert_eq!(boxes[0].right, 2.0);
    }

    #[test]
    fn total_words_saturates() {
        assert_eq!(OutputLayout::new(4).total_words(), 29);
        assert_eq!(OutputLayout::new(usize::MAX).total_words(), usize::MAX);
    }

    #[test]
    fn read_boxes_of_empty_buffer_is_empty() {
        assert!(OutputLayout::new(4).read_boxes(&[]).is_empty());
    }
}
