//! Candidate collection and pruning.
//!
//! Thresholded boxes accumulate in a `CandidateSet`, which is then sorted by
//! descending confidence and pruned with label-scoped suppression.

pub(crate) mod nms;

use crate::geometry::DetectionBox;
use std::cmp::Ordering;

fn confidence_cmp_desc(a: &DetectionBox, b: &DetectionBox) -> Ordering {
    b.confidence.total_cmp(&a.confidence)
}

/// Sorts boxes by descending confidence, keeping input order among ties.
pub(crate) fn sort_boxes_desc(boxes: &mut [DetectionBox]) {
    boxes.sort_by(confidence_cmp_desc);
}

/// Working set of thresholded boxes for one decode call.
#[derive(Clone, Debug, Default)]
pub struct CandidateSet {
    boxes: Vec<DetectionBox>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            boxes: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, candidate: DetectionBox) {
        self.boxes.push(candidate);
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn as_slice(&self) -> &[DetectionBox] {
        &self.boxes
    }

    /// Sorts by descending confidence and applies label-scoped suppression.
    pub fn into_suppressed(mut self, nms_threshold: f32) -> Vec<DetectionBox> {
        nms::nms_per_label(&mut self.boxes, nms_threshold)
    }
}

impl Extend<DetectionBox> for CandidateSet {
    fn extend<I: IntoIterator<Item = DetectionBox>>(&mut self, iter: I) {
        self.boxes.extend(iter);
    }
}
