//! Greedy non-maximum suppression for detection boxes.

use crate::candidate::sort_boxes_desc;
use crate::geometry::{iou, DetectionBox};

/// Applies greedy NMS within each label.
///
/// Boxes are stably sorted by descending confidence. Each box that has not
/// been removed is kept and removes every later box with the same label whose
/// IOU with it is at least `nms_threshold`. Boxes of different labels never
/// suppress each other. The result stays in descending-confidence order.
pub fn nms_per_label(boxes: &mut [DetectionBox], nms_threshold: f32) -> Vec<DetectionBox> {
    sort_boxes_desc(boxes);

    let mut removed = vec![false; boxes.len()];
    let mut kept = Vec::with_capacity(boxes.len());

    for i in 0..boxes.len() {
        if removed[i] {
            continue;
        }
        let current = boxes[i];
        kept.push(current);
        for (j, later) in boxes.iter().enumerate().skip(i + 1) {
            if removed[j] || later.label != current.label {
                continue;
            }
            if iou(&current, later) >= nms_threshold {
                removed[j] = true;
            }
        }
    }

    kept
}
