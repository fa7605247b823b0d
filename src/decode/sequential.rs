//! Single-threaded reference decoder.

use crate::candidate::CandidateSet;
use crate::decode::{Decode, DecodeConfig};
use crate::geometry::DetectionBox;
use crate::prediction::PredictionView;
use crate::trace::{trace_event, trace_span};
use crate::util::math::{argmax_first, passes};
use crate::util::DecodeResult;
use std::time::Instant;

/// Decode, stable confidence sort and greedy label-scoped NMS on one thread.
///
/// Output is in non-increasing confidence order and identical across runs
/// for identical input.
#[derive(Clone, Debug, Default)]
pub struct SequentialDecoder {
    cfg: DecodeConfig,
}

impl SequentialDecoder {
    pub fn new(cfg: DecodeConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.cfg
    }

    /// Thresholds every row and converts survivors to corner form.
    ///
    /// A row survives when its objectness and its best class score times
    /// objectness both reach `confidence_threshold`. The best class is the
    /// first maximum among the class scores.
    pub fn collect_candidates(&self, view: PredictionView<'_>) -> CandidateSet {
        let threshold = self.cfg.confidence_threshold;
        let mut candidates = CandidateSet::new();
        for row in view.iter() {
            let objectness = row.objectness();
            if !passes(objectness, threshold) {
                continue;
            }
            let Some((label, score)) = argmax_first(row.class_scores().iter().copied()) else {
                continue;
            };
            let confidence = score * objectness;
            if !passes(confidence, threshold) {
                continue;
            }
            candidates.push(DetectionBox::from_center(
                row.cx(),
                row.cy(),
                row.width(),
                row.height(),
                confidence,
                label,
            ));
        }
        candidates
    }

    /// Decodes `view` into boxes sorted by descending confidence.
    pub fn decode_view(&self, view: PredictionView<'_>) -> Vec<DetectionBox> {
        let _span = trace_span!("decode_sequential", rows = view.rows()).entered();
        let start = Instant::now();

        let candidates = self.collect_candidates(view);
        let num_candidates = candidates.len();
        let kept = candidates.into_suppressed(self.cfg.nms_threshold);

        trace_event!(
            "decode_sequential_done",
            candidates = num_candidates,
            kept = kept.len(),
            elapsed_us = start.elapsed().as_micros() as u64
        );
        kept
    }
}

impl Decode for SequentialDecoder {
    fn decode(&self, view: PredictionView<'_>) -> DecodeResult<Vec<DetectionBox>> {
        Ok(self.decode_view(view))
    }
}
