//! Decoding entry points.
//!
//! Two interchangeable decoders turn a prediction tensor into labeled boxes:
//! [`SequentialDecoder`] is the single-threaded reference and returns boxes in
//! descending confidence; [`ParallelDecoder`] offloads the work to a kernel on
//! an emulated device and returns boxes in kernel slot order. [`Decoder`]
//! picks one of them from [`DecodeConfig::backend`].

pub mod parallel;
pub mod sequential;

pub use parallel::ParallelDecoder;
pub use sequential::SequentialDecoder;

use crate::device::HostDevice;
use crate::geometry::DetectionBox;
use crate::prediction::PredictionView;
use crate::util::{DecodeError, DecodeResult};

/// Which decoder implementation to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Sequential,
    Parallel,
}

/// Thresholds and limits for a decode call.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeConfig {
    /// Minimum objectness and minimum combined confidence.
    pub confidence_threshold: f32,
    /// IOU at or above which a same-label box is suppressed.
    pub nms_threshold: f32,
    /// Capacity of the parallel candidate buffer; the sequential decoder is
    /// unbounded.
    pub max_objects: usize,
    pub backend: Backend,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            max_objects: 100,
            backend: Backend::Sequential,
        }
    }
}

impl DecodeConfig {
    /// Checks that thresholds are numbers and the capacity fits the counter.
    pub fn validate(&self) -> DecodeResult<()> {
        if self.confidence_threshold.is_nan() {
            return Err(DecodeError::InvalidConfig("confidence_threshold is NaN"));
        }
        if self.nms_threshold.is_nan() {
            return Err(DecodeError::InvalidConfig("nms_threshold is NaN"));
        }
        if self.max_objects == 0 {
            return Err(DecodeError::InvalidConfig("max_objects must be at least 1"));
        }
        if u32::try_from(self.max_objects).is_err() {
            return Err(DecodeError::InvalidConfig("max_objects exceeds u32::MAX"));
        }
        Ok(())
    }
}

/// Common contract of both decoders.
pub trait Decode {
    /// Decodes one prediction tensor into the surviving boxes.
    fn decode(&self, view: PredictionView<'_>) -> DecodeResult<Vec<DetectionBox>>;
}

#[derive(Debug)]
enum Engine {
    Sequential(SequentialDecoder),
    Parallel(ParallelDecoder),
}

/// High-level decoder dispatching on [`Backend`].
#[derive(Debug)]
pub struct Decoder {
    engine: Engine,
}

impl Decoder {
    /// Creates a decoder; the parallel backend gets a fresh [`HostDevice`].
    pub fn new(cfg: DecodeConfig) -> Self {
        Self::with_device(cfg, HostDevice::new())
    }

    /// Creates a decoder whose parallel backend runs on `device`.
    pub fn with_device(cfg: DecodeConfig, device: HostDevice) -> Self {
        let engine = match cfg.backend {
            Backend::Sequential => Engine::Sequential(SequentialDecoder::new(cfg)),
            Backend::Parallel => Engine::Parallel(ParallelDecoder::with_device(device, cfg)),
        };
        Self { engine }
    }

    pub fn config(&self) -> &DecodeConfig {
        match &self.engine {
            Engine::Sequential(decoder) => decoder.config(),
            Engine::Parallel(decoder) => decoder.config(),
        }
    }

    /// Decodes `rows * cols` row-major floats.
    ///
    /// Rows are `[cx, cy, w, h, objectness, class scores...]`, so `cols` must
    /// be at least 6.
    pub fn decode(
        &self,
        predict: &[f32],
        rows: usize,
        cols: usize,
    ) -> DecodeResult<Vec<DetectionBox>> {
        let view = PredictionView::new(predict, rows, cols)?;
        self.decode_view(view)
    }

    pub fn decode_view(&self, view: PredictionView<'_>) -> DecodeResult<Vec<DetectionBox>> {
        match &self.engine {
            Engine::Sequential(decoder) => Ok(decoder.decode_view(view)),
            Engine::Parallel(decoder) => decoder.decode_view(view),
        }
    }
}

impl Decode for Decoder {
    fn decode(&self, view: PredictionView<'_>) -> DecodeResult<Vec<DetectionBox>> {
        self.decode_view(view)
    }
}
