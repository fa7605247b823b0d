//! detdecode turns raw object-detection network output into labeled boxes.
//!
//! A prediction tensor holds one row per anchor: center-form geometry,
//! objectness and per-class scores. Decoding keeps rows whose confidence
//! clears a threshold and removes same-label duplicates with non-maximum
//! suppression. The crate ships a sequential reference decoder and a
//! parallel decoder that drives a kernel on an emulated accelerator through
//! explicit device buffers and streams, with optional rayon parallelism via
//! the `rayon` feature.

mod candidate;
pub mod decode;
pub mod device;
pub mod geometry;
pub mod kernel;
pub mod lowlevel;
pub mod prediction;
mod trace;
pub mod util;

pub use decode::{Backend, Decode, DecodeConfig, Decoder, ParallelDecoder, SequentialDecoder};
pub use device::{DeviceConfig, HostDevice};
pub use geometry::{iou, AffineMatrix, DetectionBox};
pub use prediction::io::{load_predictions, predictions_from_le_bytes};
pub use prediction::{PredictionRow, PredictionView};
pub use util::{DecodeError, DecodeResult};
