//! Low-level building blocks for custom decode pipelines.
//!
//! These types expose the candidate set, device buffers, streams and kernel
//! interface used by the decoders. Most users should prefer [`Decoder`](crate::Decoder).

pub use crate::candidate::nms::nms_per_label;
pub use crate::candidate::CandidateSet;
pub use crate::device::{DecodeBuffers, DeviceBuffer, PinnedBuffer, Stream, WORD_BYTES};
pub use crate::kernel::scalar::ScalarKernel;
pub use crate::kernel::{field, DecodeKernel, DefaultKernel, KernelArgs, OutputLayout, RECORD_WIDTH};
#[cfg(feature = "rayon")]
pub use crate::kernel::rayon::RayonKernel;
