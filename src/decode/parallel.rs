//! Accelerator-offload decoder.
//!
//! One call runs the whole pipeline on a private stream:
//! 1. acquire the stream and buffers ([`DecodeBuffers`]),
//! 2. enqueue the output reset, the input upload and the kernel launch,
//! 3. enqueue the download and synchronize (the only blocking point),
//! 4. rebuild kept boxes from the pinned copy,
//! 5. release everything.
//!
//! Any failing step returns its error immediately; the buffers and stream
//! acquired so far are released on the way out.

use crate::decode::{Decode, DecodeConfig};
use crate::device::{DecodeBuffers, HostDevice};
use crate::geometry::DetectionBox;
use crate::kernel::{DecodeKernel, DefaultKernel, KernelArgs, OutputLayout};
use crate::prediction::PredictionView;
use crate::trace::{trace_event, trace_span};
use crate::util::DecodeResult;
use std::sync::Arc;
use std::time::Instant;

/// Decoder that dispatches thresholding and suppression to a kernel.
///
/// Boxes come back in kernel slot order, not sorted by confidence. Because
/// each suppression unit compares one pair in isolation, a box can be
/// removed by a neighbour that is itself removed, so results agree with
/// [`SequentialDecoder`](crate::decode::SequentialDecoder) as sets only when
/// no such suppression chains occur.
#[derive(Debug)]
pub struct ParallelDecoder<K = DefaultKernel> {
    device: HostDevice,
    kernel: Arc<K>,
    cfg: DecodeConfig,
}

impl ParallelDecoder<DefaultKernel> {
    /// Creates a decoder on a fresh device with the default kernel.
    pub fn new(cfg: DecodeConfig) -> Self {
        Self::with_device(HostDevice::new(), cfg)
    }

    pub fn with_device(device: HostDevice, cfg: DecodeConfig) -> Self {
        Self::with_kernel(device, DefaultKernel::default(), cfg)
    }
}

impl<K> ParallelDecoder<K>
where
    K: DecodeKernel + 'static,
{
    pub fn with_kernel(device: HostDevice, kernel: K, cfg: DecodeConfig) -> Self {
        Self {
            device,
            kernel: Arc::new(kernel),
            cfg,
        }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.cfg
    }

    pub fn device(&self) -> &HostDevice {
        &self.device
    }

    /// Decodes `view` on the device.
    pub fn decode_view(&self, view: PredictionView<'_>) -> DecodeResult<Vec<DetectionBox>> {
        self.cfg.validate()?;
        let _span = trace_span!(
            "decode_parallel",
            rows = view.rows(),
            max_objects = self.cfg.max_objects
        )
        .entered();
        let start = Instant::now();

        let layout = OutputLayout::new(self.cfg.max_objects);
        let buffers = DecodeBuffers::acquire(&self.device, view.as_slice().len(), layout)?;

        buffers.clear_output()?;
        buffers.upload(view.as_slice())?;
        let args = KernelArgs {
            input: buffers.input().clone(),
            num_rows: view.rows(),
            num_classes: view.num_classes(),
            confidence_threshold: self.cfg.confidence_threshold,
            nms_threshold: self.cfg.nms_threshold,
            affine: None,
            output: buffers.output().clone(),
            max_objects: layout.max_objects,
            record_width: layout.record_width,
        };
        buffers.launch(Arc::clone(&self.kernel), args)?;
        buffers.download()?;
        buffers.synchronize()?;

        let words = buffers.host_output().read_words();
        let boxes = layout.read_boxes(&words);
        buffers.release()?;

        trace_event!(
            "decode_parallel_done",
            candidates = words.first().copied().unwrap_or(0),
            kept = boxes.len(),
            elapsed_us = start.elapsed().as_micros() as u64
        );
        Ok(boxes)
    }
}

impl<K> Decode for ParallelDecoder<K>
where
    K: DecodeKernel + 'static,
{
    fn decode(&self, view: PredictionView<'_>) -> DecodeResult<Vec<DetectionBox>> {
        self.decode_view(view)
    }
}
